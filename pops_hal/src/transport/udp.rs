//! UDP transport.
//!
//! Each link owns a send socket (broadcast enabled, so the destination may
//! be a subnet broadcast address) and, when the port is free, a
//! non-blocking receive socket bound to `INADDR_ANY:port`.

use pops_common::hal::driver::HalError;
use pops_common::hal::transport::Transport;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use tracing::{debug, warn};

/// A UDP link.
pub struct UdpLink {
    name: String,
    dest: SocketAddr,
    port: u16,
    sender: Option<UdpSocket>,
    receiver: Option<UdpSocket>,
}

impl UdpLink {
    /// Create a closed link sending to `ip:port` and receiving on `port`.
    ///
    /// # Errors
    /// `HalError::ConfigError` if `ip` is not an IPv4 address.
    pub fn new(ip: &str, port: u16) -> Result<Self, HalError> {
        let addr: Ipv4Addr = ip
            .parse()
            .map_err(|e| HalError::ConfigError(format!("UDP address '{ip}': {e}")))?;
        Ok(Self {
            name: format!("udp://{ip}:{port}"),
            dest: SocketAddr::V4(SocketAddrV4::new(addr, port)),
            port,
            sender: None,
            receiver: None,
        })
    }

    /// Port the receive socket is bound to, if any.
    pub fn receive_port(&self) -> Option<u16> {
        self.receiver
            .as_ref()
            .and_then(|s| s.local_addr().ok())
            .map(|a| a.port())
    }
}

impl Transport for UdpLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.sender.is_some()
    }

    fn reopen(&mut self) -> Result<(), HalError> {
        let sender = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .map_err(|e| HalError::io(&self.name, e))?;
        sender
            .set_broadcast(true)
            .map_err(|e| HalError::io(&self.name, e))?;
        self.sender = Some(sender);

        match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, self.port)) {
            Ok(receiver) => {
                receiver
                    .set_nonblocking(true)
                    .map_err(|e| HalError::io(&self.name, e))?;
                self.receiver = Some(receiver);
            }
            Err(e) => warn!("{}: receive port unavailable ({e}); send only", self.name),
        }
        debug!("Opened {}", self.name);
        Ok(())
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), HalError> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(HalError::CommunicationError(format!("{} is closed", self.name)));
        };
        sender
            .send_to(frame, self.dest)
            .map(|_| ())
            .map_err(|e| HalError::io(&self.name, e))
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, HalError> {
        let Some(receiver) = self.receiver.as_ref() else {
            return Ok(0);
        };
        match receiver.recv_from(buf) {
            Ok((n, _)) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(HalError::io(&self.name, e)),
        }
    }
}
