//! UART transport.
//!
//! Ports are opened without a controlling terminal and configured raw:
//! 8 data bits, receiver on, modem lines ignored, parity errors ignored,
//! `VMIN = 0` / `VTIME = 0` so reads return immediately.

use nix::sys::termios::{
    self, BaudRate, ControlFlags, FlushArg, InputFlags, LocalFlags, OutputFlags, SetArg,
    SpecialCharacterIndices,
};
use pops_common::hal::driver::HalError;
use pops_common::hal::transport::Transport;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Map a numeric baud rate; unsupported rates fall back to 9600.
fn baud_rate(baud: u32) -> BaudRate {
    match baud {
        1200 => BaudRate::B1200,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        19_200 => BaudRate::B19200,
        38_400 => BaudRate::B38400,
        57_600 => BaudRate::B57600,
        115_200 => BaudRate::B115200,
        _ => BaudRate::B9600,
    }
}

/// A serial port link.
pub struct SerialLink {
    name: String,
    path: PathBuf,
    baud: u32,
    file: Option<File>,
}

impl SerialLink {
    /// Create a closed link for `path` at `baud`. Call [`Transport::reopen`] to open it.
    pub fn new(path: impl Into<PathBuf>, baud: u32) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            path,
            baud,
            file: None,
        }
    }

    fn configure(file: &File, baud: u32) -> nix::Result<()> {
        let mut options = termios::tcgetattr(file)?;
        options.control_flags = ControlFlags::CS8 | ControlFlags::CREAD | ControlFlags::CLOCAL;
        termios::cfsetspeed(&mut options, baud_rate(baud))?;
        options.input_flags = InputFlags::IGNPAR;
        options.output_flags = OutputFlags::empty();
        options.local_flags = LocalFlags::empty();
        options.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        options.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        termios::tcflush(file, FlushArg::TCIFLUSH)?;
        termios::tcsetattr(file, SetArg::TCSANOW, &options)
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            warn!("Closed serial port {}", self.name);
        }
    }
}

impl Transport for SerialLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn reopen(&mut self) -> Result<(), HalError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&self.path)
            .map_err(|e| HalError::io(&self.name, e))?;
        Self::configure(&file, self.baud)
            .map_err(|e| HalError::CommunicationError(format!("{}: termios: {e}", self.name)))?;
        debug!("Opened serial port {} at {} baud", self.name, self.baud);
        self.file = Some(file);
        Ok(())
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), HalError> {
        let Some(file) = self.file.as_mut() else {
            return Err(HalError::CommunicationError(format!("{} is closed", self.name)));
        };
        if let Err(e) = file.write_all(frame) {
            let err = HalError::io(&self.name, e);
            self.close();
            return Err(err);
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, HalError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };
        match file.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                Ok(0)
            }
            Err(e) => {
                let err = HalError::io(&self.name, e);
                self.close();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_baud_falls_back() {
        assert_eq!(baud_rate(115_200), BaudRate::B115200);
        assert_eq!(baud_rate(12_345), BaudRate::B9600);
    }

    #[test]
    fn missing_device_stays_closed() {
        let mut link = SerialLink::new("/nonexistent/ttyO9", 9600);
        assert!(link.reopen().is_err());
        assert!(!link.is_open());
        assert!(link.send(b"x").is_err());
        let mut buf = [0u8; 8];
        assert_eq!(link.receive(&mut buf).unwrap(), 0);
    }
}
