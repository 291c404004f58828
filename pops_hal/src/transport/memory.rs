//! In-process transport.

use parking_lot::Mutex;
use pops_common::hal::driver::HalError;
use pops_common::hal::transport::Transport;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Default)]
struct LinkState {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    open: bool,
    reopen_attempts: usize,
}

/// Peer side of a [`MemoryLink`]: injects inbound bytes and inspects sent frames.
#[derive(Debug, Clone, Default)]
pub struct MemoryLinkHandle(Arc<Mutex<LinkState>>);

impl MemoryLinkHandle {
    /// Queue bytes for the next `receive`.
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.0.lock().inbound.push_back(bytes.to_vec());
    }

    /// Frames sent so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.0.lock().sent.clone()
    }

    /// Remove and return frames sent so far.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.0.lock().sent)
    }

    /// Force the link open or closed.
    pub fn set_open(&self, open: bool) {
        self.0.lock().open = open;
    }

    /// Number of `reopen` calls seen.
    pub fn reopen_attempts(&self) -> usize {
        self.0.lock().reopen_attempts
    }
}

/// A link that records frames in memory.
pub struct MemoryLink {
    name: String,
    state: MemoryLinkHandle,
}

impl MemoryLink {
    /// Create an open link and its peer handle.
    pub fn new(name: &str) -> (Self, MemoryLinkHandle) {
        let handle = MemoryLinkHandle::default();
        handle.set_open(true);
        (
            Self {
                name: name.to_string(),
                state: handle.clone(),
            },
            handle,
        )
    }
}

impl Transport for MemoryLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.state.0.lock().open
    }

    fn reopen(&mut self) -> Result<(), HalError> {
        let mut state = self.state.0.lock();
        state.reopen_attempts += 1;
        state.open = true;
        Ok(())
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), HalError> {
        let mut state = self.state.0.lock();
        if !state.open {
            return Err(HalError::CommunicationError(format!("{} is closed", self.name)));
        }
        state.sent.push(frame.to_vec());
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, HalError> {
        let mut state = self.state.0.lock();
        let Some(bytes) = state.inbound.pop_front() else {
            return Ok(0);
        };
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }
}
