//! Byte links carrying telemetry out and commands in.

use crate::hal::driver::HalError;

/// A non-blocking, frame-oriented byte link (serial port or UDP socket).
pub trait Transport: Send {
    /// Human-readable link name for log messages.
    fn name(&self) -> &str;

    /// Whether the link currently holds an open device or socket.
    fn is_open(&self) -> bool;

    /// Try to (re)open a closed link.
    fn reopen(&mut self) -> Result<(), HalError>;

    /// Send one frame.
    fn send(&mut self, frame: &[u8]) -> Result<(), HalError>;

    /// Receive pending bytes without blocking. Returns 0 when nothing is pending.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, HalError>;
}
