//! Linux hardware watchdog.
//!
//! The device is closed without the magic character, so the timer stays
//! armed after the process exits and the board reboots unless the OS
//! shuts down first.

use pops_common::hal::driver::HalError;
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::Path;
use tracing::info;

nix::ioctl_read!(wdioc_keepalive, b'W', 5, libc::c_int);
nix::ioctl_readwrite!(wdioc_settimeout, b'W', 6, libc::c_int);

/// An armed hardware watchdog.
pub struct Watchdog {
    file: File,
}

impl Watchdog {
    /// Open the device and set the timeout.
    ///
    /// # Errors
    /// `HalError::Watchdog` if the device cannot be opened or configured.
    pub fn open(device: &Path, timeout_s: u32) -> Result<Self, HalError> {
        let file = OpenOptions::new()
            .write(true)
            .open(device)
            .map_err(|e| HalError::Watchdog(format!("{}: {e}", device.display())))?;
        let mut interval = timeout_s as libc::c_int;
        // SAFETY: valid fd and a live c_int for the kernel to read and update.
        unsafe { wdioc_settimeout(file.as_raw_fd(), &mut interval) }
            .map_err(|e| HalError::Watchdog(format!("WDIOC_SETTIMEOUT: {e}")))?;
        info!("Watchdog armed ({interval}s)");
        Ok(Self { file })
    }

    /// Reset the timer.
    pub fn keepalive(&self) -> Result<(), HalError> {
        let mut dummy: libc::c_int = 0;
        // SAFETY: valid fd; the argument is ignored by the kernel.
        unsafe { wdioc_keepalive(self.file.as_raw_fd(), &mut dummy) }
            .map(|_| ())
            .map_err(|e| HalError::Watchdog(format!("WDIOC_KEEPALIVE: {e}")))
    }
}
