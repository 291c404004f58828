//! sysfs GPIO outputs.

use pops_common::hal::driver::HalError;
use std::fs;
use std::path::{Path, PathBuf};

/// Default sysfs GPIO root.
pub const SYSFS_GPIO: &str = "/sys/class/gpio";

/// One GPIO configured as an output.
#[derive(Debug)]
pub struct OutputPin {
    number: u32,
    value: PathBuf,
}

impl OutputPin {
    /// Export `number` under `root` (if needed) and set it to output, low.
    pub fn export(root: &Path, number: u32) -> Result<Self, HalError> {
        let dir = root.join(format!("gpio{number}"));
        if !dir.exists() {
            fs::write(root.join("export"), number.to_string())
                .map_err(|e| HalError::InitFailed(format!("export gpio{number}: {e}")))?;
        }
        fs::write(dir.join("direction"), "out")
            .map_err(|e| HalError::InitFailed(format!("gpio{number} direction: {e}")))?;
        let pin = Self {
            number,
            value: dir.join("value"),
        };
        pin.set(false)?;
        Ok(pin)
    }

    /// Drive the pin.
    pub fn set(&self, high: bool) -> Result<(), HalError> {
        fs::write(&self.value, if high { "1" } else { "0" })
            .map_err(|e| HalError::CommunicationError(format!("gpio{}: {e}", self.number)))
    }
}
