//! MAX5802 dual 12-bit DAC over I2C.
//!
//! Every command is three bytes: command/channel, then data MSB and LSB
//! with the 12-bit value left-aligned in 16 bits.

use pops_common::consts::DAC_FULL_SCALE;
use pops_common::hal::driver::HalError;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::info;

nix::ioctl_write_int_bad!(i2c_set_slave, 0x0703);

const CMD_CODE: u8 = 0x00;
const CMD_LOAD: u8 = 0x10;
const CMD_SW_CLEAR: u8 = 0x50;
const CMD_SW_RESET: u8 = 0x51;
const CMD_RETURN: u8 = 0x40;
const CMD_DEFAULT: u8 = 0x60;
const CMD_REF_4096: u8 = 0x77;
const ALL_CHANNELS: u8 = 0x03;

const SETTLE: Duration = Duration::from_millis(100);

/// Bytes of the CODE command for `channel` and a 12-bit `value`.
pub fn code_command(channel: u8, value: u32) -> [u8; 3] {
    let value = value.min(DAC_FULL_SCALE - 1);
    [
        CMD_CODE | channel,
        ((value & 0x0FF0) >> 4) as u8,
        ((value & 0x000F) << 4) as u8,
    ]
}

/// Bytes of the LOAD command for `channel`.
pub fn load_command(channel: u8) -> [u8; 3] {
    [CMD_LOAD | channel, 0, 0]
}

/// An open MAX5802.
pub struct Max5802 {
    bus: File,
}

impl Max5802 {
    /// Open the I2C bus and select the DAC address.
    ///
    /// # Errors
    /// `HalError::InitFailed` if the bus cannot be opened or addressed.
    pub fn open(bus: &Path, address: u16) -> Result<Self, HalError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(bus)
            .map_err(|e| HalError::InitFailed(format!("{}: {e}", bus.display())))?;
        // SAFETY: I2C_SLAVE takes the 7-bit address by value on a valid fd.
        unsafe { i2c_set_slave(file.as_raw_fd(), i32::from(address)) }
            .map_err(|e| HalError::InitFailed(format!("I2C_SLAVE 0x{address:02X}: {e}")))?;
        Ok(Self { bus: file })
    }

    /// Clear, reset, restore power-on defaults and select the 4.096 V reference.
    pub fn initialize(&mut self) -> Result<(), HalError> {
        self.send(&[CMD_SW_CLEAR, 0, 0])?;
        thread::sleep(SETTLE);
        self.send(&[CMD_SW_RESET, 0, 0])?;
        thread::sleep(SETTLE);
        self.send(&[CMD_DEFAULT, ALL_CHANNELS, 0])?;
        self.send(&[CMD_RETURN, ALL_CHANNELS, 0])?;
        thread::sleep(SETTLE);
        self.send(&[CMD_REF_4096, 0, 0])?;
        info!("MAX5802 initialized");
        Ok(())
    }

    /// Write and latch a 12-bit value on one channel.
    pub fn set(&mut self, channel: u8, value: u32) -> Result<(), HalError> {
        self.send(&code_command(channel, value))?;
        self.send(&load_command(channel))
    }

    fn send(&mut self, bytes: &[u8; 3]) -> Result<(), HalError> {
        self.bus
            .write_all(bytes)
            .map_err(|e| HalError::io("MAX5802", e))
    }
}
