//! BeagleBone Black driver for the POPS daughter board.
//!
//! - [`dac`] - MAX5802 dual 12-bit DAC on I2C
//! - [`gpio`] - sysfs GPIO outputs (heartbeat, range alarm)
//! - [`watchdog`] - `/dev/watchdog` keepalive
//! - [`sensors`] - sysfs analog inputs and IIO pressure/temperature

pub mod dac;
mod driver;
pub mod gpio;
pub mod sensors;
pub mod watchdog;

pub use driver::BeagleBoneDriver;

use pops_common::hal::driver::HardwareDriver;

/// Factory function for the driver registry.
pub fn create_driver() -> Box<dyn HardwareDriver> {
    Box::new(BeagleBoneDriver::new())
}
