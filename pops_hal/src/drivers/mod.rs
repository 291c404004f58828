//! Hardware driver implementations.
//!
//! - [`beaglebone`] - BeagleBone Black with the POPS daughter board
//! - [`simulation`] - Software stand-in for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement `HardwareDriver` from `pops_common::hal::driver`
//! 3. Register it in [`register_all_drivers`]

pub mod beaglebone;
pub mod simulation;

use crate::driver_registry::DriverRegistry;
use pops_common::hal::driver::HalError;

/// Register all built-in drivers.
///
/// # Errors
/// `HalError::DuplicateDriver` if `registry` already holds one of the names.
pub fn register_all_drivers(registry: &mut DriverRegistry) -> Result<(), HalError> {
    registry.register("beaglebone", beaglebone::create_driver)?;
    registry.register("simulation", simulation::create_driver)
}
