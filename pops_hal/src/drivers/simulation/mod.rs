//! Simulation driver for development without the daughter board.

mod driver;

pub use driver::{SimulationDriver, SimulationProbe};

use pops_common::hal::driver::HardwareDriver;

/// Factory function for the driver registry.
pub fn create_driver() -> Box<dyn HardwareDriver> {
    Box::new(SimulationDriver::new())
}
