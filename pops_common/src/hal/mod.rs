//! Hardware seams of the acquisition loop.
//!
//! - [`driver`] - `HardwareDriver` trait, `HalError`, factory type
//! - [`pru`] - Coprocessor memory: event ring and control region
//! - [`transport`] - Byte links carrying telemetry and commands

pub mod driver;
pub mod pru;
pub mod transport;
