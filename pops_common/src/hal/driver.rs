//! Hardware driver trait and error types.
//!
//! This module defines:
//! - `HardwareDriver` trait - Interface for pluggable instrument backends
//! - `HalError` enum - Error types for hardware operations
//! - `DriverFactory` type alias - Factory function type

use crate::config::{HardwareConfig, TimingConfig};
use crate::consts::AI_CHANNELS;
use thiserror::Error;

/// Error types for hardware operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Driver initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Hardware communication error
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),

    /// Driver not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// A driver name was registered twice
    #[error("Driver already registered: {0}")]
    DuplicateDriver(String),

    /// Coprocessor memory could not be mapped
    #[error("Memory map error: {0}")]
    MemoryMap(String),

    /// Coprocessor firmware could not be loaded or started
    #[error("Firmware load failed: {0}")]
    FirmwareLoad(String),

    /// Watchdog device error
    #[error("Watchdog error: {0}")]
    Watchdog(String),
}

impl HalError {
    /// Wrap an I/O error as a communication error with context.
    pub fn io(context: &str, err: std::io::Error) -> Self {
        Self::CommunicationError(format!("{context}: {err}"))
    }
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn() -> Box<dyn HardwareDriver>;

/// Interface for the instrument's peripheral hardware.
///
/// The acquisition loop owns one driver and calls it from a single thread.
///
/// # Lifecycle
///
/// 1. `init()` - Called once before the loop starts
/// 2. I/O methods - Called from loop micro-steps
/// 3. `shutdown()` - Called once when the loop stops
pub trait HardwareDriver: Send {
    /// Returns the driver's unique identifier (e.g., "simulation", "beaglebone").
    fn name(&self) -> &'static str;

    /// Returns the driver's semantic version.
    fn version(&self) -> &'static str;

    /// Open devices and arm the watchdog.
    ///
    /// # Errors
    /// Return `HalError::InitFailed` if a required device cannot be opened.
    fn init(&mut self, config: &HardwareConfig, timing: &TimingConfig) -> Result<(), HalError>;

    /// Read all analog input channels in millivolts (0–1800).
    fn read_analog_inputs(&mut self, millivolts: &mut [i32; AI_CHANNELS])
    -> Result<(), HalError>;

    /// Read ambient pressure (mbar) and temperature (°C).
    fn read_pressure_temperature(&mut self) -> Result<(f64, f64), HalError>;

    /// Load a 12-bit code into an analog output channel.
    fn set_analog_output(&mut self, channel: usize, code: u32) -> Result<(), HalError>;

    /// Drive the heartbeat indicator.
    fn set_heartbeat(&mut self, on: bool) -> Result<(), HalError>;

    /// Drive the analog input range alarm.
    fn set_range_alarm(&mut self, on: bool) -> Result<(), HalError>;

    /// Reset the hardware watchdog timer.
    fn pet_watchdog(&mut self) -> Result<(), HalError>;

    /// Release devices. The watchdog is left armed.
    fn shutdown(&mut self) -> Result<(), HalError>;
}
