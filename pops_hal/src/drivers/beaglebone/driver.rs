//! BeagleBone driver implementation.

use super::dac::Max5802;
use super::gpio::{OutputPin, SYSFS_GPIO};
use super::sensors::{ain_path, read_int, read_pressure_mbar, read_temperature_c};
use super::watchdog::Watchdog;
use pops_common::config::{HardwareConfig, TimingConfig};
use pops_common::consts::AI_CHANNELS;
use pops_common::hal::driver::{HalError, HardwareDriver};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Driver for the BeagleBone Black and POPS daughter board.
///
/// Peripherals that fail to open are logged and left absent; their
/// operations then return `CommunicationError` so the loop can keep
/// running on stale values.
pub struct BeagleBoneDriver {
    ain: Vec<PathBuf>,
    pressure: PathBuf,
    temperature: PathBuf,
    dac: Option<Max5802>,
    heartbeat: Option<OutputPin>,
    alarm: Option<OutputPin>,
    watchdog: Option<Watchdog>,
}

impl BeagleBoneDriver {
    /// Create an uninitialized driver.
    pub fn new() -> Self {
        Self {
            ain: Vec::new(),
            pressure: PathBuf::new(),
            temperature: PathBuf::new(),
            dac: None,
            heartbeat: None,
            alarm: None,
            watchdog: None,
        }
    }

    fn missing(what: &str) -> HalError {
        HalError::CommunicationError(format!("{what} not available"))
    }
}

impl Default for BeagleBoneDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareDriver for BeagleBoneDriver {
    fn name(&self) -> &'static str {
        "beaglebone"
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn init(&mut self, config: &HardwareConfig, timing: &TimingConfig) -> Result<(), HalError> {
        self.ain = (0..AI_CHANNELS)
            .map(|i| PathBuf::from(ain_path(&config.ain_path, i)))
            .collect();
        self.pressure = config.pressure_path.clone();
        self.temperature = config.temperature_path.clone();

        let gpio_root = Path::new(SYSFS_GPIO);
        self.heartbeat = OutputPin::export(gpio_root, config.heartbeat_gpio)
            .inspect_err(|e| warn!("Heartbeat GPIO: {e}"))
            .ok();
        self.alarm = OutputPin::export(gpio_root, config.alarm_gpio)
            .inspect_err(|e| warn!("Range alarm GPIO: {e}"))
            .ok();

        self.dac = match Max5802::open(&config.dac_bus, config.dac_address) {
            Ok(mut dac) => match dac.initialize() {
                Ok(()) => Some(dac),
                Err(e) => {
                    warn!("MAX5802 init failed: {e}");
                    None
                }
            },
            Err(e) => {
                warn!("MAX5802 unavailable: {e}");
                None
            }
        };

        self.watchdog = Watchdog::open(&config.watchdog_device, timing.watchdog_timeout_s)
            .inspect_err(|e| warn!("{e}"))
            .ok();

        info!("BeagleBone driver initialized");
        Ok(())
    }

    fn read_analog_inputs(
        &mut self,
        millivolts: &mut [i32; AI_CHANNELS],
    ) -> Result<(), HalError> {
        if self.ain.len() != AI_CHANNELS {
            return Err(Self::missing("analog inputs"));
        }
        let mut first_error = None;
        for (slot, path) in millivolts.iter_mut().zip(&self.ain) {
            match read_int(path) {
                Ok(v) => *slot = v as i32,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn read_pressure_temperature(&mut self) -> Result<(f64, f64), HalError> {
        Ok((
            read_pressure_mbar(&self.pressure)?,
            read_temperature_c(&self.temperature)?,
        ))
    }

    fn set_analog_output(&mut self, channel: usize, code: u32) -> Result<(), HalError> {
        let dac = self.dac.as_mut().ok_or_else(|| Self::missing("DAC"))?;
        dac.set(channel as u8, code)
    }

    fn set_heartbeat(&mut self, on: bool) -> Result<(), HalError> {
        self.heartbeat
            .as_ref()
            .ok_or_else(|| Self::missing("heartbeat GPIO"))?
            .set(on)
    }

    fn set_range_alarm(&mut self, on: bool) -> Result<(), HalError> {
        self.alarm
            .as_ref()
            .ok_or_else(|| Self::missing("range alarm GPIO"))?
            .set(on)
    }

    fn pet_watchdog(&mut self) -> Result<(), HalError> {
        self.watchdog
            .as_ref()
            .ok_or_else(|| Self::missing("watchdog"))?
            .keepalive()
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        if let Some(pin) = &self.heartbeat {
            pin.set(false)?;
        }
        self.dac = None;
        info!("BeagleBone driver shut down");
        Ok(())
    }
}
