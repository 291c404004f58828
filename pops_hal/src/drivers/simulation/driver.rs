//! Simulation driver implementation.
//!
//! The `SimulationDriver` implements `HardwareDriver` with in-memory
//! peripherals. A cloned [`SimulationProbe`] lets tests set inputs and
//! observe outputs while the driver is owned by the acquisition loop.

use parking_lot::Mutex;
use pops_common::config::{HardwareConfig, TimingConfig};
use pops_common::consts::{AI_CHANNELS, AO_CHANNELS};
use pops_common::hal::driver::{HalError, HardwareDriver};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct SimState {
    ai_mv: [i32; AI_CHANNELS],
    pressure: f64,
    temperature: f64,
    pt_fails: bool,
    ao_codes: [u32; AO_CHANNELS],
    ao_writes: u64,
    heartbeat: bool,
    heartbeat_changes: u64,
    range_alarm: bool,
    watchdog_pets: u64,
    initialized: bool,
    shut_down: bool,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            ai_mv: [1050, 600, 900, 400, 700, 900, 1100],
            pressure: 1013.25,
            temperature: 22.0,
            pt_fails: false,
            ao_codes: [0; AO_CHANNELS],
            ao_writes: 0,
            heartbeat: false,
            heartbeat_changes: 0,
            range_alarm: false,
            watchdog_pets: 0,
            initialized: false,
            shut_down: false,
        }
    }
}

/// Test-side handle onto a [`SimulationDriver`].
#[derive(Debug, Clone, Default)]
pub struct SimulationProbe(Arc<Mutex<SimState>>);

impl SimulationProbe {
    /// Set one analog input reading in millivolts.
    pub fn set_analog_input(&self, channel: usize, millivolts: i32) {
        self.0.lock().ai_mv[channel] = millivolts;
    }

    /// Set ambient pressure (mbar) and temperature (°C).
    pub fn set_pressure_temperature(&self, pressure: f64, temperature: f64) {
        let mut s = self.0.lock();
        s.pressure = pressure;
        s.temperature = temperature;
    }

    /// Make pressure/temperature reads fail.
    pub fn fail_pressure_temperature(&self, fail: bool) {
        self.0.lock().pt_fails = fail;
    }

    /// Last code written to an analog output.
    pub fn analog_output(&self, channel: usize) -> u32 {
        self.0.lock().ao_codes[channel]
    }

    /// Total analog output writes.
    pub fn analog_output_writes(&self) -> u64 {
        self.0.lock().ao_writes
    }

    /// Number of heartbeat level changes.
    pub fn heartbeat_changes(&self) -> u64 {
        self.0.lock().heartbeat_changes
    }

    /// Range alarm output level.
    pub fn range_alarm(&self) -> bool {
        self.0.lock().range_alarm
    }

    /// Number of watchdog keepalives.
    pub fn watchdog_pets(&self) -> u64 {
        self.0.lock().watchdog_pets
    }

    /// Whether `init` has run.
    pub fn initialized(&self) -> bool {
        self.0.lock().initialized
    }

    /// Whether `shutdown` has run.
    pub fn shut_down(&self) -> bool {
        self.0.lock().shut_down
    }
}

/// Simulation driver implementing the `HardwareDriver` trait.
pub struct SimulationDriver {
    name: &'static str,
    version: &'static str,
    state: SimulationProbe,
}

impl SimulationDriver {
    /// Create a new simulation driver instance.
    pub fn new() -> Self {
        Self::with_probe().0
    }

    /// Create a driver together with its probe.
    pub fn with_probe() -> (Self, SimulationProbe) {
        let probe = SimulationProbe::default();
        (
            Self {
                name: "simulation",
                version: env!("CARGO_PKG_VERSION"),
                state: probe.clone(),
            },
            probe,
        )
    }
}

impl Default for SimulationDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareDriver for SimulationDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> &'static str {
        self.version
    }

    fn init(&mut self, _config: &HardwareConfig, timing: &TimingConfig) -> Result<(), HalError> {
        self.state.0.lock().initialized = true;
        info!(
            "Simulation driver initialized (watchdog {}s emulated)",
            timing.watchdog_timeout_s
        );
        Ok(())
    }

    fn read_analog_inputs(
        &mut self,
        millivolts: &mut [i32; AI_CHANNELS],
    ) -> Result<(), HalError> {
        *millivolts = self.state.0.lock().ai_mv;
        Ok(())
    }

    fn read_pressure_temperature(&mut self) -> Result<(f64, f64), HalError> {
        let s = self.state.0.lock();
        if s.pt_fails {
            return Err(HalError::CommunicationError(
                "simulated pressure sensor fault".to_string(),
            ));
        }
        Ok((s.pressure, s.temperature))
    }

    fn set_analog_output(&mut self, channel: usize, code: u32) -> Result<(), HalError> {
        let mut s = self.state.0.lock();
        let slot = s
            .ao_codes
            .get_mut(channel)
            .ok_or_else(|| HalError::ConfigError(format!("no analog output {channel}")))?;
        *slot = code;
        s.ao_writes += 1;
        debug!("AO{channel} <- {code}");
        Ok(())
    }

    fn set_heartbeat(&mut self, on: bool) -> Result<(), HalError> {
        let mut s = self.state.0.lock();
        if s.heartbeat != on {
            s.heartbeat_changes += 1;
        }
        s.heartbeat = on;
        Ok(())
    }

    fn set_range_alarm(&mut self, on: bool) -> Result<(), HalError> {
        self.state.0.lock().range_alarm = on;
        Ok(())
    }

    fn pet_watchdog(&mut self) -> Result<(), HalError> {
        self.state.0.lock().watchdog_pets += 1;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        self.state.0.lock().shut_down = true;
        info!("Simulation driver shut down");
        Ok(())
    }
}
