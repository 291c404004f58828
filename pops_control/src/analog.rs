//! Analog inputs, analog outputs and the pressure flow schedule.

use pops_common::config::{AnalogInputs, AnalogOutputConfig, AnalogOutputs, FlowStep, FlowStepConfig};
use pops_common::consts::{AI_CHANNELS, AI_RANGE_ALARM_MV, AO_CHANNELS, DAC_FULL_SCALE};
use pops_common::hal::driver::{HalError, HardwareDriver};
use pops_common::types::{AnalogConversion, FlowCalibration};

/// Errors smaller than this are not integrated.
pub const CONTROL_EPSILON: f64 = 0.01;

/// Integration step of the closed-loop correction.
pub const CONTROL_DT: f64 = 0.1;

/// Flow assumed before the first external flow report.
pub const EXTERNAL_FLOW_DEFAULT: f64 = 3.0;

/// Flow schedule is inactive below this pressure (mbar).
pub const FLOW_STEP_MIN_PRESSURE: f64 = 10.0;

/// Maximum 12-bit DAC code.
const DAC_MAX_CODE: u32 = DAC_FULL_SCALE - 1;

// ─── Analog outputs ─────────────────────────────────────────────────

/// One analog output channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalogOutput {
    /// Set-point in volts.
    pub set_v: f64,
    /// Full-scale volts.
    pub max_v: f64,
    /// Lowest allowed set-point.
    pub min_v: f64,
    /// Integral gain.
    pub ki: f64,
    /// Apply the integral correction.
    pub use_pid: bool,
}

impl From<&AnalogOutputConfig> for AnalogOutput {
    fn from(c: &AnalogOutputConfig) -> Self {
        Self {
            set_v: c.set_v,
            max_v: c.max_v,
            min_v: c.min_v,
            ki: c.ki,
            use_pid: c.use_pid,
        }
    }
}

impl AnalogOutput {
    /// Correct the set-point against `reading`, clamp it and return the DAC code.
    pub fn correct(&mut self, reading: f64) -> u32 {
        if self.use_pid {
            let error = self.set_v - reading;
            if error.abs() > CONTROL_EPSILON {
                self.set_v += self.ki * error * CONTROL_DT;
            }
        }
        self.set_v = self.set_v.min(self.max_v).max(self.min_v);
        dac_code(self.set_v, self.max_v)
    }
}

/// 12-bit code for `volts` on a `max_v` full-scale output, saturating at 4095.
pub fn dac_code(volts: f64, max_v: f64) -> u32 {
    ((volts * f64::from(DAC_FULL_SCALE) / max_v) as u32).min(DAC_MAX_CODE)
}

/// The two analog outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalogOutputController {
    outputs: [AnalogOutput; AO_CHANNELS],
}

impl AnalogOutputController {
    /// Outputs from configuration (expects normalized channel lists).
    pub fn from_config(config: &AnalogOutputs) -> Self {
        let defaults = AnalogOutputs::default();
        let pick = |i: usize| {
            config
                .0
                .get(i)
                .or_else(|| defaults.0.get(i))
                .map(AnalogOutput::from)
                .unwrap_or(AnalogOutput {
                    set_v: 0.0,
                    max_v: 5.0,
                    min_v: 0.0,
                    ki: 0.0,
                    use_pid: false,
                })
        };
        Self {
            outputs: [pick(0), pick(1)],
        }
    }

    /// Current set-points.
    pub fn set_points(&self) -> [f64; AO_CHANNELS] {
        [self.outputs[0].set_v, self.outputs[1].set_v]
    }

    /// Channel state.
    pub fn output(&self, channel: usize) -> &AnalogOutput {
        &self.outputs[channel]
    }

    /// Replace a set-point without pushing it.
    pub fn set_target(&mut self, channel: usize, volts: f64) {
        self.outputs[channel].set_v = volts;
    }

    /// Correct, clamp and push one channel. Returns the code written.
    pub fn apply<D: HardwareDriver + ?Sized>(
        &mut self,
        channel: usize,
        reading: f64,
        driver: &mut D,
    ) -> Result<u32, HalError> {
        let output = self
            .outputs
            .get_mut(channel)
            .ok_or_else(|| HalError::ConfigError(format!("no analog output {channel}")))?;
        let code = output.correct(reading);
        driver.set_analog_output(channel, code)?;
        Ok(code)
    }

    /// Drive every output to zero.
    pub fn zero_all<D: HardwareDriver + ?Sized>(&mut self, driver: &mut D) -> Result<(), HalError> {
        for (channel, output) in self.outputs.iter_mut().enumerate() {
            output.set_v = 0.0;
            driver.set_analog_output(channel, 0)?;
        }
        Ok(())
    }
}

// ─── Flow schedule ──────────────────────────────────────────────────

/// Pressure-dependent pump voltage (AO1).
#[derive(Debug, Clone, PartialEq)]
pub struct FlowStepper {
    steps: Vec<FlowStep>,
    start_v: f64,
    level: usize,
}

impl FlowStepper {
    /// Schedule from configuration. `start_v` applies above the first step.
    pub fn new(config: &FlowStepConfig, start_v: f64) -> Self {
        Self {
            steps: config.steps.clone(),
            start_v,
            level: 0,
        }
    }

    /// Current schedule level (0 = start voltage).
    pub fn level(&self) -> usize {
        self.level
    }

    /// Evaluate the schedule. Returns the new pump voltage on a level change.
    pub fn update(&mut self, pressure: f64) -> Option<f64> {
        if pressure < FLOW_STEP_MIN_PRESSURE || self.steps.is_empty() {
            return None;
        }
        let last = self.steps.len() - 1;
        let (level, volts) = if pressure > self.steps[0].press {
            (0, self.start_v)
        } else if pressure <= self.steps[last].press {
            (last + 1, self.steps[last].pump_v)
        } else {
            // steps[i+1].press < P <= steps[i].press
            let i = self
                .steps
                .windows(2)
                .position(|w| pressure <= w[0].press && pressure > w[1].press)?;
            (i + 1, self.steps[i].pump_v)
        };
        if level == self.level {
            return None;
        }
        self.level = level;
        Some(volts)
    }
}

// ─── Analog inputs ──────────────────────────────────────────────────

/// The seven analog input channels in engineering units.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalogInputReader {
    conversions: [AnalogConversion; AI_CHANNELS],
    flow: FlowCalibration,
    external_flow: bool,
    millivolts: [i32; AI_CHANNELS],
    values: [f64; AI_CHANNELS],
    range_alarm: bool,
}

impl AnalogInputReader {
    /// Reader for the configured conversions. With `external_flow` channel 0
    /// is never read and starts at [`EXTERNAL_FLOW_DEFAULT`].
    pub fn new(inputs: &AnalogInputs, flow: FlowCalibration, external_flow: bool) -> Self {
        let mut conversions = [AnalogConversion::Volts; AI_CHANNELS];
        for (slot, input) in conversions.iter_mut().zip(&inputs.0) {
            *slot = input.conv;
        }
        let mut values = [0.0; AI_CHANNELS];
        if external_flow {
            values[0] = EXTERNAL_FLOW_DEFAULT;
        }
        Self {
            conversions,
            flow,
            external_flow,
            millivolts: [0; AI_CHANNELS],
            values,
            range_alarm: false,
        }
    }

    /// Read and convert every channel. On error the previous values are kept.
    ///
    /// Returns `true` the first time a reading reaches the range limit; the
    /// alarm then stays latched.
    pub fn read<D: HardwareDriver + ?Sized>(&mut self, driver: &mut D) -> Result<bool, HalError> {
        let mut mv = self.millivolts;
        driver.read_analog_inputs(&mut mv)?;
        self.millivolts = mv;

        let start = usize::from(self.external_flow);
        let mut raised = false;
        for i in start..AI_CHANNELS {
            if mv[i] >= AI_RANGE_ALARM_MV && !self.range_alarm {
                self.range_alarm = true;
                raised = true;
            }
            self.values[i] = self.conversions[i].convert(mv[i], &self.flow);
        }
        Ok(raised)
    }

    /// Converted values.
    pub fn values(&self) -> &[f64; AI_CHANNELS] {
        &self.values
    }

    /// Flow channel (channel 0), cc/s.
    pub fn flow(&self) -> f64 {
        self.values[0]
    }

    /// Store an externally reported flow in cc/s.
    pub fn set_external_flow(&mut self, flow: f64) {
        self.values[0] = flow;
    }

    /// Whether the range alarm has been raised.
    pub fn range_alarm(&self) -> bool {
        self.range_alarm
    }
}

/// Particles per cc: `count / flow`, or 0 without positive flow.
pub fn concentration(count: usize, flow: f64) -> f64 {
    if flow > 0.0 { count as f64 / flow } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pops_hal::drivers::simulation::SimulationDriver;

    fn output(use_pid: bool) -> AnalogOutput {
        AnalogOutput {
            set_v: 2.0,
            max_v: 5.0,
            min_v: 0.5,
            ki: 1.0,
            use_pid,
        }
    }

    fn schedule() -> FlowStepConfig {
        FlowStepConfig {
            enabled: true,
            steps: vec![
                FlowStep {
                    press: 700.0,
                    pump_v: 2.5,
                },
                FlowStep {
                    press: 400.0,
                    pump_v: 3.0,
                },
                FlowStep {
                    press: 150.0,
                    pump_v: 3.5,
                },
            ],
        }
    }

    #[test]
    fn open_loop_output_is_scaled_and_clamped() {
        let mut ao = output(false);
        assert_eq!(ao.correct(0.0), (2.0 * 4096.0 / 5.0) as u32);
        ao.set_v = 9.0;
        assert_eq!(ao.correct(0.0), 4095);
        assert_eq!(ao.set_v, 5.0);
        ao.set_v = 0.1;
        ao.correct(0.0);
        assert_eq!(ao.set_v, 0.5);
    }

    #[test]
    fn closed_loop_integrates_the_error() {
        let mut ao = output(true);
        ao.correct(1.0);
        assert!((ao.set_v - 2.1).abs() < 1e-12);

        // Inside epsilon: no change.
        let mut ao = output(true);
        ao.correct(1.995);
        assert_eq!(ao.set_v, 2.0);

        // A fractional error above epsilon is integrated.
        let mut ao = output(true);
        ao.correct(1.5);
        assert!((ao.set_v - 2.05).abs() < 1e-12);
    }

    #[test]
    fn dac_code_saturates() {
        assert_eq!(dac_code(5.0, 5.0), 4095);
        assert_eq!(dac_code(2.5, 5.0), 2048);
        assert_eq!(dac_code(0.0, 5.0), 0);
    }

    #[test]
    fn controller_pushes_to_the_driver() {
        let (mut driver, probe) = SimulationDriver::with_probe();
        let mut ctl = AnalogOutputController::from_config(&AnalogOutputs::default());
        ctl.set_target(1, 2.5);
        let code = ctl.apply(1, 0.0, &mut driver).unwrap();
        assert_eq!(code, 2048);
        assert_eq!(probe.analog_output(1), 2048);

        ctl.zero_all(&mut driver).unwrap();
        assert_eq!(probe.analog_output(1), 0);
        assert_eq!(ctl.set_points(), [0.0, 0.0]);
        assert!(ctl.apply(5, 0.0, &mut driver).is_err());
    }

    #[test]
    fn flow_schedule_levels() {
        let mut stepper = FlowStepper::new(&schedule(), 2.0);
        // Above the first step: start voltage, already level 0.
        assert_eq!(stepper.update(900.0), None);
        assert_eq!(stepper.update(700.0), Some(2.5));
        assert_eq!(stepper.update(500.0), None);
        assert_eq!(stepper.update(300.0), Some(3.0));
        assert_eq!(stepper.update(100.0), Some(3.5));
        assert_eq!(stepper.level(), 3);
        // Below 10 mbar the schedule holds.
        assert_eq!(stepper.update(5.0), None);
        assert_eq!(stepper.update(800.0), Some(2.0));
    }

    #[test]
    fn analog_inputs_convert_and_latch_alarm() {
        let (mut driver, probe) = SimulationDriver::with_probe();
        let inputs = AnalogInputs::default();
        let mut reader = AnalogInputReader::new(&inputs, FlowCalibration::default(), false);

        probe.set_analog_input(0, 1000);
        assert!(!reader.read(&mut driver).unwrap());
        assert!((reader.flow() - 2.79787).abs() < 1e-9);

        probe.set_analog_input(3, 1790);
        assert!(reader.read(&mut driver).unwrap());
        probe.set_analog_input(3, 100);
        assert!(!reader.read(&mut driver).unwrap());
        assert!(reader.range_alarm());
    }

    #[test]
    fn external_flow_channel_is_not_read() {
        let (mut driver, probe) = SimulationDriver::with_probe();
        let mut reader =
            AnalogInputReader::new(&AnalogInputs::default(), FlowCalibration::default(), true);
        assert_eq!(reader.flow(), EXTERNAL_FLOW_DEFAULT);
        probe.set_analog_input(0, 1000);
        reader.read(&mut driver).unwrap();
        assert_eq!(reader.flow(), EXTERNAL_FLOW_DEFAULT);
        reader.set_external_flow(1.5);
        assert_eq!(reader.flow(), 1.5);
    }

    #[test]
    fn concentration_needs_flow() {
        assert_eq!(concentration(300, 3.0), 100.0);
        assert_eq!(concentration(300, 0.0), 0.0);
        assert_eq!(concentration(300, -1.0), 0.0);
    }
}
