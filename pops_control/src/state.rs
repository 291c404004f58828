//! Loop lifecycle and the state owned by the scheduler.
//!
//! Startup → Steady → Shutdown. Shutdown is reachable from both other
//! states and is terminal; the [`StopCause`] tells the binary what to do
//! with the host afterwards.

use chrono::{DateTime, Utc};
use pops_common::config::PopsConfig;
use pops_common::types::InstrumentStatus;
use pops_hal::power::PowerAction;

use crate::analog::{AnalogInputReader, AnalogOutputController, FlowStepper};
use crate::baseline::BaselineState;
use crate::binning::{Histogram, WidthStats};
use crate::command::{CommandBuffer, LiveParams};
use crate::persist::{EventLog, PumpLife, SkipCounter};
use crate::raw::RawCapture;
use crate::ring::{EventSet, RingBufferConsumer};

// ─── Lifecycle ──────────────────────────────────────────────────────

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    /// Hardware, coprocessor and files being brought up.
    #[default]
    Startup,
    /// One-second macro-cycles running.
    Steady,
    /// Outputs zeroed and hardware released.
    Shutdown,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// The coprocessor raised its stop flag.
    CoprocessorStop,
    /// A shutdown command arrived.
    ShutdownCommand,
    /// A reboot command arrived.
    RebootCommand,
    /// SIGINT/SIGTERM in the binary.
    Signal,
}

impl StopCause {
    /// Host action once the loop has shut down. A signal leaves the host running.
    pub const fn power_action(self) -> Option<PowerAction> {
        match self {
            Self::RebootCommand => Some(PowerAction::Reboot),
            Self::CoprocessorStop | Self::ShutdownCommand => Some(PowerAction::Halt),
            Self::Signal => None,
        }
    }
}

/// Lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    /// Startup finished.
    Started,
    /// A stop was requested.
    Stop(StopCause),
}

/// Result of a lifecycle transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition accepted.
    Ok(LoopState),
    /// Transition rejected.
    Rejected(&'static str),
}

/// Lifecycle state plus the recorded stop cause.
#[derive(Debug, Clone, Default)]
pub struct LoopStateMachine {
    state: LoopState,
    cause: Option<StopCause>,
}

impl LoopStateMachine {
    /// Machine in `Startup`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// First stop cause recorded.
    pub fn cause(&self) -> Option<StopCause> {
        self.cause
    }

    /// Apply an event.
    pub fn handle_event(&mut self, event: LoopEvent) -> TransitionResult {
        use LoopEvent::*;
        use LoopState::*;

        let next = match (self.state, event) {
            (Startup, Started) => Steady,
            (Startup | Steady, Stop(cause)) => {
                self.cause = Some(cause);
                Shutdown
            }
            (Shutdown, _) => return TransitionResult::Rejected("loop already shut down"),
            (Steady, Started) => return TransitionResult::Rejected("loop already running"),
        };
        self.state = next;
        TransitionResult::Ok(next)
    }
}

// ─── System state ───────────────────────────────────────────────────

/// Everything the scheduler carries from one micro-step to the next.
pub struct SystemState {
    /// Events of the second in progress.
    pub events: EventSet,
    /// Ring read cursor.
    pub consumer: RingBufferConsumer,
    /// Latest baseline and threshold.
    pub baseline: BaselineState,
    /// Histogram of the last completed second.
    pub histogram: Histogram,
    /// Width statistics of the last completed second.
    pub width: WidthStats,
    /// Events counted in the last completed second.
    pub part_num: u32,
    /// Concentration of the last completed second, particles/cc.
    pub concentration: f64,
    /// Run-time parameters.
    pub params: LiveParams,
    /// Analog input channels.
    pub analog_in: AnalogInputReader,
    /// Analog output channels.
    pub analog_out: AnalogOutputController,
    /// Pressure schedule, when enabled.
    pub flow_step: Option<FlowStepper>,
    /// Ambient pressure, mbar.
    pub pressure: f64,
    /// Board temperature, °C.
    pub temperature: f64,
    /// Pump hour counter.
    pub pump: PumpLife,
    /// Inbound command bytes.
    pub commands: CommandBuffer,
    /// Latest aircraft navigation line.
    pub aircraft: String,
    /// Reported status code.
    pub status: InstrumentStatus,
    /// Last kept raw window.
    pub raw: RawCapture,
    /// Messages waiting for the log file.
    pub log: EventLog,
    /// Peak record decimation.
    pub skip: SkipCounter,
    /// Wall-clock time of the second being reported.
    pub time: DateTime<Utc>,
    /// Ring errors since startup.
    pub ring_errors: u64,
}

impl SystemState {
    /// Initial state from configuration.
    pub fn new(config: &PopsConfig, time: DateTime<Utc>) -> Self {
        let analog_out = AnalogOutputController::from_config(&config.analog_outputs);
        let flow_step = config
            .flow_step
            .enabled
            .then(|| FlowStepper::new(&config.flow_step, analog_out.set_points()[1]));
        Self {
            events: EventSet::new(),
            consumer: RingBufferConsumer::new(),
            baseline: BaselineState {
                baseline: config.baseline.bl_start as u16,
                threshold_multiplier: config.baseline.th_mult,
                ..BaselineState::default()
            },
            histogram: Histogram::from_config(&config.bins),
            width: WidthStats::default(),
            part_num: 0,
            concentration: 0.0,
            params: LiveParams::from_config(config),
            analog_in: AnalogInputReader::new(
                &config.analog_inputs,
                config.flow,
                config.status_type().external_flow(),
            ),
            analog_out,
            flow_step,
            pressure: 0.0,
            temperature: 0.0,
            pump: PumpLife::load(&config.storage.pump_life_file),
            commands: CommandBuffer::new(),
            aircraft: String::new(),
            status: InstrumentStatus::Startup,
            raw: RawCapture::new(),
            log: EventLog::new(),
            skip: SkipCounter::default(),
            time,
            ring_errors: 0,
        }
    }

    /// Queue a message for the log file, stamped with the current second.
    pub fn log_message(&mut self, message: &str) {
        let time = self.time;
        self.log.push(&time, message);
    }
}
