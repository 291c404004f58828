//! The one-second acquisition loop.
//!
//! ## RT Setup
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)`.
//! 2. Prefault stack pages.
//! 3. `sched_setscheduler(SCHED_FIFO, priority)`.
//!
//! ## Macro-cycle
//! Ordered micro-steps, each followed by a ring drain, a baseline
//! recomputation and a stop-flag check:
//!
//! 1. Finish the previous second: histogram, width statistics, frames, files.
//!    Skipped on the first cycle, whose events roll into the next second.
//! 2. Pump hour counter.
//! 3. Analog inputs.
//! 4. Pressure and temperature.
//! 5. Flow schedule.
//! 6. Every link in configuration order: reopen, send, receive, dispatch.
//!
//! Then drain, recompute and sample the raw window until the deadline
//! (previous deadline + period). Each completed cycle toggles the heartbeat
//! and pets the watchdog.

use chrono::Utc;
use pops_common::config::{LinkRole, PopsConfig};
use pops_common::consts::{AO_CHANNELS, COMMAND_BUFFER_BYTES};
use pops_common::hal::driver::HardwareDriver;
use pops_common::hal::pru::CoprocessorMemory;
use pops_common::hal::transport::Transport;
use pops_common::types::{InstrumentStatus, StatusType};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::analog::concentration;
use crate::baseline::BaselineEstimator;
use crate::binning::WidthStats;
use crate::command::{ChannelKind, CommandEffect};
use crate::error::ControlError;
use crate::persist::{OutputFileSet, SkipCounter};
use crate::state::{LoopEvent, LoopState, LoopStateMachine, StopCause, SystemState, TransitionResult};
use crate::telemetry::{self, AggregateState};

/// Bytes of header in front of each aircraft feed datagram.
pub const AIRCRAFT_HEADER_BYTES: usize = 5;

/// Aircraft line reported until the first datagram arrives.
pub const AIRCRAFT_PLACEHOLDER: &str =
    "0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0\n";

/// Delay between the two reads of the stop flag.
const STOP_DEBOUNCE: Duration = Duration::from_micros(1);

// ─── Cycle Statistics ───────────────────────────────────────────────

/// Per-cycle timing and event statistics.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Completed macro-cycles.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for the average.
    pub sum_cycle_ns: i64,
    /// Cycles that ended after their deadline.
    pub overruns: u64,
    /// Largest one-second event count.
    pub max_events: usize,
    /// Events discarded over the per-second cap.
    pub discarded_events: u64,
}

impl CycleStats {
    /// Zeroed statistics.
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
            max_events: 0,
            discarded_events: 0,
        }
    }

    /// Record a cycle duration.
    #[inline]
    pub fn record(&mut self, duration_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        self.min_cycle_ns = self.min_cycle_ns.min(duration_ns);
        self.max_cycle_ns = self.max_cycle_ns.max(duration_ns);
        self.sum_cycle_ns += duration_ns;
    }

    /// Record one second of events.
    #[inline]
    pub fn record_events(&mut self, kept: usize, discarded: u64) {
        self.max_events = self.max_events.max(kept);
        self.discarded_events += discarded;
    }

    /// Average cycle time [ns] (0 before the first cycle).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Lock all current and future memory pages.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), ControlError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| ControlError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), ControlError> {
    Ok(())
}

/// Touch 256 KiB of stack so the loop does not fault pages in.
#[cfg(feature = "rt")]
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference into `buf`.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(not(feature = "rt"))]
fn prefault_stack() {}

/// Run the calling thread under SCHED_FIFO.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), ControlError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call; pid 0 is the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(ControlError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), ControlError> {
    Ok(())
}

/// Lock memory and raise the loop thread to real-time priority.
pub fn rt_setup(rt_priority: i32) -> Result<(), ControlError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_scheduler(rt_priority)
}

// ─── Links ──────────────────────────────────────────────────────────

/// A telemetry link and the role it plays.
pub struct Link {
    /// What is sent and which command grammar applies.
    pub role: LinkRole,
    /// Underlying byte transport.
    pub transport: Box<dyn Transport>,
}

impl Link {
    /// Wrap a transport.
    pub fn new(role: LinkRole, transport: Box<dyn Transport>) -> Self {
        Self { role, transport }
    }
}

/// Frames rendered for the second just finished.
#[derive(Debug, Default)]
struct Frames {
    status: String,
    full: String,
    raw: String,
}

// ─── Control Loop ───────────────────────────────────────────────────

/// A micro-step of the macro-cycle.
type MicroStep = fn(&mut ControlLoop);

/// The acquisition and control loop.
///
/// Owns the driver, the coprocessor memory, the links and the
/// [`SystemState`]. `run()` returns once a stop has been requested and the
/// hardware has been released.
pub struct ControlLoop {
    config: PopsConfig,
    config_path: Option<PathBuf>,
    status_type: StatusType,
    driver: Box<dyn HardwareDriver>,
    pru: Arc<dyn CoprocessorMemory>,
    links: Vec<Link>,
    has_aircraft: bool,
    running: Arc<AtomicBool>,
    lifecycle: LoopStateMachine,
    state: SystemState,
    files: Option<OutputFileSet>,
    frames: Frames,
    stats: CycleStats,
    heartbeat: bool,
    primed: bool,
    first_second: bool,
    max_cycles: Option<u64>,
    rx: [u8; COMMAND_BUFFER_BYTES],
}

impl ControlLoop {
    /// Build the loop. Nothing touches the hardware until [`ControlLoop::run`].
    pub fn new(
        config: PopsConfig,
        config_path: Option<PathBuf>,
        driver: Box<dyn HardwareDriver>,
        pru: Arc<dyn CoprocessorMemory>,
        links: Vec<Link>,
        running: Arc<AtomicBool>,
    ) -> Self {
        let mut state = SystemState::new(&config, Utc::now());
        let has_aircraft = links.iter().any(|l| l.role == LinkRole::Aircraft);
        if has_aircraft {
            state.aircraft = AIRCRAFT_PLACEHOLDER.to_string();
        }
        Self {
            status_type: config.status_type(),
            config,
            config_path,
            driver,
            pru,
            links,
            has_aircraft,
            running,
            lifecycle: LoopStateMachine::new(),
            state,
            files: None,
            frames: Frames::default(),
            stats: CycleStats::new(),
            heartbeat: false,
            primed: false,
            first_second: true,
            max_cycles: None,
            rx: [0; COMMAND_BUFFER_BYTES],
        }
    }

    /// Stop on its own after `cycles` macro-cycles.
    pub fn with_cycle_limit(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Scheduler state.
    pub fn state(&self) -> &SystemState {
        &self.state
    }

    /// Lifecycle state.
    pub fn lifecycle(&self) -> LoopState {
        self.lifecycle.state()
    }

    /// Current output file set.
    pub fn files(&self) -> Option<&OutputFileSet> {
        self.files.as_ref()
    }

    /// Loop statistics.
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Run until stopped. Returns why the loop stopped.
    ///
    /// # Errors
    /// `ControlError` if the driver cannot be initialized or the first file
    /// set cannot be created.
    pub fn run(&mut self) -> Result<StopCause, ControlError> {
        self.startup()?;

        let period = Duration::from_millis(self.config.timing.period_ms);
        let mut deadline = Instant::now() + period;
        while self.lifecycle.state() == LoopState::Steady {
            let cycle_start = Instant::now();
            self.macro_cycle(deadline);
            if self.lifecycle.state() != LoopState::Steady {
                break;
            }
            self.end_cycle();

            let now = Instant::now();
            self.stats
                .record(now.duration_since(cycle_start).as_nanos() as i64);
            deadline += period;
            if deadline <= now {
                self.stats.overruns += 1;
                warn!("Cycle overrun, resynchronizing");
                deadline = now + period;
            }
            if self.stats.cycle_count % 60 == 0 {
                debug!(
                    "cycles={} avg={}ns max={}ns overruns={} max_events={}",
                    self.stats.cycle_count,
                    self.stats.avg_cycle_ns(),
                    self.stats.max_cycle_ns,
                    self.stats.overruns,
                    self.stats.max_events
                );
            }
            if self.max_cycles.is_some_and(|max| self.stats.cycle_count >= max) {
                self.request_stop(StopCause::Signal);
            }
        }

        Ok(self.shutdown())
    }

    // ── Startup / shutdown ──

    fn startup(&mut self) -> Result<(), ControlError> {
        self.driver
            .init(&self.config.hardware, &self.config.timing)?;
        info!(
            "Driver '{}' v{} initialized",
            self.driver.name(),
            self.driver.version()
        );

        for channel in 0..AO_CHANNELS {
            if let Err(e) = self.state.analog_out.apply(channel, 0.0, self.driver.as_mut()) {
                self.report(&format!("AO{channel} could not be set: {e}"));
            }
        }

        self.state.baseline =
            BaselineEstimator::recompute(&*self.pru, self.state.params.th_mult);

        let now = Utc::now();
        self.state.time = now;
        let instrument = &self.config.instrument;
        let banner = format!(
            "POPS {} on {} ({}), {}, status type {}, media {}",
            instrument.pops_sn,
            instrument.bbb_sn,
            instrument.daughter_board,
            instrument.code_version,
            instrument.status_type,
            self.config.storage.media
        );
        info!("{banner}");
        self.state.log_message(&banner);

        let header = self.housekeeping_header();
        let files = OutputFileSet::create(
            &self.config.storage.base_dir,
            self.config_path.as_deref(),
            &now,
            &header,
        )?;
        self.files = Some(files);

        self.lifecycle.handle_event(LoopEvent::Started);
        self.check_stop();
        Ok(())
    }

    fn shutdown(&mut self) -> StopCause {
        let cause = self.lifecycle.cause().unwrap_or(StopCause::Signal);
        info!("Shutting down: {:?}", cause);

        if let Err(e) = self.state.analog_out.zero_all(self.driver.as_mut()) {
            warn!("Analog outputs not zeroed: {e}");
        }
        if let Err(e) = self.driver.set_heartbeat(false) {
            debug!("Heartbeat off failed: {e}");
        }

        self.state.log_message(&format!("Stopped: {cause:?}"));
        if let Some(files) = &self.files {
            if let Err(e) = files.append_log(&mut self.state.log) {
                warn!("Final log flush failed: {e}");
            }
        }

        if let Err(e) = self.driver.shutdown() {
            warn!("Driver shutdown failed: {e}");
        }
        self.links.clear();
        info!(
            "Loop stopped after {} cycles (avg {} ns, {} overruns, {} events discarded)",
            self.stats.cycle_count,
            self.stats.avg_cycle_ns(),
            self.stats.overruns,
            self.stats.discarded_events
        );
        cause
    }

    fn end_cycle(&mut self) {
        self.heartbeat = !self.heartbeat;
        if let Err(e) = self.driver.set_heartbeat(self.heartbeat) {
            debug!("Heartbeat failed: {e}");
        }
        if let Err(e) = self.driver.pet_watchdog() {
            warn!("Watchdog keepalive failed: {e}");
        }
    }

    // ── Macro-cycle ──

    fn macro_cycle(&mut self, deadline: Instant) {
        const STEPS: [MicroStep; 5] = [
            ControlLoop::finish_second,
            ControlLoop::update_pump_time,
            ControlLoop::read_analog_inputs,
            ControlLoop::read_pressure_temperature,
            ControlLoop::check_flow_step,
        ];
        for step in STEPS {
            step(self);
            if self.service() {
                return;
            }
        }
        for index in 0..self.links.len() {
            if self.service_link(index) {
                return;
            }
        }
        self.tail_loop(deadline);
    }

    /// Drain, recompute the baseline and check for a stop. Returns `true`
    /// once the loop is shutting down.
    fn service(&mut self) -> bool {
        if let Err(e) = self
            .state
            .consumer
            .drain_once(&*self.pru, &mut self.state.events)
        {
            self.state.ring_errors += 1;
            if self.state.ring_errors.is_power_of_two() {
                warn!("{e} ({} times)", self.state.ring_errors);
            }
        }
        self.state.baseline =
            BaselineEstimator::recompute(&*self.pru, self.state.params.th_mult);
        self.check_stop()
    }

    fn check_stop(&mut self) -> bool {
        if self.lifecycle.state() == LoopState::Shutdown {
            return true;
        }
        if self.pru.stop_flag() > 0 {
            thread::sleep(STOP_DEBOUNCE);
            if self.pru.stop_flag() > 0 {
                self.request_stop(StopCause::CoprocessorStop);
                return true;
            }
        }
        if !self.running.load(Ordering::SeqCst) {
            self.request_stop(StopCause::Signal);
            return true;
        }
        false
    }

    fn request_stop(&mut self, cause: StopCause) {
        if let TransitionResult::Ok(_) = self.lifecycle.handle_event(LoopEvent::Stop(cause)) {
            info!("Stop requested: {:?}", cause);
        }
    }

    fn tail_loop(&mut self, deadline: Instant) {
        let sleep = Duration::from_micros(self.config.timing.tail_sleep_us);
        while Instant::now() < deadline {
            if self.service() {
                return;
            }
            self.state
                .raw
                .sample(&*self.pru, self.state.baseline.baseline_plus_threshold);
            thread::sleep(sleep);
        }
        self.check_stop();
    }

    // ── Micro-steps ──

    /// Reduce the finished second and publish it.
    fn finish_second(&mut self) {
        // Nothing has been drained before the first pass.
        if !self.primed {
            self.primed = true;
            return;
        }
        let flow = self.state.analog_in.flow();
        let st = &mut self.state;
        st.histogram.calc_histogram(st.events.as_slice());
        st.width = WidthStats::calc_width_stats(st.events.as_slice());
        st.part_num = st.events.len() as u32;
        st.concentration = concentration(st.events.len(), flow);
        let discarded = st.events.discarded();
        self.stats.record_events(st.part_num as usize, discarded);
        if discarded > 0 {
            st.log_message(&format!("{discarded} events over the per-second limit discarded"));
        }

        st.status = if self.first_second {
            InstrumentStatus::Startup
        } else if self.config.instrument.low_flow_threshold > 0.0
            && flow < self.config.instrument.low_flow_threshold
        {
            InstrumentStatus::LowFlow
        } else {
            InstrumentStatus::Running
        };
        self.first_second = false;

        let housekeeping = self.render_frames();
        self.write_files(&housekeeping);

        self.state.events.clear();
        self.state.time = Utc::now();
    }

    /// Render link frames; returns the housekeeping row.
    fn render_frames(&mut self) -> String {
        let st = &self.state;
        let p = &st.params;
        let (peak_file, peak_short) = match &self.files {
            Some(f) => (f.peak_path().display().to_string(), f.peak_file_short()),
            None => (String::new(), ""),
        };
        let analog_out = st.analog_out.set_points();
        let snapshot = AggregateState {
            time: st.time,
            status_type: &self.config.instrument.status_type,
            status: st.status,
            part_num: st.part_num,
            concentration: st.concentration,
            baseline: st.baseline,
            pressure: st.pressure,
            temperature: st.temperature,
            pump_life: st.pump.hours(),
            width: st.width,
            analog_in: st.analog_in.values(),
            analog_out,
            bl_start: p.bl_start,
            histogram: &st.histogram,
            skip_save: p.skip_save,
            min_peak_pts: p.min_peak_pts,
            max_peak_pts: p.max_peak_pts,
            raw_pts: p.raw_pts,
            peak_file: &peak_file,
            peak_file_short: peak_short,
            aircraft: self.has_aircraft.then_some(st.aircraft.as_str()),
        };
        self.frames.status = telemetry::encode_status(self.status_type, &snapshot);
        self.frames.full = telemetry::encode_full(&snapshot);
        self.frames.raw = telemetry::encode_raw(st.raw.samples(p.raw_pts));
        telemetry::encode_housekeeping(&snapshot)
    }

    /// Rotate if needed, then housekeeping, log, peak and raw records.
    fn write_files(&mut self, housekeeping: &str) {
        if self
            .files
            .as_ref()
            .is_some_and(|f| f.rotate_needed(self.config.storage.max_peak_file_bytes))
        {
            self.new_file_set("peak file size limit");
        }
        let Some(files) = self.files.as_ref() else {
            return;
        };
        let st = &mut self.state;
        let mut failures = Vec::new();
        if let Err(e) = files.append_housekeeping(housekeeping) {
            failures.push(format!("HK file could not be written: {e}"));
        }
        if let Err(e) = files.append_log(&mut st.log) {
            warn!("Log file could not be written: {e}");
        }
        if st.skip.should_save(st.params.skip_save) {
            let fullsec = telemetry::fullsec(&st.time);
            if let Err(e) = files.append_peak(fullsec, st.events.as_slice()) {
                failures.push(format!("Peak file could not be written: {e}"));
            }
        }
        if st.params.raw_save {
            if let Err(e) = files.append_raw(st.raw.samples(st.params.raw_pts)) {
                failures.push(format!("Raw file could not be written: {e}"));
            }
        }
        for message in failures {
            self.report(&message);
        }
    }

    fn new_file_set(&mut self, reason: &str) {
        let header = self.housekeeping_header();
        match OutputFileSet::create(
            &self.config.storage.base_dir,
            self.config_path.as_deref(),
            &Utc::now(),
            &header,
        ) {
            Ok(files) => {
                self.report(&format!("New files {} ({reason})", files.version()));
                self.files = Some(files);
                self.state.skip = SkipCounter::default();
            }
            Err(e) => self.report(&format!("New file set failed: {e}")),
        }
    }

    fn housekeeping_header(&self) -> String {
        let ai: Vec<&str> = self
            .config
            .analog_inputs
            .0
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        let ao: Vec<&str> = self
            .config
            .analog_outputs
            .0
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        telemetry::housekeeping_header(&ai, &ao, self.has_aircraft, self.state.histogram.nbins())
    }

    fn update_pump_time(&mut self) {
        if let Err(e) = self.state.pump.increment_and_save() {
            self.report(&format!("Pump life not saved: {e}"));
        }
    }

    fn read_analog_inputs(&mut self) {
        match self.state.analog_in.read(self.driver.as_mut()) {
            Ok(false) => {}
            Ok(true) => {
                self.report("Analog input at range limit");
                if let Err(e) = self.driver.set_range_alarm(true) {
                    self.report(&format!("Range alarm output failed: {e}"));
                }
            }
            Err(e) => self.report(&format!("Analog inputs not read: {e}")),
        }
    }

    fn read_pressure_temperature(&mut self) {
        match self.driver.read_pressure_temperature() {
            Ok((pressure, temperature)) => {
                self.state.pressure = pressure;
                self.state.temperature = temperature;
            }
            Err(e) => self.report(&format!("P/T not read: {e}")),
        }
    }

    fn check_flow_step(&mut self) {
        let pressure = self.state.pressure;
        let Some(volts) = self
            .state
            .flow_step
            .as_mut()
            .and_then(|stepper| stepper.update(pressure))
        else {
            return;
        };
        self.state.analog_out.set_target(1, volts);
        match self.state.analog_out.apply(1, 0.0, self.driver.as_mut()) {
            Ok(code) => debug!("Flow step: AO1 {volts:.2} V (code {code}) at {pressure:.1} mbar"),
            Err(e) => self.report(&format!("AO1 flow step failed: {e}")),
        }
    }

    // ── Links ──

    /// Service one link; every transfer is followed by [`Self::service`].
    fn service_link(&mut self, index: usize) -> bool {
        if !self.links[index].transport.is_open() {
            if let Err(e) = self.links[index].transport.reopen() {
                debug!("{} reopen failed: {e}", self.links[index].transport.name());
            }
            if self.service() {
                return true;
            }
        }
        if !self.links[index].transport.is_open() {
            return false;
        }

        match self.links[index].role {
            LinkRole::Status => {
                self.send(index, FrameKind::Status);
                if self.service() {
                    return true;
                }
                self.receive_command(index, ChannelKind::Digit);
            }
            LinkRole::Full => {
                self.send(index, FrameKind::Full);
                if self.service() {
                    return true;
                }
                if self.state.params.raw_view {
                    self.send(index, FrameKind::Raw);
                    if self.service() {
                        return true;
                    }
                }
                self.receive_command(index, ChannelKind::Text);
            }
            LinkRole::Aircraft => self.receive_aircraft(index),
        }
        self.service()
    }

    fn send(&mut self, index: usize, kind: FrameKind) {
        let frame = match kind {
            FrameKind::Status => &self.frames.status,
            FrameKind::Full => &self.frames.full,
            FrameKind::Raw => &self.frames.raw,
        };
        if frame.is_empty() {
            return;
        }
        let link = &mut self.links[index];
        if let Err(e) = link.transport.send(frame.as_bytes()) {
            debug!("{} send failed: {e}", link.transport.name());
        }
    }

    fn receive(&mut self, index: usize) -> usize {
        let link = &mut self.links[index];
        match link.transport.receive(&mut self.rx) {
            Ok(n) => n,
            Err(e) => {
                debug!("{} receive failed: {e}", link.transport.name());
                0
            }
        }
    }

    fn receive_command(&mut self, index: usize, kind: ChannelKind) {
        let n = self.receive(index);
        if n == 0 {
            return;
        }
        self.state.commands.load(&self.rx[..n]);
        match self.state.commands.dispatch(kind, &mut self.state.params) {
            Some(effect) => self.apply_effect(effect),
            None => debug!("Ignored command on {}", self.links[index].transport.name()),
        }
    }

    fn receive_aircraft(&mut self, index: usize) {
        let n = self.receive(index);
        if n > AIRCRAFT_HEADER_BYTES {
            self.state.aircraft = String::from_utf8_lossy(&self.rx[AIRCRAFT_HEADER_BYTES..n]).into_owned();
        }
    }

    fn apply_effect(&mut self, effect: CommandEffect) {
        match effect {
            CommandEffect::ParamsChanged => {}
            CommandEffect::NewFile => self.new_file_set("command"),
            CommandEffect::SetAnalogOutput { channel, volts } => {
                self.state.analog_out.set_target(channel, volts);
                if let Err(e) = self.state.analog_out.apply(channel, volts, self.driver.as_mut()) {
                    self.report(&format!("AO{channel} could not be set: {e}"));
                }
            }
            CommandEffect::ExternalFlow(flow) => self.state.analog_in.set_external_flow(flow),
            CommandEffect::BinsChanged => {
                let p = &self.state.params;
                let (nbins, logmin, logmax) = (p.nbins, p.logmin, p.logmax);
                self.state.histogram.set_layout(nbins, logmin, logmax);
            }
            CommandEffect::Shutdown => self.request_stop(StopCause::ShutdownCommand),
            CommandEffect::Reboot => self.request_stop(StopCause::RebootCommand),
        }
    }

    /// Log a warning and queue it for the log file.
    fn report(&mut self, message: &str) {
        warn!("{message}");
        self.state.log_message(message);
    }
}

#[derive(Debug, Clone, Copy)]
enum FrameKind {
    Status,
    Full,
    Raw,
}

// ─── Tests ──────────────────────────────────────────────────────────
