//! Integration test: complete acquisition runs.
//!
//! Each run uses the simulation driver, in-process coprocessor memory and
//! in-memory links, with files under a temporary directory and a short
//! macro-cycle period.

use pops_common::config::{FlowStep, FlowStepConfig, LinkRole, PopsConfig};
use pops_common::consts::PUMP_HOURS_PER_CYCLE;
use pops_common::hal::pru::CoprocessorMemory;
use pops_control::cycle::{AIRCRAFT_PLACEHOLDER, ControlLoop, Link};
use pops_control::persist::{OutputFileSet, PeakRecord};
use pops_control::state::{LoopState, StopCause};
use pops_hal::drivers::simulation::{SimulationDriver, SimulationProbe};
use pops_hal::pru::MemoryPru;
use pops_hal::transport::{MemoryLink, MemoryLinkHandle};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

fn test_config(tmp: &TempDir) -> PopsConfig {
    let mut config = PopsConfig::default();
    config.storage.base_dir = tmp.path().to_path_buf();
    config.storage.pump_life_file = tmp.path().join("gPumpFile.txt");
    config.timing.period_ms = 40;
    config.timing.tail_sleep_us = 500;
    config.normalize();
    config
}

fn memory_pru() -> Arc<MemoryPru> {
    let pru = Arc::new(MemoryPru::new());
    pru.initialize(2300);
    pru
}

fn link(role: LinkRole, name: &str) -> (Link, MemoryLinkHandle) {
    let (transport, handle) = MemoryLink::new(name);
    (Link::new(role, Box::new(transport)), handle)
}

fn control_loop(
    config: PopsConfig,
    pru: &Arc<MemoryPru>,
    links: Vec<Link>,
) -> (ControlLoop, SimulationProbe) {
    let (driver, probe) = SimulationDriver::with_probe();
    let control = ControlLoop::new(
        config,
        None,
        Box::new(driver),
        pru.clone(),
        links,
        Arc::new(AtomicBool::new(true)),
    );
    (control, probe)
}

fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .split("\r\n")
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn hk_fields(row: &str) -> Vec<&str> {
    row.split(',').collect()
}

fn peak_records(files: &OutputFileSet) -> Vec<PeakRecord> {
    let mut reader = BufReader::new(File::open(files.peak_path()).unwrap());
    let mut records = Vec::new();
    while let Some(record) = PeakRecord::read_from(&mut reader).unwrap() {
        records.push(record);
    }
    records
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn steady_run_publishes_frames_and_files() {
    let tmp = TempDir::new().unwrap();
    let pru = memory_pru();
    for n in 0..100u32 {
        assert!(pru.push_event(500 + n as u16, 12, 2_000));
    }
    let (status, status_peer) = link(LinkRole::Status, "status");
    let (full, full_peer) = link(LinkRole::Full, "full");
    let (control, probe) = control_loop(test_config(&tmp), &pru, vec![status, full]);
    let mut control = control.with_cycle_limit(3);

    let cause = control.run().unwrap();
    assert_eq!(cause, StopCause::Signal);
    assert_eq!(control.lifecycle(), LoopState::Shutdown);
    assert_eq!(control.stats().cycle_count, 3);
    assert_eq!(control.stats().max_events, 100);

    assert!(probe.initialized());
    assert!(probe.shut_down());
    assert_eq!(probe.watchdog_pets(), 3);
    // Three toggles, then off at shutdown.
    assert_eq!(probe.heartbeat_changes(), 4);

    // The first cycle has no finished second to publish.
    let status_frames = status_peer.sent();
    assert_eq!(status_frames.len(), 2);
    for frame in &status_frames {
        let text = String::from_utf8_lossy(frame);
        assert!(text.starts_with("POPS,"), "{text}");
        assert!(text.ends_with("\r\n"));
    }
    let full_frames = full_peer.sent();
    assert_eq!(full_frames.len(), 4);
    assert!(full_frames[0].starts_with(b"POPS,UAV,"));
    assert!(full_frames[1].starts_with(b"RawData,"));

    let files = control.files().unwrap();
    assert_eq!(files.version(), "x001");
    let hk = lines(files.housekeeping_path());
    assert_eq!(hk.len(), 3);
    assert!(hk[0].starts_with("DateTime,Status,PartCt"));
    // Status then particle count: startup second, then running.
    assert_eq!(&hk_fields(&hk[1])[1..3], ["1", "100"]);
    assert_eq!(&hk_fields(&hk[2])[1..3], ["3", "0"]);

    let records = peak_records(files);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].events.len(), 100);
    assert_eq!(records[0].events[0][0], 500);
    assert_eq!(records[0].events[99][1], 12);
    assert!(records[1].events.is_empty());

    let log = fs::read_to_string(files.log_path()).unwrap();
    assert!(log.contains("POPS POPS# on Snoopy#"));
    assert!(log.contains("Stopped: Signal"));

    let pump: f64 = fs::read_to_string(tmp.path().join("gPumpFile.txt"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!((pump - 3.0 * PUMP_HOURS_PER_CYCLE).abs() < 1e-8);
    assert!((control.state().pump.hours() - pump).abs() < 1e-8);
}

#[test]
fn reboot_digit_stops_the_first_cycle() {
    let tmp = TempDir::new().unwrap();
    let pru = memory_pru();
    let (status, peer) = link(LinkRole::Status, "status");
    peer.push_inbound(b"9");
    let (control, probe) = control_loop(test_config(&tmp), &pru, vec![status]);
    let mut control = control.with_cycle_limit(10);

    assert_eq!(control.run().unwrap(), StopCause::RebootCommand);
    assert_eq!(control.stats().cycle_count, 0);
    assert_eq!(probe.watchdog_pets(), 0);
    assert!(probe.shut_down());
    assert!(peer.sent().is_empty());
}

#[test]
fn coprocessor_stop_during_startup_halts() {
    let tmp = TempDir::new().unwrap();
    let pru = memory_pru();
    pru.set_stop(true);
    let (mut control, probe) = control_loop(test_config(&tmp), &pru, Vec::new());

    let cause = control.run().unwrap();
    assert_eq!(cause, StopCause::CoprocessorStop);
    assert!(cause.power_action().is_some());
    assert_eq!(control.stats().cycle_count, 0);
    // Both outputs set at startup, both zeroed at shutdown.
    assert_eq!(probe.analog_output_writes(), 4);
    assert_eq!(probe.analog_output(0), 0);
    assert_eq!(probe.analog_output(1), 0);

    let files = control.files().unwrap();
    let log = fs::read_to_string(files.log_path()).unwrap();
    assert!(log.contains("Stopped: CoprocessorStop"));
}

#[test]
fn cleared_running_flag_stops_with_signal() {
    let tmp = TempDir::new().unwrap();
    let pru = memory_pru();
    let (driver, probe) = SimulationDriver::with_probe();
    let mut control = ControlLoop::new(
        test_config(&tmp),
        None,
        Box::new(driver),
        pru.clone(),
        Vec::new(),
        Arc::new(AtomicBool::new(false)),
    );
    assert_eq!(control.run().unwrap(), StopCause::Signal);
    assert!(StopCause::Signal.power_action().is_none());
    assert!(probe.shut_down());
}

#[test]
fn full_link_commands_take_effect() {
    let tmp = TempDir::new().unwrap();
    let pru = memory_pru();
    let (full, peer) = link(LinkRole::Full, "full");
    peer.push_inbound(b"nbins=12");
    peer.push_inbound(b"AO0=1.25");
    peer.push_inbound(b"ViewRaw=-1");
    peer.push_inbound(b"NewFile");
    let (control, probe) = control_loop(test_config(&tmp), &pru, vec![full]);
    let mut control = control.with_cycle_limit(5);

    control.run().unwrap();
    let state = control.state();
    assert_eq!(state.histogram.nbins(), 12);
    assert_eq!(state.params.nbins, 12);
    assert!(!state.params.raw_view);
    // Startup pair, the AO0 command, shutdown pair.
    assert_eq!(probe.analog_output_writes(), 5);

    let files = control.files().unwrap();
    assert_eq!(files.version(), "x002");
    let header = &lines(files.housekeeping_path())[0];
    assert!(header.ends_with(",b11"), "{header}");

    // Raw frames follow full frames from the second cycle until ViewRaw
    // turns them off.
    let raw_frames = peer
        .sent()
        .iter()
        .filter(|f| f.starts_with(b"RawData"))
        .count();
    assert_eq!(raw_frames, 2);
}

#[test]
fn aircraft_feed_reaches_housekeeping() {
    let tmp = TempDir::new().unwrap();
    let pru = memory_pru();
    let (aircraft, peer) = link(LinkRole::Aircraft, "aircraft");
    peer.push_inbound(b"\x01\x02\x03\x04\x0512.5,-45.25,3000\n");
    let (control, _probe) = control_loop(test_config(&tmp), &pru, vec![aircraft]);
    let mut control = control.with_cycle_limit(2);
    assert_eq!(control.state().aircraft, AIRCRAFT_PLACEHOLDER);

    control.run().unwrap();
    assert_eq!(control.state().aircraft, "12.5,-45.25,3000\n");
    assert!(peer.sent().is_empty());

    let hk = lines(control.files().unwrap().housekeeping_path());
    assert_eq!(hk.len(), 2);
    assert!(hk[0].contains("ACDateTime,Lat,Lon"));
    assert!(hk[1].contains(",12.5,-45.25,3000,"));
}

#[test]
fn peak_file_size_limit_rotates_the_set() {
    let tmp = TempDir::new().unwrap();
    let pru = memory_pru();
    let mut config = test_config(&tmp);
    config.storage.max_peak_file_bytes = 1;
    let (control, _probe) = control_loop(config, &pru, Vec::new());
    let mut control = control.with_cycle_limit(4);

    control.run().unwrap();
    let files = control.files().unwrap();
    assert_eq!(files.version(), "x003");
    let history = fs::read_to_string(files.dir().join("Version")).unwrap();
    assert_eq!(history.split_whitespace().collect::<Vec<_>>(), ["x001", "x002", "x003"]);
}

#[test]
fn new_file_set_saves_its_first_second() {
    let tmp = TempDir::new().unwrap();
    let pru = memory_pru();
    let mut config = test_config(&tmp);
    config.storage.skip_save = 1;
    config.storage.max_peak_file_bytes = 1;
    let (control, _probe) = control_loop(config, &pru, Vec::new());
    let mut control = control.with_cycle_limit(3);

    control.run().unwrap();
    let files = control.files().unwrap();
    assert_eq!(files.version(), "x002");
    assert_eq!(peak_records(files).len(), 1);
}

#[test]
fn low_flow_is_reported_after_the_startup_second() {
    let tmp = TempDir::new().unwrap();
    let pru = memory_pru();
    let mut config = test_config(&tmp);
    config.instrument.low_flow_threshold = 100.0;
    let (control, _probe) = control_loop(config, &pru, Vec::new());
    let mut control = control.with_cycle_limit(3);

    control.run().unwrap();
    let hk = lines(control.files().unwrap().housekeeping_path());
    let status: Vec<&str> = hk[1..].iter().map(|row| hk_fields(row)[1]).collect();
    assert_eq!(status, ["1", "17"]);
}

#[test]
fn skip_save_thins_peak_records() {
    let tmp = TempDir::new().unwrap();
    let pru = memory_pru();
    let mut config = test_config(&tmp);
    config.storage.skip_save = 1;
    let (control, _probe) = control_loop(config, &pru, Vec::new());
    let mut control = control.with_cycle_limit(4);

    control.run().unwrap();
    let files = control.files().unwrap();
    assert_eq!(peak_records(files).len(), 2);
    assert_eq!(lines(files.housekeeping_path()).len(), 4);
}

#[test]
fn pressure_schedule_and_range_alarm() {
    let tmp = TempDir::new().unwrap();
    let pru = memory_pru();
    let mut config = test_config(&tmp);
    config.flow_step = FlowStepConfig {
        enabled: true,
        steps: vec![FlowStep {
            press: 900.0,
            pump_v: 3.0,
        }],
    };
    let (control, probe) = control_loop(config, &pru, Vec::new());
    probe.set_pressure_temperature(800.0, -20.0);
    probe.set_analog_input(4, 1800);
    let mut control = control.with_cycle_limit(2);

    control.run().unwrap();
    let state = control.state();
    assert_eq!(state.pressure, 800.0);
    assert_eq!(state.temperature, -20.0);
    assert_eq!(state.flow_step.as_ref().map(|s| s.level()), Some(1));
    assert!(state.analog_in.range_alarm());
    assert!(probe.range_alarm());
    // Startup pair, one schedule step, shutdown pair.
    assert_eq!(probe.analog_output_writes(), 5);

    let log = fs::read_to_string(control.files().unwrap().log_path()).unwrap();
    assert_eq!(log.matches("Analog input at range limit").count(), 1);
}

#[test]
fn closed_link_is_reopened() {
    let tmp = TempDir::new().unwrap();
    let pru = memory_pru();
    let (status, peer) = link(LinkRole::Status, "status");
    peer.set_open(false);
    let (control, _probe) = control_loop(test_config(&tmp), &pru, vec![status]);
    let mut control = control.with_cycle_limit(2);

    control.run().unwrap();
    assert_eq!(peer.reopen_attempts(), 1);
    assert_eq!(peer.sent().len(), 1);
}

#[test]
fn sensor_fault_is_logged_and_skipped() {
    let tmp = TempDir::new().unwrap();
    let pru = memory_pru();
    let (control, probe) = control_loop(test_config(&tmp), &pru, Vec::new());
    probe.fail_pressure_temperature(true);
    let mut control = control.with_cycle_limit(2);

    assert_eq!(control.run().unwrap(), StopCause::Signal);
    assert_eq!(control.state().pressure, 0.0);
    let log = fs::read_to_string(control.files().unwrap().log_path()).unwrap();
    assert_eq!(log.matches("P/T not read").count(), 2);
}
