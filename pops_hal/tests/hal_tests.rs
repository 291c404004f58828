//! HAL integration tests.
//!
//! Driver lookup through the registry, the in-process coprocessor seen
//! through the `CoprocessorMemory` seam while the synthetic producer runs,
//! and a UDP link talking to itself over loopback.

use pops_common::config::{HardwareConfig, TimingConfig};
use pops_common::consts::{
    BASELINE_WORD, BASELINE_WORDS, BLTH_WORD, INITIAL_THRESHOLD_OFFSET, RING_BASE_ADDRESS,
    RING_CAPACITY_WORDS, tail_offset,
};
use pops_common::hal::driver::HalError;
use pops_common::hal::pru::{ControlRegion, CoprocessorMemory, RingBufferSource};
use pops_common::hal::transport::Transport;
use pops_hal::driver_registry::DriverRegistry;
use pops_hal::pru::{MemoryPru, SyntheticProducer, SyntheticProfile};
use pops_hal::transport::UdpLink;
use std::net::UdpSocket;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn registry_builds_simulation_driver() {
    let registry = DriverRegistry::with_builtin_drivers().unwrap();
    let names = registry.list_drivers();
    assert!(names.contains(&"simulation"));
    assert!(names.contains(&"beaglebone"));

    let mut driver = registry.create_driver("simulation").unwrap();
    assert_eq!(driver.name(), "simulation");
    driver
        .init(&HardwareConfig::default(), &TimingConfig::default())
        .unwrap();
    let mut mv = [0i32; 7];
    driver.read_analog_inputs(&mut mv).unwrap();
    assert_eq!(mv[0], 1050);
    driver.shutdown().unwrap();

    assert!(registry.create_driver("nonexistent").is_err());
}

#[test]
fn initialize_seeds_control_region() {
    let pru = MemoryPru::new();
    pru.set_stop(true);
    pru.set_tail_offset(100);

    let memory: &dyn CoprocessorMemory = &pru;
    memory.initialize(2300);
    assert_eq!(memory.stop_flag(), 0);
    assert_eq!(memory.tail_address(), RING_BASE_ADDRESS);
    assert_eq!(pru.control_word(BLTH_WORD), 2300 + INITIAL_THRESHOLD_OFFSET);
    assert_eq!(pru.control_word(BASELINE_WORD), 2300);
    assert_ne!(memory.baseline_word(BASELINE_WORDS - 1), 0);
    assert_eq!(pru.head(), 0);
}

#[test]
fn synthetic_producer_fills_ring_and_windows() {
    let pru = Arc::new(MemoryPru::new());
    pru.initialize(2300);
    let profile = SyntheticProfile {
        events_per_second: 5_000,
        ..SyntheticProfile::default()
    };
    let mut producer = SyntheticProducer::spawn(pru.clone(), profile).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while pru.pushed_events() < 50 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    producer.stop();

    let pushed = pru.pushed_events();
    assert!(pushed >= 50, "only {pushed} events produced");
    let memory: Arc<dyn CoprocessorMemory> = pru.clone();
    let tail = tail_offset(memory.tail_address()).unwrap();
    assert_eq!(tail, (2 * pushed) % RING_CAPACITY_WORDS);

    // Baseline window holds noise around the profile baseline.
    let word = memory.baseline_word(0);
    let sample = (word >> 16) as i32;
    assert!((sample - 2300).abs() <= 12, "baseline sample {sample}");

    // Stopping twice is harmless.
    producer.stop();
}

#[test]
fn udp_link_round_trip_over_loopback() {
    // Find a free port, then let the link bind it for receiving.
    let port = UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let mut link = UdpLink::new("127.0.0.1", port).unwrap();
    assert!(!link.is_open());
    assert!(matches!(
        link.send(b"x"),
        Err(HalError::CommunicationError(_))
    ));

    link.reopen().unwrap();
    assert!(link.is_open());
    assert_eq!(link.receive_port(), Some(port));

    link.send(b"nbins=16").unwrap();
    let mut buf = [0u8; 64];
    let deadline = Instant::now() + Duration::from_secs(2);
    let n = loop {
        let n = link.receive(&mut buf).unwrap();
        if n > 0 || Instant::now() >= deadline {
            break n;
        }
        thread::sleep(Duration::from_millis(2));
    };
    assert_eq!(&buf[..n], b"nbins=16");
    assert_eq!(link.receive(&mut buf).unwrap(), 0);
}
