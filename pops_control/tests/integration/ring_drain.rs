//! Integration test: coprocessor ring, baseline feedback and raw capture
//! against the in-process coprocessor memory.

use pops_common::consts::{
    BASELINE_SAMPLES, BASELINE_WORD, BLTH_WORD, MAX_EVENTS_PER_SECOND, RAW_SAMPLES,
    RING_CAPACITY_WORDS, tail_address,
};
use pops_common::hal::pru::{CoprocessorMemory, RingBufferSource};
use pops_common::types::ParticleEvent;
use pops_control::baseline::BaselineEstimator;
use pops_control::raw::RawCapture;
use pops_control::ring::{EventSet, RingBufferConsumer, RingError};
use pops_control::telemetry::encode_raw;
use pops_hal::pru::MemoryPru;

// ── Helpers ─────────────────────────────────────────────────────────

/// Deterministic record `n` as (peak, width, raw ticks).
fn record(n: u32) -> (u16, u16, u32) {
    (
        (100 + n % 60_000) as u16,
        (5 + n % 40) as u16,
        200 * (1 + n % 1_000),
    )
}

fn expected(n: u32) -> ParticleEvent {
    let (peak, width, ticks) = record(n);
    let (w0, w1) = ParticleEvent::to_words(peak, width, ticks);
    ParticleEvent::from_words(w0, w1)
}

/// Memory and consumer positioned at `head`.
fn ring_at(head: usize) -> (MemoryPru, RingBufferConsumer) {
    let pru = MemoryPru::new();
    pru.initialize(2300);
    pru.set_tail_offset(head);
    pru.publish_head(head);
    (pru, RingBufferConsumer::with_head(head))
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn one_second_is_capped_across_many_drains() {
    let (pru, mut consumer) = ring_at(0);
    let mut events = EventSet::new();
    let total = 30_005u32;
    let mut decoded = 0;
    let mut wrapped = 0;

    let mut n = 0u32;
    while n < total {
        let batch_end = (n + 1_000).min(total);
        while n < batch_end {
            let (peak, width, ticks) = record(n);
            assert!(pru.push_event(peak, width, ticks), "ring full at {n}");
            n += 1;
        }
        let stats = consumer.drain_once(&pru, &mut events).unwrap();
        decoded += stats.decoded;
        wrapped += usize::from(stats.wrapped);
        assert_eq!(pru.head(), consumer.head());
        assert_eq!(pru.pending_words(), 0);
    }

    assert_eq!(decoded, total as usize);
    assert!(wrapped > 0, "batches should have crossed the ring end");
    assert_eq!(events.len(), MAX_EVENTS_PER_SECOND);
    assert_eq!(events.discarded(), 6);
    assert_eq!(events.as_slice()[0], expected(0));
    assert_eq!(
        events.as_slice()[MAX_EVENTS_PER_SECOND - 1],
        expected(MAX_EVENTS_PER_SECOND as u32 - 1)
    );

    events.clear();
    assert!(events.is_empty());
    assert_eq!(events.discarded(), 0);
}

#[test]
fn wrapped_region_keeps_every_record_in_order() {
    let head = RING_CAPACITY_WORDS - 72;
    let (pru, mut consumer) = ring_at(head);
    let mut events = EventSet::new();
    for n in 0..100 {
        let (peak, width, ticks) = record(n);
        assert!(pru.push_event(peak, width, ticks));
    }
    assert_eq!(pru.tail_offset(), 128);

    let stats = consumer.drain_once(&pru, &mut events).unwrap();
    assert!(stats.wrapped);
    assert_eq!(stats.words, 200);
    assert_eq!(stats.kept, 100);
    for (n, event) in events.as_slice().iter().enumerate() {
        assert_eq!(*event, expected(n as u32), "event {n}");
    }
    assert_eq!(consumer.head(), 128);
}

#[test]
fn full_ring_drains_in_one_pass() {
    let (pru, mut consumer) = ring_at(0);
    let mut events = EventSet::new();
    let mut n = 0;
    while {
        let (peak, width, ticks) = record(n);
        pru.push_event(peak, width, ticks)
    } {
        n += 1;
    }
    assert_eq!(n as usize, RING_CAPACITY_WORDS / 2 - 1);

    let stats = consumer.drain_once(&pru, &mut events).unwrap();
    assert_eq!(stats.kept, n as usize);
    // A second drain with nothing published is a no-op.
    let again = consumer.drain_once(&pru, &mut events).unwrap();
    assert_eq!(again.words, 0);
    assert_eq!(events.len(), n as usize);
}

#[test]
fn tail_outside_ring_leaves_head_alone() {
    let (pru, mut consumer) = ring_at(0);
    let mut events = EventSet::new();
    for n in 0..10 {
        let (peak, width, ticks) = record(n);
        pru.push_event(peak, width, ticks);
    }
    pru.set_tail_raw(0x10);
    assert_eq!(
        consumer.drain_once(&pru, &mut events),
        Err(RingError::TailOutOfRange(0x10))
    );
    assert_eq!(consumer.head(), 0);
    assert!(events.is_empty());

    pru.set_tail_raw(tail_address(20));
    let stats = consumer.drain_once(&pru, &mut events).unwrap();
    assert_eq!(stats.kept, 10);
}

#[test]
fn baseline_feedback_reaches_control_words() {
    let pru = MemoryPru::new();
    pru.initialize(2300);
    let samples: Vec<u16> = (0..BASELINE_SAMPLES)
        .map(|i| if i % 2 == 0 { 2290 } else { 2310 })
        .collect();
    pru.set_baseline_samples(&samples);

    let state = BaselineEstimator::recompute(&pru, 2.0);
    assert_eq!(state.baseline, 2300);
    assert!((state.std_dev - 10.0 * (512.0f64 / 511.0).sqrt()).abs() < 1e-9);
    assert_eq!(state.baseline_plus_threshold, 2320);
    assert_eq!(pru.control_word(BASELINE_WORD), 2300);
    assert_eq!(pru.control_word(BLTH_WORD), 2320);
}

#[test]
fn raw_window_kept_only_with_a_pulse() {
    let pru = MemoryPru::new();
    let mut capture = RawCapture::new();
    let threshold = 2320;

    // Ten samples above threshold is not a pulse.
    let mut window = vec![2300u16; RAW_SAMPLES];
    window[100..110].fill(3000);
    pru.set_raw_samples(&window);
    assert!(!capture.sample(&pru, threshold));
    assert_eq!(capture.captures(), 0);
    assert!(capture.samples(8).iter().all(|&s| s == 0));

    window[100..111].fill(3000);
    pru.set_raw_samples(&window);
    assert!(capture.sample(&pru, threshold));
    assert_eq!(capture.samples(RAW_SAMPLES), &window[..]);

    // Later quiet windows do not replace the kept one.
    pru.set_raw_samples(&vec![2300u16; RAW_SAMPLES]);
    assert!(!capture.sample(&pru, threshold));
    assert_eq!(capture.samples(RAW_SAMPLES)[105], 3000);

    let frame = encode_raw(capture.samples(4));
    assert_eq!(frame, "RawData,8fc,8fc,8fc,8fc");
    assert_eq!(capture.samples(10_000).len(), RAW_SAMPLES);
}
