//! In-process coprocessor memory.
//!
//! Same word layout as the PRU subsystem, backed by atomics so a producer
//! thread and the acquisition loop can share it through an `Arc`. The
//! producer helpers follow the hardware publish order: record words first,
//! tail pointer last with release ordering.

use pops_common::consts::{
    BASELINE_SAMPLES, CONTROL_REGION_WORDS, EVENT_WORDS, RAW_SAMPLES, RAW_WORDS,
    RING_CAPACITY_WORDS, STOP_WORD, TAIL_WORD, tail_address, tail_offset,
};
use pops_common::hal::pru::{ControlRegion, CoprocessorMemory, RingBufferSource};
use pops_common::types::ParticleEvent;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Coprocessor memory held in process.
pub struct MemoryPru {
    ring: Box<[AtomicU32]>,
    control: Box<[AtomicU32]>,
    raw: Box<[AtomicU32]>,
    head: AtomicUsize,
    pushed: AtomicUsize,
}

fn zeroed(len: usize) -> Box<[AtomicU32]> {
    (0..len).map(|_| AtomicU32::new(0)).collect()
}

impl MemoryPru {
    /// Create zeroed memory with the tail pointing at ring offset 0.
    pub fn new() -> Self {
        let pru = Self {
            ring: zeroed(RING_CAPACITY_WORDS),
            control: zeroed(CONTROL_REGION_WORDS),
            raw: zeroed(RAW_WORDS),
            head: AtomicUsize::new(0),
            pushed: AtomicUsize::new(0),
        };
        pru.control[TAIL_WORD].store(tail_address(0), Ordering::Release);
        pru
    }

    // ── Producer side ──

    /// Current producer write offset.
    pub fn tail_offset(&self) -> usize {
        tail_offset(self.control[TAIL_WORD].load(Ordering::Acquire)).unwrap_or(0)
    }

    /// Words written but not yet consumed.
    pub fn pending_words(&self) -> usize {
        let tail = self.tail_offset();
        let head = self.head.load(Ordering::Acquire);
        (tail + RING_CAPACITY_WORDS - head) % RING_CAPACITY_WORDS
    }

    /// Append one event record and publish the new tail.
    ///
    /// Returns `false` without writing when the ring is full.
    pub fn push_event(&self, peak: u16, width: u16, raw_ticks: u32) -> bool {
        if self.pending_words() + EVENT_WORDS >= RING_CAPACITY_WORDS {
            return false;
        }
        let tail = self.tail_offset();
        let (w0, w1) = ParticleEvent::to_words(peak, width, raw_ticks);
        self.ring[tail].store(w0, Ordering::Relaxed);
        self.ring[(tail + 1) % RING_CAPACITY_WORDS].store(w1, Ordering::Relaxed);
        let next = (tail + EVENT_WORDS) % RING_CAPACITY_WORDS;
        self.control[TAIL_WORD].store(tail_address(next), Ordering::Release);
        self.pushed.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Move the tail to an arbitrary ring offset.
    pub fn set_tail_offset(&self, offset: usize) {
        self.control[TAIL_WORD].store(tail_address(offset % RING_CAPACITY_WORDS), Ordering::Release);
    }

    /// Publish a raw tail value, including out-of-range addresses.
    pub fn set_tail_raw(&self, address: u32) {
        self.control[TAIL_WORD].store(address, Ordering::Release);
    }

    /// Events accepted by [`push_event`](Self::push_event) since creation.
    pub fn pushed_events(&self) -> usize {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Raise or clear the stop flag.
    pub fn set_stop(&self, stop: bool) {
        self.control[STOP_WORD].store(u32::from(stop), Ordering::Release);
    }

    /// Fill the baseline window. Sample `2i` is the high half of word `i`.
    pub fn set_baseline_samples(&self, samples: &[u16]) {
        for (i, pair) in samples.chunks(2).take(BASELINE_SAMPLES / 2).enumerate() {
            let hi = u32::from(pair[0]);
            let lo = u32::from(pair.get(1).copied().unwrap_or(0));
            self.control[i].store((hi << 16) | lo, Ordering::Relaxed);
        }
    }

    /// Fill the raw capture window. Sample `2i` is the low half of word `i`.
    pub fn set_raw_samples(&self, samples: &[u16]) {
        for (i, pair) in samples.chunks(2).take(RAW_SAMPLES / 2).enumerate() {
            let lo = u32::from(pair[0]);
            let hi = u32::from(pair.get(1).copied().unwrap_or(0));
            self.raw[i].store((hi << 16) | lo, Ordering::Relaxed);
        }
    }

    // ── Inspection ──

    /// Read any control word.
    pub fn control_word(&self, index: usize) -> u32 {
        self.control[index].load(Ordering::Acquire)
    }

    /// Head last published by the consumer.
    pub fn head(&self) -> usize {
        self.head.load(Ordering::Acquire)
    }
}

impl Default for MemoryPru {
    fn default() -> Self {
        Self::new()
    }
}

impl RingBufferSource for MemoryPru {
    fn tail_address(&self) -> u32 {
        self.control[TAIL_WORD].load(Ordering::Acquire)
    }

    fn read_ring_word(&self, offset: usize) -> u32 {
        self.ring[offset % RING_CAPACITY_WORDS].load(Ordering::Relaxed)
    }

    fn publish_head(&self, head: usize) {
        self.head.store(head, Ordering::Release);
    }
}

impl ControlRegion for MemoryPru {
    fn baseline_word(&self, index: usize) -> u32 {
        self.control[index].load(Ordering::Relaxed)
    }

    fn write_control_word(&self, index: usize, value: u32) {
        self.control[index].store(value, Ordering::Release);
    }

    fn stop_flag(&self) -> u32 {
        self.control[STOP_WORD].load(Ordering::Acquire)
    }

    fn raw_word(&self, index: usize) -> u32 {
        self.raw[index].load(Ordering::Relaxed)
    }
}

impl CoprocessorMemory for MemoryPru {
    fn write_ring_word(&self, offset: usize, value: u32) {
        self.ring[offset % RING_CAPACITY_WORDS].store(value, Ordering::Relaxed);
    }
}
