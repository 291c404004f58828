//! Coprocessor memory seams.
//!
//! The coprocessor writes particle records into a 3072-word ring and
//! publishes its tail pointer in control word 258. The host consumes the
//! ring, feeds back baseline and threshold through control words 256/257
//! and polls the stop flag in word 259.
//!
//! Publish order: the producer writes a record, then stores the tail. The
//! consumer must read the tail with acquire semantics before reading data.

use crate::consts::{
    BASELINE_FILL_PATTERN, BASELINE_WORD, BASELINE_WORDS, BLTH_WORD, INITIAL_THRESHOLD_OFFSET,
    RING_BASE_ADDRESS, RING_CAPACITY_WORDS, STOP_WORD, TAIL_WORD,
};

/// Consumer view of the event ring.
pub trait RingBufferSource {
    /// Producer tail pointer as an absolute address (acquire load).
    fn tail_address(&self) -> u32;

    /// Read one ring word at a word offset in `0..RING_CAPACITY_WORDS`.
    fn read_ring_word(&self, offset: usize) -> u32;

    /// Record the consumer head after a drain.
    fn publish_head(&self, head: usize);
}

/// Host view of the coprocessor control region and raw capture window.
pub trait ControlRegion {
    /// Read a packed baseline sample word in `0..BASELINE_WORDS`.
    fn baseline_word(&self, index: usize) -> u32;

    /// Write a control word.
    fn write_control_word(&self, index: usize, value: u32);

    /// Read the stop flag word.
    fn stop_flag(&self) -> u32;

    /// Read a packed raw capture word.
    fn raw_word(&self, index: usize) -> u32;

    /// Publish baseline + threshold and baseline for the producer's comparator.
    fn write_thresholds(&self, blth: u32, baseline: u32) {
        self.write_control_word(BLTH_WORD, blth);
        self.write_control_word(BASELINE_WORD, baseline);
    }
}

/// Complete coprocessor memory: ring plus control region.
pub trait CoprocessorMemory: RingBufferSource + ControlRegion + Send + Sync {
    /// Write one ring word. Used only before the producer starts.
    fn write_ring_word(&self, offset: usize, value: u32);

    /// Seed the memory before the coprocessor firmware starts.
    ///
    /// Clears the ring, fills the baseline window, seeds the threshold
    /// words from `bl_start`, points the tail at the ring base and clears
    /// the stop flag.
    fn initialize(&self, bl_start: u32) {
        for offset in 0..RING_CAPACITY_WORDS {
            self.write_ring_word(offset, 0);
        }
        for index in 0..BASELINE_WORDS {
            self.write_control_word(index, BASELINE_FILL_PATTERN);
        }
        self.write_control_word(BLTH_WORD, bl_start + INITIAL_THRESHOLD_OFFSET);
        self.write_control_word(BASELINE_WORD, bl_start);
        self.write_control_word(TAIL_WORD, RING_BASE_ADDRESS);
        self.write_control_word(STOP_WORD, 0);
        self.publish_head(0);
    }
}
