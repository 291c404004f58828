//! System-wide constants for the POPS workspace.
//!
//! Single source of truth for the coprocessor memory layout and the
//! per-second acquisition limits. Imported by all crates.

use static_assertions::{const_assert, const_assert_eq};

// ─── Coprocessor memory layout ──────────────────────────────────────

/// Capacity of the shared event ring, in 32-bit words.
pub const RING_CAPACITY_WORDS: usize = 3072;

/// Address the coprocessor uses for word 0 of the ring.
pub const RING_BASE_ADDRESS: u32 = 0x0001_0000;

/// Size of one ring word in bytes.
pub const WORD_BYTES: u32 = 4;

/// Words per particle event in the ring.
pub const EVENT_WORDS: usize = 2;

/// Number of packed 16-bit baseline samples in the control region.
pub const BASELINE_SAMPLES: usize = 512;

/// Words holding the baseline samples (two samples per word).
pub const BASELINE_WORDS: usize = BASELINE_SAMPLES / 2;

/// Control word receiving baseline + threshold.
pub const BLTH_WORD: usize = 256;

/// Control word receiving the baseline.
pub const BASELINE_WORD: usize = 257;

/// Control word holding the producer's tail pointer (absolute address).
pub const TAIL_WORD: usize = 258;

/// Control word holding the stop flag (nonzero = stop).
pub const STOP_WORD: usize = 259;

/// Words the control region must provide.
pub const CONTROL_REGION_WORDS: usize = 260;

/// Packed raw samples in the raw capture region.
pub const RAW_SAMPLES: usize = 512;

/// Words in the raw capture region.
pub const RAW_WORDS: usize = RAW_SAMPLES / 2;

/// Fill pattern for the baseline samples before the coprocessor starts.
pub const BASELINE_FILL_PATTERN: u32 = 0x7500_7550;

/// Offset added to BL_Start for the initial threshold word.
pub const INITIAL_THRESHOLD_OFFSET: u32 = 0x30;

// ─── Acquisition limits ─────────────────────────────────────────────

/// Maximum particle events retained per one-second cycle.
pub const MAX_EVENTS_PER_SECOND: usize = 29_999;

/// Maximum number of histogram bins.
pub const MAX_BINS: usize = 200;

/// Number of analog input channels.
pub const AI_CHANNELS: usize = 7;

/// Number of analog output channels.
pub const AO_CHANNELS: usize = 2;

/// Full-scale code of the 12-bit DAC.
pub const DAC_FULL_SCALE: u32 = 4096;

/// Analog input reading (mV) at which the range alarm is raised.
pub const AI_RANGE_ALARM_MV: i32 = 1780;

/// Binary peak file size that triggers a new file set.
pub const DEFAULT_ROTATE_BYTES: u64 = 50_000_000;

/// Command buffer capacity in bytes.
pub const COMMAND_BUFFER_BYTES: usize = 512;

/// Pump hours accumulated per one-second cycle.
pub const PUMP_HOURS_PER_CYCLE: f64 = 0.000_277_778;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/media/uSD/POPS_BBB.toml";

const_assert!(RING_CAPACITY_WORDS % EVENT_WORDS == 0);
const_assert_eq!(BASELINE_WORDS, BLTH_WORD);
const_assert!(STOP_WORD < CONTROL_REGION_WORDS);
const_assert!(RAW_WORDS * 2 == RAW_SAMPLES);

/// Convert a producer tail address to a ring word offset.
///
/// Returns `None` when the address lies outside the ring.
#[inline]
pub const fn tail_offset(address: u32) -> Option<usize> {
    if address < RING_BASE_ADDRESS {
        return None;
    }
    let offset = ((address - RING_BASE_ADDRESS) / WORD_BYTES) as usize;
    if offset >= RING_CAPACITY_WORDS {
        return None;
    }
    Some(offset)
}

/// Convert a ring word offset to the address the producer publishes.
#[inline]
pub const fn tail_address(offset: usize) -> u32 {
    RING_BASE_ADDRESS + (offset as u32) * WORD_BYTES
}
