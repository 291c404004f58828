//! Raw waveform capture.
//!
//! The second coprocessor keeps a rolling window of 512 detector samples,
//! two per word with the earlier sample in the low half. The loop samples it
//! on every tail-loop iteration and keeps the window only when it holds a
//! particle, i.e. more than [`MIN_PULSE_RUN`] consecutive samples above the
//! detection threshold. The last kept window is what raw frames report.

use pops_common::consts::{RAW_SAMPLES, RAW_WORDS};
use pops_common::hal::pru::ControlRegion;

/// A window is kept when a run above threshold is longer than this.
pub const MIN_PULSE_RUN: usize = 10;

/// Last captured raw window.
#[derive(Debug, Clone)]
pub struct RawCapture {
    scratch: [u16; RAW_SAMPLES],
    kept: [u16; RAW_SAMPLES],
    captures: u64,
}

impl RawCapture {
    /// Empty capture (all samples zero).
    pub fn new() -> Self {
        Self {
            scratch: [0; RAW_SAMPLES],
            kept: [0; RAW_SAMPLES],
            captures: 0,
        }
    }

    /// Read the current window and keep it if it contains a pulse.
    ///
    /// Returns `true` when the window was kept.
    pub fn sample<R: ControlRegion + ?Sized>(&mut self, region: &R, threshold: u16) -> bool {
        for i in 0..RAW_WORDS {
            let word = region.raw_word(i);
            self.scratch[2 * i] = (word & 0xFFFF) as u16;
            self.scratch[2 * i + 1] = (word >> 16) as u16;
        }
        if !has_pulse(&self.scratch, threshold) {
            return false;
        }
        self.kept = self.scratch;
        self.captures += 1;
        true
    }

    /// The first `pts` samples of the kept window.
    pub fn samples(&self, pts: usize) -> &[u16] {
        &self.kept[..pts.min(RAW_SAMPLES)]
    }

    /// Windows kept since startup.
    pub fn captures(&self) -> u64 {
        self.captures
    }
}

impl Default for RawCapture {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `samples` has more than [`MIN_PULSE_RUN`] consecutive values above `threshold`.
pub fn has_pulse(samples: &[u16], threshold: u16) -> bool {
    let mut run = 0usize;
    for &s in samples {
        if s > threshold {
            run += 1;
            if run > MIN_PULSE_RUN {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}
