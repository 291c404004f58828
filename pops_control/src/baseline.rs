//! Baseline and detection threshold feedback.
//!
//! The coprocessor keeps the last 512 quiescent samples in control words
//! 0..255, two per word with the earlier sample in the high half. The host
//! reduces them to a mean and a sample standard deviation and writes
//! `baseline + multiplier * std` back as the comparator threshold.

use pops_common::consts::{BASELINE_SAMPLES, BASELINE_WORDS};
use pops_common::hal::pru::ControlRegion;

/// Latest baseline statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BaselineState {
    /// Mean of the raw window, truncated to counts.
    pub baseline: u16,
    /// Standard deviations above the baseline for detection.
    pub threshold_multiplier: f64,
    /// Detection threshold, truncated to counts.
    pub baseline_plus_threshold: u16,
    /// Sample standard deviation (N−1) of the raw window.
    pub std_dev: f64,
}

/// Stateless estimator over a [`ControlRegion`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineEstimator;

impl BaselineEstimator {
    /// Recompute from the current window and publish the result.
    pub fn recompute<R: ControlRegion + ?Sized>(region: &R, multiplier: f64) -> BaselineState {
        let mut samples = [0u16; BASELINE_SAMPLES];
        for i in 0..BASELINE_WORDS {
            let word = region.baseline_word(i);
            samples[2 * i] = (word >> 16) as u16;
            samples[2 * i + 1] = (word & 0xFFFF) as u16;
        }
        let state = Self::from_samples(&samples, multiplier);
        region.write_thresholds(
            u32::from(state.baseline_plus_threshold),
            u32::from(state.baseline),
        );
        state
    }

    /// Statistics of a sample window (at least two samples).
    pub fn from_samples(samples: &[u16], multiplier: f64) -> BaselineState {
        let n = samples.len() as f64;
        let mean = samples.iter().map(|&s| f64::from(s)).sum::<f64>() / n;
        let var = samples
            .iter()
            .map(|&s| (f64::from(s) - mean).powi(2))
            .sum::<f64>();
        let std_dev = (var / (n - 1.0)).sqrt();
        BaselineState {
            baseline: mean as u16,
            threshold_multiplier: multiplier,
            baseline_plus_threshold: (mean + multiplier * std_dev) as u16,
            std_dev,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pops_common::consts::{BASELINE_WORD, BLTH_WORD};
    use std::cell::RefCell;

    struct FakeRegion {
        words: RefCell<Vec<u32>>,
    }

    impl FakeRegion {
        fn with_samples(samples: &[u16]) -> Self {
            let mut words = vec![0u32; 260];
            for (i, pair) in samples.chunks(2).enumerate() {
                words[i] = (u32::from(pair[0]) << 16) | u32::from(pair[1]);
            }
            Self {
                words: RefCell::new(words),
            }
        }
    }

    impl ControlRegion for FakeRegion {
        fn baseline_word(&self, index: usize) -> u32 {
            self.words.borrow()[index]
        }

        fn write_control_word(&self, index: usize, value: u32) {
            self.words.borrow_mut()[index] = value;
        }

        fn stop_flag(&self) -> u32 {
            0
        }

        fn raw_word(&self, _index: usize) -> u32 {
            0
        }
    }

    #[test]
    fn constant_window_has_zero_spread() {
        let region = FakeRegion::with_samples(&[2300; BASELINE_SAMPLES]);
        let state = BaselineEstimator::recompute(&region, 3.0);
        assert_eq!(state.baseline, 2300);
        assert_eq!(state.std_dev, 0.0);
        assert_eq!(state.baseline_plus_threshold, 2300);
        assert_eq!(region.words.borrow()[BLTH_WORD], 2300);
        assert_eq!(region.words.borrow()[BASELINE_WORD], 2300);
    }

    #[test]
    fn alternating_window_matches_sample_formula() {
        // 256 samples at 2290 and 256 at 2310.
        let samples: Vec<u16> = (0..BASELINE_SAMPLES)
            .map(|i| if i % 2 == 0 { 2290 } else { 2310 })
            .collect();
        let region = FakeRegion::with_samples(&samples);
        let state = BaselineEstimator::recompute(&region, 2.0);

        let expected_std = (512.0 * 100.0 / 511.0_f64).sqrt();
        assert_eq!(state.baseline, 2300);
        assert!((state.std_dev - expected_std).abs() < 1e-9);
        assert_eq!(
            state.baseline_plus_threshold,
            (2300.0 + 2.0 * expected_std) as u16
        );
        assert_eq!(
            region.words.borrow()[BLTH_WORD],
            u32::from(state.baseline_plus_threshold)
        );
    }

    #[test]
    fn high_half_is_the_earlier_sample() {
        let mut samples = vec![0u16; BASELINE_SAMPLES];
        samples[0] = 512;
        let region = FakeRegion::with_samples(&samples);
        assert_eq!(region.baseline_word(0), 512 << 16);
        let state = BaselineEstimator::recompute(&region, 0.0);
        assert_eq!(state.baseline, 1);
    }
}
