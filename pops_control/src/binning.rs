//! Log-spaced peak-height histogram and pulse width statistics.

use pops_common::config::BinsConfig;
use pops_common::consts::MAX_BINS;
use pops_common::types::ParticleEvent;

/// Bins in the compressed status view.
pub const COMPRESSED_BINS: usize = 8;

// ─── Histogram ──────────────────────────────────────────────────────

/// One second of peak heights binned in log10 space.
///
/// Invariant: the sum of all bins never exceeds the number of events binned.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    bins: [u32; MAX_BINS],
    nbins: usize,
    logmin: f64,
    logmax: f64,
}

impl Histogram {
    /// Empty histogram with the given layout. `nbins` is clamped to `1..=MAX_BINS`.
    pub fn new(nbins: usize, logmin: f64, logmax: f64) -> Self {
        Self {
            bins: [0; MAX_BINS],
            nbins: nbins.clamp(1, MAX_BINS),
            logmin,
            logmax,
        }
    }

    /// Histogram laid out from configuration.
    pub fn from_config(config: &BinsConfig) -> Self {
        Self::new(config.nbins, config.logmin, config.logmax)
    }

    /// Change the layout. Counters are cleared.
    pub fn set_layout(&mut self, nbins: usize, logmin: f64, logmax: f64) {
        *self = Self::new(nbins, logmin, logmax);
    }

    /// Number of bins.
    pub fn nbins(&self) -> usize {
        self.nbins
    }

    /// log10 of the lower edge of bin 0.
    pub fn logmin(&self) -> f64 {
        self.logmin
    }

    /// log10 of the upper edge of the last bin.
    pub fn logmax(&self) -> f64 {
        self.logmax
    }

    /// Bin counters.
    pub fn bins(&self) -> &[u32] {
        &self.bins[..self.nbins]
    }

    /// Total binned events.
    pub fn total(&self) -> u64 {
        self.bins().iter().map(|&b| u64::from(b)).sum()
    }

    /// Rebuild from a set of events.
    ///
    /// Peaks whose bin falls below 0 or at/above `nbins` are dropped,
    /// including zero-height peaks.
    pub fn calc_histogram(&mut self, events: &[ParticleEvent]) {
        self.bins = [0; MAX_BINS];
        if events.is_empty() {
            return;
        }
        let logdelta = (self.logmax - self.logmin) / self.nbins as f64;
        for event in events {
            let dbin = (f64::from(event.peak).log10() - self.logmin) / logdelta;
            if !(dbin >= 0.0) {
                continue;
            }
            let bin = dbin as usize;
            if bin < self.nbins {
                self.bins[bin] += 1;
            }
        }
    }

    /// Eight-bin view used by compact status frames.
    ///
    /// A 16-bin layout keeps bins 0..=5, folds 6..=9 into bin 6 and
    /// 10..=15 into bin 7. Other layouts report their first eight bins,
    /// zero-padded.
    pub fn compress_bins(&self) -> [u32; COMPRESSED_BINS] {
        let mut out = [0u32; COMPRESSED_BINS];
        if self.nbins == 16 {
            out[..6].copy_from_slice(&self.bins[..6]);
            out[6] = self.bins[6..10].iter().sum();
            out[7] = self.bins[10..16].iter().sum();
        } else {
            let n = self.nbins.min(COMPRESSED_BINS);
            out[..n].copy_from_slice(&self.bins[..n]);
        }
        out
    }
}

// ─── Width statistics ───────────────────────────────────────────────

/// Mean and sample standard deviation of pulse widths.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WidthStats {
    /// Mean width in samples.
    pub mean: f64,
    /// Sample standard deviation (N−1).
    pub std_dev: f64,
}

impl WidthStats {
    /// Statistics of `events`; fewer than six events give zeros.
    pub fn calc_width_stats(events: &[ParticleEvent]) -> Self {
        if events.len() <= 5 {
            return Self::default();
        }
        let n = events.len() as f64;
        let mean = events.iter().map(|e| f64::from(e.width)).sum::<f64>() / n;
        let var = events
            .iter()
            .map(|e| (f64::from(e.width) - mean).powi(2))
            .sum::<f64>();
        Self {
            mean,
            std_dev: (var / (n - 1.0)).sqrt(),
        }
    }
}
