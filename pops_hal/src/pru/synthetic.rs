//! Synthetic particle producer for development hosts.
//!
//! Runs on its own thread and plays the coprocessor's role against a
//! [`MemoryPru`]: Poisson-spaced events with log-uniform peak heights,
//! a noisy baseline window and a raw capture window.

use super::memory::MemoryPru;
use pops_common::consts::{BASELINE_SAMPLES, RAW_SAMPLES};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

const TICK: Duration = Duration::from_millis(1);
const TICKS_PER_MICROSECOND: f64 = 200.0;

/// Shape of the synthetic signal.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticProfile {
    /// Mean particle rate.
    pub events_per_second: u32,
    /// Quiescent signal level.
    pub baseline: u16,
    /// Peak-to-peak baseline noise.
    pub noise: u16,
    /// log10 range of generated peak heights.
    pub log_peak: (f64, f64),
    /// PRNG seed.
    pub seed: u64,
}

impl Default for SyntheticProfile {
    fn default() -> Self {
        Self {
            events_per_second: 500,
            baseline: 2300,
            noise: 24,
            log_peak: (1.5, 4.5),
            seed: 0x5EED_0000_0000_0001,
        }
    }
}

/// xorshift64* generator; statistical quality is irrelevant here.
struct XorShift(u64);

impl XorShift {
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform in (0, 1].
    fn unit(&mut self) -> f64 {
        ((self.next_u64() >> 11) as f64 + 1.0) / (1u64 << 53) as f64
    }
}

/// Handle to a running synthetic producer thread.
pub struct SyntheticProducer {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SyntheticProducer {
    /// Start producing into `pru`.
    ///
    /// # Errors
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(pru: Arc<MemoryPru>, profile: SyntheticProfile) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name("pops-synthetic".to_string())
            .spawn(move || produce(&pru, profile, &flag))?;
        info!(
            "Synthetic producer started ({} events/s)",
            profile.events_per_second
        );
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SyntheticProducer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn produce(pru: &MemoryPru, profile: SyntheticProfile, running: &AtomicBool) {
    let mut rng = XorShift(profile.seed.max(1));
    let mean_dt_us = 1e6 / f64::from(profile.events_per_second.max(1));
    let per_tick = TICK.as_secs_f64() * f64::from(profile.events_per_second);
    let mut carry = 0.0;
    let mut dropped = 0u64;
    let mut window = vec![0u16; BASELINE_SAMPLES.max(RAW_SAMPLES)];

    while running.load(Ordering::SeqCst) {
        carry += per_tick;
        while carry >= 1.0 {
            carry -= 1.0;
            let log_peak = profile.log_peak.0 + (profile.log_peak.1 - profile.log_peak.0) * rng.unit();
            let peak = 10f64.powf(log_peak).min(f64::from(u16::MAX)) as u16;
            let width = 5 + (rng.next_u64() % 56) as u16;
            let dt_us = -mean_dt_us * rng.unit().ln();
            let ticks = (dt_us * TICKS_PER_MICROSECOND) as u32;
            if !pru.push_event(peak, width, ticks) {
                dropped += 1;
            }
        }

        fill_noise(&mut rng, &mut window, profile.baseline, profile.noise);
        pru.set_baseline_samples(&window[..BASELINE_SAMPLES]);
        if rng.unit() < 0.05 {
            add_pulse(&mut window, profile.baseline);
        }
        pru.set_raw_samples(&window[..RAW_SAMPLES]);

        thread::sleep(TICK);
    }
    debug!("Synthetic producer stopped ({dropped} events dropped on a full ring)");
}

fn fill_noise(rng: &mut XorShift, window: &mut [u16], baseline: u16, noise: u16) {
    let half = i32::from(noise / 2);
    for sample in window.iter_mut() {
        let jitter = (rng.next_u64() % (u64::from(noise) + 1)) as i32 - half;
        *sample = (i32::from(baseline) + jitter).clamp(0, i32::from(u16::MAX)) as u16;
    }
}

fn add_pulse(window: &mut [u16], baseline: u16) {
    let start = window.len() / 3;
    for (i, sample) in window.iter_mut().skip(start).take(40).enumerate() {
        let rise = if i < 20 { i } else { 40 - i };
        *sample = baseline.saturating_add((rise * 60) as u16);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pops_common::hal::pru::RingBufferSource;

    #[test]
    fn producer_publishes_events() {
        let pru = Arc::new(MemoryPru::new());
        let mut producer = SyntheticProducer::spawn(
            pru.clone(),
            SyntheticProfile {
                events_per_second: 20_000,
                ..SyntheticProfile::default()
            },
        )
        .unwrap();
        thread::sleep(Duration::from_millis(50));
        producer.stop();
        assert!(pru.pushed_events() > 0);
        assert_ne!(pru.tail_address(), pops_common::consts::RING_BASE_ADDRESS);
    }

    #[test]
    fn noise_stays_near_baseline() {
        let mut rng = XorShift(7);
        let mut window = vec![0u16; 64];
        fill_noise(&mut rng, &mut window, 2000, 20);
        assert!(window.iter().all(|&s| (1990..=2010).contains(&s)));
    }
}
