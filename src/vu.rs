// src/vu.rs

//! Per-voice peak metering, readable from any thread.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::util::amp_to_db;

/// dB value reported for silence or an invalid voice index.
pub const SILENCE_DB: f32 = -100.0;

/// A lock-free f32 cell. The audio thread stores, any thread loads.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Peak-envelope follower with independent attack and decay time constants.
///
/// `process` runs on the audio thread only; the resulting dB level is stored
/// through an [`AtomicF32`] owned by the caller so readers never see a torn
/// value, only one that is stale by at most a block.
#[derive(Debug)]
pub struct VuMeter {
    attack_coeff: f32,
    decay_coeff: f32,
    peak: f32,
}

const ATTACK_TIME: f32 = 0.01;
const DECAY_TIME: f32 = 0.3;

impl VuMeter {
    pub fn new(sample_rate: f32) -> Self {
        // per-sample coefficients, coeff = exp(-1 / (time * sample_rate))
        Self {
            attack_coeff: (-1.0 / (ATTACK_TIME * sample_rate)).exp(),
            decay_coeff: (-1.0 / (DECAY_TIME * sample_rate)).exp(),
            peak: 0.0,
        }
    }

    /// Follow the block's peak magnitude and return the new level in dB.
    pub fn process(&mut self, buffer: &[f32]) -> f32 {
        if buffer.is_empty() {
            return amp_to_db(self.peak);
        }
        let block_peak = buffer.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        let coeff = if block_peak > self.peak {
            self.attack_coeff
        } else {
            self.decay_coeff
        };
        // one step per block, scaled to the block length
        let k = coeff.powi(buffer.len() as i32);
        self.peak = block_peak + (self.peak - block_peak) * k;
        amp_to_db(self.peak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_reports_floor() {
        let mut meter = VuMeter::new(48_000.0);
        let db = meter.process(&[0.0; 256]);
        assert_eq!(db, SILENCE_DB);
    }

    #[test]
    fn loud_block_rises_quiet_block_decays() {
        let mut meter = VuMeter::new(48_000.0);
        let loud = vec![0.9f32; 4800];
        let quiet = vec![0.0f32; 4800];
        let after_loud = meter.process(&loud);
        assert!(after_loud > -10.0, "level after loud block: {}", after_loud);
        let mut after_quiet = after_loud;
        for _ in 0..20 {
            after_quiet = meter.process(&quiet);
        }
        assert!(
            after_quiet < after_loud - 6.0,
            "decay did not fall: {} -> {}",
            after_loud,
            after_quiet
        );
    }

    #[test]
    fn atomic_f32_round_trips_negative_values() {
        let cell = AtomicF32::new(SILENCE_DB);
        assert_eq!(cell.load(), SILENCE_DB);
        cell.store(-3.5);
        assert_eq!(cell.load(), -3.5);
    }
}
