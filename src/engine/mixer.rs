// src/engine/mixer.rs

//! Bus mixing helpers: smoothed level ramps, mono/stereo busses and the
//! equal-power pan law used for both the main mix and the reverb send.

use std::f32::consts::FRAC_PI_2;

/// One-pole smoother for levels, pans and rates. Values approach the target
/// exponentially so control-thread changes never step audibly.
#[derive(Debug, Clone)]
pub struct Ramp {
    value: f32,
    target: f32,
    coeff: f32,
    sample_rate: f32,
    time: f32,
}

impl Ramp {
    pub fn new(sample_rate: f32, initial: f32, time: f32) -> Self {
        let mut ramp = Self {
            value: initial,
            target: initial,
            coeff: 0.0,
            sample_rate,
            time,
        };
        ramp.update_coeff();
        ramp
    }

    fn update_coeff(&mut self) {
        let t = self.time.max(1.0e-4);
        self.coeff = 1.0 - (-1.0 / (t * self.sample_rate)).exp();
    }

    pub fn set_time(&mut self, seconds: f32) {
        self.time = seconds;
        self.update_coeff();
    }

    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        self.value += self.coeff * (self.target - self.value);
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn target(&self) -> f32 {
        self.target
    }
}

/// A stereo accumulation bus with preallocated storage.
#[derive(Debug)]
pub struct StereoBus {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoBus {
    pub fn new(max_frames: usize) -> Self {
        Self {
            left: vec![0.0; max_frames],
            right: vec![0.0; max_frames],
        }
    }

    pub fn clear(&mut self, frames: usize) {
        self.left[..frames].fill(0.0);
        self.right[..frames].fill(0.0);
    }

    /// Sum another bus into this one.
    pub fn add_from(&mut self, other: &StereoBus, frames: usize) {
        for i in 0..frames {
            self.left[i] += other.left[i];
            self.right[i] += other.right[i];
        }
    }
}

/// Equal-power stereo gains for a pan position in `[0, 1]`.
#[inline]
pub fn pan_gains(pan01: f32) -> (f32, f32) {
    let p = pan01.clamp(0.0, 1.0) * FRAC_PI_2;
    (p.cos(), p.sin())
}

/// Map a user-facing pan in `[-1, 1]` to the internal `[0, 1]` crossfade.
#[inline]
pub fn pan_to_01(pan: f32) -> f32 {
    (pan / 2.0) + 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_converges_to_target() {
        let mut ramp = Ramp::new(48_000.0, 0.0, 0.01);
        ramp.set_target(1.0);
        let mut last = 0.0;
        for _ in 0..48_000 {
            last = ramp.next();
        }
        assert!((last - 1.0).abs() < 1e-3, "ramp stalled at {}", last);
    }

    #[test]
    fn pan_law_is_equal_power() {
        let (l, r) = pan_gains(0.5);
        assert!((l * l + r * r - 1.0).abs() < 1e-5);
        let (l, r) = pan_gains(0.0);
        assert!((l - 1.0).abs() < 1e-6 && r.abs() < 1e-6);
        let (l, r) = pan_gains(1.0);
        assert!(l.abs() < 1e-6 && (r - 1.0).abs() < 1e-6);
    }
}
