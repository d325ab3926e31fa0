// src/tape.rs

//! The tape-loop primitive: one playhead over a shared sample buffer with a
//! loop window, signed rate, play/record flags and a record-once mode.
//!
//! The engine treats this as a self-contained transport; the interpolation
//! and crossfade quality here is intentionally plain.

use crate::engine::mixer::Ramp;

/// Smallest loop the primitive will accept, in seconds. Degenerate windows
/// are clamped to this instead of rejected.
pub const MIN_LOOP_SEC: f32 = 0.01;

/// One-pole filter used on both the record (pre) and playback (post) paths.
/// `dry` and `lp` mix the unfiltered and low-passed signals.
#[derive(Debug, Clone)]
struct OnePole {
    z1: f32,
    alpha: f32,
    lp: f32,
    dry: f32,
}

impl OnePole {
    fn new(sample_rate: f32, cutoff_hz: f32, lp: f32, dry: f32) -> Self {
        let mut f = Self {
            z1: 0.0,
            alpha: 0.0,
            lp,
            dry,
        };
        f.set_cutoff(sample_rate, cutoff_hz);
        f
    }

    fn set_cutoff(&mut self, sample_rate: f32, cutoff_hz: f32) {
        let fc = cutoff_hz.clamp(10.0, sample_rate * 0.45);
        self.alpha = 1.0 - (-2.0 * std::f32::consts::PI * fc / sample_rate).exp();
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        self.z1 += self.alpha * (x - self.z1);
        self.dry * x + self.lp * self.z1
    }
}

#[derive(Debug)]
pub struct TapeLoop {
    sample_rate: f32,
    /// Which shared buffer this voice reads/writes.
    pub buffer_index: usize,
    loop_start: f32,
    loop_end: f32,
    loop_flag: bool,
    /// Playhead in frames, fractional.
    position: f64,
    rate: Ramp,
    pub play: bool,
    pub rec: bool,
    /// Stop recording at the next loop wrap (single-shot capture).
    pub rec_once: bool,
    rec_level: Ramp,
    pre_level: Ramp,
    fade_time: f32,
    fade_gain: f32,
    pre_filter: OnePole,
    post_filter: OnePole,
    tape_bias: f32,
    tape_pregain: f32,
}

impl TapeLoop {
    pub fn new(sample_rate: f32, buffer_index: usize) -> Self {
        Self {
            sample_rate,
            buffer_index,
            loop_start: 0.0,
            loop_end: 2.0,
            loop_flag: true,
            position: 0.0,
            rate: Ramp::new(sample_rate, 1.0, 0.2),
            play: false,
            rec: false,
            rec_once: false,
            rec_level: Ramp::new(sample_rate, 1.0, 0.2),
            pre_level: Ramp::new(sample_rate, 0.0, 0.2),
            fade_time: 0.2,
            fade_gain: 1.0,
            pre_filter: OnePole::new(sample_rate, 19_000.0, 0.0, 1.0),
            post_filter: OnePole::new(sample_rate, 19_000.0, 1.0, 0.0),
            tape_bias: 0.0,
            tape_pregain: 1.0,
        }
    }

    pub fn set_loop_start(&mut self, sec: f32) {
        self.loop_start = sec.max(0.0);
        if self.loop_end < self.loop_start + MIN_LOOP_SEC {
            self.loop_end = self.loop_start + MIN_LOOP_SEC;
        }
    }

    pub fn set_loop_end(&mut self, sec: f32) {
        self.loop_end = sec.max(self.loop_start + MIN_LOOP_SEC);
    }

    pub fn loop_start(&self) -> f32 {
        self.loop_start
    }

    pub fn loop_end(&self) -> f32 {
        self.loop_end
    }

    pub fn duration(&self) -> f32 {
        self.loop_end - self.loop_start
    }

    pub fn set_loop_flag(&mut self, looping: bool) {
        self.loop_flag = looping;
    }

    /// Set the signed effective playback rate (slewed).
    pub fn set_rate(&mut self, rate: f32) {
        self.rate.set_target(rate);
    }

    pub fn set_rate_slew(&mut self, seconds: f32) {
        self.rate.set_time(seconds);
    }

    pub fn set_rec_level(&mut self, level: f32) {
        self.rec_level.set_target(level);
    }

    pub fn set_pre_level(&mut self, level: f32) {
        self.pre_level.set_target(level);
    }

    pub fn set_rec_pre_slew(&mut self, seconds: f32) {
        self.rec_level.set_time(seconds);
        self.pre_level.set_time(seconds);
    }

    pub fn set_fade_time(&mut self, seconds: f32) {
        self.fade_time = seconds;
    }

    pub fn set_pre_filter_cutoff(&mut self, hz: f32) {
        self.pre_filter.set_cutoff(self.sample_rate, hz);
    }

    pub fn set_post_filter_cutoff(&mut self, hz: f32) {
        self.post_filter.set_cutoff(self.sample_rate, hz);
    }

    pub fn set_post_filter_lowpass(&mut self, lp: f32) {
        self.post_filter.lp = lp;
    }

    pub fn set_post_filter_dry(&mut self, dry: f32) {
        self.post_filter.dry = dry;
    }

    pub fn set_tape_bias(&mut self, bias: f32) {
        self.tape_bias = bias;
    }

    pub fn set_tape_pregain(&mut self, pregain: f32) {
        self.tape_pregain = pregain;
    }

    /// One-shot transport jump, with a fade-in to hide the discontinuity.
    pub fn cut_to(&mut self, sec: f32) {
        self.position = (sec.max(0.0) as f64) * self.sample_rate as f64;
        self.restart_fade();
    }

    pub fn position_sec(&self) -> f32 {
        (self.position / self.sample_rate as f64) as f32
    }

    fn restart_fade(&mut self) {
        if self.fade_time > 1.0e-4 {
            self.fade_gain = 0.0;
        }
    }

    #[inline]
    fn fade_step(&self) -> f32 {
        if self.fade_time <= 1.0e-4 {
            1.0
        } else {
            1.0 / (self.fade_time * self.sample_rate)
        }
    }

    #[inline]
    fn saturate(&self, x: f32) -> f32 {
        let driven = self.tape_pregain * x;
        (driven + self.tape_bias * driven * driven).tanh()
    }

    /// Render one block: read `input` into the tape when recording, write the
    /// tape into `output` when playing. `buf` is the shared sample buffer
    /// this voice's `buffer_index` refers to.
    pub fn process_block(&mut self, buf: &mut [f32], input: &[f32], output: &mut [f32]) {
        let frames = output.len().min(input.len());
        let start_f = (self.loop_start as f64) * self.sample_rate as f64;
        let end_f = (self.loop_end as f64) * self.sample_rate as f64;
        let buf_len = buf.len() as f64;
        let fade_step = self.fade_step();

        for i in 0..frames {
            let rate = self.rate.next() as f64;
            let idx = (self.position.max(0.0) as usize).min(buf.len() - 1);

            if self.play {
                let s = self.post_filter.process(buf[idx]);
                output[i] = s * self.fade_gain;
            } else {
                output[i] = 0.0;
            }

            if self.rec {
                let pre = self.pre_level.next();
                let filtered = self.pre_filter.process(input[i]);
                let x = self.saturate(filtered);
                buf[idx] = buf[idx] * pre + x * self.rec_level.next();
            } else {
                // keep the ramps moving so a rec toggle resumes smoothly
                self.pre_level.next();
                self.rec_level.next();
            }

            if self.play || self.rec {
                self.position += rate;
                if self.loop_flag {
                    if self.position >= end_f {
                        self.finish_pass();
                        self.position = start_f + (self.position - end_f);
                    } else if self.position < start_f {
                        self.finish_pass();
                        self.position = end_f - (start_f - self.position);
                    }
                }
                if self.position >= buf_len {
                    self.position -= buf_len;
                } else if self.position < 0.0 {
                    self.position += buf_len;
                }
            }

            if self.fade_gain < 1.0 {
                self.fade_gain = (self.fade_gain + fade_step).min(1.0);
            }
        }
    }

    /// Loop wrap bookkeeping: a record-once pass ends here.
    fn finish_pass(&mut self) {
        if self.rec_once {
            self.rec = false;
            self.rec_once = false;
        }
        self.restart_fade();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_input(frames: usize) -> Vec<f32> {
        vec![0.0; frames]
    }

    #[test]
    fn degenerate_loop_is_clamped() {
        let mut tape = TapeLoop::new(48_000.0, 0);
        tape.set_loop_start(5.0);
        tape.set_loop_end(4.0);
        assert!(tape.duration() >= MIN_LOOP_SEC);
        assert!(tape.loop_end() >= tape.loop_start());
    }

    #[test]
    fn record_then_play_reproduces_signal() {
        let sr = 1_000.0;
        let mut tape = TapeLoop::new(sr, 0);
        let mut buf = vec![0.0f32; 4_000];
        tape.set_loop_start(0.0);
        tape.set_loop_end(1.0);
        tape.set_fade_time(0.0);
        tape.set_rate_slew(0.0);
        tape.set_rec_pre_slew(0.0);
        tape.set_rec_level(1.0);
        tape.set_pre_level(0.0);
        tape.cut_to(0.0);
        tape.play = true;
        tape.rec = true;

        let input = vec![0.5f32; 500];
        let mut out = vec![0.0f32; 500];
        tape.process_block(&mut buf, &input, &mut out);
        tape.rec = false;
        tape.cut_to(0.0);

        let silence = silent_input(500);
        let mut out2 = vec![0.0f32; 500];
        tape.process_block(&mut buf, &silence, &mut out2);
        let energy: f32 = out2.iter().map(|s| s * s).sum();
        assert!(energy > 1.0, "playback energy {}", energy);
    }

    #[test]
    fn record_once_stops_at_wrap() {
        let sr = 1_000.0;
        let mut tape = TapeLoop::new(sr, 0);
        let mut buf = vec![0.0f32; 4_000];
        tape.set_loop_start(0.0);
        tape.set_loop_end(0.1); // 100 frames
        tape.set_fade_time(0.0);
        tape.cut_to(0.0);
        tape.play = true;
        tape.rec = true;
        tape.rec_once = true;

        let input = vec![0.3f32; 300];
        let mut out = vec![0.0f32; 300];
        tape.process_block(&mut buf, &input, &mut out);
        assert!(!tape.rec, "record-once did not stop after one pass");
        assert!(tape.play, "record-once must keep playing");
    }

    #[test]
    fn position_advances_in_real_time_at_unit_rate() {
        let sr = 1_000.0;
        let mut tape = TapeLoop::new(sr, 0);
        let mut buf = vec![0.0f32; 10_000];
        tape.set_loop_start(0.0);
        tape.set_loop_end(5.0);
        tape.set_rate_slew(0.0);
        tape.set_rate(1.0);
        tape.cut_to(0.0);
        tape.play = true;

        let input = silent_input(1_370);
        let mut out = vec![0.0f32; 1_370];
        tape.process_block(&mut buf, &input, &mut out);
        assert!((tape.position_sec() - 1.37).abs() < 1e-3);
    }
}
