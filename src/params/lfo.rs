// src/params/lfo.rs

//! Low-frequency oscillator driving parameter modulation. Runs at the
//! control tick rate, not the audio rate.

use std::f32::consts::TAU;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LfoWaveform {
    Sine = 0,
    Triangle = 1,
    Saw = 2,
    InvSaw = 3,
    Square = 4,
    Random = 5, // sample & hold
}

impl From<u8> for LfoWaveform {
    fn from(val: u8) -> Self {
        match val {
            1 => LfoWaveform::Triangle,
            2 => LfoWaveform::Saw,
            3 => LfoWaveform::InvSaw,
            4 => LfoWaveform::Square,
            5 => LfoWaveform::Random,
            _ => LfoWaveform::Sine,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lfo {
    pub waveform: LfoWaveform,
    frequency_hz: f32,
    tick_rate: f32,
    phase: f32,
    last_output: f32,
}

impl Lfo {
    /// `tick_rate` is how many times per second [`Lfo::tick`] is called.
    pub fn new(tick_rate: f32) -> Self {
        Self {
            waveform: LfoWaveform::Sine,
            frequency_hz: 0.5,
            tick_rate,
            phase: 0.0,
            last_output: 0.0,
        }
    }

    pub fn set_frequency(&mut self, hz: f32) {
        self.frequency_hz = hz.max(0.0);
    }

    pub fn frequency(&self) -> f32 {
        self.frequency_hz
    }

    /// Cycle period in seconds.
    pub fn period(&self) -> f32 {
        if self.frequency_hz <= 0.0 {
            0.0
        } else {
            1.0 / self.frequency_hz
        }
    }

    pub fn set_period(&mut self, seconds: f32) {
        self.frequency_hz = if seconds <= 0.0 { 0.0 } else { 1.0 / seconds };
    }

    /// Advance one control tick and return the new value in `[-1, 1]`.
    pub fn tick(&mut self) -> f32 {
        let phase_inc = self.frequency_hz / self.tick_rate;
        self.phase = (self.phase + phase_inc) % 1.0;

        match self.waveform {
            LfoWaveform::Sine => (self.phase * TAU).sin(),
            LfoWaveform::Triangle => 1.0 - 4.0 * (self.phase - 0.5).abs(),
            LfoWaveform::Saw => 2.0 * self.phase - 1.0,
            LfoWaveform::InvSaw => 1.0 - 2.0 * self.phase,
            LfoWaveform::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoWaveform::Random => {
                // phase wrapped: hold a new random value
                if self.phase < phase_inc {
                    self.last_output = rand::random::<f32>() * 2.0 - 1.0;
                }
                self.last_output
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_stays_in_range() {
        for wf in [
            LfoWaveform::Sine,
            LfoWaveform::Triangle,
            LfoWaveform::Saw,
            LfoWaveform::InvSaw,
            LfoWaveform::Square,
            LfoWaveform::Random,
        ] {
            let mut lfo = Lfo::new(30.0);
            lfo.waveform = wf;
            lfo.set_frequency(1.3);
            for _ in 0..300 {
                let v = lfo.tick();
                assert!((-1.0..=1.0).contains(&v), "{:?} out of range: {}", wf, v);
            }
        }
    }

    #[test]
    fn period_round_trips_frequency() {
        let mut lfo = Lfo::new(30.0);
        lfo.set_period(4.0);
        assert!((lfo.frequency() - 0.25).abs() < 1e-6);
        assert!((lfo.period() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn sine_completes_a_cycle() {
        let mut lfo = Lfo::new(100.0);
        lfo.set_frequency(1.0);
        let mut max = -1.0f32;
        let mut min = 1.0f32;
        for _ in 0..100 {
            let v = lfo.tick();
            max = max.max(v);
            min = min.min(v);
        }
        assert!(max > 0.9 && min < -0.9);
    }
}
