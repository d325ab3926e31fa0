// src/engine/reverb.rs

//! Schroeder-style send reverb on the shared stereo bus: four parallel comb
//! filters into two series all-pass diffusers per channel, with the right
//! channel slightly detuned for width.

/// One-pole low-pass used to damp the reverb tail inside each comb.
#[derive(Debug, Clone, Copy, Default)]
struct DampingFilter {
    z1: f32,
}

impl DampingFilter {
    #[inline(always)]
    fn process(&mut self, input: f32, coeff: f32) -> f32 {
        let output = input * (1.0 - coeff) + self.z1 * coeff;
        self.z1 = output;
        output
    }
}

#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    delay_length: usize,
    damping_filter: DampingFilter,
}

impl CombFilter {
    fn new(delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; delay_samples.max(1)],
            write_pos: 0,
            delay_length: delay_samples.max(1),
            damping_filter: DampingFilter::default(),
        }
    }

    #[inline(always)]
    fn process(&mut self, input: f32, feedback: f32, damping: f32) -> f32 {
        let read_index =
            (self.write_pos + self.buffer.len() - self.delay_length) % self.buffer.len();
        let output = self.buffer[read_index];
        let damped = self.damping_filter.process(output, damping);
        self.buffer[self.write_pos] = input + damped * feedback;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        output
    }
}

#[derive(Debug, Clone)]
struct AllPassFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    delay_length: usize,
}

impl AllPassFilter {
    fn new(delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; delay_samples.max(1)],
            write_pos: 0,
            delay_length: delay_samples.max(1),
        }
    }

    #[inline(always)]
    fn process(&mut self, input: f32) -> f32 {
        let read_index =
            (self.write_pos + self.buffer.len() - self.delay_length) % self.buffer.len();
        let delayed = self.buffer[read_index];
        let output = -input + delayed;
        self.buffer[self.write_pos] = input + delayed * 0.5;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        output
    }
}

// Prime delay lengths avoid periodic artifacts. The right channel's delays
// are stretched a touch for decorrelation.
const BASE_COMB_DELAYS: [f32; 4] = [1117.0, 1187.0, 1277.0, 1351.0];
const BASE_ALLPASS_DELAYS: [f32; 2] = [223.0, 557.0];
const RIGHT_DETUNE: f32 = 1.02;

#[derive(Debug)]
struct ReverbChannel {
    combs: [CombFilter; 4],
    allpasses: [AllPassFilter; 2],
}

impl ReverbChannel {
    fn new(sr_factor: f32, detune: f32) -> Self {
        Self {
            combs: std::array::from_fn(|i| {
                CombFilter::new((BASE_COMB_DELAYS[i] * sr_factor * detune) as usize)
            }),
            allpasses: std::array::from_fn(|i| {
                AllPassFilter::new((BASE_ALLPASS_DELAYS[i] * sr_factor * detune) as usize)
            }),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damping: f32) -> f32 {
        let comb_out = self
            .combs
            .iter_mut()
            .map(|f| f.process(input, feedback, damping))
            .sum::<f32>()
            * 0.25;
        self.allpasses
            .iter_mut()
            .fold(comb_out, |acc, f| f.process(acc))
    }
}

/// The shared send reverb. Returns a fully wet signal; the engine mixes it
/// back into the main bus.
#[derive(Debug)]
pub struct Reverb {
    left: ReverbChannel,
    right: ReverbChannel,
    feedback: f32,
    damping: f32,
}

impl Reverb {
    pub fn new(sample_rate: f32) -> Self {
        let sr_factor = sample_rate / 44_100.0;
        let mut reverb = Self {
            left: ReverbChannel::new(sr_factor, 1.0),
            right: ReverbChannel::new(sr_factor, RIGHT_DETUNE),
            feedback: 0.0,
            damping: 0.0,
        };
        reverb.set_decay(50.0);
        reverb.set_density(50.0);
        reverb
    }

    /// Decay amount in percent (0-100), mapped to comb feedback.
    pub fn set_decay(&mut self, percent: f32) {
        let x = (percent / 100.0).clamp(0.0, 1.0);
        self.feedback = 0.7 + 0.28 * x;
    }

    /// Density amount in percent (0-100). Higher density keeps more highs in
    /// the tail, so the damping coefficient runs inversely.
    pub fn set_density(&mut self, percent: f32) {
        let x = (percent / 100.0).clamp(0.0, 1.0);
        self.damping = (1.0 - x).powf(2.0) * 0.4 + 0.05;
    }

    /// Process the wet bus in place.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32], frames: usize) {
        for i in 0..frames {
            left[i] = self.left.process(left[i], self.feedback, self.damping);
            right[i] = self.right.process(right[i], self.feedback, self.damping);
        }
    }
}
