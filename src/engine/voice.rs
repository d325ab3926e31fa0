// src/engine/voice.rs

//! One engine voice: a tape loop plus its mix ramps, feedback sends, prime
//! state and the shared transport flags the control thread observes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::engine::mixer::Ramp;
use crate::tape::TapeLoop;
use crate::vu::{AtomicF32, SILENCE_DB};
use crate::NUM_VOICES;

/// Transport state published by the audio thread, read by the control thread.
/// All fields are independent atomics; readers may see a frame-stale mix of
/// them, which is fine for UI and parameter resolution.
#[derive(Debug)]
pub struct SharedVoiceState {
    pub playing: AtomicBool,
    pub recording: AtomicBool,
    pub primed: AtomicBool,
    /// Set by the audio thread when a primed recording has just stopped;
    /// the control thread consumes it to resolve the loop duration.
    pub done_primed: AtomicBool,
    /// Current playhead in seconds.
    pub position: AtomicF32,
    /// Playhead captured at the instant a primed recording stopped.
    pub saved_position: AtomicF32,
    /// Post-mix voice level in dB.
    pub vu_db: AtomicF32,
}

impl SharedVoiceState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            playing: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            primed: AtomicBool::new(false),
            done_primed: AtomicBool::new(false),
            position: AtomicF32::new(0.0),
            saved_position: AtomicF32::new(0.0),
            vu_db: AtomicF32::new(SILENCE_DB),
        })
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    pub fn is_primed(&self) -> bool {
        self.primed.load(Ordering::Relaxed)
    }

    /// Read-and-clear of the primed-recording-finished flag. Acquire pairs
    /// with the audio thread's release store so `saved_position` is current
    /// once the flag is observed.
    pub fn take_done_primed(&self) -> bool {
        self.done_primed.swap(false, Ordering::Acquire)
    }
}

pub struct Voice {
    pub tape: TapeLoop,
    pub enabled: bool,
    /// User-set rate magnitude.
    pub rate_set: f32,
    /// Correction factor distinct from the user rate (sample-rate matching
    /// for loaded material), multiplied in underneath it.
    pub rate_base: f32,
    pub rate_forward: bool,
    pub out_level: Ramp,
    pub out_pan: Ramp,
    pub reverb_send: Ramp,
    pub in_level: Ramp,
    /// Feedback level from every other voice's output into this voice's
    /// record input.
    pub feedback: [Ramp; NUM_VOICES],
    /// Armed: recording starts on the next input transient.
    pub primed: bool,
    /// Armed for a single loop pass.
    pub primed_record_once: bool,
    /// Recording was started by a prime trigger; on stop we publish the
    /// playhead so the loop window can be resolved to the captured length.
    pub was_primed: bool,
    pub prime_sensitivity_db: f32,
    pub shared: Arc<SharedVoiceState>,
}

impl Voice {
    pub fn new(sample_rate: f32, buffer_index: usize) -> Self {
        Self {
            tape: TapeLoop::new(sample_rate, buffer_index),
            enabled: true,
            rate_set: 1.0,
            rate_base: 1.0,
            rate_forward: true,
            out_level: Ramp::new(sample_rate, 0.0, 0.2),
            out_pan: Ramp::new(sample_rate, 0.5, 0.2),
            reverb_send: Ramp::new(sample_rate, 0.0, 0.2),
            in_level: Ramp::new(sample_rate, 1.0, 0.2),
            feedback: std::array::from_fn(|_| Ramp::new(sample_rate, 0.0, 0.2)),
            primed: false,
            primed_record_once: false,
            was_primed: false,
            prime_sensitivity_db: -30.0,
            shared: SharedVoiceState::new(),
        }
    }

    /// Recompute the signed effective rate from the user rate, the base rate
    /// and the direction, and hand it to the tape.
    pub fn update_rate(&mut self) {
        let magnitude = self.rate_set.abs() * self.rate_base.abs();
        self.tape
            .set_rate(if self.rate_forward { magnitude } else { -magnitude });
    }

    /// Mirror the transport flags into the shared state after a block.
    pub fn publish(&self) {
        self.shared.playing.store(self.tape.play, Ordering::Relaxed);
        self.shared.recording.store(self.tape.rec, Ordering::Relaxed);
        self.shared.primed.store(self.primed, Ordering::Relaxed);
        self.shared.position.store(self.tape.position_sec());
    }
}
