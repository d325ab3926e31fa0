// src/engine.rs

//! The real-time loop engine. Everything in here runs on the audio thread:
//! no allocation, no locks, no I/O. The control context talks to it through
//! the command channel and reads state back through per-voice atomics.

pub mod command;
pub mod mixer;
pub mod reverb;
pub mod voice;

use std::sync::Arc;

use crate::engine::command::{CommandRx, EngineCommand};
use crate::engine::mixer::{pan_gains, pan_to_01, StereoBus};
use crate::engine::reverb::Reverb;
use crate::engine::voice::{SharedVoiceState, Voice};
use crate::recorder::SessionCapture;
use crate::tape::MIN_LOOP_SEC;
use crate::util::amp_to_db;
use crate::vu::{VuMeter, SILENCE_DB};
use crate::{default_buffer_index, loop_region_offset, BUFFER_SECONDS, MAX_BLOCK_FRAMES, NUM_BUFFERS, NUM_VOICES};

/// How long the reverb keeps running after the last active send, so tails
/// ring out before the network is bypassed.
const REVERB_TAIL_SECONDS: f32 = 4.0;

pub struct LoopEngine {
    sample_rate: f32,
    command_rx: CommandRx,
    voices: Vec<Voice>,
    /// Shared sample buffers the voices read and write.
    buffers: Vec<Vec<f32>>,
    /// Per-voice record input scratch for the current block.
    inputs: Vec<Vec<f32>>,
    /// Per-voice playback output. Feedback routing reads the previous
    /// block's contents before they are overwritten.
    outputs: Vec<Vec<f32>>,
    meters: Vec<VuMeter>,
    mix_bus: StereoBus,
    reverb_bus: StereoBus,
    voice_bus: StereoBus,
    reverb: Reverb,
    /// Frames of reverb tail left to render once every send has gone quiet.
    reverb_tail_frames: usize,
    session: Option<Box<SessionCapture>>,
}

impl LoopEngine {
    pub fn new(sample_rate: f32, command_rx: CommandRx) -> Self {
        let buffer_frames = (BUFFER_SECONDS * sample_rate) as usize;
        let mut voices = Vec::with_capacity(NUM_VOICES);
        for v in 0..NUM_VOICES {
            let mut voice = Voice::new(sample_rate, default_buffer_index(v));
            let start = loop_region_offset(v);
            voice.tape.set_loop_start(start);
            voice.tape.set_loop_end(start + 2.0);
            voice.tape.cut_to(start);
            voices.push(voice);
        }
        Self {
            sample_rate,
            command_rx,
            voices,
            buffers: (0..NUM_BUFFERS).map(|_| vec![0.0; buffer_frames]).collect(),
            inputs: (0..NUM_VOICES).map(|_| vec![0.0; MAX_BLOCK_FRAMES]).collect(),
            outputs: (0..NUM_VOICES).map(|_| vec![0.0; MAX_BLOCK_FRAMES]).collect(),
            meters: (0..NUM_VOICES).map(|_| VuMeter::new(sample_rate)).collect(),
            mix_bus: StereoBus::new(MAX_BLOCK_FRAMES),
            reverb_bus: StereoBus::new(MAX_BLOCK_FRAMES),
            voice_bus: StereoBus::new(MAX_BLOCK_FRAMES),
            reverb: Reverb::new(sample_rate),
            reverb_tail_frames: 0,
            session: None,
        }
    }

    pub fn shared_states(&self) -> Vec<Arc<SharedVoiceState>> {
        self.voices.iter().map(|v| v.shared.clone()).collect()
    }

    /// Most recent level of a voice in dB. Out-of-range indices report the
    /// silence floor rather than panicking.
    pub fn vu_level(&self, voice: usize) -> f32 {
        match self.voices.get(voice) {
            Some(v) => v.shared.vu_db.load(),
            None => SILENCE_DB,
        }
    }

    /// Last rendered block of one voice, for routing inspection. Out-of-range
    /// indices read as an empty block.
    pub fn voice_output(&self, voice: usize) -> &[f32] {
        self.outputs.get(voice).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Render one block of the whole engine.
    pub fn process_block(&mut self, input: &[f32], out_left: &mut [f32], out_right: &mut [f32]) {
        let frames = input
            .len()
            .min(out_left.len())
            .min(out_right.len())
            .min(MAX_BLOCK_FRAMES);

        self.handle_commands();
        self.mix_input(input, frames);

        // the trigger listens to the voice's mixed record input (input level
        // and feedback sends applied), so the triggering block is captured
        for v in 0..NUM_VOICES {
            if !self.voices[v].primed {
                continue;
            }
            let peak = self.inputs[v][..frames]
                .iter()
                .fold(0.0f32, |a, s| a.max(s.abs()));
            if amp_to_db(peak) > self.voices[v].prime_sensitivity_db {
                self.trigger_primed(v);
            }
        }

        for v in 0..NUM_VOICES {
            let voice = &mut self.voices[v];
            if !voice.enabled {
                self.outputs[v][..frames].fill(0.0);
                continue;
            }
            let was_primed_rec = voice.was_primed && voice.tape.rec;
            let buf = voice.tape.buffer_index.min(NUM_BUFFERS - 1);
            voice.tape.process_block(
                &mut self.buffers[buf],
                &self.inputs[v][..frames],
                &mut self.outputs[v][..frames],
            );
            // a record-once pass that wrapped has stopped itself
            if was_primed_rec && !voice.tape.rec {
                voice.was_primed = false;
            }
        }

        for v in 0..NUM_VOICES {
            let db = self.meters[v].process(&self.outputs[v][..frames]);
            self.voices[v].shared.vu_db.store(db);
            self.voices[v].publish();
        }

        self.mix_output(frames);

        out_left[..frames].copy_from_slice(&self.mix_bus.left[..frames]);
        out_right[..frames].copy_from_slice(&self.mix_bus.right[..frames]);

        if let Some(session) = self.session.as_mut() {
            session.mix.capture(&self.mix_bus.left, &self.mix_bus.right, frames);
        }
    }

    /// Fill the per-voice record inputs: hardware input scaled by the input
    /// level, plus every playing voice's previous output scaled by its
    /// feedback send into this voice.
    fn mix_input(&mut self, input: &[f32], frames: usize) {
        let mut playing = [false; NUM_VOICES];
        for (flag, voice) in playing.iter_mut().zip(self.voices.iter()) {
            *flag = voice.enabled && voice.tape.play;
        }

        for dst in 0..NUM_VOICES {
            let recording =
                self.voices[dst].enabled && (self.voices[dst].tape.rec || self.voices[dst].primed);
            if !recording {
                self.inputs[dst][..frames].fill(0.0);
                // keep the ramps tracking their targets
                for _ in 0..frames {
                    self.voices[dst].in_level.next();
                }
                continue;
            }
            for i in 0..frames {
                self.inputs[dst][i] = input[i] * self.voices[dst].in_level.next();
            }
            for src in 0..NUM_VOICES {
                if src == dst || !playing[src] {
                    continue;
                }
                let ramp = &mut self.voices[dst].feedback[src];
                if ramp.target() == 0.0 && ramp.value().abs() < 1.0e-6 {
                    continue;
                }
                let out = &self.outputs[src];
                let dst_in = &mut self.inputs[dst];
                for i in 0..frames {
                    dst_in[i] += out[i] * ramp.next();
                }
            }
        }
    }

    /// Pan each playing voice into the main bus and the reverb bus, run the
    /// reverb, then fold the wet bus back into the mix. The reverb send taps
    /// the voice before its fader, so a level-gated voice still feeds the
    /// reverb.
    fn mix_output(&mut self, frames: usize) {
        self.mix_bus.clear(frames);
        self.reverb_bus.clear(frames);
        let mut send_active = false;

        for v in 0..NUM_VOICES {
            let voice = &mut self.voices[v];
            if !voice.enabled || !voice.tape.play {
                continue;
            }
            if voice.reverb_send.target() > 0.0 || voice.reverb_send.value() > 1.0e-6 {
                send_active = true;
            }
            self.voice_bus.clear(frames);
            let out = &self.outputs[v];
            for i in 0..frames {
                let gain = voice.out_level.next();
                let (gl, gr) = pan_gains(voice.out_pan.next());
                let main = out[i] * gain;
                self.voice_bus.left[i] = main * gl;
                self.voice_bus.right[i] = main * gr;
                let send = out[i] * voice.reverb_send.next();
                self.reverb_bus.left[i] += send * gl;
                self.reverb_bus.right[i] += send * gr;
            }
            if let Some(session) = self.session.as_mut() {
                if let Some(stream) = session.voices.get_mut(v) {
                    stream.capture(&self.voice_bus.left, &self.voice_bus.right, frames);
                }
            }
            self.mix_bus.add_from(&self.voice_bus, frames);
        }

        if send_active {
            self.reverb_tail_frames = (REVERB_TAIL_SECONDS * self.sample_rate) as usize;
        }
        if self.reverb_tail_frames > 0 {
            self.reverb_tail_frames = self.reverb_tail_frames.saturating_sub(frames);
            self.reverb
                .process(&mut self.reverb_bus.left, &mut self.reverb_bus.right, frames);
            self.mix_bus.add_from(&self.reverb_bus, frames);
        }
    }

    fn handle_commands(&mut self) {
        while let Some(cmd) = self.command_rx.pop() {
            self.apply(cmd);
        }
    }

    fn apply(&mut self, cmd: EngineCommand) {
        use EngineCommand::*;
        match cmd {
            SetEnabled { voice, enabled } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.enabled = enabled;
                }
            }
            SetLevel { voice, level } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.out_level.set_target(level);
                }
            }
            SetPan { voice, pan } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.out_pan.set_target(pan_to_01(pan));
                }
            }
            SetInputLevel { voice, level } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.in_level.set_target(level);
                }
            }
            SetFeedbackLevel { src, dst, level } => {
                if src < NUM_VOICES {
                    if let Some(v) = self.voices.get_mut(dst) {
                        v.feedback[src].set_target(level);
                    }
                }
            }
            SetReverbSend { voice, level } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.reverb_send.set_target(level);
                }
            }
            SetLevelSlew { voice, seconds } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.out_level.set_time(seconds);
                    v.reverb_send.set_time(seconds);
                }
            }
            SetPanSlew { voice, seconds } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.out_pan.set_time(seconds);
                }
            }
            SetRate { voice, rate } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.rate_set = rate;
                    v.update_rate();
                }
            }
            SetBaseRate { voice, rate } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.rate_base = rate;
                    v.update_rate();
                }
            }
            SetRateDirection { voice, forward } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.rate_forward = forward;
                    v.update_rate();
                }
            }
            SetRateSlew { voice, seconds } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.set_rate_slew(seconds);
                }
            }
            SetLoopStart { voice, sec } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.set_loop_start(sec);
                }
            }
            SetLoopEnd { voice, sec } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.set_loop_end(sec.max(v.tape.loop_start() + MIN_LOOP_SEC));
                }
            }
            SetLoopFlag { voice, looping } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.set_loop_flag(looping);
                }
            }
            CutToPosition { voice, sec } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.cut_to(sec);
                }
            }
            SetFadeTime { voice, seconds } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.set_fade_time(seconds);
                }
            }
            SetVoiceBuffer { voice, buffer } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.buffer_index = buffer.min(NUM_BUFFERS - 1);
                }
            }
            SetRecLevel { voice, level } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.set_rec_level(level);
                }
            }
            SetPreLevel { voice, level } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.set_pre_level(level);
                }
            }
            SetRecPreSlew { voice, seconds } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.set_rec_pre_slew(seconds);
                }
            }
            SetRecFlag { voice, rec } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.rec = rec;
                }
            }
            SetPlayFlag { voice, play } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.play = play;
                }
            }
            ToggleRecord { voice } => self.toggle_record(voice),
            TogglePlay { voice } => self.toggle_play(voice),
            TogglePrime { voice } => self.toggle_prime(voice),
            ToggleRecordOnce { voice } => self.toggle_record_once(voice),
            SetPrimeSensitivity { voice, db } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.prime_sensitivity_db = db;
                }
            }
            SetPreFilterCutoff { voice, hz } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.set_pre_filter_cutoff(hz);
                }
            }
            SetPostFilterCutoff { voice, hz } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.set_post_filter_cutoff(hz);
                }
            }
            SetPostFilterLowpass { voice, amount } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.set_post_filter_lowpass(amount);
                }
            }
            SetPostFilterDry { voice, amount } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.set_post_filter_dry(amount);
                }
            }
            SetTapeBias { voice, amount } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.set_tape_bias(amount);
                }
            }
            SetTapePregain { voice, amount } => {
                if let Some(v) = self.voices.get_mut(voice) {
                    v.tape.set_tape_pregain(amount);
                }
            }
            SetReverbDecay { percent } => self.reverb.set_decay(percent),
            SetReverbDensity { percent } => self.reverb.set_density(percent),
            StartSession(capture) => self.session = Some(capture),
            StopSession => self.session = None,
        }
    }

    /// Record toggle. Starting always enables play; stopping a recording
    /// that began from a prime trigger publishes the playhead so the loop
    /// window can be resolved to the captured length.
    fn toggle_record(&mut self, voice: usize) {
        let Some(v) = self.voices.get_mut(voice) else {
            return;
        };
        if v.tape.rec {
            v.tape.rec = false;
            v.tape.rec_once = false;
            if v.was_primed {
                v.was_primed = false;
                // position first, then the release store publishing it
                v.shared.saved_position.store(v.tape.position_sec());
                v.shared
                    .done_primed
                    .store(true, std::sync::atomic::Ordering::Release);
            }
        } else {
            if v.primed {
                v.primed = false;
                v.was_primed = true;
            }
            v.tape.rec = true;
            v.tape.play = true;
        }
    }

    /// Play toggle. Any prime state is cancelled either way.
    fn toggle_play(&mut self, voice: usize) {
        let Some(v) = self.voices.get_mut(voice) else {
            return;
        };
        v.tape.play = !v.tape.play;
        v.primed = false;
        v.primed_record_once = false;
        v.was_primed = false;
        if !v.tape.play {
            v.tape.rec = false;
            v.tape.rec_once = false;
        }
    }

    /// Arm or disarm the voice. Arming parks the transport at the loop start
    /// with play and record both off, waiting on the input trigger.
    fn toggle_prime(&mut self, voice: usize) {
        let Some(v) = self.voices.get_mut(voice) else {
            return;
        };
        v.primed = !v.primed;
        if v.primed {
            v.tape.play = false;
            v.tape.rec = false;
            v.tape.rec_once = false;
            v.was_primed = false;
            let start = v.tape.loop_start();
            v.tape.cut_to(start);
        } else {
            v.primed_record_once = false;
        }
    }

    /// Single-pass capture. On a primed voice this only flips the mode the
    /// trigger will start in; otherwise it starts recording immediately from
    /// the loop start.
    fn toggle_record_once(&mut self, voice: usize) {
        let Some(v) = self.voices.get_mut(voice) else {
            return;
        };
        if v.primed {
            v.primed_record_once = !v.primed_record_once;
            return;
        }
        let start = v.tape.loop_start();
        v.tape.cut_to(start);
        v.tape.rec = true;
        v.tape.rec_once = true;
        v.tape.play = true;
    }

    /// Input crossed the prime threshold: start recording.
    fn trigger_primed(&mut self, voice: usize) {
        let Some(v) = self.voices.get_mut(voice) else {
            return;
        };
        v.primed = false;
        v.was_primed = true;
        v.tape.rec = true;
        v.tape.play = true;
        if v.primed_record_once {
            v.tape.rec_once = true;
            v.primed_record_once = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command::command_channel;

    fn engine_with_tx(sr: f32) -> (LoopEngine, crate::engine::command::CommandTx) {
        let (tx, rx) = command_channel(256);
        (LoopEngine::new(sr, rx), tx)
    }

    fn run_block(engine: &mut LoopEngine, input: &[f32]) {
        let mut l = vec![0.0f32; input.len()];
        let mut r = vec![0.0f32; input.len()];
        engine.process_block(input, &mut l, &mut r);
    }

    #[test]
    fn toggle_record_implies_play() {
        let (mut engine, mut tx) = engine_with_tx(48_000.0);
        tx.push(EngineCommand::ToggleRecord { voice: 3 });
        run_block(&mut engine, &[0.0; 64]);
        let shared = engine.shared_states()[3].clone();
        assert!(shared.is_recording());
        assert!(shared.is_playing());
    }

    #[test]
    fn prime_parks_transport_until_trigger() {
        let (mut engine, mut tx) = engine_with_tx(48_000.0);
        tx.push(EngineCommand::TogglePrime { voice: 0 });
        run_block(&mut engine, &[0.0; 64]);
        let shared = engine.shared_states()[0].clone();
        assert!(shared.is_primed());
        assert!(!shared.is_playing());
        assert!(!shared.is_recording());

        // a loud input block trips the trigger
        run_block(&mut engine, &[0.8; 64]);
        assert!(!shared.is_primed());
        assert!(shared.is_recording());
        assert!(shared.is_playing());
    }

    #[test]
    fn quiet_input_does_not_trip_prime() {
        let (mut engine, mut tx) = engine_with_tx(48_000.0);
        tx.push(EngineCommand::TogglePrime { voice: 0 });
        tx.push(EngineCommand::SetPrimeSensitivity { voice: 0, db: -20.0 });
        run_block(&mut engine, &[0.0; 64]);
        run_block(&mut engine, &[0.001; 64]); // about -60 dB
        let shared = engine.shared_states()[0].clone();
        assert!(shared.is_primed());
        assert!(!shared.is_recording());
    }

    #[test]
    fn stopping_primed_record_publishes_saved_position() {
        let (mut engine, mut tx) = engine_with_tx(1_000.0);
        tx.push(EngineCommand::TogglePrime { voice: 0 });
        run_block(&mut engine, &[0.0; 100]);
        run_block(&mut engine, &[0.9; 100]); // trigger
        for _ in 0..5 {
            run_block(&mut engine, &[0.5; 100]);
        }
        tx.push(EngineCommand::ToggleRecord { voice: 0 });
        run_block(&mut engine, &[0.0; 100]);

        let shared = engine.shared_states()[0].clone();
        assert!(shared.take_done_primed());
        assert!(!shared.take_done_primed(), "flag must be consumed once");
        let saved = shared.saved_position.load();
        assert!(saved > engine.voices[0].tape.loop_start());
    }

    #[test]
    fn feedback_routes_playing_source_into_recording_destination() {
        let (mut engine, mut tx) = engine_with_tx(1_000.0);
        // record something audible into voice 0 first
        tx.push(EngineCommand::SetRecLevel { voice: 0, level: 1.0 });
        tx.push(EngineCommand::SetRecPreSlew { voice: 0, seconds: 0.0 });
        tx.push(EngineCommand::SetFadeTime { voice: 0, seconds: 0.0 });
        tx.push(EngineCommand::ToggleRecord { voice: 0 });
        run_block(&mut engine, &[0.5; 256]);
        tx.push(EngineCommand::ToggleRecord { voice: 0 });

        // now record voice 1 from voice 0's output only
        tx.push(EngineCommand::SetInputLevel { voice: 1, level: 0.0 });
        tx.push(EngineCommand::SetFeedbackLevel { src: 0, dst: 1, level: 1.0 });
        tx.push(EngineCommand::SetRecLevel { voice: 1, level: 1.0 });
        tx.push(EngineCommand::SetRecPreSlew { voice: 1, seconds: 0.0 });
        tx.push(EngineCommand::SetFadeTime { voice: 1, seconds: 0.0 });
        tx.push(EngineCommand::ToggleRecord { voice: 1 });
        for _ in 0..8 {
            run_block(&mut engine, &[0.0; 256]);
        }
        tx.push(EngineCommand::ToggleRecord { voice: 1 });
        tx.push(EngineCommand::CutToPosition {
            voice: 1,
            sec: engine.voices[1].tape.loop_start(),
        });
        run_block(&mut engine, &[0.0; 256]);

        let energy: f32 = engine.voice_output(1)[..256].iter().map(|s| s * s).sum();
        assert!(energy > 1e-4, "voice 1 captured nothing: {}", energy);
    }

    #[test]
    fn vu_level_out_of_range_reports_floor() {
        let (engine, _tx) = engine_with_tx(48_000.0);
        assert_eq!(engine.vu_level(99), SILENCE_DB);
    }

    #[test]
    fn base_rate_scales_the_user_rate() {
        let (mut engine, mut tx) = engine_with_tx(1_000.0);
        tx.push(EngineCommand::SetRateSlew { voice: 0, seconds: 0.0 });
        tx.push(EngineCommand::SetRate { voice: 0, rate: 0.5 });
        tx.push(EngineCommand::SetBaseRate { voice: 0, rate: 0.5 });
        tx.push(EngineCommand::TogglePlay { voice: 0 });
        for _ in 0..10 {
            run_block(&mut engine, &[0.0; 100]);
        }
        // one second at an effective rate of 0.5 * 0.5
        let pos = engine.voices[0].tape.position_sec();
        assert!((pos - 0.25).abs() < 1e-2, "position {}", pos);

        tx.push(EngineCommand::SetRateDirection { voice: 0, forward: false });
        run_block(&mut engine, &[0.0; 100]);
        run_block(&mut engine, &[0.0; 100]);
        let reversed = engine.voices[0].tape.position_sec();
        assert!(reversed < pos, "expected reverse motion: {} -> {}", pos, reversed);
    }

    #[test]
    fn primed_voice_triggers_from_feedback_routing() {
        let (mut engine, mut tx) = engine_with_tx(1_000.0);
        // give voice 0 a short audible loop
        tx.push(EngineCommand::SetLoopEnd { voice: 0, sec: 0.2 });
        tx.push(EngineCommand::SetFadeTime { voice: 0, seconds: 0.0 });
        tx.push(EngineCommand::SetRecPreSlew { voice: 0, seconds: 0.0 });
        tx.push(EngineCommand::SetRecLevel { voice: 0, level: 1.0 });
        tx.push(EngineCommand::ToggleRecord { voice: 0 });
        run_block(&mut engine, &[0.5; 256]);
        tx.push(EngineCommand::ToggleRecord { voice: 0 });

        // voice 1 hears nothing from the hardware input, only voice 0
        tx.push(EngineCommand::SetInputLevel { voice: 1, level: 0.0 });
        tx.push(EngineCommand::SetFeedbackLevel { src: 0, dst: 1, level: 1.0 });
        tx.push(EngineCommand::TogglePrime { voice: 1 });
        for _ in 0..10 {
            run_block(&mut engine, &[0.0; 256]);
        }
        let shared = engine.shared_states()[1].clone();
        assert!(!shared.is_primed());
        assert!(shared.is_recording(), "feedback routing must trip the trigger");
    }

    #[test]
    fn gated_input_does_not_trip_prime() {
        let (mut engine, mut tx) = engine_with_tx(1_000.0);
        tx.push(EngineCommand::SetInputLevel { voice: 0, level: 0.0 });
        tx.push(EngineCommand::TogglePrime { voice: 0 });
        // let the input-level ramp settle at zero
        for _ in 0..10 {
            run_block(&mut engine, &[0.0; 256]);
        }
        run_block(&mut engine, &[0.8; 256]);
        run_block(&mut engine, &[0.8; 256]);
        let shared = engine.shared_states()[0].clone();
        assert!(shared.is_primed(), "gated input must not trigger");
        assert!(!shared.is_recording());
    }

    #[test]
    fn voice_output_out_of_range_is_empty() {
        let (engine, _tx) = engine_with_tx(48_000.0);
        assert!(engine.voice_output(99).is_empty());
    }

    #[test]
    fn reverb_send_taps_the_voice_before_its_fader() {
        let (mut engine, mut tx) = engine_with_tx(1_000.0);
        tx.push(EngineCommand::SetLoopEnd { voice: 0, sec: 0.2 });
        tx.push(EngineCommand::SetFadeTime { voice: 0, seconds: 0.0 });
        tx.push(EngineCommand::SetRecPreSlew { voice: 0, seconds: 0.0 });
        tx.push(EngineCommand::SetRecLevel { voice: 0, level: 1.0 });
        tx.push(EngineCommand::ToggleRecord { voice: 0 });
        run_block(&mut engine, &[0.5; 256]);
        tx.push(EngineCommand::ToggleRecord { voice: 0 });

        // fader closed, send open: the reverb must still hear the voice
        tx.push(EngineCommand::SetLevelSlew { voice: 0, seconds: 0.0 });
        tx.push(EngineCommand::SetLevel { voice: 0, level: 0.0 });
        tx.push(EngineCommand::SetReverbSend { voice: 0, level: 1.0 });
        let mut l = vec![0.0f32; 256];
        let mut r = vec![0.0f32; 256];
        let mut energy = 0.0f32;
        for _ in 0..8 {
            engine.process_block(&[0.0; 256], &mut l, &mut r);
            energy += l.iter().chain(r.iter()).map(|s| s * s).sum::<f32>();
        }
        assert!(energy > 1e-4, "no wet signal reached the mix: {}", energy);
    }

    #[test]
    fn toggle_play_cancels_prime() {
        let (mut engine, mut tx) = engine_with_tx(48_000.0);
        tx.push(EngineCommand::TogglePrime { voice: 2 });
        run_block(&mut engine, &[0.0; 64]);
        tx.push(EngineCommand::TogglePlay { voice: 2 });
        run_block(&mut engine, &[0.0; 64]);
        let shared = engine.shared_states()[2].clone();
        assert!(!shared.is_primed());
        assert!(shared.is_playing());
    }
}
