// src/control.rs

//! The control context: parameter bank, session recorder, buffer I/O and
//! transport actions, all driven from one non-realtime thread. Talks to the
//! engine only through the command channel and the shared voice atomics.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::bufsvc::{BufferHandle, BufferService};
use crate::engine::command::{CommandTx, EngineCommand};
use crate::engine::voice::SharedVoiceState;
use crate::params::{ParamBank, ParamId};
use crate::recorder::SessionRecorder;
use crate::snapshot;
use crate::vu::SILENCE_DB;
use crate::{default_buffer_index, loop_region_offset, NUM_VOICES};

/// Loop window armed for a primed capture, in seconds. The real duration is
/// resolved when recording stops.
const PRIME_CAPTURE_SECONDS: f32 = 30.0;

/// How long to let the audio thread release its session streams before the
/// writer is joined.
const SESSION_RELEASE: Duration = Duration::from_millis(250);

pub struct ControlSurface {
    tx: Rc<RefCell<CommandTx>>,
    /// Transport commands that hit a full channel; retried each tick.
    /// Parameter nudges are allowed to drop, transport toggles are not.
    pending: VecDeque<EngineCommand>,
    pub bank: ParamBank,
    shared: Vec<Arc<SharedVoiceState>>,
    recorder: SessionRecorder,
    buffers: Box<dyn BufferService>,
    sample_rate: u32,
    session_dir: PathBuf,
}

impl ControlSurface {
    pub fn new(
        tx: Rc<RefCell<CommandTx>>,
        shared: Vec<Arc<SharedVoiceState>>,
        sample_rate: u32,
        session_dir: PathBuf,
        buffers: Box<dyn BufferService>,
    ) -> Self {
        let bank = ParamBank::new(tx.clone());
        Self {
            tx,
            pending: VecDeque::new(),
            bank,
            shared,
            recorder: SessionRecorder::new(),
            buffers,
            sample_rate,
            session_dir,
        }
    }

    /// Push all initial parameter values to the engine.
    pub fn sync_engine(&mut self) {
        self.bank.bang_all();
    }

    /// One control tick.
    pub fn update(&mut self) {
        while let Some(cmd) = self.pending.pop_front() {
            if let Err(cmd) = self.tx.borrow_mut().try_push(cmd) {
                // channel still full, retry next tick
                self.pending.push_front(cmd);
                break;
            }
        }
        self.bank.update(&self.shared);
    }

    // transport -----------------------------------------------------------

    pub fn toggle_play(&mut self, voice: usize) {
        self.push_transport(EngineCommand::TogglePlay { voice });
    }

    pub fn toggle_record(&mut self, voice: usize) {
        self.push_transport(EngineCommand::ToggleRecord { voice });
    }

    pub fn toggle_record_once(&mut self, voice: usize) {
        self.push_transport(EngineCommand::ToggleRecordOnce { voice });
    }

    /// Arm a primed capture: open the loop window wide, wipe the voice's
    /// region and park the transport at the loop start. Disarms if already
    /// primed.
    pub fn toggle_prime(&mut self, voice: usize) {
        if voice >= NUM_VOICES {
            return;
        }
        if !self.shared[voice].is_primed() {
            self.bank
                .set_value(voice, ParamId::Duration, PRIME_CAPTURE_SECONDS, false);
            let start = loop_region_offset(voice)
                + self.bank.value(voice, ParamId::Start);
            if let Err(err) = self.buffers.request_clear(
                BufferHandle(default_buffer_index(voice)),
                start,
                PRIME_CAPTURE_SECONDS,
            ) {
                log::warn!("could not clear region for voice {}: {}", voice + 1, err);
            }
        }
        self.push_transport(EngineCommand::TogglePrime { voice });
    }

    fn push_transport(&mut self, cmd: EngineCommand) {
        if !self.pending.is_empty() {
            self.pending.push_back(cmd);
            return;
        }
        if let Err(cmd) = self.tx.borrow_mut().try_push(cmd) {
            log::warn!("command channel full, queueing transport command");
            self.pending.push_back(cmd);
        }
    }

    // parameters ----------------------------------------------------------

    pub fn nudge(&mut self, voice: usize, id: ParamId, steps: f32) {
        self.bank.nudge(voice, id, steps);
    }

    pub fn set_param(&mut self, voice: usize, id: ParamId, value: f32) {
        self.bank.set_value(voice, id, value, false);
    }

    pub fn toggle_lfo(&mut self, voice: usize, id: ParamId) {
        self.bank.toggle_lfo(voice, id);
    }

    /// Widen (positive steps) or narrow the LFO window of a parameter.
    pub fn nudge_lfo_range(&mut self, voice: usize, id: ParamId, steps: f32) {
        self.bank.nudge_lfo_range(voice, id, steps);
    }

    // state readback ------------------------------------------------------

    pub fn vu(&self, voice: usize) -> f32 {
        match self.shared.get(voice) {
            Some(state) => state.vu_db.load(),
            None => SILENCE_DB,
        }
    }

    pub fn position(&self, voice: usize) -> f32 {
        self.shared
            .get(voice)
            .map(|s| s.position.load())
            .unwrap_or(0.0)
    }

    pub fn is_playing(&self, voice: usize) -> bool {
        self.shared.get(voice).is_some_and(|s| s.is_playing())
    }

    pub fn is_recording(&self, voice: usize) -> bool {
        self.shared.get(voice).is_some_and(|s| s.is_recording())
    }

    pub fn is_primed(&self, voice: usize) -> bool {
        self.shared.get(voice).is_some_and(|s| s.is_primed())
    }

    // session recording ---------------------------------------------------

    pub fn session_active(&self) -> bool {
        self.recorder.is_active()
    }

    pub fn start_session(&mut self) -> Result<()> {
        let capture =
            self.recorder
                .start(NUM_VOICES, self.sample_rate, &self.session_dir)?;
        self.push_transport(EngineCommand::StartSession(Box::new(capture)));
        log::info!("session recording started");
        Ok(())
    }

    /// Stop the session and return the files that captured audio.
    pub fn stop_session(&mut self) -> Result<Vec<PathBuf>> {
        self.push_transport(EngineCommand::StopSession);
        // let the audio thread drop its stream endpoints before the final
        // drain runs
        std::thread::sleep(SESSION_RELEASE);
        let kept = self.recorder.stop()?;
        log::info!("session recording stopped, {} file(s) kept", kept.len());
        Ok(kept)
    }

    // persistence ---------------------------------------------------------

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        snapshot::save_to(&self.bank, path)
    }

    pub fn load_snapshot(&mut self, path: &Path) -> Result<()> {
        snapshot::load_from(&mut self.bank, path)
    }

    // buffer file I/O -----------------------------------------------------

    /// Load a mono sound file into a voice's loop region.
    pub fn load_loop(&mut self, voice: usize, path: &Path) -> Result<()> {
        let start = self.loop_window_start(voice);
        let duration = self.bank.value(voice, ParamId::Duration);
        self.buffers.request_read_mono(
            path,
            BufferHandle(default_buffer_index(voice)),
            0.0,
            start,
            duration.min(crate::loop_region_span()),
        )
    }

    /// Save a voice's current loop window to a mono sound file.
    pub fn save_loop(&mut self, voice: usize, path: &Path) -> Result<()> {
        let start = self.loop_window_start(voice);
        let duration = self.bank.value(voice, ParamId::Duration);
        self.buffers.request_write_mono(
            path,
            BufferHandle(default_buffer_index(voice)),
            start,
            duration,
        )
    }

    /// Zero a voice's whole loop region.
    pub fn clear_loop(&mut self, voice: usize) -> Result<()> {
        self.buffers.request_clear(
            BufferHandle(default_buffer_index(voice)),
            loop_region_offset(voice),
            crate::loop_region_span(),
        )
    }

    fn loop_window_start(&self, voice: usize) -> f32 {
        loop_region_offset(voice) + self.bank.value(voice, ParamId::Start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bufsvc::NullBufferService;
    use crate::engine::command::{command_channel, CommandRx};

    fn surface_with_rx(capacity: usize) -> (ControlSurface, CommandRx) {
        let (tx, rx) = command_channel(capacity);
        let shared = (0..NUM_VOICES).map(|_| SharedVoiceState::new()).collect();
        let surface = ControlSurface::new(
            Rc::new(RefCell::new(tx)),
            shared,
            48_000,
            std::env::temp_dir(),
            Box::new(NullBufferService),
        );
        (surface, rx)
    }

    #[test]
    fn transport_commands_survive_a_full_channel() {
        let (mut surface, mut rx) = surface_with_rx(2);
        surface.toggle_play(0);
        surface.toggle_play(1);
        surface.toggle_play(2); // channel full, must be queued

        assert!(rx.pop().is_some());
        assert!(rx.pop().is_some());
        assert!(rx.pop().is_none());

        surface.update(); // retries the queued toggle
        assert!(matches!(
            rx.pop(),
            Some(EngineCommand::TogglePlay { voice: 2 })
        ));
    }

    #[test]
    fn queued_commands_keep_their_order() {
        let (mut surface, mut rx) = surface_with_rx(1);
        surface.toggle_record(3);
        surface.toggle_play(3); // queued
        surface.toggle_record(3); // queued behind it

        assert!(matches!(
            rx.pop(),
            Some(EngineCommand::ToggleRecord { voice: 3 })
        ));
        surface.update();
        assert!(matches!(rx.pop(), Some(EngineCommand::TogglePlay { voice: 3 })));
        surface.update();
        assert!(matches!(
            rx.pop(),
            Some(EngineCommand::ToggleRecord { voice: 3 })
        ));
    }

    #[test]
    fn priming_opens_the_capture_window() {
        let (mut surface, _rx) = surface_with_rx(256);
        surface.toggle_prime(2);
        assert_eq!(
            surface.bank.value(2, ParamId::Duration),
            PRIME_CAPTURE_SECONDS
        );
    }

    #[test]
    fn out_of_range_voice_reads_are_harmless() {
        let (surface, _rx) = surface_with_rx(8);
        assert_eq!(surface.vu(99), SILENCE_DB);
        assert!(!surface.is_playing(99));
        assert_eq!(surface.position(99), 0.0);
    }
}
