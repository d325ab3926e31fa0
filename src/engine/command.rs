// src/engine/command.rs

//! The single-producer single-consumer command channel between the control
//! context and the audio thread. Commands are drained at the top of each
//! audio block, so two commands pushed in sequence are always applied in
//! order within one block boundary.

use ringbuf::{HeapConsumer, HeapProducer, HeapRb};

use crate::recorder::SessionCapture;

/// Everything the control context can ask the engine to do.
///
/// Variants carry plain values; the one exception is [`StartSession`], which
/// moves the session capture endpoints (ring-buffer producers) onto the audio
/// thread in a single boxed payload.
///
/// [`StartSession`]: EngineCommand::StartSession
pub enum EngineCommand {
    // voice mix
    SetEnabled { voice: usize, enabled: bool },
    SetLevel { voice: usize, level: f32 },
    SetPan { voice: usize, pan: f32 },
    SetInputLevel { voice: usize, level: f32 },
    SetFeedbackLevel { src: usize, dst: usize, level: f32 },
    SetReverbSend { voice: usize, level: f32 },
    SetLevelSlew { voice: usize, seconds: f32 },
    SetPanSlew { voice: usize, seconds: f32 },

    // transport
    SetRate { voice: usize, rate: f32 },
    SetBaseRate { voice: usize, rate: f32 },
    SetRateDirection { voice: usize, forward: bool },
    SetRateSlew { voice: usize, seconds: f32 },
    SetLoopStart { voice: usize, sec: f32 },
    SetLoopEnd { voice: usize, sec: f32 },
    SetLoopFlag { voice: usize, looping: bool },
    CutToPosition { voice: usize, sec: f32 },
    SetFadeTime { voice: usize, seconds: f32 },
    SetVoiceBuffer { voice: usize, buffer: usize },

    // record path
    SetRecLevel { voice: usize, level: f32 },
    SetPreLevel { voice: usize, level: f32 },
    SetRecPreSlew { voice: usize, seconds: f32 },
    SetRecFlag { voice: usize, rec: bool },
    SetPlayFlag { voice: usize, play: bool },
    ToggleRecord { voice: usize },
    TogglePlay { voice: usize },
    TogglePrime { voice: usize },
    ToggleRecordOnce { voice: usize },
    SetPrimeSensitivity { voice: usize, db: f32 },

    // per-voice tape color
    SetPreFilterCutoff { voice: usize, hz: f32 },
    SetPostFilterCutoff { voice: usize, hz: f32 },
    SetPostFilterLowpass { voice: usize, amount: f32 },
    SetPostFilterDry { voice: usize, amount: f32 },
    SetTapeBias { voice: usize, amount: f32 },
    SetTapePregain { voice: usize, amount: f32 },

    // global reverb
    SetReverbDecay { percent: f32 },
    SetReverbDensity { percent: f32 },

    // session recording
    StartSession(Box<SessionCapture>),
    StopSession,
}

/// Control-side endpoint. Pushing never blocks; a full channel drops the
/// command and reports it so callers can retry next tick.
pub struct CommandTx {
    producer: HeapProducer<EngineCommand>,
}

impl CommandTx {
    /// Returns `false` if the channel was full and the command was dropped.
    pub fn push(&mut self, cmd: EngineCommand) -> bool {
        self.producer.push(cmd).is_ok()
    }

    /// Like [`push`](Self::push) but hands the command back on a full
    /// channel so the caller can retry it later.
    pub fn try_push(&mut self, cmd: EngineCommand) -> Result<(), EngineCommand> {
        self.producer.push(cmd)
    }
}

/// Audio-side endpoint.
pub struct CommandRx {
    consumer: HeapConsumer<EngineCommand>,
}

impl CommandRx {
    #[inline]
    pub fn pop(&mut self) -> Option<EngineCommand> {
        self.consumer.pop()
    }
}

/// Build a command channel with room for `capacity` in-flight commands.
pub fn command_channel(capacity: usize) -> (CommandTx, CommandRx) {
    let rb = HeapRb::<EngineCommand>::new(capacity);
    let (producer, consumer) = rb.split();
    (CommandTx { producer }, CommandRx { consumer })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_arrive_in_push_order() {
        let (mut tx, mut rx) = command_channel(8);
        assert!(tx.push(EngineCommand::SetLoopEnd { voice: 2, sec: 4.0 }));
        assert!(tx.push(EngineCommand::CutToPosition { voice: 2, sec: 0.0 }));

        match rx.pop() {
            Some(EngineCommand::SetLoopEnd { voice, sec }) => {
                assert_eq!(voice, 2);
                assert_eq!(sec, 4.0);
            }
            _ => panic!("expected SetLoopEnd first"),
        }
        match rx.pop() {
            Some(EngineCommand::CutToPosition { voice, .. }) => assert_eq!(voice, 2),
            _ => panic!("expected CutToPosition second"),
        }
        assert!(rx.pop().is_none());
    }

    #[test]
    fn full_channel_reports_drop() {
        let (mut tx, _rx) = command_channel(2);
        assert!(tx.push(EngineCommand::TogglePlay { voice: 0 }));
        assert!(tx.push(EngineCommand::TogglePlay { voice: 1 }));
        assert!(!tx.push(EngineCommand::TogglePlay { voice: 2 }));
    }
}
