// src/params.rs

//! The per-voice parameter bank. Parameters live on the control thread and
//! talk to the engine exclusively by pushing commands; a handful of global
//! controls (reverb decay/density, prime quantize/sensitivity) are owned by
//! voice 0 and mirrored by every other voice.

pub mod lfo;
pub mod parameter;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use rand::Rng;

use crate::engine::command::{CommandTx, EngineCommand};
use crate::engine::voice::SharedVoiceState;
use crate::params::parameter::{OwnedState, ParamKind, Parameter};
use crate::util::{db_to_amp, midi_to_freq};
use crate::{loop_region_offset, loop_region_span, NUM_VOICES};

/// Control ticks per second; LFOs and primed-duration resolution run at
/// this rate.
pub const CONTROL_TICK_HZ: f32 = 30.0;

/// Quantize settings at or below this read as "off".
const QUANTIZE_OFF_BPM: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamId {
    Level,
    Pan,
    Lpf,
    Pregain,
    Bias,
    ReverbSend,
    ReverbDecay,
    ReverbDensity,
    Rate,
    Direction,
    BaseRate,
    Start,
    Duration,
    RecLevel,
    PreLevel,
    RecSlew,
    LevelSlew,
    RateSlew,
    PanSlew,
    FadeTime,
    Quantize,
    PrimeSensitivity,
    /// Feedback from voice `src` into this voice's record input.
    Feedback(usize),
}

impl ParamId {
    pub const COUNT: usize = 22 + NUM_VOICES;

    fn index(self) -> usize {
        use ParamId::*;
        match self {
            Level => 0,
            Pan => 1,
            Lpf => 2,
            Pregain => 3,
            Bias => 4,
            ReverbSend => 5,
            ReverbDecay => 6,
            ReverbDensity => 7,
            Rate => 8,
            Direction => 9,
            BaseRate => 10,
            Start => 11,
            Duration => 12,
            RecLevel => 13,
            PreLevel => 14,
            RecSlew => 15,
            LevelSlew => 16,
            RateSlew => 17,
            PanSlew => 18,
            FadeTime => 19,
            Quantize => 20,
            PrimeSensitivity => 21,
            Feedback(src) => 22 + src,
        }
    }

    pub fn all() -> impl Iterator<Item = ParamId> {
        use ParamId::*;
        [
            Level,
            Pan,
            Lpf,
            Pregain,
            Bias,
            ReverbSend,
            ReverbDecay,
            ReverbDensity,
            Rate,
            Direction,
            BaseRate,
            Start,
            Duration,
            RecLevel,
            PreLevel,
            RecSlew,
            LevelSlew,
            RateSlew,
            PanSlew,
            FadeTime,
            Quantize,
            PrimeSensitivity,
        ]
        .into_iter()
        .chain((0..NUM_VOICES).map(Feedback))
    }
}

/// Start and duration jointly define the loop window, so their callbacks
/// share this state.
struct WindowState {
    start: f32,
    duration: f32,
}

fn push(tx: &Rc<RefCell<CommandTx>>, cmd: EngineCommand) {
    if !tx.borrow_mut().push(cmd) {
        log::warn!("command channel full, dropped a parameter update");
    }
}

struct VoiceParams {
    params: Vec<Parameter>,
    window: Rc<RefCell<WindowState>>,
}

#[allow(clippy::too_many_arguments)]
fn owned_param(
    name: &'static str,
    unit: &'static str,
    min: f32,
    max: f32,
    inc: f32,
    lfo_inc: f32,
    default: f32,
    lfo_window: (f32, f32),
    rng: &mut impl Rng,
    callback: Option<parameter::ParamCallback>,
) -> Parameter {
    let mut state = OwnedState::new(default, CONTROL_TICK_HZ, callback);
    state.lfo_min = lfo_window.0.clamp(min, max);
    state.lfo_max = lfo_window.1.clamp(min, max);
    state.lfo.set_period(rng.gen_range(10.0..30.0));
    Parameter {
        name,
        unit,
        min,
        max,
        inc,
        lfo_inc,
        hidden: false,
        quantizable: false,
        kind: ParamKind::Owned(Box::new(state)),
    }
}

fn mirror_of(template: &Parameter, owner: usize) -> Parameter {
    Parameter {
        name: template.name,
        unit: template.unit,
        min: template.min,
        max: template.max,
        inc: template.inc,
        lfo_inc: template.lfo_inc,
        hidden: template.hidden,
        quantizable: template.quantizable,
        kind: ParamKind::Mirror { voice: owner },
    }
}

impl VoiceParams {
    fn new(voice: usize, tx: &Rc<RefCell<CommandTx>>, rng: &mut impl Rng) -> Self {
        let window = Rc::new(RefCell::new(WindowState {
            start: 0.0,
            duration: 2.0,
        }));
        let region = loop_region_offset(voice);

        let mut params = Vec::with_capacity(ParamId::COUNT);
        for id in ParamId::all() {
            let param = match id {
                ParamId::Level => {
                    let default = rng.gen_range(-32.0..6.0);
                    let cmd_tx = tx.clone();
                    owned_param(
                        "level",
                        "dB",
                        -48.0,
                        12.0,
                        0.1,
                        0.5,
                        default,
                        (default - 6.0, default + 6.0),
                        rng,
                        Some(Box::new(move |value| {
                            let mut amp = db_to_amp(value);
                            if amp < 0.02 {
                                amp = 0.0;
                            }
                            push(&cmd_tx, EngineCommand::SetLevel { voice, level: amp });
                        })),
                    )
                }
                ParamId::Pan => {
                    let default = rng.gen_range(-0.625..0.625);
                    let cmd_tx = tx.clone();
                    owned_param(
                        "pan",
                        "",
                        -1.0,
                        1.0,
                        0.01,
                        0.1,
                        default,
                        (default - 1.0, default + 1.0),
                        rng,
                        Some(Box::new(move |value| {
                            push(&cmd_tx, EngineCommand::SetPan { voice, pan: value });
                        })),
                    )
                }
                ParamId::Lpf => {
                    let cmd_tx = tx.clone();
                    owned_param(
                        "lpf",
                        "",
                        20.0,
                        135.0,
                        0.1,
                        0.5,
                        135.0,
                        (125.0, 135.0),
                        rng,
                        Some(Box::new(move |value| {
                            push(
                                &cmd_tx,
                                EngineCommand::SetPostFilterCutoff {
                                    voice,
                                    hz: midi_to_freq(value),
                                },
                            );
                        })),
                    )
                }
                ParamId::Pregain => {
                    let cmd_tx = tx.clone();
                    owned_param(
                        "pregain",
                        "dB",
                        -32.0,
                        36.0,
                        0.1,
                        0.5,
                        0.0,
                        (-6.0, 6.0),
                        rng,
                        Some(Box::new(move |value| {
                            push(
                                &cmd_tx,
                                EngineCommand::SetTapePregain {
                                    voice,
                                    amount: db_to_amp(value),
                                },
                            );
                        })),
                    )
                }
                ParamId::Bias => {
                    let cmd_tx = tx.clone();
                    owned_param(
                        "bias",
                        "dB",
                        -32.0,
                        12.0,
                        0.1,
                        0.5,
                        -24.0,
                        (-30.0, -18.0),
                        rng,
                        Some(Box::new(move |value| {
                            push(
                                &cmd_tx,
                                EngineCommand::SetTapeBias {
                                    voice,
                                    amount: db_to_amp(value),
                                },
                            );
                        })),
                    )
                }
                ParamId::ReverbSend => {
                    let cmd_tx = tx.clone();
                    owned_param(
                        "reverb",
                        "%",
                        0.0,
                        1.0,
                        0.01,
                        0.1,
                        0.0,
                        (0.0, 0.2),
                        rng,
                        Some(Box::new(move |value| {
                            push(&cmd_tx, EngineCommand::SetReverbSend { voice, level: value });
                        })),
                    )
                }
                ParamId::ReverbDecay => {
                    if voice != 0 {
                        params.push(mirror_of(&params_template_decay(), 0));
                        continue;
                    }
                    let cmd_tx = tx.clone();
                    owned_param(
                        "decay",
                        "%",
                        0.0,
                        100.0,
                        0.1,
                        0.5,
                        82.0,
                        (80.0, 90.0),
                        rng,
                        Some(Box::new(move |value| {
                            push(&cmd_tx, EngineCommand::SetReverbDecay { percent: value });
                        })),
                    )
                }
                ParamId::ReverbDensity => {
                    if voice != 0 {
                        params.push(mirror_of(&params_template_density(), 0));
                        continue;
                    }
                    let cmd_tx = tx.clone();
                    owned_param(
                        "density",
                        "%",
                        0.0,
                        100.0,
                        0.1,
                        0.5,
                        80.0,
                        (70.0, 90.0),
                        rng,
                        Some(Box::new(move |value| {
                            push(&cmd_tx, EngineCommand::SetReverbDensity { percent: value });
                        })),
                    )
                }
                ParamId::Rate => {
                    let cmd_tx = tx.clone();
                    owned_param(
                        "rate",
                        "",
                        0.0,
                        2.0,
                        0.01,
                        0.1,
                        1.0,
                        (0.99, 1.01),
                        rng,
                        Some(Box::new(move |value| {
                            push(&cmd_tx, EngineCommand::SetRate { voice, rate: value });
                        })),
                    )
                }
                ParamId::Direction => {
                    let cmd_tx = tx.clone();
                    owned_param(
                        "direction",
                        "",
                        -1.0,
                        1.0,
                        0.1,
                        0.1,
                        0.0,
                        (-0.5, 0.5),
                        rng,
                        Some(Box::new(move |value| {
                            push(
                                &cmd_tx,
                                EngineCommand::SetRateDirection {
                                    voice,
                                    forward: value >= 0.0,
                                },
                            );
                        })),
                    )
                }
                ParamId::BaseRate => {
                    let cmd_tx = tx.clone();
                    let mut p = owned_param(
                        "base rate",
                        "",
                        0.0,
                        2.0,
                        0.01,
                        0.1,
                        1.0,
                        (0.99, 1.01),
                        rng,
                        Some(Box::new(move |value| {
                            push(&cmd_tx, EngineCommand::SetBaseRate { voice, rate: value });
                        })),
                    );
                    p.hidden = true;
                    p
                }
                ParamId::Start => {
                    let cmd_tx = tx.clone();
                    let state = window.clone();
                    owned_param(
                        "start",
                        "s",
                        0.0,
                        loop_region_span(),
                        0.01,
                        0.1,
                        0.0,
                        (0.0, 0.2),
                        rng,
                        Some(Box::new(move |value| {
                            let duration = {
                                let mut s = state.borrow_mut();
                                s.start = value;
                                s.duration
                            };
                            push(
                                &cmd_tx,
                                EngineCommand::SetLoopStart {
                                    voice,
                                    sec: region + value,
                                },
                            );
                            push(
                                &cmd_tx,
                                EngineCommand::SetLoopEnd {
                                    voice,
                                    sec: region + value + duration,
                                },
                            );
                        })),
                    )
                }
                ParamId::Duration => {
                    let cmd_tx = tx.clone();
                    let state = window.clone();
                    let mut p = owned_param(
                        "duration",
                        "s",
                        0.0,
                        60.0,
                        0.01,
                        0.1,
                        2.0,
                        (1.0, 3.0),
                        rng,
                        Some(Box::new(move |value| {
                            let start = {
                                let mut s = state.borrow_mut();
                                s.duration = value;
                                s.start
                            };
                            push(
                                &cmd_tx,
                                EngineCommand::SetLoopEnd {
                                    voice,
                                    sec: region + start + value,
                                },
                            );
                        })),
                    );
                    p.quantizable = true;
                    p
                }
                ParamId::RecLevel => {
                    let cmd_tx = tx.clone();
                    owned_param(
                        "rec level",
                        "dB",
                        -48.0,
                        12.0,
                        0.1,
                        0.5,
                        0.0,
                        (-6.0, 6.0),
                        rng,
                        Some(Box::new(move |value| {
                            let amp = if value <= -42.0 { 0.0 } else { db_to_amp(value) };
                            push(&cmd_tx, EngineCommand::SetRecLevel { voice, level: amp });
                        })),
                    )
                }
                ParamId::PreLevel => {
                    let cmd_tx = tx.clone();
                    owned_param(
                        "rec pre level",
                        "dB",
                        -48.0,
                        12.0,
                        0.1,
                        0.5,
                        -48.0,
                        (-54.0, -42.0),
                        rng,
                        Some(Box::new(move |value| {
                            let amp = if value <= -42.0 { 0.0 } else { db_to_amp(value) };
                            push(&cmd_tx, EngineCommand::SetPreLevel { voice, level: amp });
                        })),
                    )
                }
                ParamId::RecSlew => {
                    let cmd_tx = tx.clone();
                    owned_param(
                        "rec slew",
                        "s",
                        0.0,
                        4.0,
                        0.01,
                        0.1,
                        0.2,
                        (0.0, 1.0),
                        rng,
                        Some(Box::new(move |value| {
                            push(&cmd_tx, EngineCommand::SetRecPreSlew { voice, seconds: value });
                        })),
                    )
                }
                ParamId::LevelSlew => {
                    let cmd_tx = tx.clone();
                    owned_param(
                        "level slew",
                        "s",
                        0.0,
                        4.0,
                        0.01,
                        0.1,
                        0.2,
                        (0.0, 1.0),
                        rng,
                        Some(Box::new(move |value| {
                            push(&cmd_tx, EngineCommand::SetLevelSlew { voice, seconds: value });
                        })),
                    )
                }
                ParamId::RateSlew => {
                    let cmd_tx = tx.clone();
                    owned_param(
                        "rate slew",
                        "s",
                        0.0,
                        4.0,
                        0.01,
                        0.1,
                        0.2,
                        (0.0, 1.0),
                        rng,
                        Some(Box::new(move |value| {
                            push(&cmd_tx, EngineCommand::SetRateSlew { voice, seconds: value });
                        })),
                    )
                }
                ParamId::PanSlew => {
                    let cmd_tx = tx.clone();
                    owned_param(
                        "pan slew",
                        "s",
                        0.0,
                        4.0,
                        0.01,
                        0.1,
                        0.2,
                        (0.0, 1.0),
                        rng,
                        Some(Box::new(move |value| {
                            push(&cmd_tx, EngineCommand::SetPanSlew { voice, seconds: value });
                        })),
                    )
                }
                ParamId::FadeTime => {
                    let cmd_tx = tx.clone();
                    owned_param(
                        "fade time",
                        "s",
                        0.0,
                        4.0,
                        0.01,
                        0.1,
                        0.2,
                        (0.0, 1.0),
                        rng,
                        Some(Box::new(move |value| {
                            push(&cmd_tx, EngineCommand::SetFadeTime { voice, seconds: value });
                        })),
                    )
                }
                ParamId::Quantize => {
                    if voice != 0 {
                        params.push(mirror_of(&params_template_quantize(), 0));
                        continue;
                    }
                    // read at nudge/resolution time, nothing to forward
                    owned_param("quantize", "bpm", 0.0, 200.0, 1.0, 0.1, 0.0, (0.0, 1.0), rng, None)
                }
                ParamId::PrimeSensitivity => {
                    if voice != 0 {
                        params.push(mirror_of(&params_template_sensitivity(), 0));
                        continue;
                    }
                    let cmd_tx = tx.clone();
                    owned_param(
                        "prime tol",
                        "dB",
                        -96.0,
                        0.0,
                        1.0,
                        0.5,
                        -30.0,
                        (-50.0, -10.0),
                        rng,
                        Some(Box::new(move |value| {
                            for v in 0..NUM_VOICES {
                                push(
                                    &cmd_tx,
                                    EngineCommand::SetPrimeSensitivity { voice: v, db: value },
                                );
                            }
                        })),
                    )
                }
                ParamId::Feedback(src) => {
                    let cmd_tx = tx.clone();
                    owned_param(
                        feedback_name(src),
                        "%",
                        0.0,
                        1.0,
                        0.01,
                        0.1,
                        0.0,
                        (0.0, 1.0),
                        rng,
                        Some(Box::new(move |value| {
                            push(
                                &cmd_tx,
                                EngineCommand::SetFeedbackLevel {
                                    src,
                                    dst: voice,
                                    level: value,
                                },
                            );
                        })),
                    )
                }
            };
            params.push(param);
        }

        Self { params, window }
    }
}

fn feedback_name(src: usize) -> &'static str {
    const NAMES: [&str; 8] = [
        "loop 1 input",
        "loop 2 input",
        "loop 3 input",
        "loop 4 input",
        "loop 5 input",
        "loop 6 input",
        "loop 7 input",
        "loop 8 input",
    ];
    NAMES[src]
}

// Metadata-only templates for the mirrored globals.
fn params_template_decay() -> Parameter {
    Parameter {
        name: "decay",
        unit: "%",
        min: 0.0,
        max: 100.0,
        inc: 0.1,
        lfo_inc: 0.5,
        hidden: false,
        quantizable: false,
        kind: ParamKind::Mirror { voice: 0 },
    }
}

fn params_template_density() -> Parameter {
    Parameter {
        name: "density",
        ..params_template_decay()
    }
}

fn params_template_quantize() -> Parameter {
    Parameter {
        name: "quantize",
        unit: "bpm",
        max: 200.0,
        inc: 1.0,
        ..params_template_decay()
    }
}

fn params_template_sensitivity() -> Parameter {
    Parameter {
        name: "prime tol",
        unit: "dB",
        min: -96.0,
        max: 0.0,
        inc: 1.0,
        ..params_template_decay()
    }
}

pub struct ParamBank {
    voices: Vec<VoiceParams>,
}

impl ParamBank {
    pub fn new(tx: Rc<RefCell<CommandTx>>) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            voices: (0..NUM_VOICES)
                .map(|v| VoiceParams::new(v, &tx, &mut rng))
                .collect(),
        }
    }

    fn resolve(&self, voice: usize, id: ParamId) -> (usize, usize) {
        let idx = id.index();
        match &self.voices[voice].params[idx].kind {
            ParamKind::Mirror { voice: owner } => (*owner, idx),
            ParamKind::Owned(_) => (voice, idx),
        }
    }

    /// The parameter a voice presents for `id`, following mirrors to the
    /// owning voice.
    pub fn param(&self, voice: usize, id: ParamId) -> &Parameter {
        let (v, i) = self.resolve(voice, id);
        &self.voices[v].params[i]
    }

    /// Whether this voice's slot for `id` holds the owned state rather than
    /// a mirror.
    pub fn is_owned(&self, voice: usize, id: ParamId) -> bool {
        matches!(
            self.voices[voice].params[id.index()].kind,
            ParamKind::Owned(_)
        )
    }

    pub fn param_mut(&mut self, voice: usize, id: ParamId) -> &mut Parameter {
        let (v, i) = self.resolve(voice, id);
        &mut self.voices[v].params[i]
    }

    pub fn set_value(&mut self, voice: usize, id: ParamId, value: f32, quiet: bool) {
        self.param_mut(voice, id).set(value, quiet);
    }

    pub fn value(&self, voice: usize, id: ParamId) -> f32 {
        self.param(voice, id).value()
    }

    /// Relative nudge by `steps` increments. Loop duration snaps to
    /// beat-length steps while quantize is set.
    pub fn nudge(&mut self, voice: usize, id: ParamId, steps: f32) {
        let inc = if id == ParamId::Duration {
            match self.quantization_bpm() {
                Some(bpm) => 60.0 / bpm,
                None => self.param(voice, id).inc,
            }
        } else {
            self.param(voice, id).inc
        };
        let current = self.param(voice, id).value_set();
        self.set_value(voice, id, current + steps * inc, false);
    }

    pub fn toggle_lfo(&mut self, voice: usize, id: ParamId) {
        self.param_mut(voice, id).toggle_lfo();
    }

    pub fn nudge_lfo_range(&mut self, voice: usize, id: ParamId, steps: f32) {
        self.param_mut(voice, id).nudge_lfo_range(steps);
    }

    /// Active quantize tempo, if set.
    pub fn quantization_bpm(&self) -> Option<f32> {
        let value = self.param(0, ParamId::Quantize).value();
        if value > QUANTIZE_OFF_BPM {
            Some(value.round())
        } else {
            None
        }
    }

    /// Re-send every owned parameter to the engine, used after a bulk load.
    pub fn bang_all(&mut self) {
        for voice in &mut self.voices {
            for param in &mut voice.params {
                param.bang();
            }
        }
    }

    /// One control tick: advance LFOs and resolve any just-finished primed
    /// recording into a loop duration.
    pub fn update(&mut self, shared: &[Arc<SharedVoiceState>]) {
        for voice in &mut self.voices {
            for param in &mut voice.params {
                param.update();
            }
        }
        for (v, state) in shared.iter().enumerate().take(self.voices.len()) {
            if !state.take_done_primed() {
                continue;
            }
            let saved = state.saved_position.load();
            let start = self.voices[v].window.borrow().start;
            let mut duration = saved - (loop_region_offset(v) + start);
            if let Some(bpm) = self.quantization_bpm() {
                duration = (duration * bpm / 60.0).round() * 60.0 / bpm;
            }
            if duration < 0.1 {
                duration = 0.1;
            }
            self.set_value(v, ParamId::Duration, duration, false);
        }
    }
}
