// src/params/parameter.rs

//! A single automatable control value: a user-set value, an optional LFO
//! riding a min/max window around it, and a callback that forwards the
//! computed value to the engine.

use crate::params::lfo::Lfo;
use crate::util::linlin;

pub type ParamCallback = Box<dyn FnMut(f32)>;

/// State of a parameter that actually owns its value. Shared (global)
/// parameters exist as [`ParamKind::Mirror`] entries on every voice but one;
/// the bank resolves a mirror to the owning voice's `OwnedState`.
pub struct OwnedState {
    /// The value the user last set. Modulation orbits this.
    pub value_set: f32,
    /// The value after modulation, i.e. what the engine hears.
    pub value_compute: f32,
    pub lfo_min: f32,
    pub lfo_max: f32,
    pub lfo_active: bool,
    pub lfo: Lfo,
    pub callback: Option<ParamCallback>,
}

pub enum ParamKind {
    Owned(Box<OwnedState>),
    /// This voice shows the parameter owned by `voice`.
    Mirror { voice: usize },
}

pub struct Parameter {
    pub name: &'static str,
    pub unit: &'static str,
    pub min: f32,
    pub max: f32,
    /// Step applied by a relative nudge.
    pub inc: f32,
    /// Step applied when nudging the LFO window edges.
    pub lfo_inc: f32,
    /// Hidden parameters are engine-facing only and never shown or saved.
    pub hidden: bool,
    /// Whether a relative nudge snaps to beat-length steps when a tempo is
    /// set (loop duration only).
    pub quantizable: bool,
    pub kind: ParamKind,
}

impl Parameter {
    pub fn owned(&self) -> Option<&OwnedState> {
        match &self.kind {
            ParamKind::Owned(state) => Some(state),
            ParamKind::Mirror { .. } => None,
        }
    }

    pub fn owned_mut(&mut self) -> Option<&mut OwnedState> {
        match &mut self.kind {
            ParamKind::Owned(state) => Some(state),
            ParamKind::Mirror { .. } => None,
        }
    }

    /// Set the value, dragging the LFO window along by the same delta.
    /// `quiet` suppresses the callback (used when restoring saved state in
    /// bulk, before a final explicit bang).
    pub fn set(&mut self, value: f32, quiet: bool) {
        let (min, max) = (self.min, self.max);
        let Some(state) = self.owned_mut() else {
            return;
        };
        let clamped = value.clamp(min, max);
        let delta = clamped - state.value_set;
        state.lfo_min = (state.lfo_min + delta).clamp(min, max);
        state.lfo_max = (state.lfo_max + delta).clamp(min, max);
        state.value_set = clamped;
        if !state.lfo_active {
            state.value_compute = clamped;
            if !quiet {
                state.fire();
            }
        }
    }

    /// The engine-facing value.
    pub fn value(&self) -> f32 {
        self.owned().map(|s| s.value_compute).unwrap_or(0.0)
    }

    /// The user-set value, ignoring modulation.
    pub fn value_set(&self) -> f32 {
        self.owned().map(|s| s.value_set).unwrap_or(0.0)
    }

    pub fn lfo_active(&self) -> bool {
        self.owned().map(|s| s.lfo_active).unwrap_or(false)
    }

    /// One control tick: advance the LFO (when active) and forward the
    /// computed value. An active LFO fires the callback every tick.
    pub fn update(&mut self) {
        let Some(state) = self.owned_mut() else {
            return;
        };
        if !state.lfo_active {
            return;
        }
        let raw = state.lfo.tick();
        state.value_compute = linlin(raw, -1.0, 1.0, state.lfo_min, state.lfo_max);
        state.fire();
    }

    /// Re-send the current computed value.
    pub fn bang(&mut self) {
        if let Some(state) = self.owned_mut() {
            state.fire();
        }
    }

    /// Flip the LFO on or off. Turning it off returns the parameter to its
    /// user-set value immediately.
    pub fn toggle_lfo(&mut self) {
        let Some(state) = self.owned_mut() else {
            return;
        };
        state.lfo_active = !state.lfo_active;
        if state.lfo_active {
            let raw = state.lfo.tick();
            state.value_compute = linlin(raw, -1.0, 1.0, state.lfo_min, state.lfo_max);
        } else {
            state.value_compute = state.value_set;
        }
        state.fire();
    }

    /// Widen or narrow the LFO window symmetrically around the set value.
    pub fn nudge_lfo_range(&mut self, steps: f32) {
        let delta = steps * self.lfo_inc;
        let (min, max) = (self.min, self.max);
        if let Some(state) = self.owned_mut() {
            state.lfo_min = (state.lfo_min - delta).clamp(min, max);
            state.lfo_max = (state.lfo_max + delta).clamp(min, max);
            if state.lfo_max < state.lfo_min {
                state.lfo_max = state.lfo_min;
            }
        }
    }
}

impl OwnedState {
    pub fn new(initial: f32, tick_rate: f32, callback: Option<ParamCallback>) -> Self {
        Self {
            value_set: initial,
            value_compute: initial,
            lfo_min: initial,
            lfo_max: initial,
            lfo_active: false,
            lfo: Lfo::new(tick_rate),
            callback,
        }
    }

    fn fire(&mut self) {
        let value = self.value_compute;
        if let Some(cb) = self.callback.as_mut() {
            cb(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn param_with_log(initial: f32) -> (Parameter, Rc<RefCell<Vec<f32>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let param = Parameter {
            name: "level",
            unit: "dB",
            min: -48.0,
            max: 12.0,
            inc: 1.0,
            lfo_inc: 1.0,
            hidden: false,
            quantizable: false,
            kind: ParamKind::Owned(Box::new(OwnedState::new(
                initial,
                30.0,
                Some(Box::new(move |v| sink.borrow_mut().push(v))),
            ))),
        };
        (param, log)
    }

    #[test]
    fn set_clamps_and_fires() {
        let (mut param, log) = param_with_log(0.0);
        param.set(100.0, false);
        assert_eq!(param.value(), 12.0);
        assert_eq!(log.borrow().as_slice(), &[12.0]);
    }

    #[test]
    fn quiet_set_suppresses_callback() {
        let (mut param, log) = param_with_log(0.0);
        param.set(-6.0, true);
        assert_eq!(param.value(), -6.0);
        assert!(log.borrow().is_empty());
        param.bang();
        assert_eq!(log.borrow().as_slice(), &[-6.0]);
    }

    #[test]
    fn clamping_is_idempotent() {
        let (mut param, _log) = param_with_log(0.0);
        param.set(-200.0, true);
        let clamped = param.value();
        param.set(clamped, true);
        assert_eq!(param.value(), clamped);
        assert_eq!(clamped, -48.0);
    }

    #[test]
    fn inactive_lfo_keeps_computed_equal_to_set() {
        let (mut param, _log) = param_with_log(3.0);
        for _ in 0..5 {
            param.update();
            assert_eq!(param.value(), param.value_set());
        }
        param.set(-7.5, true);
        param.update();
        assert_eq!(param.value(), -7.5);
    }

    #[test]
    fn set_drags_lfo_window_along() {
        let (mut param, _log) = param_with_log(0.0);
        param.nudge_lfo_range(3.0); // window [-3, 3]
        param.set(5.0, true);
        match &param.kind {
            ParamKind::Owned(state) => {
                assert_eq!(state.lfo_min, 2.0);
                assert_eq!(state.lfo_max, 8.0);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn active_lfo_fires_every_tick_and_stays_in_window() {
        let (mut param, log) = param_with_log(0.0);
        param.nudge_lfo_range(4.0);
        param.toggle_lfo();
        for _ in 0..10 {
            param.update();
        }
        let fired = log.borrow();
        assert_eq!(fired.len(), 11); // toggle fires once, then each tick
        for v in fired.iter() {
            assert!((-4.0..=4.0).contains(v), "out of window: {}", v);
        }
    }

    #[test]
    fn disabling_lfo_restores_set_value() {
        let (mut param, log) = param_with_log(2.0);
        param.nudge_lfo_range(2.0);
        param.toggle_lfo();
        param.update();
        param.toggle_lfo();
        assert_eq!(param.value(), 2.0);
        assert_eq!(*log.borrow().last().unwrap(), 2.0);
    }
}
