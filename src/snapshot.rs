// src/snapshot.rs

//! Saving and restoring the whole parameter surface as JSON. Only owned,
//! visible parameters are stored; mirrors and hidden engine-facing values
//! are re-derived on load.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::params::lfo::LfoWaveform;
use crate::params::{ParamBank, ParamId};
use crate::NUM_VOICES;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct ParamSnapshot {
    pub name: String,
    pub value: f32,
    pub lfo_period: f32,
    pub lfo_min: f32,
    pub lfo_max: f32,
    pub waveform: u8,
    pub lfo_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceSnapshot {
    pub params: Vec<ParamSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub voices: Vec<VoiceSnapshot>,
}

/// Capture the current state of every owned, visible parameter.
pub fn capture(bank: &ParamBank) -> SessionSnapshot {
    let mut voices = Vec::with_capacity(NUM_VOICES);
    for voice in 0..NUM_VOICES {
        let mut params = Vec::new();
        for id in ParamId::all() {
            if !bank.is_owned(voice, id) {
                continue;
            }
            let param = bank.param(voice, id);
            if param.hidden {
                continue;
            }
            let Some(state) = param.owned() else {
                continue;
            };
            params.push(ParamSnapshot {
                name: param.name.to_string(),
                value: state.value_set,
                lfo_period: state.lfo.period(),
                lfo_min: state.lfo_min,
                lfo_max: state.lfo_max,
                waveform: state.lfo.waveform as u8,
                lfo_active: state.lfo_active,
            });
        }
        voices.push(VoiceSnapshot { params });
    }
    SessionSnapshot {
        version: SNAPSHOT_VERSION,
        voices,
    }
}

/// Restore a snapshot into the bank. Values are applied quietly and then
/// re-sent in one pass so the engine never sees a half-restored state.
pub fn apply(bank: &mut ParamBank, snapshot: &SessionSnapshot) -> Result<()> {
    if snapshot.version != SNAPSHOT_VERSION {
        anyhow::bail!(
            "unsupported snapshot version {} (expected {})",
            snapshot.version,
            SNAPSHOT_VERSION
        );
    }
    for (voice, voice_snap) in snapshot.voices.iter().enumerate().take(NUM_VOICES) {
        for saved in &voice_snap.params {
            let Some(id) = find_param(bank, voice, &saved.name) else {
                log::warn!("snapshot has unknown parameter '{}', skipping", saved.name);
                continue;
            };
            bank.set_value(voice, id, saved.value, true);
            let param = bank.param_mut(voice, id);
            let (min, max) = (param.min, param.max);
            if let Some(state) = param.owned_mut() {
                state.lfo_min = saved.lfo_min.clamp(min, max);
                state.lfo_max = saved.lfo_max.clamp(min, max);
                state.lfo.set_period(saved.lfo_period);
                state.lfo.waveform = LfoWaveform::from(saved.waveform);
                state.lfo_active = saved.lfo_active;
            }
        }
    }
    bank.bang_all();
    Ok(())
}

fn find_param(bank: &ParamBank, voice: usize, name: &str) -> Option<ParamId> {
    ParamId::all().find(|&id| bank.is_owned(voice, id) && bank.param(voice, id).name == name)
}

pub fn save_to(bank: &ParamBank, path: &Path) -> Result<()> {
    let snapshot = capture(bank);
    let json = serde_json::to_string_pretty(&snapshot)?;
    fs::write(path, json).with_context(|| format!("writing snapshot {}", path.display()))?;
    Ok(())
}

pub fn load_from(bank: &mut ParamBank, path: &Path) -> Result<()> {
    let json =
        fs::read_to_string(path).with_context(|| format!("reading snapshot {}", path.display()))?;
    let snapshot: SessionSnapshot =
        serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))?;
    apply(bank, &snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command::command_channel;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn new_bank() -> ParamBank {
        let (tx, _rx) = command_channel(4096);
        ParamBank::new(Rc::new(RefCell::new(tx)))
    }

    #[test]
    fn round_trip_preserves_values_and_lfo_state() {
        let mut bank = new_bank();
        bank.set_value(3, ParamId::Duration, 7.25, true);
        bank.set_value(0, ParamId::ReverbDecay, 33.0, true);
        bank.toggle_lfo(3, ParamId::Pan);

        let snapshot = capture(&bank);
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);

        let mut restored = new_bank();
        apply(&mut restored, &snapshot).unwrap();
        assert!((restored.value(3, ParamId::Duration) - 7.25).abs() < 1e-5);
        assert!((restored.value(0, ParamId::ReverbDecay) - 33.0).abs() < 1e-5);
        assert!(restored.param(3, ParamId::Pan).lfo_active());
    }

    #[test]
    fn globals_are_stored_once() {
        let bank = new_bank();
        let snapshot = capture(&bank);
        let decay_entries: usize = snapshot
            .voices
            .iter()
            .map(|v| v.params.iter().filter(|p| p.name == "decay").count())
            .sum();
        assert_eq!(decay_entries, 1);
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut bank = new_bank();
        let snapshot = SessionSnapshot {
            version: 99,
            voices: Vec::new(),
        };
        assert!(apply(&mut bank, &snapshot).is_err());
    }

    #[test]
    fn file_round_trip() {
        let path = std::env::temp_dir().join(format!("reels-snap-{}.json", std::process::id()));
        let mut bank = new_bank();
        bank.set_value(1, ParamId::Level, -12.0, true);
        save_to(&bank, &path).unwrap();

        let mut restored = new_bank();
        load_from(&mut restored, &path).unwrap();
        assert!((restored.value(1, ParamId::Level) + 12.0).abs() < 1e-5);
        let _ = fs::remove_file(&path);
    }
}
