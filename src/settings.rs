// src/settings.rs

//! On-disk application settings, stored next to the executable.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct AppSettings {
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub sample_rate: Option<u32>,
    pub buffer_size: Option<u32>,
    /// Where session recordings land. Defaults to `Sessions/` in the config
    /// directory.
    pub session_dir: Option<PathBuf>,
    /// Snapshot loaded at startup when present.
    pub last_snapshot: Option<PathBuf>,
}

pub fn get_config_dir() -> Option<PathBuf> {
    if let Ok(exe_path) = env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let config_dir = exe_dir.join("AppSettings");
            for dir in [
                &config_dir,
                &config_dir.join("Sessions"),
                &config_dir.join("Loops"),
            ] {
                if !dir.exists() {
                    if let Err(e) = fs::create_dir_all(dir) {
                        log::error!("failed to create directory {}: {}", dir.display(), e);
                        return None;
                    }
                }
            }
            return Some(config_dir);
        }
    }
    log::error!("could not determine application directory");
    None
}

pub fn save_settings(settings: &AppSettings) {
    if let Some(dir) = get_config_dir() {
        let path = dir.join("settings.json");
        match serde_json::to_string_pretty(settings) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, json) {
                    log::error!("failed to write settings to {}: {}", path.display(), e);
                }
            }
            Err(e) => log::error!("failed to serialize settings: {}", e),
        }
    }
}

pub fn load_settings() -> AppSettings {
    if let Some(dir) = get_config_dir() {
        let path = dir.join("settings.json");
        if path.exists() {
            return match fs::read_to_string(&path) {
                Ok(json) => match serde_json::from_str(&json) {
                    Ok(settings) => settings,
                    Err(e) => {
                        log::warn!("could not parse settings file, using defaults: {}", e);
                        AppSettings::default()
                    }
                },
                Err(e) => {
                    log::warn!("could not read settings file, using defaults: {}", e);
                    AppSettings::default()
                }
            };
        }
    }
    AppSettings::default()
}
