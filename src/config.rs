/// Configuration module for breathing settings and hooks
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::phase::Durations;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub breathing: Durations,
    #[serde(default = "default_session_minutes")]
    pub session_minutes: u32,
    #[serde(default)]
    pub hooks: Hooks,
}

/// Shell commands run around a session. `None`, empty, or `#`-prefixed
/// commands are skipped.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Hooks {
    #[serde(default)]
    pub session_start: Option<String>,
    #[serde(default)]
    pub session_end: Option<String>,
}

fn default_session_minutes() -> u32 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            breathing: Durations::default(),
            session_minutes: default_session_minutes(),
            hooks: Hooks::default(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// Read the config at `path`. A missing file is created with example
    /// hooks; an unreadable or invalid one falls back to defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return create_default_config(path);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), "Could not read config file, using defaults: {e}");
                return Config::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), "Invalid config format, using defaults: {e}");
            Config::default()
        })
    }
}

pub fn config_path() -> PathBuf {
    match dirs::config_dir() {
        Some(dir) => dir.join("breathe").join("config.json"),
        None => PathBuf::from("breathe-config.json"),
    }
}

fn create_default_config(path: &Path) -> Config {
    let config = Config {
        hooks: Hooks {
            session_start: Some("# afplay ~/music/calm.mp3 &".to_string()),
            session_end: Some("# pkill afplay".to_string()),
        },
        ..Config::default()
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let _ = fs::create_dir_all(parent);
    }
    match serde_json::to_string_pretty(&config) {
        Ok(json) => {
            if let Err(e) = fs::write(path, json) {
                warn!(path = %path.display(), "Could not write default config: {e}");
            }
        }
        Err(e) => warn!("Could not serialize default config: {e}"),
    }
    config
}
