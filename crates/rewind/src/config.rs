use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ExtensionBlend;

/// Largest per-participant history a config may ask for (about 5.8 hours at 50 Hz).
pub const MAX_HISTORY_CAPACITY: usize = 1 << 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullRewindPolicy {
    /// Keep rewinding at the oldest recorded state until `stop_rewind`.
    #[default]
    Hold,
    /// Stop on the playback tick that reaches the oldest recorded state.
    AutoStop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewindConfig {
    pub max_record_seconds: f32,
    pub record_tps: u32,
    pub playback_speed: f32,
    pub on_full_rewind: FullRewindPolicy,
    pub continuous_extension_keys: Vec<String>,
}

impl Default for RewindConfig {
    fn default() -> Self {
        Self {
            max_record_seconds: 5.0,
            record_tps: 50,
            playback_speed: 1.0,
            on_full_rewind: FullRewindPolicy::Hold,
            continuous_extension_keys: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RewindConfigError {
    #[error("failed to read rewind config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rewind config at {location}: {source}")]
    Parse {
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid rewind config value {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl RewindConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, RewindConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let config: Self = serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
            let path = error.path().to_string();
            let location = if path.is_empty() || path == "." {
                "<root>".to_string()
            } else {
                path
            };
            RewindConfigError::Parse {
                location,
                source: error.into_inner(),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, RewindConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| RewindConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), RewindConfigError> {
        if !self.max_record_seconds.is_finite() || self.max_record_seconds < 0.0 {
            return Err(RewindConfigError::InvalidValue {
                field: "max_record_seconds",
                message: format!(
                    "expected finite non-negative seconds, got {}",
                    self.max_record_seconds
                ),
            });
        }
        if self.record_tps == 0 {
            return Err(RewindConfigError::InvalidValue {
                field: "record_tps",
                message: "expected at least one tick per second".to_string(),
            });
        }
        let slots = self.history_slots();
        if !slots.is_finite() || slots > MAX_HISTORY_CAPACITY as f32 {
            return Err(RewindConfigError::InvalidValue {
                field: "max_record_seconds",
                message: format!(
                    "record window of {} s at {} tps exceeds {MAX_HISTORY_CAPACITY} snapshots",
                    self.max_record_seconds, self.record_tps
                ),
            });
        }
        if !is_valid_playback_speed(self.playback_speed) {
            return Err(RewindConfigError::InvalidValue {
                field: "playback_speed",
                message: format!(
                    "expected finite positive multiplier, got {}",
                    self.playback_speed
                ),
            });
        }
        Ok(())
    }

    /// Snapshots retained per participant. Zero when the record window is empty.
    pub fn history_capacity(&self) -> usize {
        self.history_slots().ceil().max(0.0) as usize
    }

    fn history_slots(&self) -> f32 {
        self.max_record_seconds * self.record_tps as f32
    }

    /// Recording interval. Hosts drive `record_tick` with this step.
    pub fn fixed_dt(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.record_tps.max(1)))
    }

    pub fn fixed_dt_seconds(&self) -> f32 {
        self.fixed_dt().as_secs_f32()
    }

    pub fn extension_blend(&self) -> ExtensionBlend {
        ExtensionBlend::new(self.continuous_extension_keys.iter().cloned())
    }
}

pub(crate) fn is_valid_playback_speed(speed: f32) -> bool {
    speed.is_finite() && speed > 0.0
}
