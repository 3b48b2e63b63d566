use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// How a successful tap picks the face it paints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceAssignment {
    /// Face index is the number of completed colors minus one.
    #[default]
    CompletionOrder,
    /// Face index is the tapped color's slot in the saved palette.
    RevealSlot,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be a positive number of seconds (got {value})")]
    NonPositive { field: &'static str, value: f64 },
    #[error("guard_window_secs must be a representable, non-negative duration (got {0})")]
    InvalidGuard(f64),
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tunable behavior of a game session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Start value of the session countdown.
    pub session_duration_secs: f64,
    /// Reset value of the per-color countdown.
    pub color_duration_secs: f64,
    /// Real-time delay after the first target during which taps are ignored.
    pub guard_window_secs: f64,
    pub face_assignment: FaceAssignment,
    /// Worker shards for frame sampling; 0 uses one per CPU.
    pub sampler_shards: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            session_duration_secs: 180.0,
            color_duration_secs: 30.0,
            guard_window_secs: 1.0,
            face_assignment: FaceAssignment::CompletionOrder,
            sampler_shards: 0,
        }
    }
}

impl GameConfig {
    /// Parses and validates a JSON document; missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("session_duration_secs", self.session_duration_secs),
            ("color_duration_secs", self.color_duration_secs),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        self.guard_window()?;
        Ok(())
    }

    /// Guard window as a `Duration`; negative, NaN and overflowing values fail.
    pub fn guard_window(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.guard_window_secs)
            .map_err(|_| ConfigError::InvalidGuard(self.guard_window_secs))
    }

    /// Effective shard count, resolving 0 to the CPU count.
    pub fn shard_count(&self) -> usize {
        if self.sampler_shards == 0 {
            num_cpus::get().max(1)
        } else {
            self.sampler_shards
        }
    }
}
