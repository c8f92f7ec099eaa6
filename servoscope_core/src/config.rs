//! Pipeline configuration.
//!
//! Every recognized option lives in [`StreamConfig`] with its default;
//! missing keys in a JSON config file fall back to those defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for buffers, controls and the command loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Arrivals closer than this to the previous entry's leading edge are merged (default: 0.2s)
    pub coalesce_threshold_secs: f64,

    /// Trailing window kept by coalescing buffers (default: 60s)
    pub retention_secs: f64,

    /// Trailing window drawn by boundary-aware buffers (default: 10s)
    pub history_secs: f64,

    /// Number of actuator channels in a multi-channel panel (default: 4)
    pub channel_count: u32,

    /// Minimum spacing of UI-originated commands (default: 100ms)
    pub ui_command_interval_ms: u64,

    /// Tick of the periodic command loop (default: 50ms)
    pub loop_command_interval_ms: u64,

    /// How long to wait for the transport to open (default: 5000ms)
    pub connect_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            coalesce_threshold_secs: 0.2,
            retention_secs: 60.0,
            history_secs: 10.0,
            channel_count: 4,
            ui_command_interval_ms: 100,
            loop_command_interval_ms: 50,
            connect_timeout_ms: 5000,
        }
    }
}

impl StreamConfig {
    /// Parses a JSON document, filling absent keys with defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Checks that every window and interval is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |name: &'static str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::invalid(name, format!("must be a positive number, got {value}")))
            }
        };

        positive("coalesce_threshold_secs", self.coalesce_threshold_secs)?;
        positive("retention_secs", self.retention_secs)?;
        positive("history_secs", self.history_secs)?;

        if self.channel_count == 0 {
            return Err(ConfigError::invalid("channel_count", "must be at least 1"));
        }
        if self.ui_command_interval_ms == 0 {
            return Err(ConfigError::invalid("ui_command_interval_ms", "must be at least 1"));
        }
        if self.loop_command_interval_ms == 0 {
            return Err(ConfigError::invalid("loop_command_interval_ms", "must be at least 1"));
        }
        Ok(())
    }

    pub fn ui_command_interval(&self) -> Duration {
        Duration::from_millis(self.ui_command_interval_ms)
    }

    pub fn loop_command_interval(&self) -> Duration {
        Duration::from_millis(self.loop_command_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
