use std::path::Path;
use std::time::Duration;

use panelworks_core::timing::{DEFAULT_MIN_RENDER_INTERVAL_MS, default_tick_interval_ms};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Minimum time between committed renders of one panel (`R`).
    pub min_render_interval_ms: u64,
    /// Scheduler tick resolution. Defaults to half of `R`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_interval_ms: Option<u64>,
    /// Capacity of the transport event channel.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_render_interval_ms: DEFAULT_MIN_RENDER_INTERVAL_MS,
            tick_interval_ms: None,
            event_buffer: 256,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Apply command-line overrides on top of the file values.
    pub fn with_overrides(
        mut self,
        min_render_interval_ms: Option<u64>,
        tick_interval_ms: Option<u64>,
    ) -> Result<Self, ConfigError> {
        if let Some(ms) = min_render_interval_ms {
            self.min_render_interval_ms = ms;
        }
        if tick_interval_ms.is_some() {
            self.tick_interval_ms = tick_interval_ms;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_render_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "min_render_interval_ms must be greater than zero".into(),
            ));
        }
        if self.tick_interval_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be greater than zero".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid("event_buffer must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
            .unwrap_or_else(|| default_tick_interval_ms(self.min_render_interval_ms))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms())
    }
}
