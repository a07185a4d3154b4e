//! Tracker configuration, loaded from TOML.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// How the store treats status changes outside the kitchen's transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// Apply anyway and log a warning.
    #[default]
    Lenient,
    /// Reject without touching local state.
    Strict,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub poll_interval_secs: u64,
    /// Orders fetched by each reconciling poll.
    pub poll_limit: usize,
    /// Length of the dashboard's recent-orders list.
    pub recent_limit: usize,
    pub channel_buffer: usize,
    pub transition_policy: TransitionPolicy,
    /// Revert an optimistic status change when persisting it fails.
    pub rollback_on_failure: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 15,
            poll_limit: 50,
            recent_limit: 5,
            channel_buffer: 100,
            transition_policy: TransitionPolicy::Lenient,
            rollback_on_failure: true,
        }
    }
}

impl TrackerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: TrackerConfig = toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&contents)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Validation("poll_interval_secs must be positive".into()));
        }
        if self.poll_limit == 0 || self.recent_limit == 0 {
            return Err(ConfigError::Validation("limits must be positive".into()));
        }
        if self.channel_buffer == 0 {
            return Err(ConfigError::Validation("channel_buffer must be positive".into()));
        }
        Ok(())
    }
}
