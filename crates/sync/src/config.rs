// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Sync configuration.
//!
//! Usually embedded by the host application, but can also be read from a
//! TOML file:
//!
//! ```toml
//! base_url = "https://api.example.com/v1"
//! sync_interval_ms = 5000
//! retry_delay_ms = 1000
//! max_retries = 3
//! conflict_strategy = "server_wins"
//! ```
//!
//! Every field is optional and falls back to its default.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::conflict::ConflictStrategy;
use crate::queue::DEFAULT_MAX_RETRIES;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid conflict strategy: '{0}'\n  hint: valid strategies are: client_wins, server_wins, manual")]
    InvalidStrategy(String),
}

/// Configuration for the sync coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Root URL the entity collections hang off (no trailing slash needed).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Interval between scheduled drain passes in milliseconds (default: 5000).
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
    /// Pause before retrying a failed mutation in milliseconds (default: 1000).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Failed attempts before a mutation is dropped (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Policy for conflicts when no handler is registered (default: server_wins).
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_sync_interval_ms() -> u64 {
    5000
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            base_url: default_base_url(),
            sync_interval_ms: default_sync_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retries: default_max_retries(),
            conflict_strategy: ConflictStrategy::default(),
        }
    }
}

impl SyncConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "base_url '{}' must start with http:// or https://",
                url
            )));
        }
        if self.sync_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sync_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
