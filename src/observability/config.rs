//! Logging configuration.
//!
//! Loaded from the `[logging]` table of the config file; environment
//! variables override it for 12-factor deployments.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, used when `RUST_LOG` is unset (default: info)
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Defaults overridden by `TIERSTORE_LOG_LEVEL` and `TIERSTORE_LOG_JSON`.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("TIERSTORE_LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.level = level;
            }
        }
        if let Ok(json) = std::env::var("TIERSTORE_LOG_JSON") {
            self.json = json == "true" || json == "1";
        }
        self
    }
}
