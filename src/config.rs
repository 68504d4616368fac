//! Configuration for wardwatch

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::WardError;

/// Minimum length of the shared token secret
pub const MIN_SECRET_LEN: usize = 32;

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wardwatch")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Shared secret of the external identity issuer (HS256)
    #[serde(default)]
    pub token_secret: Option<String>,

    /// Attempts for a contended transactional write before giving up
    #[serde(default = "default_max_write_retries")]
    pub max_write_retries: u32,

    /// How long a writer waits on a locked database file
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Buffer size of the in-process notification broadcast
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("wardwatch.db")
}

fn default_max_write_retries() -> u32 {
    3
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_notification_capacity() -> usize {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            token_secret: None,
            max_write_retries: default_max_write_retries(),
            busy_timeout_ms: default_busy_timeout_ms(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, WardError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            WardError::Config(format!("Failed to read {}: {}", path.as_ref().display(), e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| WardError::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), WardError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| WardError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), content).map_err(|e| {
            WardError::Config(format!("Failed to write {}: {}", path.as_ref().display(), e))
        })
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), WardError> {
        if self.max_write_retries == 0 {
            return Err(WardError::Config("max_write_retries must be at least 1".into()));
        }
        if let Some(secret) = &self.token_secret {
            if secret.len() < MIN_SECRET_LEN {
                return Err(WardError::Config(format!(
                    "token_secret must be at least {} characters",
                    MIN_SECRET_LEN
                )));
            }
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
