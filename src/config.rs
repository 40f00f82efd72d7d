use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_LOOKUP_BASE_URL: &str = "https://jsonplaceholder.typicode.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid registration config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// What the email uniqueness check does when the lookup itself fails.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LookupFailurePolicy {
    /// Fail the email field with a transport error.
    #[default]
    FailClosed,
    /// Let the email pass and log a warning.
    FailOpen,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LookupConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub debounce_ms: u64,
    pub on_failure: LookupFailurePolicy,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LOOKUP_BASE_URL.to_string(),
            timeout_ms: 5_000,
            debounce_ms: 0,
            on_failure: LookupFailurePolicy::FailClosed,
        }
    }
}

impl LookupConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegistrationConfig {
    pub default_username: String,
    pub password_min_length: usize,
    pub lookup: LookupConfig,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            default_username: "Test User".to_string(),
            password_min_length: 6,
            lookup: LookupConfig::default(),
        }
    }
}

impl RegistrationConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), "loaded registration config");
        Ok(config)
    }
}
