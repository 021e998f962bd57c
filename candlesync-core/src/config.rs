//! Sync job configuration, loaded from TOML.
//!
//! ```toml
//! tickers = ["RELIANCE", "TCS"]
//! lookback_days = 5
//! destination = "data/raw"
//! commit_mode = "delete_then_write"
//!
//! [provider]
//! request_delay_ms = 500
//!
//! [auth]
//! app_id = "XXXX-100"
//! ```

use crate::data::auth::AuthConfig;
use crate::data::fyers::ProviderConfig;
use crate::domain::Ticker;
use crate::pipeline::CommitMode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default lookback window in days.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Full configuration of one sync job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Ticker universe, fetched in this order.
    pub tickers: Vec<Ticker>,

    /// Fetch window is `[today - lookback_days, today]`.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,

    /// Root directory of the partitioned dataset.
    pub destination: PathBuf,

    #[serde(default)]
    pub commit_mode: CommitMode,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_lookback_days() -> i64 {
    DEFAULT_LOOKBACK_DAYS
}

impl SyncConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tickers.is_empty() {
            return Err(ConfigError::Invalid("tickers must not be empty".into()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.tickers.iter().find(|t| !seen.insert(*t)) {
            return Err(ConfigError::Invalid(format!("duplicate ticker '{dup}'")));
        }
        if self.lookback_days < 0 {
            return Err(ConfigError::Invalid(format!(
                "lookback_days must be >= 0, got {}",
                self.lookback_days
            )));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("destination must not be empty".into()));
        }
        if let Some(scheme) = uri_scheme(&self.destination) {
            return Err(ConfigError::Invalid(format!(
                "destination {} uses the '{scheme}://' scheme; only local directories are supported",
                self.destination.display()
            )));
        }
        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::Invalid("provider.timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}

/// Scheme of a URI-like path such as `gs://bucket/raw`, if any.
fn uri_scheme(path: &Path) -> Option<String> {
    let s = path.to_string_lossy();
    let (scheme, _) = s.split_once("://")?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then(|| scheme.to_string())
}
