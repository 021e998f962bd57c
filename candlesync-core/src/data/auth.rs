//! Access-token acquisition.
//!
//! A long-lived refresh credential is stored as the last line of a text file
//! (`... #REFRESH_TOKEN# <token>`). Each run exchanges it for a short-lived
//! access token which is held in memory only.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Marker separating the line prefix from the refresh credential.
pub const REFRESH_TOKEN_MARKER: &str = "#REFRESH_TOKEN#";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("refresh token not found at {}", path.display())]
    MissingRefreshToken { path: PathBuf },

    #[error("refresh token store I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("token exchange failed: {0}")]
    Exchange(String),
}

/// Short-lived access credential. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Source of an access token for one run.
pub trait AccessTokenProvider {
    fn access_token(&self) -> Result<AccessToken, AuthError>;
}

/// Text file holding refresh credentials, newest on the last line.
pub struct RefreshTokenStore {
    path: PathBuf,
}

impl RefreshTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the newest refresh token.
    pub fn read(&self) -> Result<String, AuthError> {
        if !self.path.exists() {
            return Err(AuthError::MissingRefreshToken {
                path: self.path.clone(),
            });
        }
        let content = fs::read_to_string(&self.path).map_err(|e| AuthError::Io {
            path: self.path.clone(),
            source: e,
        })?;

        let token = content
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .and_then(|l| l.rsplit(REFRESH_TOKEN_MARKER).next())
            .map(str::trim)
            .unwrap_or_default();

        if token.is_empty() {
            return Err(AuthError::MissingRefreshToken {
                path: self.path.clone(),
            });
        }
        Ok(token.to_string())
    }

    /// Append `[YYYY-MM-DD HH:MM:SS] {user} #REFRESH_TOKEN# {token}`.
    pub fn append(&self, user: &str, token: &str) -> Result<(), AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::MissingCredential("refresh token is empty".into()));
        }
        let io_err = |e| AuthError::Io {
            path: self.path.clone(),
            source: e,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        let stamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "[{stamp}] {user} {REFRESH_TOKEN_MARKER} {}", token.trim()).map_err(io_err)?;
        Ok(())
    }
}

/// `sha256_hex("{app_id}:{app_secret}")`, the provider's app identity hash.
pub fn app_id_hash(app_id: &str, app_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{app_id}:{app_secret}").as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Settings for the refresh-token exchange. Secrets come from env vars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub auth_url: String,
    pub refresh_token_path: PathBuf,
    pub app_id: String,
    pub app_secret_env: String,
    pub pin_env: String,
    pub timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auth_url: "https://api-t1.fyers.in/api/v3/validate-refresh-token".into(),
            refresh_token_path: PathBuf::from("credentials/refresh_token.txt"),
            app_id: String::new(),
            app_secret_env: "FYERS_APP_SECRET".into(),
            pin_env: "FYERS_PIN".into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize)]
struct ExchangeRequest<'a> {
    grant_type: &'a str,
    #[serde(rename = "appIdHash")]
    app_id_hash: String,
    refresh_token: &'a str,
    pin: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    s: String,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Exchanges the stored refresh token for an access token over HTTPS.
pub struct RefreshTokenExchange {
    config: AuthConfig,
    app_secret: String,
    pin: String,
}

impl RefreshTokenExchange {
    pub fn new(config: AuthConfig, app_secret: String, pin: String) -> Self {
        Self {
            config,
            app_secret,
            pin,
        }
    }

    /// Build from config, reading the secret and pin from the named env vars.
    pub fn from_env(config: AuthConfig) -> Result<Self, AuthError> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AuthError::MissingCredential(format!("env var {name} is not set")))
        };
        if config.app_id.trim().is_empty() {
            return Err(AuthError::MissingCredential("auth.app_id is empty".into()));
        }
        let app_secret = read(&config.app_secret_env)?;
        let pin = read(&config.pin_env)?;
        Ok(Self::new(config, app_secret, pin))
    }

    fn parse_response(resp: ExchangeResponse) -> Result<AccessToken, AuthError> {
        if resp.s != "ok" {
            return Err(AuthError::Exchange(format!(
                "status '{}': {}",
                resp.s,
                resp.message.unwrap_or_default()
            )));
        }
        resp.access_token
            .filter(|t| !t.is_empty())
            .map(AccessToken::new)
            .ok_or_else(|| AuthError::Exchange("response carried no access_token".into()))
    }
}

impl AccessTokenProvider for RefreshTokenExchange {
    fn access_token(&self) -> Result<AccessToken, AuthError> {
        let store = RefreshTokenStore::new(&self.config.refresh_token_path);
        let refresh_token = store.read()?;
        log::info!("Refresh token loaded from {}", store.path().display());

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        let body = ExchangeRequest {
            grant_type: "refresh_token",
            app_id_hash: app_id_hash(&self.config.app_id, &self.app_secret),
            refresh_token: &refresh_token,
            pin: &self.pin,
        };

        let resp = client
            .post(&self.config.auth_url)
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        let parsed: ExchangeResponse = resp
            .json()
            .map_err(|e| AuthError::Exchange(format!("malformed response: {e}")))?;
        Self::parse_response(parsed)
    }
}
