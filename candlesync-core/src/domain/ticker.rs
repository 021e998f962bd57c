//! Ticker, an instrument identifier from the configured universe.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default exchange prefix for provider symbols.
pub const DEFAULT_EXCHANGE: &str = "NSE";

/// Default instrument-type suffix (cash equity).
pub const DEFAULT_INSTRUMENT_SUFFIX: &str = "EQ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TickerError {
    #[error("ticker is empty")]
    Empty,

    #[error("ticker '{0}' contains whitespace or ':'")]
    InvalidChars(String),
}

/// Upper-cased, trimmed ticker such as `RELIANCE`.
///
/// Tickers are immutable once built; the provider-specific symbol is derived
/// on demand with [`Ticker::provider_symbol`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn new(raw: &str) -> Result<Self, TickerError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TickerError::Empty);
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c == ':') {
            return Err(TickerError::InvalidChars(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exchange-qualified symbol: `{EXCHANGE}:{TICKER}-{SUFFIX}`.
    pub fn provider_symbol(&self, exchange: &str, suffix: &str) -> String {
        format!("{}:{}-{}", exchange.to_uppercase(), self.0, suffix.to_uppercase())
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Ticker {
    type Error = TickerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ticker::new(&value)
    }
}

impl From<Ticker> for String {
    fn from(t: Ticker) -> Self {
        t.0
    }
}
