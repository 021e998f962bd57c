//! Market-data client trait and structured fetch errors.
//!
//! The MarketDataClient trait abstracts over the remote history endpoint so the
//! fetch loop can be driven by the real HTTP client or by fakes in tests.

use crate::domain::{DateRange, RawCandle, Ticker};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Candle resolution. Only daily bars are ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    Daily,
}

impl Resolution {
    /// Code the provider expects in the `resolution` query parameter.
    pub fn provider_code(&self) -> &'static str {
        match self {
            Resolution::Daily => "D",
        }
    }
}

/// Failure of a single history request.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Expired or invalid access credential. Fatal to the whole run.
    #[error("authentication rejected for {symbol}: {message}")]
    Auth { symbol: String, message: String },

    /// Non-ok status or malformed payload. The ticker is skipped.
    #[error("provider error for {symbol}: {message}")]
    Provider { symbol: String, message: String },

    /// Network-level failure, including timeouts. The ticker is skipped.
    #[error("transport error for {symbol}: {message}")]
    Transport { symbol: String, message: String },
}

impl FetchError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Auth { .. })
    }
}

/// Remote historical-data endpoint.
///
/// One attempt per call; retry policy belongs to the caller.
pub trait MarketDataClient {
    /// Human-readable name of this client.
    fn name(&self) -> &str;

    /// Fetch candles for `ticker` over `range` (inclusive).
    fn fetch(
        &self,
        ticker: &Ticker,
        resolution: Resolution,
        range: DateRange,
    ) -> Result<Vec<RawCandle>, FetchError>;
}

/// Progress callback for the multi-ticker fetch loop.
pub trait FetchProgress {
    /// Called before fetching a ticker.
    fn on_start(&self, ticker: &Ticker, index: usize, total: usize);

    /// Called after a ticker's fetch returns.
    fn on_complete(
        &self,
        ticker: &Ticker,
        index: usize,
        total: usize,
        result: &Result<Vec<RawCandle>, FetchError>,
    );

    /// Called once the loop has visited every ticker.
    fn on_finish(&self, succeeded: usize, empty: usize, failed: usize, total: usize);
}

/// Progress reporter that writes through the `log` facade.
pub struct LogProgress;

impl FetchProgress for LogProgress {
    fn on_start(&self, ticker: &Ticker, index: usize, total: usize) {
        log::info!("[{}/{}] Fetching data for {ticker}...", index + 1, total);
    }

    fn on_complete(
        &self,
        ticker: &Ticker,
        _index: usize,
        _total: usize,
        result: &Result<Vec<RawCandle>, FetchError>,
    ) {
        match result {
            Ok(rows) if rows.is_empty() => {
                log::warn!("Could not retrieve valid data for {ticker}: no candles returned")
            }
            Ok(rows) => log::debug!("{ticker}: {} candles", rows.len()),
            Err(e) => log::warn!("Could not retrieve valid data for {ticker}: {e}"),
        }
    }

    fn on_finish(&self, succeeded: usize, empty: usize, failed: usize, total: usize) {
        log::info!(
            "Fetch complete: {succeeded}/{total} with data, {empty} empty, {failed} failed"
        );
    }
}

/// Progress reporter that does nothing.
pub struct NoProgress;

impl FetchProgress for NoProgress {
    fn on_start(&self, _ticker: &Ticker, _index: usize, _total: usize) {}

    fn on_complete(
        &self,
        _ticker: &Ticker,
        _index: usize,
        _total: usize,
        _result: &Result<Vec<RawCandle>, FetchError>,
    ) {
    }

    fn on_finish(&self, _succeeded: usize, _empty: usize, _failed: usize, _total: usize) {}
}
