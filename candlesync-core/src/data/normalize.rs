//! Batch normalizer: provider rows → canonical records.
//!
//! Every record of a run carries the same `fetched_at`, captured once by the
//! caller, so the output of one run is reproducible.

use super::fetch_loop::TickerOutcome;
use crate::domain::{Batch, CandleRecord, RawCandle, Ticker};
use chrono::{DateTime, NaiveDateTime};

/// Map one ticker's raw rows to canonical records.
///
/// Rows whose timestamp is outside chrono's range are dropped with a warning.
/// OHLC relationship violations are logged and kept.
pub fn normalize(ticker: &Ticker, raw: &[RawCandle], fetched_at: NaiveDateTime) -> Vec<CandleRecord> {
    let mut records = Vec::with_capacity(raw.len());
    for candle in raw {
        let Some(datetime) = DateTime::from_timestamp(candle.timestamp, 0).map(|dt| dt.naive_utc())
        else {
            log::warn!("{ticker}: dropping candle with invalid timestamp {}", candle.timestamp);
            continue;
        };

        let record = CandleRecord {
            date: datetime.date(),
            symbol: ticker.clone(),
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            datetime,
            fetched_at,
            raw_timestamp: candle.timestamp,
        };
        if let Err(v) = record.validate() {
            log::warn!("{ticker} {}: suspicious candle ({v})", record.date);
        }
        records.push(record);
    }
    records
}

/// Concatenate every ticker that returned rows into one batch, in ticker order.
///
/// Failed and empty outcomes contribute nothing.
pub fn build_batch(outcomes: &[TickerOutcome], fetched_at: NaiveDateTime) -> Batch {
    let records = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok().map(|rows| (&o.ticker, rows)))
        .flat_map(|(ticker, rows)| normalize(ticker, rows, fetched_at))
        .collect();
    Batch::new(records)
}
