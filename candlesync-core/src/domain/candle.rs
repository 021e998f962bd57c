//! Candle types: the provider's positional row and the canonical record.

use super::ticker::Ticker;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One provider row: `(epoch_seconds, open, high, low, close, volume)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawCandle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Canonical daily candle for one symbol.
///
/// `date` is the UTC calendar date of `raw_timestamp` and is the partition key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleRecord {
    pub date: NaiveDate,
    pub symbol: Ticker,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub datetime: NaiveDateTime,
    pub fetched_at: NaiveDateTime,
    pub raw_timestamp: i64,
}

/// A broken OHLC relationship found by [`CandleRecord::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleViolation {
    NegativePrice,
    HighBelowBody,
    LowAboveBody,
    NotFinite,
}

impl fmt::Display for CandleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            CandleViolation::NegativePrice => "negative price",
            CandleViolation::HighBelowBody => "high below max(open, close)",
            CandleViolation::LowAboveBody => "low above min(open, close)",
            CandleViolation::NotFinite => "non-finite price",
        };
        f.write_str(msg)
    }
}

impl CandleRecord {
    /// Check the OHLC relationships the provider is supposed to guarantee.
    ///
    /// Not enforced: callers log violations and keep the record.
    pub fn validate(&self) -> Result<(), CandleViolation> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(CandleViolation::NotFinite);
        }
        if prices.iter().any(|p| *p < 0.0) {
            return Err(CandleViolation::NegativePrice);
        }
        if self.high < self.open.max(self.close) {
            return Err(CandleViolation::HighBelowBody);
        }
        if self.low > self.open.min(self.close) {
            return Err(CandleViolation::LowAboveBody);
        }
        Ok(())
    }
}

/// All records produced by one run. Built once, then only read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    records: Vec<CandleRecord>,
}

impl Batch {
    pub fn new(records: Vec<CandleRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[CandleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct partition dates, ascending.
    pub fn partition_keys(&self) -> Vec<NaiveDate> {
        self.records
            .iter()
            .map(|r| r.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Records belonging to one partition, in batch order.
    pub fn partition(&self, date: NaiveDate) -> Vec<&CandleRecord> {
        self.records.iter().filter(|r| r.date == date).collect()
    }

    /// Distinct symbols present, ascending.
    pub fn symbols(&self) -> Vec<&Ticker> {
        self.records
            .iter()
            .map(|r| &r.symbol)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
