//! Inclusive calendar date range for a fetch window.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateRangeError {
    #[error("range start {from} is after end {to}")]
    Inverted { from: NaiveDate, to: NaiveDate },

    #[error("lookback must be non-negative, got {0} days")]
    NegativeLookback(i64),
}

/// `[from, to]`, both ends inclusive, `from <= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, DateRangeError> {
        if from > to {
            return Err(DateRangeError::Inverted { from, to });
        }
        Ok(Self { from, to })
    }

    /// `[today - days, today]`.
    pub fn lookback(today: NaiveDate, days: i64) -> Result<Self, DateRangeError> {
        if days < 0 {
            return Err(DateRangeError::NegativeLookback(days));
        }
        Self::new(today - Duration::days(days), today)
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.from, self.to)
    }
}
