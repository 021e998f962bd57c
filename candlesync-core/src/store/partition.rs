//! Partition keys and their `date=YYYY-MM-DD` directory names.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

const PREFIX: &str = "date=";

/// A date partition of the store. Serializes as its directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PartitionKey(NaiveDate);

impl PartitionKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Directory name, e.g. `date=2025-06-14`.
    pub fn dir_name(&self) -> String {
        format!("{PREFIX}{}", self.0.format("%Y-%m-%d"))
    }

    /// Parse a directory name back into a key. Anything else yields `None`.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        let value = name.strip_prefix(PREFIX)?;
        NaiveDate::parse_from_str(value, "%Y-%m-%d").ok().map(Self)
    }
}

impl From<NaiveDate> for PartitionKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl From<PartitionKey> for String {
    fn from(key: PartitionKey) -> Self {
        key.dir_name()
    }
}

impl TryFrom<String> for PartitionKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_dir_name(&value).ok_or_else(|| format!("not a partition directory name: {value}"))
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}
