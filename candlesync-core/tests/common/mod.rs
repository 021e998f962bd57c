//! Shared fakes for pipeline integration tests.

#![allow(dead_code)]

use candlesync_core::data::{FetchError, MarketDataClient, NoProgress, Resolution, Throttle};
use candlesync_core::domain::{DateRange, RawCandle, Ticker};
use candlesync_core::store::{
    LocalPartitionStore, PartitionKey, PartitionStore, PartitionWrite, StoreError, StoredCandle,
};
use candlesync_core::{run_pipeline, CommitMode, PipelineContext, PipelineError, RunReport};
use candlesync_core::domain::CandleRecord;
use chrono::{NaiveDate, NaiveDateTime};
use std::cell::RefCell;
use std::collections::HashMap;

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

/// Epoch seconds of UTC midnight on 2024-06-`d`.
pub fn ts(d: u32) -> i64 {
    day(d).and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp()
}

pub fn candle(d: u32, close: f64) -> RawCandle {
    RawCandle {
        timestamp: ts(d),
        open: close - 1.0,
        high: close + 2.0,
        low: close - 2.0,
        close,
        volume: 10_000 + d as u64,
    }
}

pub fn tickers(names: &[&str]) -> Vec<Ticker> {
    names.iter().map(|n| Ticker::new(n).unwrap()).collect()
}

pub fn fetched_at() -> NaiveDateTime {
    day(20).and_hms_opt(16, 0, 0).unwrap()
}

pub fn range() -> DateRange {
    DateRange::lookback(day(14), 5).unwrap()
}

pub enum Answer {
    Rows(Vec<RawCandle>),
    NotOk,
    Timeout,
    Expired,
}

/// Client serving canned answers keyed by ticker; unknown tickers get no rows.
#[derive(Default)]
pub struct FakeClient {
    answers: HashMap<String, Answer>,
    pub calls: RefCell<Vec<String>>,
}

impl FakeClient {
    pub fn with(mut self, ticker: &str, answer: Answer) -> Self {
        self.answers.insert(ticker.to_string(), answer);
        self
    }
}

impl MarketDataClient for FakeClient {
    fn name(&self) -> &str {
        "fake"
    }

    fn fetch(
        &self,
        ticker: &Ticker,
        _resolution: Resolution,
        _range: DateRange,
    ) -> Result<Vec<RawCandle>, FetchError> {
        self.calls.borrow_mut().push(ticker.to_string());
        let symbol = ticker.provider_symbol("NSE", "EQ");
        match self.answers.get(ticker.as_str()) {
            Some(Answer::Rows(rows)) => Ok(rows.clone()),
            Some(Answer::NotOk) => Err(FetchError::Provider {
                symbol,
                message: "status 'error' (code -300): invalid symbol".into(),
            }),
            Some(Answer::Timeout) => Err(FetchError::Transport {
                symbol,
                message: "operation timed out".into(),
            }),
            Some(Answer::Expired) => Err(FetchError::Auth {
                symbol,
                message: "token expired".into(),
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// Wraps a local store, records every call and can fail on chosen partitions.
pub struct InstrumentedStore<'a> {
    pub inner: &'a LocalPartitionStore,
    pub fail_remove: Option<NaiveDate>,
    pub fail_write: Option<NaiveDate>,
    pub fail_promote: Option<NaiveDate>,
    pub calls: RefCell<Vec<String>>,
}

impl<'a> InstrumentedStore<'a> {
    pub fn new(inner: &'a LocalPartitionStore) -> Self {
        Self {
            inner,
            fail_remove: None,
            fail_write: None,
            fail_promote: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl PartitionStore for InstrumentedStore<'_> {
    fn root(&self) -> String {
        self.inner.root()
    }

    fn exists(&self, key: PartitionKey) -> Result<bool, StoreError> {
        self.record(format!("exists {key}"));
        self.inner.exists(key)
    }

    fn remove_partition(&self, key: PartitionKey) -> Result<(), StoreError> {
        self.record(format!("remove {key}"));
        if self.fail_remove == Some(key.date()) {
            return Err(StoreError::Delete {
                root: self.root(),
                key,
                message: "permission denied".into(),
            });
        }
        self.inner.remove_partition(key)
    }

    fn write_partition(
        &self,
        key: PartitionKey,
        records: &[&CandleRecord],
    ) -> Result<PartitionWrite, StoreError> {
        self.record(format!("write {key}"));
        if self.fail_write == Some(key.date()) {
            return Err(StoreError::Write {
                root: self.root(),
                key,
                message: "disk full".into(),
            });
        }
        self.inner.write_partition(key, records)
    }

    fn list_partitions(&self) -> Result<Vec<PartitionKey>, StoreError> {
        self.record("list".into());
        self.inner.list_partitions()
    }

    fn read_partition(&self, key: PartitionKey) -> Result<Vec<StoredCandle>, StoreError> {
        self.record(format!("read {key}"));
        self.inner.read_partition(key)
    }

    fn stage_partition(
        &self,
        staging_id: &str,
        key: PartitionKey,
        records: &[&CandleRecord],
    ) -> Result<PartitionWrite, StoreError> {
        self.record(format!("stage {key}"));
        if self.fail_write == Some(key.date()) {
            return Err(StoreError::Write {
                root: self.root(),
                key,
                message: "disk full".into(),
            });
        }
        self.inner.stage_partition(staging_id, key, records)
    }

    fn promote_staged(&self, staging_id: &str, key: PartitionKey) -> Result<(), StoreError> {
        self.record(format!("promote {key}"));
        if self.fail_promote == Some(key.date()) {
            return Err(StoreError::Promote {
                root: self.root(),
                key,
                message: "rename: device busy".into(),
            });
        }
        self.inner.promote_staged(staging_id, key)
    }

    fn discard_staging(&self, staging_id: &str) -> Result<(), StoreError> {
        self.record("discard".into());
        self.inner.discard_staging(staging_id)
    }

    fn staging_location(&self, staging_id: &str) -> String {
        self.inner.staging_location(staging_id)
    }
}

/// Run the pipeline with no pacing and the fixed test clock.
pub fn run(
    client: &FakeClient,
    store: &dyn PartitionStore,
    names: &[&str],
    mode: CommitMode,
) -> Result<RunReport, PipelineError> {
    let _ = env_logger::builder().is_test(true).try_init();
    let tickers = tickers(names);
    let throttle = Throttle::disabled();
    let ctx = PipelineContext {
        client,
        store,
        throttle: &throttle,
        progress: &NoProgress,
        tickers: &tickers,
        range: range(),
        fetched_at: fetched_at(),
        commit_mode: mode,
    };
    run_pipeline(&ctx)
}

/// Every partition and its rows, ascending.
pub fn snapshot(store: &LocalPartitionStore) -> Vec<(PartitionKey, Vec<StoredCandle>)> {
    store
        .list_partitions()
        .unwrap()
        .into_iter()
        .map(|k| (k, store.read_partition(k).unwrap()))
        .collect()
}

/// Seed a partition with one stale row for `symbol`.
pub fn seed(store: &LocalPartitionStore, d: u32, symbol: &str, close: f64) -> CandleRecord {
    let c = candle(d, close);
    let record = candlesync_core::data::normalize(&Ticker::new(symbol).unwrap(), &[c], fetched_at())
        .remove(0);
    store
        .write_partition(PartitionKey::new(record.date), &[&record])
        .unwrap();
    record
}
