//! Fetch → normalize → reconcile → write.
//!
//! Everything a run needs is passed in through [`PipelineContext`], built once
//! by the caller. The pipeline itself is synchronous and single-threaded.
//!
//! Overlapping runs against the same destination are not serialized here; a
//! lock keyed by destination belongs outside this module.

use crate::config::ConfigError;
use crate::data::auth::AuthError;
use crate::data::fetch_loop::{FetchLoop, FetchSummary};
use crate::data::normalize::build_batch;
use crate::data::provider::{FetchError, FetchProgress, MarketDataClient};
use crate::data::throttle::Throttle;
use crate::domain::{Batch, DateRange, DateRangeError, Ticker};
use crate::store::{self, PartitionStore, StoreError, WriteReport};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How fresh partitions replace stale ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// Delete every re-fetched partition, then write the batch.
    #[default]
    DeleteThenWrite,
    /// Write the batch to a staging area, then swap partitions in one by one.
    Staged,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    DateRange(#[from] DateRangeError),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("fetch aborted: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Collaborators and inputs of one run.
pub struct PipelineContext<'a> {
    pub client: &'a dyn MarketDataClient,
    pub store: &'a dyn PartitionStore,
    pub throttle: &'a Throttle,
    pub progress: &'a dyn FetchProgress,
    pub tickers: &'a [Ticker],
    pub range: DateRange,
    /// Shared by every record of the run.
    pub fetched_at: NaiveDateTime,
    pub commit_mode: CommitMode,
}

/// How the run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No ticker produced rows; the store was not touched.
    NoData,
    Written {
        cleared: Vec<NaiveDate>,
        written: WriteReport,
    },
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub range: DateRange,
    pub fetch: FetchSummary,
    /// Tickers that contributed nothing, with the reason.
    pub skipped: Vec<(Ticker, String)>,
    pub outcome: RunOutcome,
}

/// Run the whole pipeline once.
pub fn run_pipeline(ctx: &PipelineContext<'_>) -> Result<RunReport, PipelineError> {
    log::info!("Fetching data from {} to {}...", ctx.range.from(), ctx.range.to());

    let outcomes = FetchLoop::new(ctx.client, ctx.throttle, ctx.progress).run(ctx.tickers, ctx.range)?;
    let fetch = FetchSummary::from_outcomes(&outcomes);
    let skipped = outcomes
        .iter()
        .filter(|o| !o.has_rows())
        .map(|o| {
            let reason = match &o.result {
                Ok(_) => "no candles returned".to_string(),
                Err(e) => e.to_string(),
            };
            (o.ticker.clone(), reason)
        })
        .collect();

    let batch = build_batch(&outcomes, ctx.fetched_at);
    if batch.is_empty() {
        log::warn!("No data was fetched. Leaving {} untouched.", ctx.store.root());
        return Ok(RunReport {
            range: ctx.range,
            fetch,
            skipped,
            outcome: RunOutcome::NoData,
        });
    }

    log::info!(
        "Batch created: {} rows, {} symbol(s), {} date(s)",
        batch.len(),
        batch.symbols().len(),
        batch.partition_keys().len()
    );

    let (cleared, written) = match ctx.commit_mode {
        CommitMode::DeleteThenWrite => {
            let cleared = store::reconcile(&batch, ctx.store)?;
            let written = store::write(&batch, ctx.store)?;
            (cleared, written)
        }
        CommitMode::Staged => commit_staged(&batch, ctx.store, &staging_id(ctx.fetched_at))?,
    };

    Ok(RunReport {
        range: ctx.range,
        fetch,
        skipped,
        outcome: RunOutcome::Written { cleared, written },
    })
}

fn staging_id(fetched_at: NaiveDateTime) -> String {
    format!("run-{}", fetched_at.format("%Y%m%dT%H%M%S%.3f"))
}

/// Stage the whole batch, then replace partitions one at a time.
///
/// A staging failure leaves the live dataset untouched.
fn commit_staged(
    batch: &Batch,
    store: &dyn PartitionStore,
    staging_id: &str,
) -> Result<(Vec<NaiveDate>, WriteReport), StoreError> {
    let staged = match store::stage(batch, store, staging_id) {
        Ok(report) => report,
        Err(e) => {
            if let Err(cleanup) = store.discard_staging(staging_id) {
                log::warn!("Could not clean up staging area {staging_id}: {cleanup}");
            }
            return Err(e);
        }
    };

    let mut cleared = Vec::new();
    let mut written = WriteReport::default();
    for partition in staged.partitions {
        if store.exists(partition.key)? {
            cleared.push(partition.key.date());
        }
        store.promote_staged(staging_id, partition.key).map_err(|e| {
            log::error!(
                "Commit stopped at {}; {} partition(s) already swapped in. \
                 Uncommitted data left at {}",
                partition.key,
                written.partitions.len(),
                store.staging_location(staging_id)
            );
            e
        })?;
        log::info!("  - Partition {} committed ({} rows)", partition.key, partition.rows);
        written.partitions.push(store::PartitionWrite {
            key: partition.key,
            rows: partition.rows,
            path: std::path::Path::new(&store.root())
                .join(partition.key.dir_name())
                .display()
                .to_string(),
        });
    }
    store.discard_staging(staging_id)?;
    Ok((cleared, written))
}
