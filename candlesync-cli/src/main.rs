//! candlesync CLI: sync, partition listing and refresh-token storage.
//!
//! Commands:
//! - `sync`: fetch recent daily candles and replace the affected date partitions
//! - `partitions`: list partitions under a destination with row counts and sizes
//! - `store-token`: append a refresh credential line for later syncs

use anyhow::{Context, Result};
use candlesync_core::data::{
    AccessTokenProvider, FyersClient, LogProgress, RefreshTokenExchange, RefreshTokenStore,
    Throttle,
};
use candlesync_core::domain::DateRange;
use candlesync_core::store::{LocalPartitionStore, PartitionStore};
use candlesync_core::{run_pipeline, PipelineContext, RunOutcome, RunReport, SyncConfig};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "candlesync",
    about = "daily candle sync into a date-partitioned Parquet store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the lookback window for every configured ticker and rewrite its partitions.
    Sync {
        /// Path to a TOML config file.
        #[arg(long, default_value = "candlesync.toml")]
        config: PathBuf,

        /// Override `lookback_days` from the config.
        #[arg(long)]
        lookback_days: Option<i64>,

        /// Override `destination` from the config.
        #[arg(long)]
        destination: Option<PathBuf>,

        /// End of the fetch window (YYYY-MM-DD). Defaults to today (UTC).
        #[arg(long, value_parser = parse_date)]
        today: Option<NaiveDate>,
    },
    /// List partitions with row counts.
    Partitions {
        /// Dataset root.
        #[arg(long, default_value = "data/raw")]
        destination: PathBuf,
    },
    /// Append a refresh token to the credential file.
    StoreToken {
        /// Credential file.
        #[arg(long, default_value = "credentials/refresh_token.txt")]
        path: PathBuf,

        /// Name recorded next to the token.
        #[arg(long)]
        user: String,

        #[arg(long)]
        token: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            config,
            lookback_days,
            destination,
            today,
        } => run_sync(&config, lookback_days, destination, today),
        Commands::Partitions { destination } => run_partitions(&destination),
        Commands::StoreToken { path, user, token } => run_store_token(path, &user, &token),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn run_sync(
    config_path: &Path,
    lookback_days: Option<i64>,
    destination: Option<PathBuf>,
    today: Option<NaiveDate>,
) -> Result<()> {
    let mut config = SyncConfig::from_file(config_path)?;
    if let Some(days) = lookback_days {
        config.lookback_days = days;
    }
    if let Some(dir) = destination {
        config.destination = dir;
    }
    config.validate()?;

    let today = today.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let range = DateRange::lookback(today, config.lookback_days)?;

    let token = RefreshTokenExchange::from_env(config.auth.clone())?
        .access_token()
        .context("could not obtain an access token")?;
    log::info!("Access token obtained");

    let client = FyersClient::new(config.provider.clone(), &config.auth.app_id, token)?;
    let store = LocalPartitionStore::new(&config.destination);
    let throttle = Throttle::new(Duration::from_millis(config.provider.request_delay_ms));

    let ctx = PipelineContext {
        client: &client,
        store: &store,
        throttle: &throttle,
        progress: &LogProgress,
        tickers: &config.tickers,
        range,
        fetched_at: chrono::Utc::now().naive_utc(),
        commit_mode: config.commit_mode,
    };

    let report = run_pipeline(&ctx)?;
    print_summary(&report, &store.root());
    Ok(())
}

fn run_partitions(destination: &Path) -> Result<()> {
    if !destination.exists() {
        println!("Destination does not exist: {}", destination.display());
        return Ok(());
    }

    let store = LocalPartitionStore::new(destination);
    let keys = store.list_partitions()?;
    if keys.is_empty() {
        println!("No partitions under {}", destination.display());
        return Ok(());
    }

    let mut total_rows = 0usize;
    let mut total_size = 0u64;
    println!("{:<18} {:>8} {:>8} {:>10}", "Partition", "Rows", "Symbols", "Size");
    println!("{}", "-".repeat(47));
    for key in &keys {
        let (rows, symbols) = match store.partition_meta(*key) {
            Some(meta) => (meta.row_count, meta.symbols.len()),
            // No sidecar: count from the data itself
            None => {
                let rows = store.read_partition(*key)?;
                let mut symbols: Vec<&str> = rows.iter().map(|r| r.symbol.as_str()).collect();
                symbols.sort_unstable();
                symbols.dedup();
                (rows.len(), symbols.len())
            }
        };
        let size = dir_size(&store.partition_dir(*key));
        total_rows += rows;
        total_size += size;
        println!("{:<18} {:>8} {:>8} {:>10}", key.to_string(), rows, symbols, format_size(size));
    }
    println!();
    println!(
        "{} partition(s), {total_rows} rows, {}",
        keys.len(),
        format_size(total_size)
    );
    Ok(())
}

fn run_store_token(path: PathBuf, user: &str, token: &str) -> Result<()> {
    let store = RefreshTokenStore::new(path);
    store.append(user, token)?;
    println!("Refresh token for '{user}' saved to {}", store.path().display());
    Ok(())
}

fn dir_size(path: &Path) -> u64 {
    let mut size = 0u64;
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            if let Ok(meta) = entry.metadata() {
                size += meta.len();
            }
        }
    }
    size
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn print_summary(report: &RunReport, destination: &str) {
    println!();
    println!("=== Sync Result ===");
    println!("Window:         {}", report.range);
    println!(
        "Tickers:        {} ({} with data, {} empty, {} failed)",
        report.fetch.total, report.fetch.succeeded, report.fetch.empty, report.fetch.failed
    );
    println!("Rows fetched:   {}", report.fetch.rows);
    match &report.outcome {
        RunOutcome::NoData => {
            println!("Store:          untouched (no data)");
        }
        RunOutcome::Written { cleared, written } => {
            println!("Destination:    {destination}");
            println!("Replaced:       {} partition(s)", cleared.len());
            println!(
                "Written:        {} partition(s), {} rows",
                written.partitions.len(),
                written.rows()
            );
        }
    }
    for (ticker, reason) in &report.skipped {
        println!("SKIPPED: {ticker}: {reason}");
    }
    println!();
}
