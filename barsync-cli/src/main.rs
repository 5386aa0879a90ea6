//! Barsync CLI — keep local OHLCV datasets current.
//!
//! Commands:
//! - `sync` — reconcile every configured (symbol, timeframe) pair with Yahoo Finance
//! - `status` — report the local cursor of every pair, no network access
//! - `config` — print the effective configuration as TOML

use anyhow::{Context, Result};
use barsync_core::clock::MarketClock;
use barsync_core::data::YahooProvider;
use barsync_core::sync::{pair_status, PairOutcome, PairResult, SyncProgress};
use barsync_core::{SyncConfig, SyncSummary, Synchronizer};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "barsync.toml";

#[derive(Parser)]
#[command(
    name = "barsync",
    about = "Barsync — incremental OHLCV dataset reconciler"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and merge new bars for every configured pair.
    Sync {
        /// Path to a TOML config file. Defaults to ./barsync.toml if present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the configured symbols (comma separated).
        #[arg(long, value_delimiter = ',')]
        symbols: Option<Vec<String>>,

        /// Override the configured output root.
        #[arg(long)]
        output_root: Option<PathBuf>,

        /// Exit with status 1 if any pair failed.
        #[arg(long, default_value_t = false)]
        strict: bool,

        /// Print the run summary as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Report the local state of every configured pair.
    Status {
        /// Path to a TOML config file. Defaults to ./barsync.toml if present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the effective configuration as TOML.
    Config {
        /// Path to a TOML config file. Defaults to ./barsync.toml if present.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            config,
            symbols,
            output_root,
            strict,
            json,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(symbols) = symbols {
                config.symbols = symbols;
            }
            if let Some(root) = output_root {
                config.output_root = root;
            }
            config.validate().context("invalid configuration")?;

            let summary = run_sync(&config, json)?;
            if strict && summary.any_failed() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Status { config, json } => run_status(&load_config(config.as_deref())?, json),
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Explicit path, else `./barsync.toml` when present, else built-in defaults.
fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    if let Some(path) = path {
        return SyncConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }

    let local = Path::new(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return SyncConfig::from_file(local)
            .with_context(|| format!("failed to load config {}", local.display()));
    }

    Ok(SyncConfig::default())
}

fn run_sync(config: &SyncConfig, json: bool) -> Result<SyncSummary> {
    let clock = config.clock()?;
    let provider = YahooProvider::new(clock.timezone()).context("failed to build HTTP client")?;

    let synchronizer = Synchronizer::new(config, &provider, &clock);
    let summary = synchronizer.run_with_progress(&ConsoleProgress);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(summary)
}

fn run_status(config: &SyncConfig, json: bool) -> Result<()> {
    let clock = config.clock()?;
    let statuses = pair_status(config, &clock);

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    println!(
        "{:<8} {:<12} {:<11} {:<20} {}",
        "Symbol", "Timeframe", "State", "Last", "Path"
    );
    println!("{}", "-".repeat(80));
    for s in &statuses {
        let last = s.last.map(|t| t.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "{:<8} {:<12} {:<11} {:<20} {}",
            s.symbol,
            s.timeframe,
            s.state,
            last,
            s.path.display()
        );
        if let Some(detail) = &s.detail {
            println!("         {detail}");
        }
    }
    Ok(())
}

/// Progress lines on stderr so `--json` output stays clean.
struct ConsoleProgress;

impl SyncProgress for ConsoleProgress {
    fn on_pair_start(&self, symbol: &str, timeframe: &str, index: usize, total: usize) {
        eprintln!("[{}/{}] {symbol} {timeframe}...", index + 1, total);
    }

    fn on_pair_complete(&self, result: &PairResult, _index: usize, _total: usize) {
        eprintln!("  {}", describe(&result.outcome));
    }
}

fn describe(outcome: &PairOutcome) -> String {
    match outcome {
        PairOutcome::Written {
            report,
            cold,
            merge_degraded,
            ..
        } => {
            let mut line = format!(
                "saved {} rows ({} new)",
                report.rows_after,
                report.new_rows()
            );
            if let Some(last) = report.last_timestamp {
                line.push_str(&format!(", last {last}"));
            }
            if *cold {
                line.push_str(", full download");
            }
            if *merge_degraded {
                line.push_str(", existing data discarded");
            }
            if let Some(err) = &report.verify_error {
                line.push_str(&format!(", VERIFY FAILED: {err}"));
            }
            line
        }
        PairOutcome::UpToDate { last } => format!("up to date (last {last})"),
        PairOutcome::NoNewData => "no new data".into(),
        PairOutcome::FetchFailed { error } => format!("FETCH FAILED: {error}"),
        PairOutcome::PersistFailed { error } => format!("SAVE FAILED: {error}"),
    }
}

fn print_summary(summary: &SyncSummary) {
    println!();
    println!("=== Sync Summary ===");
    println!("Pairs:          {}", summary.total);
    println!("Written:        {}", summary.written);
    println!("Up to date:     {}", summary.up_to_date);
    println!("No new data:    {}", summary.no_new_data);
    println!("Failed:         {}", summary.failed);

    let failures: Vec<_> = summary
        .results
        .iter()
        .filter(|r| r.outcome.is_failure())
        .collect();
    if !failures.is_empty() {
        println!();
        for r in failures {
            println!("  {} {}: {}", r.symbol, r.timeframe, describe(&r.outcome));
        }
    }
}
