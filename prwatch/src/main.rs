//! prwatch - AI coding agent PR tracker
//!
//! Fetches PR counts per agent, appends them to the data table, and
//! regenerates the chart, README, and dashboard.

mod process_lock;
mod status;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use prwatch_core::{
    publisher_for, BlockingSearchClient, Config, DataStore, History, NoopPublisher, Pipeline,
    Publisher,
};

use crate::process_lock::acquire_run_lock;

#[derive(Parser)]
#[command(name = "prwatch")]
#[command(about = "Track pull requests opened and merged by AI coding agents")]
#[command(version)]
struct Cli {
    /// Config file (default: ./prwatch.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, store, render, and publish
    Run {
        /// Date to record (default: today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Skip the publisher even if enabled in config
        #[arg(long)]
        no_publish: bool,
    },
    /// Fetch and store only
    Collect {
        /// Date to record (default: today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Re-render artifacts from the stored table (no network)
    Render,
    /// Print the latest stats from the stored table
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, base_dir) = load_config(cli.config.as_deref())?;
    match cli.verbose {
        0 => {}
        1 => config.logging.level = "debug".to_string(),
        _ => config.logging.level = "trace".to_string(),
    }

    let log_guard =
        prwatch_core::logging::init(&config.logging).context("failed to initialize logging")?;

    config.output = config.output.rebased(&base_dir);
    tracing::debug!(
        base_dir = %base_dir.display(),
        log_dir = %log_guard.log_dir().display(),
        "Resolved paths"
    );

    let result = match cli.command {
        Command::Run { date, no_publish } => run(&config, &base_dir, date, no_publish),
        Command::Collect { date } => collect(&config, date),
        Command::Render => render(&config),
        Command::Status { json } => status::print(&config, json),
    };
    if let Err(e) = &result {
        let message = format!("{e:#}");
        tracing::error!(error = %message, "Command failed");
    }
    result
}

/// Load the config and pick the directory output paths are relative to.
///
/// With `--config`, paths resolve against the config file's directory;
/// otherwise against the working directory.
fn load_config(path: Option<&Path>) -> Result<(Config, PathBuf)> {
    let cwd = std::env::current_dir().context("failed to read working directory")?;
    match path {
        Some(path) => {
            let config = Config::load_from(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?;
            let base = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| cwd.join(p))
                .unwrap_or(cwd);
            Ok((config, base))
        }
        None => {
            let config = Config::load().context("failed to load configuration")?;
            Ok((config, cwd))
        }
    }
}

fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

fn run(config: &Config, base_dir: &Path, date: Option<NaiveDate>, no_publish: bool) -> Result<()> {
    let _lock = acquire_run_lock(&config.output.data_file)?;
    let date = date.unwrap_or_else(today);

    let client =
        BlockingSearchClient::new(config.github.clone()).context("failed to create API client")?;
    let publisher: Box<dyn Publisher> = if no_publish {
        Box::new(NoopPublisher)
    } else {
        publisher_for(&config.publish, base_dir)
    };

    let report = Pipeline::new(config)
        .run(&client, publisher.as_ref(), date)
        .context("run failed")?;

    println!(
        "Run {} for {}: {} agents refreshed, {} failed, {} files changed",
        report.run_id,
        report.date,
        report.fetched.len(),
        report.failed.len(),
        report.changed.len()
    );
    for failure in &report.failed {
        println!("  {} kept previous values: {}", failure.agent, failure.message);
    }
    Ok(())
}

fn collect(config: &Config, date: Option<NaiveDate>) -> Result<()> {
    let _lock = acquire_run_lock(&config.output.data_file)?;
    let date = date.unwrap_or_else(today);

    let client =
        BlockingSearchClient::new(config.github.clone()).context("failed to create API client")?;
    let report = Pipeline::new(config)
        .collect(&client, date)
        .context("collect failed")?;

    println!(
        "Collected {} agents for {} ({} failed)",
        report.fetched.len(),
        report.date,
        report.failed.len()
    );
    for failure in &report.failed {
        println!("  {}: {}", failure.agent, failure.message);
    }
    Ok(())
}

fn render(config: &Config) -> Result<()> {
    let _lock = acquire_run_lock(&config.output.data_file)?;
    let history = load_history(config)?;
    let refreshed = current_agents(&history, config);
    let report = Pipeline::new(config)
        .render(&history, &refreshed)
        .context("render failed")?;

    println!("Rendered artifacts: {} changed", report.changed.len());
    for path in &report.changed {
        println!("  {}", path.display());
    }
    Ok(())
}

/// Agents whose latest row is on the table's latest date.
pub(crate) fn current_agents(history: &History, config: &Config) -> HashSet<String> {
    let Some(latest) = history.latest_date() else {
        return HashSet::new();
    };
    config
        .agents()
        .into_iter()
        .filter(|a| history.get(latest, &a.key).is_some())
        .map(|a| a.key)
        .collect()
}

pub(crate) fn load_history(config: &Config) -> Result<History> {
    DataStore::new(&config.output.data_file)
        .load()
        .context("failed to load data table")
}
