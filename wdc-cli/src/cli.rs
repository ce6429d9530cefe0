use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use wdc_core::{
    CollectionCycle, Config, CycleOutcome, HttpFetcher, Scheduler,
    collector::collector_from_config,
    parse::parse_zone,
    repair::{RepairOptions, repair_folder},
};

use crate::prompt;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "wdc", version, about = "Weather data collector")]
pub struct Cli {
    /// Use this config file instead of the one in the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug output.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Collect periodically until interrupted with Ctrl-C.
    Run,

    /// Run a single collection cycle.
    Once,

    /// Fetch the current reading and print it as JSON without storing it.
    Fetch,

    /// Show the last stored timestamp and the current output file.
    Status,

    /// Edit the main settings interactively.
    Configure,

    /// Fix CSV files written by older versions (unquoted descriptions,
    /// local timestamps). Writes `<file>.repaired` next to each file.
    Repair {
        /// Folder containing the damaged `*.csv` files.
        folder: PathBuf,

        /// Timestamp pattern of the damaged files; defaults to the configured one.
        #[arg(long)]
        timestamp_format: Option<String>,

        /// Zone the damaged files were written in.
        #[arg(long, default_value = "Etc/GMT-1")]
        source_zone: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => {
                let path = match self.config {
                    Some(path) => path,
                    None => Config::config_file_path()?,
                };
                prompt::configure(&path)
            }
            Command::Repair { folder, timestamp_format, source_zone } => {
                let timestamp_format = match timestamp_format {
                    Some(format) => format,
                    None => load_config(self.config.as_ref())?.timestamp_format,
                };
                let options = RepairOptions {
                    timestamp_format,
                    source_zone: parse_zone(&source_zone).context("Invalid --source-zone")?,
                };
                repair(&folder, &options)
            }
            Command::Run => run_daemon(&valid_config(self.config.as_ref())?).await,
            Command::Once => run_once(&valid_config(self.config.as_ref())?).await,
            Command::Fetch => fetch(&valid_config(self.config.as_ref())?).await,
            Command::Status => status(&valid_config(self.config.as_ref())?).await,
        }
    }
}

fn load_config(explicit: Option<&PathBuf>) -> Result<Config> {
    match explicit {
        Some(path) => {
            log::info!("Load settings from {}", path.display());
            Config::load_from(path)
        }
        None => Config::load_or_init(),
    }
}

fn valid_config(explicit: Option<&PathBuf>) -> Result<Config> {
    let config = load_config(explicit)?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn log_metadata(config: &Config) {
    log::info!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    log::info!("Collector: {} reading {}", config.collector, config.data_url);
    log::info!("Interval: {} minutes", config.interval_minutes);
    log::info!(
        "Output: {}/{}_{}.csv, watermark {}",
        config.output_folder.display(),
        config.output_prefix,
        config.output_date_format,
        config.watermark_path().display()
    );
}

async fn run_daemon(config: &Config) -> Result<()> {
    log_metadata(config);

    let scheduler = Arc::new(Scheduler::from_config(config, Arc::new(HttpFetcher::new()))?);
    let cancel = CancellationToken::new();
    let timer = Arc::clone(&scheduler).spawn(cancel.clone());

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    log::info!("Shutting down, waiting for a running collection to finish");

    cancel.cancel();
    timer.await.context("Collection task failed")?;

    Ok(())
}

async fn run_once(config: &Config) -> Result<()> {
    log_metadata(config);

    let mut cycle = CollectionCycle::from_config(config, Arc::new(HttpFetcher::new()))?;
    let outcome = cycle.run().await;
    println!("{outcome}");

    if let CycleOutcome::AppendFailed { .. } = outcome {
        bail!("The dataset could not be stored");
    }

    Ok(())
}

async fn fetch(config: &Config) -> Result<()> {
    let mut collector = collector_from_config(config, Arc::new(HttpFetcher::new()))?;
    let dataset = collector.build_dataset(DateTime::UNIX_EPOCH).await;

    if dataset.timestamp == DateTime::UNIX_EPOCH {
        bail!("The station did not report a usable timestamp");
    }

    let json = serde_json::to_string_pretty(&dataset).context("Failed to serialize dataset")?;
    println!("{json}");

    Ok(())
}

async fn status(config: &Config) -> Result<()> {
    let cycle = CollectionCycle::from_config(config, Arc::new(HttpFetcher::new()))?;
    let timestamps = cycle.collector().timestamps();
    let last = cycle.watermark().read().await;

    let last = if last == DateTime::UNIX_EPOCH {
        "none".to_string()
    } else {
        cycle.watermark().format(last)
    };

    println!("Collector:      {}", cycle.collector().kind());
    println!("Watermark file: {}", cycle.watermark().path().display());
    println!("Last stored:    {last}");
    println!(
        "Output file:    {}",
        cycle.output().file_path(Utc::now(), timestamps).display()
    );

    Ok(())
}

fn repair(folder: &std::path::Path, options: &RepairOptions) -> Result<()> {
    for report in repair_folder(folder, options)? {
        println!(
            "{} -> {}: {} lines, {} merged, {} requoted, {} converted, {} left as is",
            report.file.display(),
            report.output.display(),
            report.lines_read,
            report.merged_lines,
            report.requoted_rows,
            report.converted_timestamps,
            report.unparsed_timestamps
        );
    }

    Ok(())
}
