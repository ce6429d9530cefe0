//! One collection cycle: read watermark, build dataset, compare, append,
//! advance watermark.
//!
//! ```text
//! Idle -> FetchingTimestamp -> NotNewer -> Idle
//!                           -> FetchingFields -> Appending -> UpdatingWatermark -> Idle
//!                                                          -> AppendFailed -> Idle
//! ```

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::{fmt, path::PathBuf, sync::Arc};

use crate::{
    Config,
    collector::{DataCollector, collector_from_config},
    fetch::FieldFetcher,
    output::CsvAppender,
    watermark::WatermarkStore,
};

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The station had nothing newer than the watermark; nothing was written.
    NotNewer {
        last: DateTime<Utc>,
        remote: DateTime<Utc>,
    },
    /// A row was appended. If the watermark could not be saved the same
    /// reading will be appended again by the next cycle.
    Appended {
        timestamp: DateTime<Utc>,
        file: PathBuf,
        watermark_saved: bool,
    },
    /// The row could not be stored; the watermark was left as it was.
    AppendFailed { timestamp: DateTime<Utc> },
}

impl CycleOutcome {
    pub fn appended(&self) -> bool {
        matches!(self, CycleOutcome::Appended { .. })
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::NotNewer { last, .. } => write!(f, "no newer data than {last}"),
            CycleOutcome::Appended { timestamp, file, watermark_saved: true } => {
                write!(f, "appended {timestamp} to {}", file.display())
            }
            CycleOutcome::Appended { timestamp, file, watermark_saved: false } => {
                write!(f, "appended {timestamp} to {} (watermark not saved)", file.display())
            }
            CycleOutcome::AppendFailed { timestamp } => write!(f, "failed to store {timestamp}"),
        }
    }
}

/// Owns everything a cycle touches. Not meant to be shared; the scheduler
/// serializes access to it.
#[derive(Debug)]
pub struct CollectionCycle {
    collector: Box<dyn DataCollector>,
    watermark: WatermarkStore,
    output: CsvAppender,
}

impl CollectionCycle {
    pub fn new(
        collector: Box<dyn DataCollector>,
        watermark: WatermarkStore,
        output: CsvAppender,
    ) -> Self {
        Self { collector, watermark, output }
    }

    pub fn from_config(config: &Config, fetcher: Arc<dyn FieldFetcher>) -> Result<Self> {
        Ok(Self::new(
            collector_from_config(config, fetcher)?,
            WatermarkStore::new(config.watermark_path(), config.timestamp_parser()?),
            CsvAppender::from_config(config)?,
        ))
    }

    pub fn collector(&self) -> &dyn DataCollector {
        self.collector.as_ref()
    }

    pub fn watermark(&self) -> &WatermarkStore {
        &self.watermark
    }

    pub fn output(&self) -> &CsvAppender {
        &self.output
    }

    pub async fn run(&mut self) -> CycleOutcome {
        log::info!("** Collecting with {}", self.collector.kind());

        let last = self.watermark.read().await;
        let dataset = self.collector.build_dataset(last).await;
        let timestamps = self.collector.timestamps();

        if !dataset.is_newer_than(last) {
            log::info!(
                "No newer data available. Last timestamp: '{}'. Time now: '{}'",
                timestamps.format(last),
                timestamps.format(Utc::now())
            );
            return CycleOutcome::NotNewer { last, remote: dataset.timestamp };
        }

        let file = match self.output.append(&dataset, timestamps).await {
            Ok(file) => file,
            Err(e) => {
                log::error!("New data could not be stored to file: {e}. Please fix it!");
                log::debug!("Dropped dataset: {dataset:?}");
                return CycleOutcome::AppendFailed { timestamp: dataset.timestamp };
            }
        };

        // The row is already on disk; a failed save only risks a duplicate row.
        let watermark_saved = match self.watermark.write(dataset.timestamp).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("{e}. The next cycle may append this record again.");
                false
            }
        };

        log::info!(
            "Stored dataset of '{}' in '{}'",
            timestamps.format(dataset.timestamp),
            file.display()
        );

        CycleOutcome::Appended { timestamp: dataset.timestamp, file, watermark_saved }
    }
}
