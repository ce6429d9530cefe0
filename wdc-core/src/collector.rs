use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{convert::TryFrom, fmt::Debug, sync::Arc};
use thiserror::Error;

use crate::{
    Config, Dataset,
    collector::muensterwetter::MuensterwetterCollector,
    fetch::FieldFetcher,
    parse::{ParseError, TimestampParser},
};

pub mod muensterwetter;

/// Known collector implementations, selected by the `collector` config key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectorKind {
    Muensterwetter,
}

impl CollectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectorKind::Muensterwetter => "muensterwetter",
        }
    }

    pub const fn all() -> &'static [CollectorKind] {
        &[CollectorKind::Muensterwetter]
    }
}

impl std::fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for CollectorKind {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.trim().to_lowercase();

        match lower.as_str() {
            // Configurations written by earlier releases name the implementation class.
            "muensterwetter" | "org.n52.sensorweb.wdc.ms.muensterwetterrealtimecollector" => {
                Ok(CollectorKind::Muensterwetter)
            }
            _ => Err(anyhow!(
                "Unknown collector '{value}'. Supported collectors: muensterwetter."
            )),
        }
    }
}

/// Why a single field ended up without a value.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("no response from {url}")]
    Unavailable { url: String },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Builds one [`Dataset`] per collection cycle.
#[async_trait]
pub trait DataCollector: Send + Sync + Debug {
    fn kind(&self) -> CollectorKind;

    /// Parser in its current state; the zone may change while building.
    fn timestamps(&self) -> &TimestampParser;

    /// Fetch a reading, skipping all but the timestamp request when the
    /// station has nothing newer than `last_time`.
    ///
    /// An unusable remote timestamp yields `last_time`, so the result is
    /// never newer in that case.
    async fn build_dataset(&mut self, last_time: DateTime<Utc>) -> Dataset;
}

/// Construct the configured collector.
pub fn collector_from_config(
    config: &Config,
    fetcher: Arc<dyn FieldFetcher>,
) -> anyhow::Result<Box<dyn DataCollector>> {
    let boxed: Box<dyn DataCollector> = match config.collector_kind()? {
        CollectorKind::Muensterwetter => {
            Box::new(MuensterwetterCollector::from_config(config, fetcher)?)
        }
    };

    Ok(boxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FakeFetcher;

    #[test]
    fn collector_kind_as_str_roundtrip() {
        for kind in CollectorKind::all() {
            let parsed = CollectorKind::try_from(kind.as_str()).expect("roundtrip should succeed");
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn implementation_class_name_is_accepted() {
        let kind =
            CollectorKind::try_from("org.n52.sensorweb.wdc.ms.MuensterwetterRealTimeCollector")
                .unwrap();
        assert_eq!(kind, CollectorKind::Muensterwetter);
    }

    #[test]
    fn unknown_collector_error() {
        let err = CollectorKind::try_from("doesnotexist").unwrap_err();
        assert!(err.to_string().contains("Unknown collector"));
    }

    #[test]
    fn collector_from_default_config() {
        let collector =
            collector_from_config(&Config::default(), Arc::new(FakeFetcher::default())).unwrap();
        assert_eq!(collector.kind(), CollectorKind::Muensterwetter);
        assert_eq!(collector.timestamps().pattern(), "%d.%m.%Y %H:%M");
    }
}
