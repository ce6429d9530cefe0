use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{
    Config,
    config::FieldPaths,
    fetch::FieldFetcher,
    model::{Dataset, Field, FieldKind, FieldValue},
    parse::{TimestampParser, parse_decimal, parse_digits},
};

use super::{CollectorKind, DataCollector, FieldError};

/// Collector for stations that publish every measurement as its own small
/// text file below a common base URL.
#[derive(Debug)]
pub struct MuensterwetterCollector {
    data_url: String,
    paths: FieldPaths,
    timestamps: TimestampParser,
    fetcher: Arc<dyn FieldFetcher>,
}

impl MuensterwetterCollector {
    pub fn new(
        data_url: impl Into<String>,
        paths: FieldPaths,
        timestamps: TimestampParser,
        fetcher: Arc<dyn FieldFetcher>,
    ) -> Self {
        Self { data_url: data_url.into(), paths, timestamps, fetcher }
    }

    pub fn from_config(config: &Config, fetcher: Arc<dyn FieldFetcher>) -> Result<Self> {
        Ok(Self::new(
            config.data_url.clone(),
            config.fields.clone(),
            config.timestamp_parser()?,
            fetcher,
        ))
    }

    fn url_for(&self, suffix: &str) -> String {
        format!("{}{}", self.data_url, suffix)
    }

    async fn fetch_timestamp(&mut self, last_time: DateTime<Utc>) -> DateTime<Utc> {
        let raw = self
            .fetcher
            .fetch(&self.url_for(&self.paths.time))
            .await
            .unwrap_or_default();

        if !self.paths.time_zone.trim().is_empty() {
            let zone_url = self.url_for(&self.paths.time_zone);
            if let Some(zone_id) = self.fetcher.fetch(&zone_url).await {
                self.timestamps.adopt_zone(&zone_id);
            }
        }

        match self.timestamps.parse(&raw) {
            Ok(timestamp) => timestamp,
            Err(e) => {
                log::error!(
                    "Timestamp '{}' could not be parsed ({e}). Stop this collection run",
                    raw.trim()
                );
                last_time
            }
        }
    }

    async fn fetch_field(&self, field: Field) -> Result<FieldValue, FieldError> {
        let url = self.url_for(self.paths.suffix(field));
        let Some(raw) = self.fetcher.fetch(&url).await else {
            return Err(FieldError::Unavailable { url });
        };

        let value = match field.kind() {
            FieldKind::Decimal => FieldValue::Number(parse_decimal(&raw)?),
            FieldKind::Digits => FieldValue::Number(parse_digits(&raw)?),
            FieldKind::Text => FieldValue::Text(raw.trim().to_string()),
        };

        Ok(value)
    }
}

#[async_trait]
impl DataCollector for MuensterwetterCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Muensterwetter
    }

    fn timestamps(&self) -> &TimestampParser {
        &self.timestamps
    }

    async fn build_dataset(&mut self, last_time: DateTime<Utc>) -> Dataset {
        let timestamp = self.fetch_timestamp(last_time).await;
        let mut dataset = Dataset::new(timestamp);

        // skip requesting if data is not new
        if !dataset.is_newer_than(last_time) {
            return dataset;
        }

        for &field in Field::all() {
            match self.fetch_field(field).await {
                Ok(value) => dataset.set(field, value),
                Err(e) => {
                    log::warn!("Field '{field}' left unset: {e}");
                    dataset.mark_missing(field);
                }
            }
        }

        log::debug!("Created new dataset: {dataset:?}");
        dataset
    }
}
