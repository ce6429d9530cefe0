//! Persistence of the last recorded timestamp.
//!
//! The watermark file holds a single line: the timestamp of the newest row
//! appended to the CSV output, formatted with the configured pattern. It is
//! the only state carried from one collection cycle to the next.
//!
//! The store keeps its own parser pinned to the configured zone. A zone
//! reported by the station changes how readings are parsed, but never how
//! the watermark is written or read back, so a restart compares against the
//! same instant that was saved.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::parse::TimestampParser;

pub const WATERMARK_FILE: &str = "lastTime.52n";

#[derive(Debug, Error)]
#[error("could not save timestamp '{value}' to '{}': {source}", .path.display())]
pub struct WatermarkError {
    pub path: PathBuf,
    pub value: String,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
    timestamps: TimestampParser,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>, timestamps: TimestampParser) -> Self {
        Self { path: path.into(), timestamps }
    }

    /// Store using the standard file name inside `folder`.
    pub fn in_folder(folder: impl AsRef<Path>, timestamps: TimestampParser) -> Self {
        Self::new(folder.as_ref().join(WATERMARK_FILE), timestamps)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render `timestamp` the way it is stored.
    pub fn format(&self, timestamp: DateTime<Utc>) -> String {
        self.timestamps.format(timestamp)
    }

    /// Last recorded timestamp, or the epoch when there is none usable.
    ///
    /// Never fails: a missing, empty or garbled file means "accept the next
    /// reading".
    pub async fn read(&self) -> DateTime<Utc> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "File '{}' could not be found. A new file will be created after successful download of weather data.",
                    self.path.display()
                );
                return DateTime::UNIX_EPOCH;
            }
            Err(e) => {
                log::warn!(
                    "Could not read '{}': {e}. Default value 1970-01-01 will be used.",
                    self.path.display()
                );
                return DateTime::UNIX_EPOCH;
            }
        };

        let line = contents.lines().next().unwrap_or_default().trim();
        if line.is_empty() {
            return DateTime::UNIX_EPOCH;
        }

        match self.timestamps.parse(line) {
            Ok(timestamp) => timestamp,
            Err(e) => {
                log::warn!(
                    "Last timestamp '{line}' in '{}' could not be parsed: {e}. Default value 1970-01-01 will be used.",
                    self.path.display()
                );
                DateTime::UNIX_EPOCH
            }
        }
    }

    /// Replace the stored timestamp.
    ///
    /// Written to a sibling temp file and renamed over the target, so a
    /// crash leaves either the old or the new value.
    pub async fn write(&self, timestamp: DateTime<Utc>) -> Result<(), WatermarkError> {
        let value = self.timestamps.format(timestamp);
        self.write_line(&value).await.map_err(|source| WatermarkError {
            path: self.path.clone(),
            value,
            source,
        })
    }

    async fn write_line(&self, value: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(value.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn parser() -> TimestampParser {
        TimestampParser::new("%d.%m.%Y %H:%M", chrono_tz::UTC).unwrap()
    }

    #[tokio::test]
    async fn absent_file_reads_as_epoch() {
        let tmp = TempDir::new().unwrap();
        let store = WatermarkStore::in_folder(tmp.path(), parser());

        assert_eq!(store.read().await, DateTime::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn empty_or_garbled_file_reads_as_epoch() {
        let tmp = TempDir::new().unwrap();
        let store = WatermarkStore::in_folder(tmp.path(), parser());

        tokio::fs::write(store.path(), "").await.unwrap();
        assert_eq!(store.read().await, DateTime::UNIX_EPOCH);

        tokio::fs::write(store.path(), "yesterday").await.unwrap();
        assert_eq!(store.read().await, DateTime::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn write_then_read() {
        let tmp = TempDir::new().unwrap();
        let store = WatermarkStore::in_folder(tmp.path().join("state"), parser());
        let ts = Utc.with_ymd_and_hms(2013, 11, 25, 12, 0, 0).unwrap();

        store.write(ts).await.unwrap();

        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert_eq!(raw, "25.11.2013 12:00");
        assert_eq!(store.read().await, ts);
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn write_overwrites_previous_value() {
        let tmp = TempDir::new().unwrap();
        let store = WatermarkStore::in_folder(tmp.path(), parser());
        let first = Utc.with_ymd_and_hms(2013, 11, 25, 12, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2013, 11, 25, 12, 4, 0).unwrap();

        store.write(first).await.unwrap();
        store.write(second).await.unwrap();

        assert_eq!(store.read().await, second);
    }

    #[tokio::test]
    async fn unwritable_location_is_reported() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        tokio::fs::write(&blocker, "x").await.unwrap();
        // parent of the watermark is a regular file
        let store = WatermarkStore::in_folder(&blocker, parser());

        let err = store.write(DateTime::UNIX_EPOCH).await.unwrap_err();
        assert!(err.to_string().contains("could not save timestamp"));
    }

    #[tokio::test]
    async fn zone_adopted_elsewhere_does_not_shift_saved_value() {
        let tmp = TempDir::new().unwrap();
        let configured = TimestampParser::new("%d.%m.%Y %H:%M", chrono_tz::Europe::Berlin).unwrap();
        let ts = Utc.with_ymd_and_hms(2013, 11, 25, 12, 0, 0).unwrap();

        // the running collector switched to the station's zone
        let mut station = configured.clone();
        assert!(station.adopt_zone("Europe/London"));

        let store = WatermarkStore::in_folder(tmp.path(), configured.clone());
        store.write(ts).await.unwrap();

        // a restarted process only knows the configured zone
        let restarted = WatermarkStore::in_folder(tmp.path(), configured);
        assert_eq!(restarted.read().await, ts);
        assert_eq!(tokio::fs::read_to_string(restarted.path()).await.unwrap(), "25.11.2013 13:00");
        assert_ne!(station.format(ts), restarted.format(ts));
    }
}
