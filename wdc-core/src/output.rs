use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

use crate::{
    Config,
    model::{CSV_HEADER, Dataset},
    parse::{ParseError, TimestampParser, check_pattern},
};

/// Failures that abort storing a record.
///
/// Each of them leaves the watermark untouched, so the record is offered
/// again by the next cycle.
#[derive(Debug, Error)]
pub enum AppendError {
    #[error("CSV output file '{}' could not be created: {source}", .path.display())]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not append new line to CSV file '{}': {source}", .path.display())]
    AppendRow {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not serialize dataset: {0}")]
    Serialize(#[from] csv::Error),
}

/// Append-only writer for the CSV files, one file per date bucket.
///
/// File names are `<prefix>_<date part>.csv`; the first line of a new file
/// is [`CSV_HEADER`] and every append adds a line break followed by one row.
#[derive(Debug, Clone)]
pub struct CsvAppender {
    folder: PathBuf,
    prefix: String,
    date_format: String,
}

impl CsvAppender {
    pub fn new(
        folder: impl Into<PathBuf>,
        prefix: impl Into<String>,
        date_format: impl Into<String>,
    ) -> Result<Self, ParseError> {
        let date_format = date_format.into();
        check_pattern(&date_format)?;

        Ok(Self { folder: folder.into(), prefix: prefix.into(), date_format })
    }

    pub fn from_config(config: &Config) -> Result<Self, ParseError> {
        Self::new(
            config.output_folder.clone(),
            config.output_prefix.clone(),
            config.output_date_format.clone(),
        )
    }

    /// File that a record taken at `timestamp` belongs to.
    pub fn file_path(&self, timestamp: DateTime<Utc>, timestamps: &TimestampParser) -> PathBuf {
        let date_part = timestamps.format_with(timestamp, &self.date_format);
        self.folder.join(format!("{}_{}.csv", self.prefix, date_part))
    }

    /// Create `path` holding only the header unless it already exists.
    ///
    /// A file left empty or with a cut-off header by an earlier failure gets
    /// its header rewritten; a file whose header write fails is removed, so
    /// no row is ever appended to a file without a header.
    ///
    /// Returns whether the header was written.
    pub async fn ensure_file(&self, path: &Path) -> Result<bool, AppendError> {
        let create_err = |source| AppendError::CreateFile { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(create_err)?;
            }
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if !has_partial_header(path).await.map_err(create_err)? {
                    return Ok(false);
                }
                log::warn!("CSV output file '{}' has no complete header, rewriting it", path.display());
                OpenOptions::new()
                    .write(true)
                    .truncate(true)
                    .open(path)
                    .await
                    .map_err(create_err)?
            }
            Err(e) => return Err(create_err(e)),
        };

        if let Err(e) = write_header(&mut file).await {
            drop(file);
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(rm) if rm.kind() == std::io::ErrorKind::NotFound => {}
                Err(rm) => log::warn!("Could not remove incomplete file '{}': {rm}", path.display()),
            }
            return Err(create_err(e));
        }

        Ok(true)
    }

    /// Append one serialized row to an existing file.
    pub async fn append_row(&self, path: &Path, row: &str) -> Result<(), AppendError> {
        let append_err = |source| AppendError::AppendRow { path: path.to_path_buf(), source };

        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .await
            .map_err(append_err)?;

        let line = format!("\n{row}");
        file.write_all(line.as_bytes()).await.map_err(append_err)?;
        file.flush().await.map_err(append_err)?;
        file.sync_data().await.map_err(append_err)?;

        Ok(())
    }

    /// Store `dataset` in its bucket file, creating the file on first use.
    pub async fn append(
        &self,
        dataset: &Dataset,
        timestamps: &TimestampParser,
    ) -> Result<PathBuf, AppendError> {
        let row = dataset.to_csv_row(timestamps)?;
        let path = self.file_path(dataset.timestamp, timestamps);

        if self.ensure_file(&path).await? {
            log::info!("Created CSV output file '{}'", path.display());
        }
        self.append_row(&path, &row).await?;

        log::debug!("Appended '{row}' to '{}'", path.display());
        Ok(path)
    }
}

async fn write_header(file: &mut tokio::fs::File) -> std::io::Result<()> {
    file.write_all(CSV_HEADER.as_bytes()).await?;
    file.flush().await?;
    file.sync_data().await
}

/// Whether the file is shorter than the header and holds only its beginning.
async fn has_partial_header(path: &Path) -> std::io::Result<bool> {
    let len = tokio::fs::metadata(path).await?.len();
    if len >= CSV_HEADER.len() as u64 {
        return Ok(false);
    }

    let contents = tokio::fs::read(path).await?;
    Ok(CSV_HEADER.as_bytes().starts_with(&contents))
}
