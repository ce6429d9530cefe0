//! Repair of CSV files written by older collector versions.
//!
//! Those versions wrote weather descriptions verbatim, so a description with
//! a comma shifted every following column and a description with a line
//! break split a row in two. They also recorded local time. The repair
//! rejoins split rows, quotes the description column and converts the
//! timestamp column to UTC, writing `<file>.repaired` next to each input.

use anyhow::{Context, Result, bail};
use chrono::SecondsFormat;
use chrono_tz::Tz;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    model::{CSV_HEADER, Field},
    parse::TimestampParser,
};

const REPAIRED_EXTENSION: &str = "repaired";

#[derive(Debug, Clone)]
pub struct RepairOptions {
    /// Pattern of the timestamp column in the damaged files.
    pub timestamp_format: String,
    /// Zone the damaged files were written in.
    pub source_zone: Tz,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub file: PathBuf,
    pub output: PathBuf,
    pub lines_read: usize,
    pub merged_lines: usize,
    pub requoted_rows: usize,
    pub converted_timestamps: usize,
    /// Rows kept as they were because their timestamp did not parse.
    pub unparsed_timestamps: usize,
}

/// Repair every `*.csv` file directly inside `folder`, in name order.
pub fn repair_folder(folder: &Path, options: &RepairOptions) -> Result<Vec<RepairReport>> {
    let entries = fs::read_dir(folder)
        .with_context(|| format!("Can not read folder '{}'", folder.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        bail!("No CSV files found in folder '{}'", folder.display());
    }

    files.iter().map(|file| repair_file(file, options)).collect()
}

pub fn repair_file(path: &Path, options: &RepairOptions) -> Result<RepairReport> {
    let parser = TimestampParser::new(options.timestamp_format.clone(), options.source_zone)
        .context("Invalid timestamp format")?;

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Could not read file '{}'", path.display()))?;

    let mut report = RepairReport {
        file: path.to_path_buf(),
        output: output_path(path),
        ..RepairReport::default()
    };

    let rows = merge_continuation_lines(&contents, &mut report);
    let mut repaired = String::with_capacity(contents.len());

    for row in rows {
        let line = if row.starts_with("timestamp") {
            row
        } else {
            let row = match quote_text_column(&row) {
                Some(quoted) => {
                    report.requoted_rows += 1;
                    quoted
                }
                None => row,
            };

            match convert_timestamp(&row, &parser) {
                Some(converted) => {
                    report.converted_timestamps += 1;
                    converted
                }
                None => {
                    report.unparsed_timestamps += 1;
                    row
                }
            }
        };

        repaired.push_str(&line);
        repaired.push('\n');
    }

    fs::write(&report.output, repaired)
        .with_context(|| format!("Could not write file '{}'", report.output.display()))?;

    log::info!(
        "Repaired '{}' -> '{}' ({} lines, {} merged, {} requoted, {} timestamps converted)",
        report.file.display(),
        report.output.display(),
        report.lines_read,
        report.merged_lines,
        report.requoted_rows,
        report.converted_timestamps
    );

    Ok(report)
}

fn output_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(REPAIRED_EXTENSION);
    PathBuf::from(name)
}

/// Join lines that start with a comma onto the row before them.
fn merge_continuation_lines(contents: &str, report: &mut RepairReport) -> Vec<String> {
    let mut rows: Vec<String> = Vec::new();

    for line in contents.lines() {
        report.lines_read += 1;
        if line.is_empty() {
            continue;
        }

        match rows.last_mut() {
            Some(previous) if line.starts_with(',') => {
                previous.push_str(line);
                report.merged_lines += 1;
            }
            _ => rows.push(line.to_string()),
        }
    }

    rows
}

/// Quote the description column of a row that has surplus columns.
///
/// Rows with quotes already are assumed to be well formed.
fn quote_text_column(row: &str) -> Option<String> {
    let expected = CSV_HEADER.split(',').count();
    let columns: Vec<&str> = row.split(',').collect();
    if columns.len() <= expected || row.contains('"') {
        return None;
    }

    // +1 for the leading timestamp column
    let text_idx = Field::all()
        .iter()
        .position(|f| *f == Field::WeatherCodeText)
        .map(|idx| idx + 1)?;
    let surplus = columns.len() - expected;
    let text = columns[text_idx..=text_idx + surplus].join(",");

    let mut fixed: Vec<String> = columns[..text_idx].iter().map(|c| c.to_string()).collect();
    fixed.push(format!("\"{text}\""));
    fixed.extend(columns[text_idx + surplus + 1..].iter().map(|c| c.to_string()));

    Some(fixed.join(","))
}

/// Replace the leading local timestamp with its UTC RFC 3339 form.
fn convert_timestamp(row: &str, parser: &TimestampParser) -> Option<String> {
    let (timestamp, rest) = row.split_once(',')?;
    let utc = parser.parse(timestamp).ok()?;

    Some(format!(
        "{},{}",
        utc.to_rfc3339_opts(SecondsFormat::Millis, true),
        rest
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options() -> RepairOptions {
        RepairOptions {
            timestamp_format: "%d.%m.%Y %H:%M".to_string(),
            source_zone: chrono_tz::Etc::GMTMinus1,
        }
    }

    const ROW: &str = "25.11.2013 12:00,3.7,88.0,2.5,9.0,2.0,225.0,SW,5.1,1012.3,25.0,61";

    #[test]
    fn continuation_lines_are_merged() {
        let mut report = RepairReport::default();
        let rows = merge_continuation_lines("a,b\nc\n,d\n\ne", &mut report);

        assert_eq!(rows, vec!["a,b", "c,d", "e"]);
        assert_eq!(report.merged_lines, 1);
        assert_eq!(report.lines_read, 5);
    }

    #[test]
    fn surplus_commas_belong_to_description() {
        let row = format!("{ROW},Regen, leicht,112.0");
        let fixed = quote_text_column(&row).unwrap();

        assert_eq!(fixed, format!("{ROW},\"Regen, leicht\",112.0"));
        assert!(quote_text_column(&format!("{ROW},Regen,112.0")).is_none());
    }

    #[test]
    fn timestamp_is_shifted_to_utc() {
        let parser = TimestampParser::new("%d.%m.%Y %H:%M", chrono_tz::Etc::GMTMinus1).unwrap();
        let converted = convert_timestamp("25.11.2013 12:00,3.7", &parser).unwrap();

        assert_eq!(converted, "2013-11-25T11:00:00.000Z,3.7");
        assert!(convert_timestamp("garbage,3.7", &parser).is_none());
    }

    #[test]
    fn folder_repair_writes_sibling_files() {
        let tmp = TempDir::new().unwrap();
        let damaged = format!("{CSV_HEADER}\n{ROW},Regen\n,leicht,112.0\n{ROW},Nebel,0.0\n");
        fs::write(tmp.path().join("station_2013-11.csv"), damaged).unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let reports = repair_folder(tmp.path(), &options()).unwrap();
        assert_eq!(reports.len(), 1);

        let report = &reports[0];
        assert_eq!(report.merged_lines, 1);
        assert_eq!(report.requoted_rows, 1);
        assert_eq!(report.converted_timestamps, 2);
        assert_eq!(report.unparsed_timestamps, 0);

        let repaired = fs::read_to_string(&report.output).unwrap();
        let lines: Vec<&str> = repaired.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].starts_with("2013-11-25T11:00:00.000Z,3.7,"));
        assert!(lines[1].ends_with(",61,\"Regen,leicht\",112.0"));
        assert!(lines[2].ends_with(",Nebel,0.0"));
        assert!(report.output.ends_with("station_2013-11.csv.repaired"));
    }

    #[test]
    fn empty_folder_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = repair_folder(tmp.path(), &options()).unwrap_err();
        assert!(err.to_string().contains("No CSV files found"));
    }
}
