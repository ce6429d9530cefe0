//! Core library for the `wdc` weather data collector.
//!
//! This crate defines:
//! - Configuration loading and validation
//! - Fetching and parsing of per-field station endpoints
//! - The collection cycle (watermark, dataset, CSV append) and its scheduler
//! - Repair of CSV files written by older versions
//!
//! It is used by `wdc-cli`, but can also be embedded in other services.

pub mod collector;
pub mod config;
pub mod cycle;
pub mod fetch;
pub mod model;
pub mod output;
pub mod parse;
pub mod repair;
pub mod scheduler;
pub mod watermark;

pub use collector::{CollectorKind, DataCollector};
pub use config::{Config, FieldPaths};
pub use cycle::{CollectionCycle, CycleOutcome};
pub use fetch::{FieldFetcher, HttpFetcher};
pub use model::{CSV_HEADER, Dataset, Field, FieldValue};
pub use output::CsvAppender;
pub use parse::TimestampParser;
pub use scheduler::Scheduler;
pub use watermark::WatermarkStore;
