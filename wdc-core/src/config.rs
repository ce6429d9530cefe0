use anyhow::{Context, Result, anyhow, bail};
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    collector::CollectorKind,
    model::Field,
    parse::{TimestampParser, check_pattern, parse_zone},
    watermark::WATERMARK_FILE,
};

/// URL suffixes appended to `data_url`, one per endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldPaths {
    pub time: String,
    /// Endpoint reporting the station's time zone id; empty to disable.
    pub time_zone: String,
    pub air_temperature: String,
    pub relative_humidity: String,
    pub wind_speed: String,
    pub wind_speed_kmh: String,
    pub wind_speed_bft: String,
    pub wind_max_gust: String,
    pub wind_direction_degree: String,
    pub wind_direction: String,
    pub air_pressure: String,
    pub visibility: String,
    pub weather_code: String,
    pub weather_code_text: String,
    pub global_radiation: String,
}

impl Default for FieldPaths {
    fn default() -> Self {
        Self {
            time: "time.txt".into(),
            time_zone: "timezone.txt".into(),
            air_temperature: "airTemperature.txt".into(),
            relative_humidity: "relativeHumidity.txt".into(),
            wind_speed: "windspeed.txt".into(),
            wind_speed_kmh: "windspeedKmh.txt".into(),
            wind_speed_bft: "windspeedBft.txt".into(),
            wind_max_gust: "windMax10min.txt".into(),
            wind_direction_degree: "windDirectionDeg.txt".into(),
            wind_direction: "windDirection.txt".into(),
            air_pressure: "airPressure.txt".into(),
            visibility: "visibility.txt".into(),
            weather_code: "weatherCode.txt".into(),
            weather_code_text: "weatherCodeTextDe.txt".into(),
            global_radiation: "globalRadiation.txt".into(),
        }
    }
}

impl FieldPaths {
    pub fn suffix(&self, field: Field) -> &str {
        match field {
            Field::Temperature => &self.air_temperature,
            Field::RelativeHumidity => &self.relative_humidity,
            Field::WindSpeedMperSec => &self.wind_speed,
            Field::WindSpeedKmh => &self.wind_speed_kmh,
            Field::WindSpeedBft => &self.wind_speed_bft,
            Field::WindDirectionDegree => &self.wind_direction_degree,
            Field::WindDirection => &self.wind_direction,
            Field::WindMaxGust => &self.wind_max_gust,
            Field::AirPressure => &self.air_pressure,
            Field::Visibility => &self.visibility,
            Field::WeatherCode => &self.weather_code,
            Field::WeatherCodeText => &self.weather_code_text,
            Field::GlobalRadiation => &self.global_radiation,
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// data_url = "https://station.example.org/data/"
/// interval_minutes = 4
/// output_prefix = "muenster"
///
/// [fields]
/// time = "time.txt"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collector implementation id, e.g. "muensterwetter".
    pub collector: String,
    /// Base URL every field suffix is appended to.
    pub data_url: String,
    pub interval_minutes: u64,
    pub initial_delay_ms: u64,
    /// chrono strftime pattern used for the remote timestamp, the watermark
    /// and the CSV timestamp column.
    pub timestamp_format: String,
    /// IANA zone used until the station reports its own.
    pub time_zone: String,
    pub watermark_folder: PathBuf,
    pub output_folder: PathBuf,
    pub output_prefix: String,
    /// strftime pattern of the date part in output file names; selects the
    /// bucket (day, month, ...) a record lands in.
    pub output_date_format: String,
    pub fields: FieldPaths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collector: CollectorKind::Muensterwetter.as_str().to_string(),
            data_url: "http://localhost/weather/".to_string(),
            interval_minutes: 4,
            initial_delay_ms: 1000,
            timestamp_format: "%d.%m.%Y %H:%M".to_string(),
            time_zone: "Europe/Berlin".to_string(),
            watermark_folder: PathBuf::from("."),
            output_folder: PathBuf::from("."),
            output_prefix: "prefix_not_defined".to_string(),
            output_date_format: "%Y-%m".to_string(),
            fields: FieldPaths::default(),
        }
    }
}

impl Config {
    /// Load config from `path`; the file must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Load config from the platform config directory, or fall back to the
    /// defaults and try to persist them there for later editing.
    pub fn load_or_init() -> Result<Self> {
        let path = Self::config_file_path()?;
        if path.exists() {
            log::info!("Load settings from {}", path.display());
            return Self::load_from(&path);
        }

        log::info!("No settings at {}, using defaults", path.display());
        let cfg = Self::default();
        match cfg.save_to(&path) {
            Ok(()) => log::info!("Saved default settings at {}", path.display()),
            Err(e) => log::warn!("Settings could not be saved: {e:#}"),
        }

        Ok(cfg)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file in the platform config directory.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("org", "52north", "weather-data-collector")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Check everything that would otherwise fail in the middle of a run.
    pub fn validate(&self) -> Result<()> {
        if self.interval_minutes == 0 {
            bail!("interval_minutes must be a positive number of minutes");
        }

        reqwest::Url::parse(&self.data_url)
            .with_context(|| format!("data_url '{}' is not a valid URL", self.data_url))?;

        self.collector_kind()?;
        self.zone()?;
        check_pattern(&self.timestamp_format).context("Invalid timestamp_format")?;
        check_pattern(&self.output_date_format).context("Invalid output_date_format")?;

        if self.fields.time.trim().is_empty() {
            bail!("fields.time must name the timestamp endpoint");
        }

        Ok(())
    }

    pub fn collector_kind(&self) -> Result<CollectorKind> {
        CollectorKind::try_from(self.collector.as_str())
    }

    pub fn zone(&self) -> Result<Tz> {
        parse_zone(&self.time_zone).context("Invalid time_zone")
    }

    pub fn timestamp_parser(&self) -> Result<TimestampParser> {
        TimestampParser::new(self.timestamp_format.clone(), self.zone()?)
            .context("Invalid timestamp_format")
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn watermark_path(&self) -> PathBuf {
        self.watermark_folder.join(WATERMARK_FILE)
    }
}
