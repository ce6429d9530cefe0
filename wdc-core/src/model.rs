use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::parse::TimestampParser;

/// Header of every CSV output file, matching [`Dataset::to_csv_row`].
pub const CSV_HEADER: &str = "timestamp,temperature,relativeHumidity,windSpeedMperSec,windSpeedKmh,\
                              windSpeedBft,windDirectionDegree,windDirection,windMaxGust,\
                              airPressure,visibility,weatherCode,weatherCodeText,globalRadiation";

/// A measurement served by its own endpoint, in CSV column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Temperature,
    RelativeHumidity,
    WindSpeedMperSec,
    WindSpeedKmh,
    WindSpeedBft,
    WindDirectionDegree,
    WindDirection,
    WindMaxGust,
    AirPressure,
    Visibility,
    WeatherCode,
    WeatherCodeText,
    GlobalRadiation,
}

/// How the raw text of a field is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Decimal number, comma or point separated.
    Decimal,
    /// Number embedded in text with units, digits only.
    Digits,
    /// Short token kept as text.
    Text,
}

impl Field {
    pub const fn all() -> &'static [Field] {
        &[
            Field::Temperature,
            Field::RelativeHumidity,
            Field::WindSpeedMperSec,
            Field::WindSpeedKmh,
            Field::WindSpeedBft,
            Field::WindDirectionDegree,
            Field::WindDirection,
            Field::WindMaxGust,
            Field::AirPressure,
            Field::Visibility,
            Field::WeatherCode,
            Field::WeatherCodeText,
            Field::GlobalRadiation,
        ]
    }

    pub fn column(&self) -> &'static str {
        match self {
            Field::Temperature => "temperature",
            Field::RelativeHumidity => "relativeHumidity",
            Field::WindSpeedMperSec => "windSpeedMperSec",
            Field::WindSpeedKmh => "windSpeedKmh",
            Field::WindSpeedBft => "windSpeedBft",
            Field::WindDirectionDegree => "windDirectionDegree",
            Field::WindDirection => "windDirection",
            Field::WindMaxGust => "windMaxGust",
            Field::AirPressure => "airPressure",
            Field::Visibility => "visibility",
            Field::WeatherCode => "weatherCode",
            Field::WeatherCodeText => "weatherCodeText",
            Field::GlobalRadiation => "globalRadiation",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::WindDirection | Field::WeatherCode | Field::WeatherCodeText => FieldKind::Text,
            Field::Visibility => FieldKind::Digits,
            _ => FieldKind::Decimal,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Locale independent rendering; whole numbers keep a trailing `.0`.
    pub fn to_csv(&self) -> String {
        match self {
            FieldValue::Number(n) => format!("{n:?}"),
            FieldValue::Text(s) => s.clone(),
        }
    }
}

/// All measurements of one station reading, i.e. one CSV row.
///
/// Fields that could not be fetched or parsed keep their zero/empty default
/// and are listed in `missing`; a zero is therefore not necessarily measured.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub relative_humidity: f64,
    pub wind_speed_mper_sec: f64,
    pub wind_speed_kmh: f64,
    pub wind_speed_bft: f64,
    pub wind_direction_degree: f64,
    pub wind_direction: String,
    pub wind_max_gust: f64,
    pub air_pressure: f64,
    pub visibility: f64,
    pub weather_code: String,
    pub weather_code_text: String,
    pub global_radiation: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<Field>,
}

impl Dataset {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            temperature: 0.0,
            relative_humidity: 0.0,
            wind_speed_mper_sec: 0.0,
            wind_speed_kmh: 0.0,
            wind_speed_bft: 0.0,
            wind_direction_degree: 0.0,
            wind_direction: String::new(),
            wind_max_gust: 0.0,
            air_pressure: 0.0,
            visibility: 0.0,
            weather_code: String::new(),
            weather_code_text: String::new(),
            global_radiation: 0.0,
            missing: Vec::new(),
        }
    }

    pub fn is_newer_than(&self, last_time: DateTime<Utc>) -> bool {
        self.timestamp > last_time
    }

    pub fn set(&mut self, field: Field, value: FieldValue) {
        match (self.slot_mut(field), value) {
            (Slot::Text(slot), FieldValue::Text(s)) => *slot = s,
            (Slot::Number(slot), FieldValue::Number(n)) => *slot = n,
            (_, value) => {
                log::warn!("Ignoring value {value:?} of the wrong kind for field '{field}'");
            }
        }
    }

    pub fn mark_missing(&mut self, field: Field) {
        if !self.missing.contains(&field) {
            self.missing.push(field);
        }
    }

    pub fn is_missing(&self, field: Field) -> bool {
        self.missing.contains(&field)
    }

    pub fn value(&self, field: Field) -> FieldValue {
        match field {
            Field::WindDirection => FieldValue::Text(self.wind_direction.clone()),
            Field::WeatherCode => FieldValue::Text(self.weather_code.clone()),
            Field::WeatherCodeText => FieldValue::Text(self.weather_code_text.clone()),
            Field::Temperature => FieldValue::Number(self.temperature),
            Field::RelativeHumidity => FieldValue::Number(self.relative_humidity),
            Field::WindSpeedMperSec => FieldValue::Number(self.wind_speed_mper_sec),
            Field::WindSpeedKmh => FieldValue::Number(self.wind_speed_kmh),
            Field::WindSpeedBft => FieldValue::Number(self.wind_speed_bft),
            Field::WindDirectionDegree => FieldValue::Number(self.wind_direction_degree),
            Field::WindMaxGust => FieldValue::Number(self.wind_max_gust),
            Field::AirPressure => FieldValue::Number(self.air_pressure),
            Field::Visibility => FieldValue::Number(self.visibility),
            Field::GlobalRadiation => FieldValue::Number(self.global_radiation),
        }
    }

    fn slot_mut(&mut self, field: Field) -> Slot<'_> {
        match field {
            Field::Temperature => Slot::Number(&mut self.temperature),
            Field::RelativeHumidity => Slot::Number(&mut self.relative_humidity),
            Field::WindSpeedMperSec => Slot::Number(&mut self.wind_speed_mper_sec),
            Field::WindSpeedKmh => Slot::Number(&mut self.wind_speed_kmh),
            Field::WindSpeedBft => Slot::Number(&mut self.wind_speed_bft),
            Field::WindDirectionDegree => Slot::Number(&mut self.wind_direction_degree),
            Field::WindDirection => Slot::Text(&mut self.wind_direction),
            Field::WindMaxGust => Slot::Number(&mut self.wind_max_gust),
            Field::AirPressure => Slot::Number(&mut self.air_pressure),
            Field::Visibility => Slot::Number(&mut self.visibility),
            Field::WeatherCode => Slot::Text(&mut self.weather_code),
            Field::WeatherCodeText => Slot::Text(&mut self.weather_code_text),
            Field::GlobalRadiation => Slot::Number(&mut self.global_radiation),
        }
    }

    /// Serialize as one CSV line (no terminator) in [`CSV_HEADER`] order.
    ///
    /// Text values containing a comma, quote or line break are quoted.
    pub fn to_csv_row(&self, timestamps: &TimestampParser) -> Result<String, csv::Error> {
        let mut record = Vec::with_capacity(Field::all().len() + 1);
        record.push(timestamps.format(self.timestamp));
        record.extend(Field::all().iter().map(|field| self.value(*field).to_csv()));

        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(&record)?;
        let bytes = writer.into_inner().map_err(|e| e.into_error())?;

        Ok(String::from_utf8_lossy(&bytes).trim_end_matches('\n').to_string())
    }
}

/// Storage of one field inside a [`Dataset`].
enum Slot<'a> {
    Number(&'a mut f64),
    Text(&'a mut String),
}
