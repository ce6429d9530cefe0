//! Conversion of raw endpoint text into typed values.
//!
//! Endpoints answer with bare text such as `"3,7"`, `"25 km"` or
//! `"25.11.2013 12:00"`. Numbers may use a decimal comma; timestamps are
//! local times in a zone that the station may report separately.

use chrono::{
    DateTime, NaiveDateTime, TimeZone, Utc,
    format::{Item, StrftimeItems},
};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("value is empty")]
    Empty,

    #[error("'{raw}' is not a number")]
    InvalidNumber { raw: String },

    #[error("'{raw}' does not match timestamp format '{pattern}': {reason}")]
    InvalidTimestamp {
        raw: String,
        pattern: String,
        reason: String,
    },

    #[error("local time '{raw}' does not exist in time zone {zone}")]
    NonexistentLocalTime { raw: String, zone: String },

    #[error("'{pattern}' is not a valid date/time format")]
    InvalidPattern { pattern: String },

    #[error("unknown time zone '{id}'")]
    UnknownZone { id: String },
}

/// Parse a decimal that may use a comma as decimal separator.
pub fn parse_decimal(raw: &str) -> Result<f64, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    trimmed
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber { raw: raw.to_string() })
}

/// Parse a number out of text that carries units or grouping characters,
/// keeping only its digits (`"10.000 m"` becomes `10000`).
pub fn parse_digits(raw: &str) -> Result<f64, ParseError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return if raw.trim().is_empty() {
            Err(ParseError::Empty)
        } else {
            Err(ParseError::InvalidNumber { raw: raw.to_string() })
        };
    }

    digits
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber { raw: raw.to_string() })
}

/// Reject strftime patterns chrono would fail to render.
pub fn check_pattern(pattern: &str) -> Result<(), ParseError> {
    let invalid = pattern.trim().is_empty()
        || StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error));

    if invalid {
        Err(ParseError::InvalidPattern { pattern: pattern.to_string() })
    } else {
        Ok(())
    }
}

/// Look up an IANA zone id such as `Europe/Berlin`.
pub fn parse_zone(id: &str) -> Result<Tz, ParseError> {
    id.trim()
        .parse::<Tz>()
        .map_err(|_| ParseError::UnknownZone { id: id.to_string() })
}

/// Parses and formats timestamps with one strftime pattern in a zone that
/// can be switched at runtime.
///
/// The same instance formats the watermark, the CSV timestamp column and
/// the file name date part, so a zone reported by the station affects all
/// of them from the moment it is adopted.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampParser {
    pattern: String,
    zone: Tz,
}

impl TimestampParser {
    pub fn new(pattern: impl Into<String>, zone: Tz) -> Result<Self, ParseError> {
        let pattern = pattern.into();
        check_pattern(&pattern)?;
        Ok(Self { pattern, zone })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// Switch to the zone named by `id` if the tz database knows it.
    ///
    /// Returns `false` and keeps the current zone otherwise.
    pub fn adopt_zone(&mut self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() {
            return false;
        }

        match parse_zone(id) {
            Ok(zone) => {
                if zone != self.zone {
                    log::info!("Switching timestamp zone from {} to {}", self.zone, zone);
                    self.zone = zone;
                }
                true
            }
            Err(_) => {
                log::info!(
                    "Time zone id '{}' is not known to the tz database, keeping {}",
                    id,
                    self.zone
                );
                false
            }
        }
    }

    pub fn parse(&self, raw: &str) -> Result<DateTime<Utc>, ParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ParseError::Empty);
        }

        let naive = NaiveDateTime::parse_from_str(trimmed, &self.pattern).map_err(|e| {
            ParseError::InvalidTimestamp {
                raw: trimmed.to_string(),
                pattern: self.pattern.clone(),
                reason: e.to_string(),
            }
        })?;

        // Ambiguous wall-clock times (DST fall-back) resolve to the earlier instant.
        self.zone
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| ParseError::NonexistentLocalTime {
                raw: trimmed.to_string(),
                zone: self.zone.to_string(),
            })
    }

    pub fn format(&self, timestamp: DateTime<Utc>) -> String {
        timestamp
            .with_timezone(&self.zone)
            .format(&self.pattern)
            .to_string()
    }

    /// Format `timestamp` in the current zone with another pattern.
    ///
    /// `pattern` must have passed [`check_pattern`].
    pub fn format_with(&self, timestamp: DateTime<Utc>, pattern: &str) -> String {
        timestamp
            .with_timezone(&self.zone)
            .format(pattern)
            .to_string()
    }
}
