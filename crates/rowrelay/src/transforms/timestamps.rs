//! ⏰ Timestamps: strings that look like dates become dates that are dates.
//!
//! The remote API types `createdAt` and `timestamp` as real date/times. A CSV cell
//! only ever holds text, so these two fields get parsed before anything else
//! touches the row.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;

use crate::common::FieldValue;
use crate::error::TransformError;

/// 🎯 Top-level fields that get reinterpreted as date/times.
pub(crate) const TIMESTAMP_FIELDS: [&str; 2] = ["createdAt", "timestamp"];

const NAIVE_DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    // -- 🇺🇸 what a spreadsheet "Save as CSV" hands you
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%b %d, %Y"];

/// 🔄 Parse one timestamp-field value.
///
/// Accepts RFC 3339, naive `date time` in ISO or `MM/DD/YYYY` order (read as UTC),
/// bare dates like `2024-01-02`, `01/02/2024` or `Jan 2, 2024` (midnight UTC), and
/// integer epoch milliseconds, as a number or as a string of digits. Empty strings
/// and nulls become [`FieldValue::Null`].
pub(crate) fn parse_timestamp(field: &str, value: &Value) -> Result<FieldValue, TransformError> {
    let invalid = || TransformError::InvalidTimestamp {
        field: field.to_string(),
        value: value.to_string(),
    };

    match value {
        Value::Null => Ok(FieldValue::Null),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(FieldValue::Timestamp)
            .ok_or_else(invalid),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(FieldValue::Null);
            }
            parse_str(s)
                .map(FieldValue::Timestamp)
                .ok_or_else(|| TransformError::InvalidTimestamp {
                    field: field.to_string(),
                    value: s.to_string(),
                })
        }
        _ => Err(invalid()),
    }
}

fn parse_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    // -- 🔢 a cell that is all digits is epoch millis that lost its number-ness in the CSV
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis);
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}
