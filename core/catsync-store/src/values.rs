//! Conversion of incoming JSON values to SQLite values, driven by the
//! declared attribute type.
//!
//! Timestamps are stored as fixed-width UTC text so that `MAX()` over a
//! timestamp column orders chronologically.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use catsync_model::AttributeType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses an ISO-8601 / RFC 3339 timestamp. Inputs without an offset are
/// taken as UTC; a bare date is midnight UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    // Postgres-style text output: "2024-01-01 10:00:00+00"
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// The storage form of a timestamp: `YYYY-MM-DDTHH:MM:SS.ffffffZ`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a date, accepting full timestamps by truncation.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(text).map(|ts| ts.date_naive()))
}

/// Converts one JSON value to the SQLite value for a column of type `ty`.
///
/// `null` is always accepted. The error string describes the mismatch.
pub fn to_sql_value(ty: AttributeType, value: &Value) -> Result<SqlValue, String> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    match ty {
        t if t.is_integer() => match value {
            Value::Number(n) => n
                .as_i64()
                .map(SqlValue::Integer)
                .or_else(|| n.as_f64().map(SqlValue::Real))
                .ok_or_else(|| format!("number out of range: {n}")),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(SqlValue::Integer)
                .map_err(|_| format!("not an integer: {s:?}")),
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            other => Err(format!("expected integer, got {other}")),
        },
        AttributeType::Float64 | AttributeType::Float32 => match value {
            Value::Number(n) => n
                .as_f64()
                .map(SqlValue::Real)
                .ok_or_else(|| format!("number out of range: {n}")),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(SqlValue::Real)
                .map_err(|_| format!("not a number: {s:?}")),
            other => Err(format!("expected number, got {other}")),
        },
        AttributeType::String => match value {
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            other => Ok(SqlValue::Text(other.to_string())),
        },
        AttributeType::Uuid => {
            let text = value
                .as_str()
                .ok_or_else(|| format!("expected uuid string, got {value}"))?;
            uuid::Uuid::parse_str(text.trim())
                .map(|id| SqlValue::Text(id.hyphenated().to_string()))
                .map_err(|e| format!("invalid uuid {text:?}: {e}"))
        }
        AttributeType::Time | AttributeType::DateTime => {
            let text = value
                .as_str()
                .ok_or_else(|| format!("expected timestamp string, got {value}"))?;
            parse_timestamp(text)
                .map(|ts| SqlValue::Text(format_timestamp(&ts)))
                .ok_or_else(|| format!("invalid timestamp: {text:?}"))
        }
        AttributeType::Date => {
            let text = value
                .as_str()
                .ok_or_else(|| format!("expected date string, got {value}"))?;
            parse_date(text)
                .map(|d| SqlValue::Text(d.format("%Y-%m-%d").to_string()))
                .ok_or_else(|| format!("invalid date: {text:?}"))
        }
        AttributeType::StringArray => match value {
            Value::Array(items) if items.iter().all(Value::is_string) => {
                Ok(SqlValue::Text(value.to_string()))
            }
            other => Err(format!("expected array of strings, got {other}")),
        },
        AttributeType::Bytes => match value {
            Value::String(encoded) => STANDARD
                .decode(encoded.trim())
                .map(SqlValue::Blob)
                .map_err(|e| format!("invalid base64: {e}")),
            Value::Array(items) => items
                .iter()
                .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(SqlValue::Blob)
                .ok_or_else(|| "expected byte array".to_string()),
            other => Err(format!("expected bytes, got {other}")),
        },
        AttributeType::Bool => match value {
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            Value::Number(n) if n.as_i64() == Some(0) || n.as_i64() == Some(1) => {
                Ok(SqlValue::Integer(n.as_i64().unwrap_or_default()))
            }
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(SqlValue::Integer(1)),
                "false" | "f" | "0" => Ok(SqlValue::Integer(0)),
                _ => Err(format!("not a boolean: {s:?}")),
            },
            other => Err(format!("expected boolean, got {other}")),
        },
        AttributeType::Json => Ok(SqlValue::Text(value.to_string())),
        // Integer widths are handled by the guard arm above.
        _ => Err(format!("unsupported type {ty}")),
    }
}
