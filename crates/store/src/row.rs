// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row-mapping helpers shared by the repositories.
//!
//! Conversion failures are wrapped in `FromSqlConversionFailure` inside
//! query closures so the failing column index survives into the error.

use crate::error::DecodeError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

/// Encode a timestamp for storage (RFC 3339, microsecond precision, UTC).
pub fn dt_to_sql(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Encode an optional timestamp for storage.
pub fn opt_dt_to_sql(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(dt_to_sql)
}

fn decode_failure(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(DecodeError(message)))
}

/// Read a required timestamp column.
pub fn dt_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| decode_failure(idx, format!("timestamp {text:?}: {e}")))
}

/// Read an optional timestamp column.
pub fn opt_dt_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        None => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| decode_failure(idx, format!("timestamp {text:?}: {e}"))),
    }
}

/// Read a required JSON column.
pub fn json_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| decode_failure(idx, format!("json: {e}")))
}

/// Read an optional JSON column.
pub fn opt_json_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        None => Ok(None),
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| decode_failure(idx, format!("json: {e}"))),
    }
}

/// Read an enum column through its `parse` function.
pub fn enum_col<T>(
    row: &Row<'_>,
    idx: usize,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    parse(&text).ok_or_else(|| decode_failure(idx, format!("enum value {text:?}")))
}

/// Read an optional enum column through its `parse` function.
pub fn opt_enum_col<T>(
    row: &Row<'_>,
    idx: usize,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<Option<T>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        None => Ok(None),
        Some(text) => parse(&text)
            .map(Some)
            .ok_or_else(|| decode_failure(idx, format!("enum value {text:?}"))),
    }
}
