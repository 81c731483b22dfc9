// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store error taxonomy.

use thiserror::Error;

/// Errors surfaced by the repository layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The session factory has been marked closing; callers must treat
    /// this as "service shutting down" and skip non-essential writes.
    #[error("repository is closing")]
    Closing,

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode JSON column: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid stored value: {0}")]
    Decode(String),
}

impl StoreError {
    /// True when the error is the cooperative-shutdown signal.
    pub fn is_closing(&self) -> bool {
        matches!(self, StoreError::Closing)
    }
}

/// Decode failure for a stored enum/timestamp value.
///
/// Wrapped into `rusqlite::Error::FromSqlConversionFailure` inside row
/// mapping closures so the row index is preserved.
#[derive(Debug, Error)]
#[error("invalid stored value: {0}")]
pub struct DecodeError(pub String);
