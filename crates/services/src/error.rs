// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared service error type.

use kagan_adapters::GitError;
use kagan_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid input: {0}")]
    Invalid(String),
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ServiceError::NotFound { entity, id: id.into() }
    }

    /// True when the underlying cause is the cooperative-shutdown signal.
    pub fn is_closing(&self) -> bool {
        matches!(self, ServiceError::Store(StoreError::Closing))
    }
}
