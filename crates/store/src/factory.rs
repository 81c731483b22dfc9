// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Closing-aware session factory over a single SQLite connection.
//!
//! All repositories share one factory. Sessions are short-lived guards:
//! hold one only for the duration of a query batch, never across long
//! awaits. `close()` marks the factory closing (new sessions fail fast
//! with [`StoreError::Closing`]), waits for the outstanding guard to
//! drain, then drops the connection.

use crate::error::StoreError;
use crate::schema;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct FactoryInner {
    conn: Mutex<Option<Connection>>,
    closing: AtomicBool,
}

/// Shared handle yielding transactional session guards.
#[derive(Clone)]
pub struct SessionFactory {
    inner: Arc<FactoryInner>,
}

impl SessionFactory {
    /// Open (or create) the database at `path` and initialize the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize(conn)
    }

    /// Open an in-memory database (tests).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self, StoreError> {
        // journal_mode returns a row, so it cannot go through execute().
        let _mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::create_schema(&conn)?;
        schema::ensure_schema_compatibility(&conn)?;
        Ok(Self {
            inner: Arc::new(FactoryInner {
                conn: Mutex::new(Some(conn)),
                closing: AtomicBool::new(false),
            }),
        })
    }

    /// Acquire a session guard, failing fast once the factory is closing.
    pub fn session(&self) -> Result<StoreSession<'_>, StoreError> {
        if self.is_closing() {
            return Err(StoreError::Closing);
        }
        let guard = self.inner.conn.lock();
        if guard.is_none() {
            return Err(StoreError::Closing);
        }
        Ok(StoreSession { guard })
    }

    /// Mark the factory closing without disposing the connection yet.
    pub fn mark_closing(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
    }

    pub fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
    }

    /// Close sequence: mark closing, drain the outstanding session, then
    /// dispose the connection.
    pub fn close(&self) {
        self.mark_closing();
        let mut guard = self.inner.conn.lock();
        *guard = None;
    }
}

/// Short-lived transactional scope over the shared connection.
pub struct StoreSession<'a> {
    guard: MutexGuard<'a, Option<Connection>>,
}

impl StoreSession<'_> {
    /// Borrow the connection for reads and single-statement writes.
    pub fn conn(&self) -> Result<&Connection, StoreError> {
        self.guard.as_ref().ok_or(StoreError::Closing)
    }

    /// Begin an explicit transaction for multi-statement writes.
    pub fn transaction(&mut self) -> Result<Transaction<'_>, StoreError> {
        let conn = self.guard.as_mut().ok_or(StoreError::Closing)?;
        Ok(conn.transaction()?)
    }
}

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;
