// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kagan-store: SQLite-backed repository layer for the Kagan core.
//!
//! One `SessionFactory` is shared process-wide; repositories are cheap
//! clones over it. All writes go through short-lived session guards so
//! shutdown can drain cleanly.

mod auxiliary;
mod error;
mod executions;
mod factory;
mod jobs;
mod projects;
mod row;
mod schema;
mod tasks;
mod workspaces;

pub use auxiliary::{
    AuditRepository, MergeRepository, PlannerRepository, ScratchRepository,
    SessionRecordRepository,
};
pub use error::StoreError;
pub use executions::ExecutionRepository;
pub use factory::{SessionFactory, StoreSession};
pub use jobs::{JobRepository, JobTransition};
pub use projects::{ProjectRepository, RepoRepository};
pub use tasks::{TaskPatch, TaskRepository};
pub use workspaces::WorkspaceRepository;
