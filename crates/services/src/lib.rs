// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kagan-services: task, workspace, session, automation, merge, and job
//! services over the store and adapter layers.

pub mod automation;
pub mod error;
pub mod events;
pub mod jobs;
pub mod merges;
pub mod sessions;
pub mod tasks;
pub mod workspaces;

#[cfg(test)]
mod test_support;

pub use automation::{AutomationService, SpawnResult, COMPLETE_MARKER, MAX_LOG_CHUNK_BYTES};
pub use error::ServiceError;
pub use events::{EventBus, EventHandler};
pub use jobs::{JobExecutor, JobService};
pub use merges::{MergeService, MergeTaskResult, RejectionAction};
pub use sessions::{
    build_launch_command, build_startup_prompt, ensure_worktree_gitignored, shell_quote,
    CreatedSession, SessionBundle, SessionError, SessionService,
};
pub use tasks::{extract_task_mentions, TaskService};
pub use workspaces::{
    branch_name_for, slugify, RebaseOutcome, RepoDiff, RepoSpec, WorkspaceService,
};
