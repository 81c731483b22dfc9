// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kagan-adapters: subprocess, git, tmux, and instance-lock adapters.

pub mod git;
pub mod lock;
pub mod process;
pub mod tmux;

pub use git::{
    has_tracked_uncommitted_changes, DiffStats, FileDiff, GitCommandResult, GitError,
    GitOperationsAdapter, GitOps, GitRunner, GitWorktreeAdapter, MergeConflict,
    MergeOperationResult, RebaseResult, SystemGitRunner, WorktreeGit, KAGAN_GENERATED_PATTERNS,
};
pub use lock::{InstanceLock, LockError, LockInfo};
pub use process::{
    run_exec_capture, run_exec_checked, spawn_detached, ExecOptions, ProcessError, ProcessResult,
    ProcessRetryPolicy,
};
pub use tmux::{run_tmux, TmuxError};
