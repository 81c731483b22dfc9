// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git adapter layer: command runner port, worktree management, and
//! higher-level merge/diff operations.

mod operations;
mod worktrees;

pub use operations::{
    has_tracked_uncommitted_changes, DiffStats, FileDiff, GitOperationsAdapter, GitOps,
    MergeConflict, MergeOperationResult, KAGAN_GENERATED_PATTERNS,
};
pub use worktrees::{GitWorktreeAdapter, RebaseResult, WorktreeGit};

use crate::process::{run_exec_capture, run_exec_checked, ExecOptions, ProcessError, ProcessRetryPolicy};
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Result of a git command invocation.
#[derive(Debug, Clone)]
pub struct GitCommandResult {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Errors raised by the git runner.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("git executable not found")]
    NotFound,

    #[error("git {command} failed (rc={returncode}): {detail}")]
    Command {
        command: String,
        returncode: i32,
        stdout: String,
        stderr: String,
        detail: String,
        attempts: u32,
    },

    #[error(transparent)]
    Process(ProcessError),
}

/// Port for executing git subcommands.
///
/// `check = true` turns a non-zero return code into [`GitError::Command`];
/// `check = false` captures the result either way.
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run(
        &self,
        cwd: &Path,
        args: &[String],
        check: bool,
    ) -> Result<GitCommandResult, GitError>;
}

/// Runner executing the real `git` binary via the process adapter.
///
/// Transient spawn failures and timeouts retry once after 100 ms; the
/// worktree/index environment of the parent process is scrubbed so
/// commands resolve the repository from `cwd` alone.
#[derive(Debug, Default, Clone)]
pub struct SystemGitRunner;

impl SystemGitRunner {
    fn options(cwd: &Path) -> ExecOptions {
        ExecOptions {
            cwd: Some(cwd.to_path_buf()),
            env_remove: vec!["GIT_DIR".to_string(), "GIT_WORK_TREE".to_string()],
            retry: ProcessRetryPolicy::git_default(),
            ..ExecOptions::default()
        }
    }
}

#[async_trait]
impl GitRunner for SystemGitRunner {
    async fn run(
        &self,
        cwd: &Path,
        args: &[String],
        check: bool,
    ) -> Result<GitCommandResult, GitError> {
        let options = Self::options(cwd);
        if check {
            match run_exec_checked("git", args, &options).await {
                Ok(result) => Ok(GitCommandResult {
                    returncode: result.returncode,
                    stdout: result.stdout_text(),
                    stderr: result.stderr_text(),
                }),
                Err(ProcessError::NonzeroExit {
                    returncode,
                    attempts,
                    stdout,
                    stderr,
                    detail,
                    ..
                }) => Err(GitError::Command {
                    command: args.join(" "),
                    returncode,
                    stdout,
                    stderr,
                    detail,
                    attempts,
                }),
                Err(ProcessError::Os { ref source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    Err(GitError::NotFound)
                }
                Err(error) => Err(GitError::Process(error)),
            }
        } else {
            match run_exec_capture("git", args, &options).await {
                Ok(result) => Ok(GitCommandResult {
                    returncode: result.returncode,
                    stdout: result.stdout_text(),
                    stderr: result.stderr_text(),
                }),
                Err(ProcessError::Os { ref source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    Err(GitError::NotFound)
                }
                Err(error) => Err(GitError::Process(error)),
            }
        }
    }
}

/// Shared helpers over a [`GitRunner`] used by both git adapters.
pub(crate) struct GitBase {
    runner: std::sync::Arc<dyn GitRunner>,
}

impl GitBase {
    pub(crate) fn new(runner: std::sync::Arc<dyn GitRunner>) -> Self {
        Self { runner }
    }

    pub(crate) async fn run(
        &self,
        cwd: &Path,
        args: &[&str],
    ) -> Result<GitCommandResult, GitError> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.runner.run(cwd, &args, true).await
    }

    pub(crate) async fn run_unchecked(
        &self,
        cwd: &Path,
        args: &[&str],
    ) -> Result<GitCommandResult, GitError> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.runner.run(cwd, &args, false).await
    }

    pub(crate) async fn ref_exists(&self, cwd: &Path, reference: &str) -> Result<bool, GitError> {
        let result = self
            .run_unchecked(cwd, &["rev-parse", "--verify", "--quiet", reference])
            .await?;
        Ok(!result.stdout.trim().is_empty())
    }

    pub(crate) async fn has_remote(&self, cwd: &Path, name: &str) -> Result<bool, GitError> {
        let result = self.run_unchecked(cwd, &["remote"]).await?;
        Ok(result
            .stdout
            .lines()
            .map(str::trim)
            .any(|remote| remote == name))
    }

    pub(crate) async fn head_commit(&self, cwd: &Path) -> Result<String, GitError> {
        let result = self.run(cwd, &["rev-parse", "HEAD"]).await?;
        Ok(result.stdout.trim().to_string())
    }
}
