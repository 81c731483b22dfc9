// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git worktree management for isolated task execution.

use super::{GitBase, GitError, GitRunner};
use async_trait::async_trait;
use kagan_core::BaseRefStrategy;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Port for worktree and repo-diff operations used by services.
#[async_trait]
pub trait WorktreeGit: Send + Sync {
    async fn create_worktree(
        &self,
        repo_path: &Path,
        worktree_path: &Path,
        branch_name: &str,
        base_branch: &str,
    ) -> Result<(), GitError>;

    async fn delete_worktree(&self, worktree_path: &Path) -> Result<(), GitError>;

    async fn has_uncommitted_changes(&self, worktree_path: &Path) -> Result<bool, GitError>;

    async fn get_diff(&self, worktree_path: &Path, target_branch: &str)
        -> Result<String, GitError>;

    async fn get_commit_log(
        &self,
        worktree_path: &Path,
        base_branch: &str,
    ) -> Result<Vec<String>, GitError>;

    async fn get_files_changed(
        &self,
        worktree_path: &Path,
        base_branch: &str,
    ) -> Result<Vec<String>, GitError>;

    async fn resolve_base_ref(
        &self,
        cwd: &Path,
        base_branch: &str,
    ) -> Result<String, GitError>;

    async fn prune_worktrees(&self, repo_path: &Path) -> Result<usize, GitError>;

    async fn list_kagan_branches(&self, repo_path: &Path) -> Result<Vec<String>, GitError>;

    async fn delete_branch(
        &self,
        repo_path: &Path,
        branch_name: &str,
        force: bool,
    ) -> Result<bool, GitError>;

    async fn rebase_onto(
        &self,
        worktree_path: &Path,
        base_ref: &str,
    ) -> Result<RebaseResult, GitError>;
}

/// Outcome of a rebase attempt.
#[derive(Debug, Clone)]
pub enum RebaseResult {
    Success,
    Conflict { files: Vec<String> },
}

/// Adapter for git worktree operations across multiple repositories.
pub struct GitWorktreeAdapter {
    git: GitBase,
    base_ref_strategy: BaseRefStrategy,
}

impl GitWorktreeAdapter {
    pub fn new(runner: Arc<dyn GitRunner>, base_ref_strategy: BaseRefStrategy) -> Self {
        Self { git: GitBase::new(runner), base_ref_strategy }
    }

    /// Resolve the base ref according to the configured strategy.
    ///
    /// `refresh_remote` additionally fetches the base branch from origin
    /// (best-effort) before resolving, which worktree creation wants and
    /// diff queries do not.
    async fn resolve_base_ref_with_strategy(
        &self,
        cwd: &Path,
        base_branch: &str,
        refresh_remote: bool,
    ) -> Result<String, GitError> {
        if self.base_ref_strategy == BaseRefStrategy::Local {
            if self.has_local_branch(cwd, base_branch).await? {
                return Ok(base_branch.to_string());
            }
            if self.has_remote_branch(cwd, base_branch).await? {
                return Ok(format!("origin/{base_branch}"));
            }
            return Ok(base_branch.to_string());
        }

        if refresh_remote && self.git.has_remote(cwd, "origin").await? {
            // Best-effort: a failed fetch must not block worktree creation.
            let _ = self
                .git
                .run_unchecked(cwd, &["fetch", "origin", base_branch])
                .await;
        }

        let has_local = self.has_local_branch(cwd, base_branch).await?;
        let has_remote = self.has_remote_branch(cwd, base_branch).await?;

        if self.base_ref_strategy == BaseRefStrategy::Remote {
            if has_remote {
                return Ok(format!("origin/{base_branch}"));
            }
            return Ok(base_branch.to_string());
        }

        // local_if_ahead
        if has_local && has_remote {
            if self.is_local_ahead_of_origin(cwd, base_branch).await? {
                return Ok(base_branch.to_string());
            }
            return Ok(format!("origin/{base_branch}"));
        }
        if has_remote {
            return Ok(format!("origin/{base_branch}"));
        }
        Ok(base_branch.to_string())
    }

    async fn has_local_branch(&self, cwd: &Path, branch: &str) -> Result<bool, GitError> {
        self.git.ref_exists(cwd, &format!("refs/heads/{branch}")).await
    }

    async fn has_remote_branch(&self, cwd: &Path, branch: &str) -> Result<bool, GitError> {
        self.git
            .ref_exists(cwd, &format!("refs/remotes/origin/{branch}"))
            .await
    }

    async fn is_local_ahead_of_origin(
        &self,
        cwd: &Path,
        branch: &str,
    ) -> Result<bool, GitError> {
        let result = self
            .git
            .run_unchecked(
                cwd,
                &[
                    "rev-list",
                    "--count",
                    &format!("refs/remotes/origin/{branch}..refs/heads/{branch}"),
                ],
            )
            .await?;
        Ok(result.stdout.trim().parse::<u64>().map(|n| n > 0).unwrap_or(false))
    }

    /// Locate the main repository from a worktree's `.git` gitdir pointer.
    fn main_repo_for_worktree(worktree_path: &Path) -> Option<PathBuf> {
        let git_file = worktree_path.join(".git");
        let content = std::fs::read_to_string(&git_file).ok()?;
        let gitdir = content.trim().strip_prefix("gitdir:")?.trim();
        // gitdir points at <repo>/.git/worktrees/<name>
        Path::new(gitdir).parent()?.parent()?.parent().map(Path::to_path_buf)
    }
}

#[async_trait]
impl WorktreeGit for GitWorktreeAdapter {
    async fn create_worktree(
        &self,
        repo_path: &Path,
        worktree_path: &Path,
        branch_name: &str,
        base_branch: &str,
    ) -> Result<(), GitError> {
        let start_point = self
            .resolve_base_ref_with_strategy(repo_path, base_branch, true)
            .await?;
        let worktree = worktree_path.display().to_string();
        self.git
            .run(
                repo_path,
                &["worktree", "add", "-b", branch_name, &worktree, &start_point],
            )
            .await?;
        Ok(())
    }

    async fn delete_worktree(&self, worktree_path: &Path) -> Result<(), GitError> {
        if !worktree_path.exists() {
            return Ok(());
        }
        let Some(main_repo) = Self::main_repo_for_worktree(worktree_path) else {
            return Ok(());
        };
        let worktree = worktree_path.display().to_string();
        self.git
            .run(&main_repo, &["worktree", "remove", &worktree, "--force"])
            .await?;
        Ok(())
    }

    async fn has_uncommitted_changes(&self, worktree_path: &Path) -> Result<bool, GitError> {
        if !worktree_path.exists() {
            return Ok(false);
        }
        let result = self
            .git
            .run_unchecked(worktree_path, &["status", "--porcelain"])
            .await?;
        Ok(super::has_tracked_uncommitted_changes(&result.stdout))
    }

    async fn get_diff(
        &self,
        worktree_path: &Path,
        target_branch: &str,
    ) -> Result<String, GitError> {
        if !worktree_path.exists() {
            return Ok(String::new());
        }
        let base_ref = self.resolve_base_ref(worktree_path, target_branch).await?;
        let result = self
            .git
            .run(worktree_path, &["diff", &format!("{base_ref}..HEAD")])
            .await?;
        Ok(result.stdout)
    }

    async fn get_commit_log(
        &self,
        worktree_path: &Path,
        base_branch: &str,
    ) -> Result<Vec<String>, GitError> {
        if !worktree_path.exists() {
            return Ok(Vec::new());
        }
        let base_ref = self.resolve_base_ref(worktree_path, base_branch).await?;
        let result = self
            .git
            .run(worktree_path, &["log", "--oneline", &format!("{base_ref}..HEAD")])
            .await?;
        Ok(result
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn get_files_changed(
        &self,
        worktree_path: &Path,
        base_branch: &str,
    ) -> Result<Vec<String>, GitError> {
        if !worktree_path.exists() {
            return Ok(Vec::new());
        }
        let base_ref = self.resolve_base_ref(worktree_path, base_branch).await?;
        let result = self
            .git
            .run(worktree_path, &["diff", "--name-only", &format!("{base_ref}..HEAD")])
            .await?;
        Ok(result
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn resolve_base_ref(
        &self,
        cwd: &Path,
        base_branch: &str,
    ) -> Result<String, GitError> {
        self.resolve_base_ref_with_strategy(cwd, base_branch, false).await
    }

    async fn prune_worktrees(&self, repo_path: &Path) -> Result<usize, GitError> {
        if !repo_path.exists() {
            return Ok(0);
        }
        let result = self
            .git
            .run_unchecked(repo_path, &["worktree", "prune", "--verbose"])
            .await?;
        Ok(result
            .stdout
            .lines()
            .filter(|line| line.trim_start().starts_with("Removing"))
            .count())
    }

    async fn list_kagan_branches(&self, repo_path: &Path) -> Result<Vec<String>, GitError> {
        if !repo_path.exists() {
            return Ok(Vec::new());
        }
        let result = self
            .git
            .run_unchecked(
                repo_path,
                &["for-each-ref", "--format=%(refname:short)", "refs/heads/kagan/*"],
            )
            .await?;
        Ok(result
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn delete_branch(
        &self,
        repo_path: &Path,
        branch_name: &str,
        force: bool,
    ) -> Result<bool, GitError> {
        if !repo_path.exists() {
            return Ok(false);
        }
        let flag = if force { "-D" } else { "-d" };
        let result = self
            .git
            .run_unchecked(repo_path, &["branch", flag, branch_name])
            .await?;
        Ok(result.returncode == 0)
    }

    async fn rebase_onto(
        &self,
        worktree_path: &Path,
        base_ref: &str,
    ) -> Result<RebaseResult, GitError> {
        let result = self
            .git
            .run_unchecked(worktree_path, &["rebase", base_ref])
            .await?;
        if result.returncode == 0 {
            return Ok(RebaseResult::Success);
        }

        let conflicts = self
            .git
            .run_unchecked(worktree_path, &["diff", "--name-only", "--diff-filter=U"])
            .await?;
        let files: Vec<String> = conflicts
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        let _ = self
            .git
            .run_unchecked(worktree_path, &["rebase", "--abort"])
            .await;
        Ok(RebaseResult::Conflict { files })
    }
}
