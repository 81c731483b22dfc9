// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted git fakes shared by the service tests.

use async_trait::async_trait;
use kagan_adapters::{
    DiffStats, FileDiff, GitError, GitOps, MergeOperationResult, RebaseResult, WorktreeGit,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;

/// Worktree fake: records calls, resolves base refs verbatim, and rebases
/// according to a scripted conflict list.
#[derive(Default)]
pub struct FakeWorktreeGit {
    pub calls: Mutex<Vec<String>>,
    pub rebase_conflict: Mutex<Option<Vec<String>>>,
    pub fail_worktree_create: Mutex<bool>,
}

impl FakeWorktreeGit {
    pub fn recorded(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, entry: String) {
        self.calls.lock().push(entry);
    }
}

#[async_trait]
impl WorktreeGit for FakeWorktreeGit {
    async fn create_worktree(
        &self,
        repo_path: &Path,
        worktree_path: &Path,
        branch_name: &str,
        base_branch: &str,
    ) -> Result<(), GitError> {
        if *self.fail_worktree_create.lock() {
            return Err(GitError::Command {
                command: "worktree add".to_string(),
                returncode: 128,
                stdout: String::new(),
                stderr: "fatal: branch exists".to_string(),
                detail: "fatal: branch exists".to_string(),
                attempts: 1,
            });
        }
        self.record(format!(
            "create_worktree {} {} {} {}",
            repo_path.display(),
            worktree_path.display(),
            branch_name,
            base_branch
        ));
        Ok(())
    }

    async fn delete_worktree(&self, worktree_path: &Path) -> Result<(), GitError> {
        self.record(format!("delete_worktree {}", worktree_path.display()));
        Ok(())
    }

    async fn has_uncommitted_changes(&self, _worktree_path: &Path) -> Result<bool, GitError> {
        Ok(false)
    }

    async fn get_diff(
        &self,
        _worktree_path: &Path,
        _target_branch: &str,
    ) -> Result<String, GitError> {
        Ok(String::new())
    }

    async fn get_commit_log(
        &self,
        _worktree_path: &Path,
        _base_branch: &str,
    ) -> Result<Vec<String>, GitError> {
        Ok(Vec::new())
    }

    async fn get_files_changed(
        &self,
        _worktree_path: &Path,
        _base_branch: &str,
    ) -> Result<Vec<String>, GitError> {
        Ok(Vec::new())
    }

    async fn resolve_base_ref(
        &self,
        _cwd: &Path,
        base_branch: &str,
    ) -> Result<String, GitError> {
        Ok(base_branch.to_string())
    }

    async fn prune_worktrees(&self, _repo_path: &Path) -> Result<usize, GitError> {
        Ok(0)
    }

    async fn list_kagan_branches(&self, _repo_path: &Path) -> Result<Vec<String>, GitError> {
        Ok(Vec::new())
    }

    async fn delete_branch(
        &self,
        repo_path: &Path,
        branch_name: &str,
        _force: bool,
    ) -> Result<bool, GitError> {
        self.record(format!("delete_branch {} {}", repo_path.display(), branch_name));
        Ok(true)
    }

    async fn rebase_onto(
        &self,
        worktree_path: &Path,
        base_ref: &str,
    ) -> Result<RebaseResult, GitError> {
        self.record(format!("rebase {} {}", worktree_path.display(), base_ref));
        match self.rebase_conflict.lock().clone() {
            Some(files) => Ok(RebaseResult::Conflict { files }),
            None => Ok(RebaseResult::Success),
        }
    }
}

/// Git-ops fake with scripted merge results and per-worktree diff stats.
#[derive(Default)]
pub struct FakeGitOps {
    pub calls: Mutex<Vec<String>>,
    pub diff_stats: Mutex<HashMap<String, DiffStats>>,
    pub file_diffs: Mutex<HashMap<String, Vec<FileDiff>>>,
    pub merge_results: Mutex<VecDeque<MergeOperationResult>>,
    pub head: Mutex<String>,
}

impl FakeGitOps {
    pub fn recorded(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn push_merge_result(&self, result: MergeOperationResult) {
        self.merge_results.lock().push_back(result);
    }

    pub fn set_diff_stats(&self, worktree: &str, stats: DiffStats) {
        self.diff_stats.lock().insert(worktree.to_string(), stats);
    }

    fn record(&self, entry: String) {
        self.calls.lock().push(entry);
    }
}

#[async_trait]
impl GitOps for FakeGitOps {
    async fn has_uncommitted_changes(&self, _worktree_path: &Path) -> Result<bool, GitError> {
        Ok(false)
    }

    async fn commit_all(
        &self,
        worktree_path: &Path,
        message: &str,
    ) -> Result<String, GitError> {
        self.record(format!("commit_all {} {}", worktree_path.display(), message));
        Ok(self.head.lock().clone())
    }

    async fn push(
        &self,
        worktree_path: &Path,
        branch: &str,
        _force: bool,
    ) -> Result<(), GitError> {
        self.record(format!("push {} {}", worktree_path.display(), branch));
        Ok(())
    }

    async fn merge_squash(
        &self,
        repo_path: &Path,
        source_branch: &str,
        target_branch: &str,
        _commit_message: Option<&str>,
    ) -> Result<MergeOperationResult, GitError> {
        self.record(format!(
            "merge_squash {} {} {}",
            repo_path.display(),
            source_branch,
            target_branch
        ));
        Ok(self.merge_results.lock().pop_front().unwrap_or(MergeOperationResult {
            success: true,
            message: format!("Squash merged to {target_branch}"),
            commit_sha: Some("deadbeef".to_string()),
            conflict: None,
        }))
    }

    async fn merge_branch(
        &self,
        repo_path: &Path,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<MergeOperationResult, GitError> {
        self.record(format!(
            "merge_branch {} {} {}",
            repo_path.display(),
            source_branch,
            target_branch
        ));
        Ok(self.merge_results.lock().pop_front().unwrap_or(MergeOperationResult {
            success: true,
            message: format!("Merged to {target_branch}"),
            commit_sha: Some("deadbeef".to_string()),
            conflict: None,
        }))
    }

    async fn is_base_ahead(
        &self,
        _repo_path: &Path,
        _base_ref: &str,
        _head_ref: &str,
    ) -> Result<bool, GitError> {
        Ok(false)
    }

    async fn get_file_diffs(
        &self,
        worktree_path: &Path,
        _target_branch: &str,
    ) -> Result<Vec<FileDiff>, GitError> {
        Ok(self
            .file_diffs
            .lock()
            .get(&worktree_path.display().to_string())
            .cloned()
            .unwrap_or_default())
    }

    async fn get_diff_stats(
        &self,
        worktree_path: &Path,
        _target_branch: &str,
    ) -> Result<DiffStats, GitError> {
        Ok(self
            .diff_stats
            .lock()
            .get(&worktree_path.display().to_string())
            .cloned()
            .unwrap_or_default())
    }

    async fn head_commit(&self, _repo_path: &Path) -> Result<String, GitError> {
        Ok(self.head.lock().clone())
    }
}
