// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Extended git operations: dirty-tree checks, commits, pushes, merges,
//! and file-level diffs.

use super::{GitBase, GitError, GitRunner};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Paths generated by the core inside worktrees. These never count as
/// uncommitted changes and are appended to `.gitignore` on setup.
pub const KAGAN_GENERATED_PATTERNS: &[&str] = &[
    ".mcp.json",
    "opencode.json",
    "kagan*.json",
    "*kagan.json",
    ".kagan/",
    ".gemini/",
];

/// Check `git status --porcelain` output for relevant uncommitted changes.
///
/// Untracked (`??`) lines and core-generated paths are ignored; any other
/// porcelain line marks the worktree dirty.
pub fn has_tracked_uncommitted_changes(status_output: &str) -> bool {
    for raw_line in status_output.lines() {
        let line = raw_line.trim_end();
        if line.is_empty() {
            continue;
        }
        let status = &line[..line.len().min(2)];
        if status == "??" {
            continue;
        }
        let path_segment = if line.len() > 3 { &line[3..] } else { "" };
        for path in extract_status_paths(path_segment) {
            if !path.is_empty() && !is_kagan_generated_path(&path) {
                return true;
            }
        }
    }
    false
}

fn extract_status_paths(path_segment: &str) -> Vec<String> {
    let raw: Vec<&str> = if path_segment.contains(" -> ") {
        path_segment.split(" -> ").collect()
    } else {
        vec![path_segment]
    };
    raw.into_iter().map(normalize_status_path).collect()
}

fn normalize_status_path(path: &str) -> String {
    let normalized = path.trim();
    if normalized.len() >= 2 && normalized.starts_with('"') && normalized.ends_with('"') {
        return normalized[1..normalized.len() - 1].to_string();
    }
    normalized.to_string()
}

fn is_kagan_generated_path(path: &str) -> bool {
    let normalized = path.trim().trim_start_matches("./");
    for pattern in KAGAN_GENERATED_PATTERNS {
        if let Some(prefix) = pattern.strip_suffix('/') {
            if normalized == prefix || normalized.starts_with(&format!("{prefix}/")) {
                return true;
            }
            continue;
        }
        if glob_match(pattern, normalized) {
            return true;
        }
    }
    false
}

/// Minimal `*` glob match, enough for the generated-file patterns.
fn glob_match(pattern: &str, value: &str) -> bool {
    fn inner(pattern: &[u8], value: &[u8]) -> bool {
        match (pattern.first(), value.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                inner(&pattern[1..], value)
                    || (!value.is_empty() && inner(pattern, &value[1..]))
            }
            (Some(p), Some(v)) if p == v => inner(&pattern[1..], &value[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), value.as_bytes())
}

/// Details about a merge conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub op: String,
    pub files: Vec<String>,
}

/// Result of a merge operation.
#[derive(Debug, Clone)]
pub struct MergeOperationResult {
    pub success: bool,
    pub message: String,
    pub commit_sha: Option<String>,
    pub conflict: Option<MergeConflict>,
}

impl MergeOperationResult {
    fn failure(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), commit_sha: None, conflict: None }
    }
}

/// File-level diff entry for the workspace diff surface.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub additions: u64,
    pub deletions: u64,
    pub status: String,
    pub diff_content: String,
}

/// Aggregate diff statistics.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct DiffStats {
    pub files: u64,
    pub insertions: u64,
    pub deletions: u64,
}

/// Port for the higher-level git operations used by services.
#[async_trait]
pub trait GitOps: Send + Sync {
    async fn has_uncommitted_changes(&self, worktree_path: &Path) -> Result<bool, GitError>;

    async fn commit_all(&self, worktree_path: &Path, message: &str) -> Result<String, GitError>;

    async fn push(&self, worktree_path: &Path, branch: &str, force: bool)
        -> Result<(), GitError>;

    async fn merge_squash(
        &self,
        repo_path: &Path,
        source_branch: &str,
        target_branch: &str,
        commit_message: Option<&str>,
    ) -> Result<MergeOperationResult, GitError>;

    async fn merge_branch(
        &self,
        repo_path: &Path,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<MergeOperationResult, GitError>;

    async fn is_base_ahead(
        &self,
        repo_path: &Path,
        base_ref: &str,
        head_ref: &str,
    ) -> Result<bool, GitError>;

    async fn get_file_diffs(
        &self,
        worktree_path: &Path,
        target_branch: &str,
    ) -> Result<Vec<FileDiff>, GitError>;

    async fn get_diff_stats(
        &self,
        worktree_path: &Path,
        target_branch: &str,
    ) -> Result<DiffStats, GitError>;

    async fn head_commit(&self, repo_path: &Path) -> Result<String, GitError>;
}

/// Extended git operations for worktree-based repos.
pub struct GitOperationsAdapter {
    git: GitBase,
}

impl GitOperationsAdapter {
    pub fn new(runner: Arc<dyn GitRunner>) -> Self {
        Self { git: GitBase::new(runner) }
    }

    async fn resolve_base_ref(
        &self,
        repo_path: &Path,
        base_branch: &str,
    ) -> Result<String, GitError> {
        if self
            .git
            .ref_exists(repo_path, &format!("refs/remotes/origin/{base_branch}"))
            .await?
        {
            return Ok(format!("origin/{base_branch}"));
        }
        Ok(base_branch.to_string())
    }

    async fn collect_conflict_files(&self, repo_path: &Path) -> Result<Vec<String>, GitError> {
        let result = self
            .git
            .run_unchecked(repo_path, &["diff", "--name-only", "--diff-filter=U"])
            .await?;
        let files: Vec<String> = result
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if !files.is_empty() {
            return Ok(files);
        }

        // Fallback: some conflict shapes only show in porcelain status.
        let status = self
            .git
            .run_unchecked(repo_path, &["status", "--porcelain"])
            .await?;
        Ok(status
            .stdout
            .lines()
            .filter(|line| {
                line.starts_with("UU ") || line.starts_with("AA ") || line.starts_with("DD ")
            })
            .map(|line| line[3..].trim().to_string())
            .collect())
    }

    async fn abort_merge(&self, repo_path: &Path) -> Result<(), GitError> {
        let _ = self.git.run_unchecked(repo_path, &["merge", "--abort"]).await;
        let _ = self.git.run_unchecked(repo_path, &["reset", "--hard"]).await;
        Ok(())
    }

    async fn file_status(
        &self,
        worktree_path: &Path,
        file_path: &str,
        target_branch: &str,
    ) -> Result<String, GitError> {
        let result = self
            .git
            .run(
                worktree_path,
                &[
                    "diff",
                    "--name-status",
                    &format!("{target_branch}..HEAD"),
                    "--",
                    file_path,
                ],
            )
            .await?;
        Ok(decode_name_status(&result.stdout))
    }
}

/// Decode the first status letter of `git diff --name-status` output.
pub(crate) fn decode_name_status(name_status: &str) -> String {
    let status = match name_status.trim().chars().next() {
        Some('A') => "added",
        Some('M') => "modified",
        Some('D') => "deleted",
        Some('R') => "renamed",
        Some('C') => "copied",
        _ => "modified",
    };
    status.to_string()
}

/// Extract the number preceding `word` in a diff --stat summary line.
pub(crate) fn extract_number(text: &str, word: &str) -> u64 {
    let mut last: u64 = 0;
    let mut found = false;
    let tokens: Vec<&str> = text.split_whitespace().collect();
    for pair in tokens.windows(2) {
        if pair[1].starts_with(word) {
            if let Ok(value) = pair[0].parse::<u64>() {
                last = value;
                found = true;
            }
        }
    }
    if found {
        last
    } else {
        0
    }
}

#[async_trait]
impl GitOps for GitOperationsAdapter {
    async fn has_uncommitted_changes(&self, worktree_path: &Path) -> Result<bool, GitError> {
        let result = self
            .git
            .run_unchecked(worktree_path, &["status", "--porcelain"])
            .await?;
        Ok(has_tracked_uncommitted_changes(&result.stdout))
    }

    async fn commit_all(&self, worktree_path: &Path, message: &str) -> Result<String, GitError> {
        if !self.has_uncommitted_changes(worktree_path).await? {
            return self.git.head_commit(worktree_path).await;
        }
        self.git.run(worktree_path, &["add", "-A"]).await?;
        self.git.run(worktree_path, &["commit", "-m", message]).await?;
        self.git.head_commit(worktree_path).await
    }

    async fn push(
        &self,
        worktree_path: &Path,
        branch: &str,
        force: bool,
    ) -> Result<(), GitError> {
        if !self.git.has_remote(worktree_path, "origin").await? {
            return Ok(());
        }
        if force {
            self.git
                .run(worktree_path, &["push", "--force-with-lease", "origin", branch])
                .await?;
        } else {
            self.git.run(worktree_path, &["push", "origin", branch]).await?;
        }
        Ok(())
    }

    async fn merge_squash(
        &self,
        repo_path: &Path,
        source_branch: &str,
        target_branch: &str,
        commit_message: Option<&str>,
    ) -> Result<MergeOperationResult, GitError> {
        let has_origin = self.git.has_remote(repo_path, "origin").await?;
        if has_origin {
            self.git.run(repo_path, &["fetch", "origin", target_branch]).await?;
        }

        let base_ref = self.resolve_base_ref(repo_path, target_branch).await?;
        if self.is_base_ahead(repo_path, &base_ref, source_branch).await? {
            return Ok(MergeOperationResult::failure(format!(
                "Base branch {base_ref} is ahead of {source_branch}; rebase required"
            )));
        }

        self.git.run(repo_path, &["checkout", target_branch]).await?;

        let merge = self
            .git
            .run_unchecked(repo_path, &["merge", "--squash", source_branch])
            .await?;

        let conflict_files = self.collect_conflict_files(repo_path).await?;
        if !conflict_files.is_empty() {
            self.abort_merge(repo_path).await?;
            return Ok(MergeOperationResult {
                success: false,
                message: "Merge conflict detected".to_string(),
                commit_sha: None,
                conflict: Some(MergeConflict {
                    op: "merge-squash".to_string(),
                    files: conflict_files,
                }),
            });
        }

        if merge.returncode != 0 {
            self.abort_merge(repo_path).await?;
            let stderr = merge.stderr.trim();
            let stdout = merge.stdout.trim();
            let message = if !stderr.is_empty() {
                stderr
            } else if !stdout.is_empty() {
                stdout
            } else {
                "Squash merge failed"
            };
            return Ok(MergeOperationResult::failure(message));
        }

        let status = self.git.run(repo_path, &["status", "--porcelain"]).await?;
        if status.stdout.trim().is_empty() {
            let head = self.git.head_commit(repo_path).await?;
            return Ok(MergeOperationResult {
                success: true,
                message: "No changes to merge".to_string(),
                commit_sha: Some(head),
                conflict: None,
            });
        }

        let default_message = format!("Squash merge {source_branch}");
        let message = commit_message.unwrap_or(&default_message);
        self.git.run(repo_path, &["commit", "-m", message]).await?;

        if has_origin {
            self.git.run(repo_path, &["push", "origin", target_branch]).await?;
        }

        let squash_sha = self.git.head_commit(repo_path).await?;

        // Point the task branch at the squash commit so follow-up work
        // continues from the merged state without conflicts.
        let _ = self
            .git
            .run_unchecked(
                repo_path,
                &["update-ref", &format!("refs/heads/{source_branch}"), &squash_sha],
            )
            .await;

        Ok(MergeOperationResult {
            success: true,
            message: format!("Squash merged to {target_branch}"),
            commit_sha: Some(squash_sha),
            conflict: None,
        })
    }

    async fn merge_branch(
        &self,
        repo_path: &Path,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<MergeOperationResult, GitError> {
        let has_origin = self.git.has_remote(repo_path, "origin").await?;
        if has_origin {
            self.git.run(repo_path, &["fetch", "origin", target_branch]).await?;
        }
        self.git.run(repo_path, &["checkout", target_branch]).await?;

        let message = format!("Merge {source_branch}");
        let merge = self
            .git
            .run_unchecked(
                repo_path,
                &["merge", "--no-ff", source_branch, "-m", &message],
            )
            .await?;
        if merge.stdout.contains("CONFLICT") || merge.stderr.contains("CONFLICT") {
            let files = self.collect_conflict_files(repo_path).await?;
            let _ = self.git.run_unchecked(repo_path, &["merge", "--abort"]).await;
            return Ok(MergeOperationResult {
                success: false,
                message: "Merge conflict detected".to_string(),
                commit_sha: None,
                conflict: Some(MergeConflict { op: "merge".to_string(), files }),
            });
        }

        if has_origin {
            self.git.run(repo_path, &["push", "origin", target_branch]).await?;
        }
        let head = self.git.head_commit(repo_path).await?;
        Ok(MergeOperationResult {
            success: true,
            message: format!("Merged to {target_branch}"),
            commit_sha: Some(head),
            conflict: None,
        })
    }

    async fn is_base_ahead(
        &self,
        repo_path: &Path,
        base_ref: &str,
        head_ref: &str,
    ) -> Result<bool, GitError> {
        let result = self
            .git
            .run(
                repo_path,
                &[
                    "rev-list",
                    "--left-right",
                    "--count",
                    &format!("{base_ref}...{head_ref}"),
                ],
            )
            .await?;
        let left = result
            .stdout
            .split_whitespace()
            .next()
            .unwrap_or("0")
            .parse::<u64>()
            .unwrap_or(0);
        Ok(left > 0)
    }

    async fn get_file_diffs(
        &self,
        worktree_path: &Path,
        target_branch: &str,
    ) -> Result<Vec<FileDiff>, GitError> {
        let numstat = self
            .git
            .run(worktree_path, &["diff", "--numstat", &format!("{target_branch}..HEAD")])
            .await?;

        let mut files = Vec::new();
        for line in numstat.stdout.lines().filter(|line| !line.trim().is_empty()) {
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 3 {
                continue;
            }
            let additions = parts[0].parse::<u64>().unwrap_or(0);
            let deletions = parts[1].parse::<u64>().unwrap_or(0);
            let mut file_path = parts[2].to_string();
            if let Some((_, renamed)) = file_path.split_once(" => ") {
                file_path = renamed.trim_matches(|c| c == '{' || c == '}').to_string();
            }

            let status = self.file_status(worktree_path, &file_path, target_branch).await?;
            let diff = self
                .git
                .run(
                    worktree_path,
                    &["diff", &format!("{target_branch}..HEAD"), "--", &file_path],
                )
                .await?;

            files.push(FileDiff {
                path: file_path,
                additions,
                deletions,
                status,
                diff_content: diff.stdout,
            });
        }
        Ok(files)
    }

    async fn get_diff_stats(
        &self,
        worktree_path: &Path,
        target_branch: &str,
    ) -> Result<DiffStats, GitError> {
        let result = self
            .git
            .run(worktree_path, &["diff", "--stat", &format!("{target_branch}..HEAD")])
            .await?;
        let summary = result.stdout.lines().last().unwrap_or("");
        Ok(DiffStats {
            files: extract_number(summary, "file"),
            insertions: extract_number(summary, "insertion"),
            deletions: extract_number(summary, "deletion"),
        })
    }

    async fn head_commit(&self, repo_path: &Path) -> Result<String, GitError> {
        self.git.head_commit(repo_path).await
    }
}

#[cfg(test)]
#[path = "operations_tests.rs"]
mod tests;
