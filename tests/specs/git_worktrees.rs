// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worktree, base-ref, and merge behavior against real git repositories.

use super::support::{add_origin, commit_file, git, head, init_repo};
use kagan_adapters::{
    GitOperationsAdapter, GitOps, GitRunner, GitWorktreeAdapter, SystemGitRunner, WorktreeGit,
};
use kagan_core::BaseRefStrategy;
use std::path::Path;
use std::sync::Arc;

fn worktree_adapter(strategy: BaseRefStrategy) -> GitWorktreeAdapter {
    GitWorktreeAdapter::new(Arc::new(SystemGitRunner) as Arc<dyn GitRunner>, strategy)
}

fn ops_adapter() -> GitOperationsAdapter {
    GitOperationsAdapter::new(Arc::new(SystemGitRunner) as Arc<dyn GitRunner>)
}

#[tokio::test]
async fn create_and_delete_worktree_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    init_repo(&repo);

    let adapter = worktree_adapter(BaseRefStrategy::Remote);
    let worktree = repo.join(".kagan").join("worktrees").join("aaaa0000");
    adapter
        .create_worktree(&repo, &worktree, "kagan/aaaa0000-test", "main")
        .await
        .unwrap();
    assert!(worktree.join("README.md").exists());

    let branches = adapter.list_kagan_branches(&repo).await.unwrap();
    assert_eq!(branches, vec!["kagan/aaaa0000-test"]);

    adapter.delete_worktree(&worktree).await.unwrap();
    assert!(!worktree.exists());
    assert!(adapter.delete_branch(&repo, "kagan/aaaa0000-test", true).await.unwrap());
    assert!(adapter.list_kagan_branches(&repo).await.unwrap().is_empty());
}

#[tokio::test]
async fn base_ref_strategies_with_local_ahead_of_origin() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    init_repo(&repo);
    add_origin(&repo, dir.path());

    // Local main moves two commits ahead of origin/main.
    commit_file(&repo, "a.txt", "one\n", "local commit 1");
    commit_file(&repo, "b.txt", "two\n", "local commit 2");

    let remote = worktree_adapter(BaseRefStrategy::Remote);
    assert_eq!(remote.resolve_base_ref(&repo, "main").await.unwrap(), "origin/main");

    let local_if_ahead = worktree_adapter(BaseRefStrategy::LocalIfAhead);
    assert_eq!(local_if_ahead.resolve_base_ref(&repo, "main").await.unwrap(), "main");

    let local = worktree_adapter(BaseRefStrategy::Local);
    assert_eq!(local.resolve_base_ref(&repo, "main").await.unwrap(), "main");
}

#[tokio::test]
async fn base_ref_local_if_ahead_prefers_remote_when_in_sync() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    init_repo(&repo);
    add_origin(&repo, dir.path());

    let adapter = worktree_adapter(BaseRefStrategy::LocalIfAhead);
    assert_eq!(adapter.resolve_base_ref(&repo, "main").await.unwrap(), "origin/main");

    // Without any remote the local branch is the only option.
    let lonely = dir.path().join("lonely");
    std::fs::create_dir_all(&lonely).unwrap();
    init_repo(&lonely);
    assert_eq!(adapter.resolve_base_ref(&lonely, "main").await.unwrap(), "main");
}

#[tokio::test]
async fn squash_merge_applies_worktree_commits() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    init_repo(&repo);

    let worktrees = worktree_adapter(BaseRefStrategy::Remote);
    let worktree = repo.join(".kagan").join("worktrees").join("aaaa0000");
    worktrees
        .create_worktree(&repo, &worktree, "kagan/aaaa0000-feature", "main")
        .await
        .unwrap();
    commit_file(&worktree, "feature.txt", "new feature\n", "feat: add feature");

    let ops = ops_adapter();
    let result = ops
        .merge_squash(&repo, "kagan/aaaa0000-feature", "main", None)
        .await
        .unwrap();
    assert!(result.success, "merge failed: {}", result.message);
    assert!(result.commit_sha.is_some());
    assert!(repo.join("feature.txt").exists());

    // The squash produced exactly one commit on main.
    let log = git(&repo, &["log", "--oneline"]);
    assert_eq!(log.lines().count(), 2);
    assert!(log.contains("Squash merge kagan/aaaa0000-feature"));
}

#[tokio::test]
async fn squash_merge_conflict_aborts_and_leaves_target_clean() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    init_repo(&repo);
    add_origin(&repo, dir.path());

    let worktrees = worktree_adapter(BaseRefStrategy::Remote);
    let worktree = repo.join(".kagan").join("worktrees").join("aaaa0000");
    worktrees
        .create_worktree(&repo, &worktree, "kagan/aaaa0000-conflict", "main")
        .await
        .unwrap();
    commit_file(&worktree, "README.md", "worktree version\n", "edit readme in worktree");

    // A concurrent, unpushed commit on the local target branch.
    commit_file(&repo, "README.md", "main version\n", "edit readme on main");
    let head_before = head(&repo);

    let ops = ops_adapter();
    let result = ops
        .merge_squash(&repo, "kagan/aaaa0000-conflict", "main", None)
        .await
        .unwrap();
    assert!(!result.success);
    let conflict = result.conflict.expect("conflict metadata");
    assert_eq!(conflict.files, vec!["README.md"]);

    // Abort + hard reset left the target branch untouched and clean.
    assert_eq!(head(&repo), head_before);
    let status = git(&repo, &["status", "--porcelain"]);
    assert_eq!(status.trim(), "");

    // Resolve the conflict inside the task workspace, then retry.
    resolve_in_worktree(&worktree);
    let retry = ops
        .merge_squash(&repo, "kagan/aaaa0000-conflict", "main", None)
        .await
        .unwrap();
    assert!(retry.success, "retry failed: {}", retry.message);
    assert_eq!(
        std::fs::read_to_string(repo.join("README.md")).unwrap(),
        "merged version\n"
    );
}

fn resolve_in_worktree(worktree: &Path) {
    // Merge main, take a merged resolution, and commit it.
    assert!(!super::support::git_ok(worktree, &["merge", "main"]));
    std::fs::write(worktree.join("README.md"), "merged version\n").unwrap();
    git(worktree, &["add", "-A"]);
    git(worktree, &["commit", "-q", "-m", "merge main and resolve"]);
}

#[tokio::test]
async fn base_ahead_guard_demands_rebase() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    init_repo(&repo);

    let worktrees = worktree_adapter(BaseRefStrategy::Remote);
    let worktree = repo.join(".kagan").join("worktrees").join("aaaa0000");
    worktrees
        .create_worktree(&repo, &worktree, "kagan/aaaa0000-stale", "main")
        .await
        .unwrap();
    commit_file(&worktree, "stale.txt", "work\n", "stale work");

    // The target advances; without a remote the local branch is the base.
    commit_file(&repo, "other.txt", "other\n", "target moves on");

    let ops = ops_adapter();
    let result = ops
        .merge_squash(&repo, "kagan/aaaa0000-stale", "main", None)
        .await
        .unwrap();
    assert!(!result.success);
    assert!(result.message.contains("rebase required"));
    assert!(result.conflict.is_none());
}

#[tokio::test]
async fn tracked_dirty_state_is_detected_through_real_status() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    init_repo(&repo);

    let ops = ops_adapter();
    assert!(!ops.has_uncommitted_changes(&repo).await.unwrap());

    // Untracked files don't count.
    std::fs::write(repo.join("scratch.txt"), "x").unwrap();
    assert!(!ops.has_uncommitted_changes(&repo).await.unwrap());

    // Generated config files don't count either.
    std::fs::write(repo.join(".mcp.json"), "{}").unwrap();
    git(&repo, &["add", ".mcp.json"]);
    assert!(!ops.has_uncommitted_changes(&repo).await.unwrap());

    // A tracked modification does.
    std::fs::write(repo.join("README.md"), "changed\n").unwrap();
    assert!(ops.has_uncommitted_changes(&repo).await.unwrap());
}

#[tokio::test]
async fn file_diffs_report_stats_and_status() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    init_repo(&repo);

    let worktrees = worktree_adapter(BaseRefStrategy::Remote);
    let worktree = repo.join(".kagan").join("worktrees").join("aaaa0000");
    worktrees
        .create_worktree(&repo, &worktree, "kagan/aaaa0000-diffs", "main")
        .await
        .unwrap();
    commit_file(&worktree, "added.txt", "line one\nline two\n", "feat: add file");

    let ops = ops_adapter();
    let diffs = ops.get_file_diffs(&worktree, "main").await.unwrap();
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].path, "added.txt");
    assert_eq!(diffs[0].status, "added");
    assert_eq!(diffs[0].additions, 2);
    assert!(diffs[0].diff_content.contains("+line one"));

    let stats = ops.get_diff_stats(&worktree, "main").await.unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(stats.insertions, 2);
}
