// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git fixture helpers for the integration specs.

use std::path::{Path, PathBuf};
use std::process::Command;

/// Run a git command in `dir`, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .output()
        .expect("git not available");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Run a git command in `dir`, returning success instead of panicking.
pub fn git_ok(dir: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Initialize a repository on branch `main` with one commit.
pub fn init_repo(dir: &Path) {
    git(dir, &["init", "-b", "main"]);
    git(dir, &["config", "user.email", "kagan@example.test"]);
    git(dir, &["config", "user.name", "Kagan Tests"]);
    commit_file(dir, "README.md", "hello\n", "initial commit");
}

/// Write `content` to `name` and commit it.
pub fn commit_file(dir: &Path, name: &str, content: &str, message: &str) {
    std::fs::write(dir.join(name), content).expect("write fixture file");
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", message]);
}

/// Create a bare origin for `repo` and push `main` to it.
/// Returns the origin path.
pub fn add_origin(repo: &Path, parent: &Path) -> PathBuf {
    let origin = parent.join("origin.git");
    git(parent, &["init", "--bare", "-b", "main", origin.to_str().expect("utf8 path")]);
    git(repo, &["remote", "add", "origin", origin.to_str().expect("utf8 path")]);
    git(repo, &["push", "-q", "origin", "main"]);
    origin
}

/// Current HEAD commit of a repository.
pub fn head(dir: &Path) -> String {
    git(dir, &["rev-parse", "HEAD"]).trim().to_string()
}
