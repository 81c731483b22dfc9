// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-repository instance lock.
//!
//! The lock file lives under the user's XDG state directory, never inside
//! the repository, and is keyed by the canonical (symlink-resolved) repo
//! path. A companion `.info` file records the holder so a rejected second
//! instance can tell the user who owns the lock.

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Holder metadata written next to the lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub hostname: String,
    pub repo_path: String,
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another kagan instance holds the lock for {repo_path}")]
    AlreadyLocked {
        repo_path: String,
        holder: Option<LockInfo>,
    },

    #[error("failed to prepare lock directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Exclusive instance lock for one repository. Released on drop.
pub struct InstanceLock {
    file: File,
    lock_path: PathBuf,
    info_path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock for `repo_path`, rejecting when another process
    /// for the same canonical path already holds it.
    pub fn acquire(repo_path: &Path) -> Result<Self, LockError> {
        let canonical = repo_path
            .canonicalize()
            .unwrap_or_else(|_| repo_path.to_path_buf());
        let lock_dir = state_dir().join("locks");
        std::fs::create_dir_all(&lock_dir)?;

        let lock_path = lock_dir.join(lock_file_name(&canonical));
        let info_path = lock_path.with_extension("info");

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        if file.try_lock_exclusive().is_err() {
            let holder = read_info(&info_path);
            return Err(LockError::AlreadyLocked {
                repo_path: canonical.display().to_string(),
                holder,
            });
        }

        let info = LockInfo {
            pid: std::process::id(),
            hostname: hostname(),
            repo_path: canonical.display().to_string(),
        };
        write_info(&info_path, &info)?;

        Ok(Self { file, lock_path, info_path })
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn info_path(&self) -> &Path {
        &self.info_path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.info_path);
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("KAGAN_STATE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("kagan")
}

/// Lock file name: readable repo dir name plus a hash of the full path.
fn lock_file_name(canonical: &Path) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    canonical.hash(&mut hasher);
    let digest = hasher.finish();
    let stem = canonical
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repo".to_string());
    format!("{stem}-{digest:016x}.lock")
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn read_info(info_path: &Path) -> Option<LockInfo> {
    let content = std::fs::read_to_string(info_path).ok()?;
    serde_json::from_str(&content).ok()
}

fn write_info(info_path: &Path, info: &LockInfo) -> std::io::Result<()> {
    let mut file = File::create(info_path)?;
    let payload = serde_json::to_string_pretty(info).unwrap_or_default();
    file.write_all(payload.as_bytes())
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
