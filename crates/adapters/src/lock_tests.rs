// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

fn with_state_dir<T>(f: impl FnOnce(&Path) -> T) -> T {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("KAGAN_STATE_DIR", dir.path());
    let result = f(dir.path());
    std::env::remove_var("KAGAN_STATE_DIR");
    result
}

#[test]
#[serial]
fn acquire_writes_info_file() {
    with_state_dir(|_state| {
        let repo = tempfile::tempdir().unwrap();
        let lock = InstanceLock::acquire(repo.path()).unwrap();
        assert!(lock.lock_path().exists());
        assert!(lock.info_path().exists());

        let info: LockInfo =
            serde_json::from_str(&std::fs::read_to_string(lock.info_path()).unwrap()).unwrap();
        assert_eq!(info.pid, std::process::id());
        assert_eq!(info.repo_path, repo.path().canonicalize().unwrap().display().to_string());
    });
}

#[test]
#[serial]
fn drop_releases_and_cleans_up() {
    with_state_dir(|_state| {
        let repo = tempfile::tempdir().unwrap();
        let lock = InstanceLock::acquire(repo.path()).unwrap();
        let lock_path = lock.lock_path().to_path_buf();
        drop(lock);
        assert!(!lock_path.exists());

        // Re-acquire after release succeeds.
        let lock = InstanceLock::acquire(repo.path()).unwrap();
        drop(lock);
    });
}

#[test]
#[serial]
fn distinct_repos_use_distinct_lock_files() {
    with_state_dir(|_state| {
        let repo_a = tempfile::tempdir().unwrap();
        let repo_b = tempfile::tempdir().unwrap();
        let lock_a = InstanceLock::acquire(repo_a.path()).unwrap();
        let lock_b = InstanceLock::acquire(repo_b.path()).unwrap();
        assert_ne!(lock_a.lock_path(), lock_b.lock_path());
    });
}

#[test]
#[serial]
fn symlinked_repo_resolves_to_same_lock() {
    with_state_dir(|_state| {
        let repo = tempfile::tempdir().unwrap();
        let link = repo.path().parent().unwrap().join(format!(
            "link-{}",
            repo.path().file_name().unwrap().to_string_lossy()
        ));
        std::os::unix::fs::symlink(repo.path(), &link).unwrap();

        let direct = InstanceLock::acquire(repo.path()).unwrap();
        let via_link_path = {
            // Same canonical path means the same lock file name.
            let canonical = link.canonicalize().unwrap();
            direct.lock_path().file_name().unwrap().to_string_lossy().into_owned()
                == super::lock_file_name(&canonical)
        };
        assert!(via_link_path);
        std::fs::remove_file(&link).unwrap();
    });
}
