// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-repository instance lock behavior.

use kagan_adapters::{InstanceLock, LockError};
use serial_test::serial;

#[test]
#[serial]
fn second_acquire_for_same_repo_is_rejected() {
    let state = tempfile::tempdir().unwrap();
    std::env::set_var("KAGAN_STATE_DIR", state.path());

    let repo = tempfile::tempdir().unwrap();
    let first = InstanceLock::acquire(repo.path()).unwrap();

    match InstanceLock::acquire(repo.path()) {
        Err(LockError::AlreadyLocked { holder, .. }) => {
            let holder = holder.expect("holder info recorded");
            assert_eq!(holder.pid, std::process::id());
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("second acquire unexpectedly succeeded"),
    }

    drop(first);
    // Released locks can be re-acquired.
    let _again = InstanceLock::acquire(repo.path()).unwrap();
    std::env::remove_var("KAGAN_STATE_DIR");
}

#[test]
#[serial]
fn lock_lives_outside_the_repository() {
    let state = tempfile::tempdir().unwrap();
    std::env::set_var("KAGAN_STATE_DIR", state.path());

    let repo = tempfile::tempdir().unwrap();
    let lock = InstanceLock::acquire(repo.path()).unwrap();
    assert!(lock.lock_path().starts_with(state.path()));
    assert!(!lock.lock_path().starts_with(repo.path()));
    std::env::remove_var("KAGAN_STATE_DIR");
}
