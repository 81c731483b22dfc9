// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    queued = { JobStatus::Queued, false },
    running = { JobStatus::Running, false },
    succeeded = { JobStatus::Succeeded, true },
    failed = { JobStatus::Failed, true },
    cancelled = { JobStatus::Cancelled, true },
)]
fn terminal_set(status: JobStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
}

#[test]
fn status_display_round_trips_through_parse() {
    for status in [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Succeeded,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ] {
        assert_eq!(JobStatus::parse(&status.to_string()), Some(status));
    }
    assert_eq!(JobStatus::parse("exploded"), None);
}

#[test]
fn outcome_helpers_set_success_flag() {
    let ok = JobOutcome::ok("OK");
    assert!(ok.success);
    assert_eq!(ok.code.as_deref(), Some("OK"));

    let err = JobOutcome::error("BOOM", "it broke");
    assert!(!err.success);
    assert_eq!(err.message.as_deref(), Some("it broke"));
}

#[test]
fn outcome_serializes_without_null_fields() {
    let json = serde_json::to_value(JobOutcome::ok("OK")).unwrap();
    assert_eq!(json["success"], true);
    assert!(json.get("message").is_none());
    assert!(json.get("data").is_none());
}
