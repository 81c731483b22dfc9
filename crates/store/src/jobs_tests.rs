// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn setup() -> JobRepository {
    let factory = SessionFactory::open_in_memory().unwrap();
    JobRepository::new(factory)
}

fn submit(repo: &JobRepository, job_id: &str, task_id: &str) -> Job {
    repo.create_job(
        &JobId::from_string(job_id),
        &TaskId::from_string(task_id),
        "noop_succeed",
        &json!({}),
        Utc::now(),
        "Job queued",
        "JOB_QUEUED",
    )
    .unwrap()
}

#[test]
fn create_job_writes_initial_event() {
    let repo = setup();
    let job = submit(&repo, "aaaa1111", "tttt0000");
    assert_eq!(job.status, JobStatus::Queued);

    let events = repo.list_events("aaaa1111").unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_index, JOB_EVENT_INDEX_INITIAL);
    assert_eq!(events[0].status, JobStatus::Queued);
    assert_eq!(events[0].code.as_deref(), Some("JOB_QUEUED"));
}

#[test]
fn full_lifecycle_produces_gapless_event_indices() {
    let repo = setup();
    submit(&repo, "aaaa1111", "tttt0000");

    let transition = repo
        .mark_running("aaaa1111", Utc::now(), "Job running", "JOB_RUNNING")
        .unwrap()
        .unwrap();
    assert!(transition.transitioned);
    assert_eq!(transition.job.last_attempt_number, 1);

    let transition = repo
        .complete_job(
            "aaaa1111",
            JobStatus::Succeeded,
            Utc::now(),
            Some("done"),
            Some("OK"),
            Some(&json!({"success": true})),
        )
        .unwrap()
        .unwrap();
    assert!(transition.transitioned);

    let events = repo.list_events("aaaa1111").unwrap();
    let indices: Vec<i64> = events.iter().map(|event| event.event_index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    let statuses: Vec<JobStatus> = events.iter().map(|event| event.status).collect();
    assert_eq!(
        statuses,
        vec![JobStatus::Queued, JobStatus::Running, JobStatus::Succeeded]
    );
}

#[test]
fn terminal_write_is_idempotent() {
    let repo = setup();
    submit(&repo, "aaaa1111", "tttt0000");
    repo.mark_running("aaaa1111", Utc::now(), "Job running", "JOB_RUNNING")
        .unwrap();
    repo.complete_job("aaaa1111", JobStatus::Cancelled, Utc::now(), None, None, None)
        .unwrap();

    let again = repo
        .complete_job(
            "aaaa1111",
            JobStatus::Succeeded,
            Utc::now(),
            Some("late"),
            Some("LATE"),
            None,
        )
        .unwrap()
        .unwrap();
    assert!(!again.transitioned);
    assert_eq!(again.job.status, JobStatus::Cancelled);

    // No extra event was appended.
    assert_eq!(repo.list_events("aaaa1111").unwrap().len(), 3);
}

#[test]
fn mark_running_twice_does_not_transition() {
    let repo = setup();
    submit(&repo, "aaaa1111", "tttt0000");
    repo.mark_running("aaaa1111", Utc::now(), "Job running", "JOB_RUNNING")
        .unwrap();
    let second = repo
        .mark_running("aaaa1111", Utc::now(), "Job running", "JOB_RUNNING")
        .unwrap()
        .unwrap();
    assert!(!second.transitioned);
    assert_eq!(second.job.last_attempt_number, 1);
    assert_eq!(repo.list_attempts("aaaa1111").unwrap().len(), 1);
}

#[test]
fn attempt_opened_on_running_closed_on_terminal() {
    let repo = setup();
    submit(&repo, "aaaa1111", "tttt0000");
    repo.mark_running("aaaa1111", Utc::now(), "Job running", "JOB_RUNNING")
        .unwrap();

    let attempts = repo.list_attempts("aaaa1111").unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].attempt_number, 1);
    assert!(attempts[0].finished_at.is_none());

    repo.complete_job(
        "aaaa1111",
        JobStatus::Failed,
        Utc::now(),
        Some("boom"),
        Some("ERR"),
        None,
    )
    .unwrap();
    let attempts = repo.list_attempts("aaaa1111").unwrap();
    assert_eq!(attempts[0].status, JobStatus::Failed);
    assert!(attempts[0].finished_at.is_some());
    assert_eq!(attempts[0].message.as_deref(), Some("boom"));
}

#[test]
fn recovery_fails_all_non_terminal_jobs() {
    let repo = setup();
    submit(&repo, "aaaa1111", "tttt0000");
    submit(&repo, "bbbb2222", "tttt0000");
    repo.mark_running("bbbb2222", Utc::now(), "Job running", "JOB_RUNNING")
        .unwrap();
    submit(&repo, "cccc3333", "tttt0000");
    repo.mark_running("cccc3333", Utc::now(), "Job running", "JOB_RUNNING")
        .unwrap();
    repo.complete_job("cccc3333", JobStatus::Succeeded, Utc::now(), None, Some("OK"), None)
        .unwrap();

    let recovered = repo
        .recover_non_terminal_jobs(
            Utc::now(),
            "Job interrupted by previous service shutdown",
            "JOB_RECOVERED_INTERRUPTED",
            &json!({"success": false, "code": "JOB_RECOVERED_INTERRUPTED"}),
        )
        .unwrap();
    assert_eq!(recovered.len(), 2);

    for job_id in ["aaaa1111", "bbbb2222"] {
        let job = repo.get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.code.as_deref(), Some("JOB_RECOVERED_INTERRUPTED"));
        let last = repo.list_events(job_id).unwrap().pop().unwrap();
        assert_eq!(last.status, JobStatus::Failed);
        assert_eq!(last.code.as_deref(), Some("JOB_RECOVERED_INTERRUPTED"));
    }

    // The interrupted running job has its attempt closed.
    let attempts = repo.list_attempts("bbbb2222").unwrap();
    assert_eq!(attempts[0].status, JobStatus::Failed);
    assert!(attempts[0].finished_at.is_some());

    // Terminal jobs are untouched.
    let done = repo.get_job("cccc3333").unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Succeeded);

    // Nothing left to recover.
    assert!(repo.list_non_terminal_jobs().unwrap().is_empty());
}

#[test]
fn recovery_with_no_stale_jobs_is_empty() {
    let repo = setup();
    let recovered = repo
        .recover_non_terminal_jobs(Utc::now(), "msg", "CODE", &json!({}))
        .unwrap();
    assert!(recovered.is_empty());
}

#[test]
fn complete_preserves_result_when_none_given() {
    let repo = setup();
    submit(&repo, "aaaa1111", "tttt0000");
    repo.mark_running("aaaa1111", Utc::now(), "Job running", "JOB_RUNNING")
        .unwrap();
    repo.complete_job(
        "aaaa1111",
        JobStatus::Succeeded,
        Utc::now(),
        None,
        Some("OK"),
        Some(&json!({"success": true, "n": 7})),
    )
    .unwrap();

    let job = repo.get_job("aaaa1111").unwrap().unwrap();
    assert_eq!(job.result.unwrap()["n"], 7);
}
