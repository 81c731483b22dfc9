// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-recovery behavior of the durable job service across process
//! restarts, driven through the bootstrap wiring and a real DB file.

use kagan_core::{JobId, JobStatus, KaganConfig, TaskId};
use kagan_host::create_app_context;
use kagan_store::{JobRepository, SessionFactory};
use serde_json::json;

#[tokio::test]
async fn restart_recovers_interrupted_jobs_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("kagan.db");

    // A previous instance left one queued and one running job behind.
    {
        let factory = SessionFactory::open(&db_path).unwrap();
        let repository = JobRepository::new(factory.clone());
        repository
            .create_job(
                &JobId::from_string("aaaa1111"),
                &TaskId::from_string("tttt0000"),
                "merge",
                &json!({"task_id": "tttt0000"}),
                chrono::Utc::now(),
                "Job queued",
                "JOB_QUEUED",
            )
            .unwrap();
        repository
            .create_job(
                &JobId::from_string("bbbb2222"),
                &TaskId::from_string("tttt0000"),
                "start_agent",
                &json!({"task_id": "tttt0000"}),
                chrono::Utc::now(),
                "Job queued",
                "JOB_QUEUED",
            )
            .unwrap();
        repository
            .mark_running("bbbb2222", chrono::Utc::now(), "Job running", "JOB_RUNNING")
            .unwrap();
        factory.close();
    }

    // The fresh core recovers both before serving its first request.
    let ctx = create_app_context(KaganConfig::default(), &db_path).unwrap();
    for job_id in ["aaaa1111", "bbbb2222"] {
        let job = ctx.jobs.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.code.as_deref(), Some("JOB_RECOVERED_INTERRUPTED"));

        let events = ctx.jobs.events(job_id, "tttt0000").await.unwrap().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.status, JobStatus::Failed);
        assert_eq!(last.code.as_deref(), Some("JOB_RECOVERED_INTERRUPTED"));
        let indices: Vec<i64> = events.iter().map(|event| event.event_index).collect();
        let expected: Vec<i64> = (1..=indices.len() as i64).collect();
        assert_eq!(indices, expected);
    }

    // New work proceeds normally after recovery.
    let job = ctx
        .jobs
        .submit(&TaskId::from_string("tttt0000"), "noop", json!({}))
        .await
        .unwrap();
    let done = ctx
        .jobs
        .wait(job.id.as_str(), "tttt0000", None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status, JobStatus::Succeeded);
    ctx.close().await;

    // A second restart finds nothing to recover.
    let ctx = create_app_context(KaganConfig::default(), &db_path).unwrap();
    let job = ctx.jobs.get("aaaa1111").await.unwrap().unwrap();
    let events = ctx.jobs.events("aaaa1111", "tttt0000").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(events.len(), 2, "recovery must not append twice");
    ctx.close().await;
}
