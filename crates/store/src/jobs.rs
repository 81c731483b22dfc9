// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job repository: durable jobs, the append-only lifecycle event stream,
//! and execution attempts.
//!
//! Invariants enforced here:
//! - `event_index` is strictly increasing per job (`max + 1`, unique
//!   constraint on `(job_id, event_index)`).
//! - Terminal writes are idempotent: completing an already-terminal job
//!   returns `transitioned = false` and appends no event.
//! - Every `queued → running` transition opens a new attempt;
//!   `running → terminal` closes the latest open attempt.

use crate::error::StoreError;
use crate::factory::SessionFactory;
use crate::row::{dt_col, dt_to_sql, enum_col, json_col, opt_dt_col, opt_json_col};
use chrono::{DateTime, Utc};
use kagan_core::{
    new_id, Job, JobAttempt, JobEventRecord, JobId, JobStatus, TaskId, JOB_EVENT_INDEX_INITIAL,
};
use rusqlite::{params, Row, Transaction};

const JOB_COLUMNS: &str = "id, task_id, action, status, params_json, result_json, message, \
     code, last_attempt_number, created_at, updated_at, finished_at";

fn map_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: JobId::from_string(row.get::<_, String>(0)?),
        task_id: TaskId::from_string(row.get::<_, String>(1)?),
        action: row.get(2)?,
        status: enum_col(row, 3, JobStatus::parse)?,
        params: json_col(row, 4)?,
        result: opt_json_col(row, 5)?,
        message: row.get(6)?,
        code: row.get(7)?,
        last_attempt_number: row.get(8)?,
        created_at: dt_col(row, 9)?,
        updated_at: dt_col(row, 10)?,
        finished_at: opt_dt_col(row, 11)?,
    })
}

fn map_event(row: &Row<'_>) -> rusqlite::Result<JobEventRecord> {
    Ok(JobEventRecord {
        id: row.get(0)?,
        job_id: JobId::from_string(row.get::<_, String>(1)?),
        task_id: TaskId::from_string(row.get::<_, String>(2)?),
        event_index: row.get(3)?,
        status: enum_col(row, 4, JobStatus::parse)?,
        message: row.get(5)?,
        code: row.get(6)?,
        created_at: dt_col(row, 7)?,
    })
}

fn map_attempt(row: &Row<'_>) -> rusqlite::Result<JobAttempt> {
    Ok(JobAttempt {
        id: row.get(0)?,
        job_id: JobId::from_string(row.get::<_, String>(1)?),
        attempt_number: row.get(2)?,
        status: enum_col(row, 3, JobStatus::parse)?,
        started_at: dt_col(row, 4)?,
        finished_at: opt_dt_col(row, 5)?,
        message: row.get(6)?,
        code: row.get(7)?,
        result: opt_json_col(row, 8)?,
    })
}

/// Result of a transition attempt on a job lifecycle state.
#[derive(Debug, Clone)]
pub struct JobTransition {
    pub job: Job,
    pub transitioned: bool,
}

/// Repository for durable jobs, lifecycle events, and attempts.
#[derive(Clone)]
pub struct JobRepository {
    factory: SessionFactory,
}

impl JobRepository {
    pub fn new(factory: SessionFactory) -> Self {
        Self { factory }
    }

    /// Create a queued job and its initial lifecycle event.
    pub fn create_job(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        action: &str,
        params: &serde_json::Value,
        created_at: DateTime<Utc>,
        queued_message: &str,
        queued_code: &str,
    ) -> Result<Job, StoreError> {
        let mut session = self.factory.session()?;
        let tx = session.transaction()?;
        tx.execute(
            "INSERT INTO jobs (id, task_id, action, status, params_json, message, code, \
             last_attempt_number, created_at, updated_at) \
             VALUES (?1, ?2, ?3, 'queued', ?4, ?5, ?6, 0, ?7, ?7)",
            params![
                job_id.as_str(),
                task_id.as_str(),
                action,
                serde_json::to_string(params)?,
                queued_message,
                queued_code,
                dt_to_sql(created_at),
            ],
        )?;
        append_event(
            &tx,
            job_id.as_str(),
            task_id.as_str(),
            JOB_EVENT_INDEX_INITIAL,
            JobStatus::Queued,
            Some(queued_message),
            Some(queued_code),
            created_at,
        )?;
        tx.commit()?;
        Ok(Job {
            id: *job_id,
            task_id: *task_id,
            action: action.to_string(),
            status: JobStatus::Queued,
            params: params.clone(),
            result: None,
            message: Some(queued_message.to_string()),
            code: Some(queued_code.to_string()),
            last_attempt_number: 0,
            created_at,
            updated_at: created_at,
            finished_at: None,
        })
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![job_id], map_job)?;
        Ok(rows.next().transpose()?)
    }

    /// All lifecycle events for a job in ascending `event_index` order.
    pub fn list_events(&self, job_id: &str) -> Result<Vec<JobEventRecord>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, job_id, task_id, event_index, status, message, code, created_at \
             FROM job_events WHERE job_id = ?1 \
             ORDER BY event_index ASC, created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![job_id], map_event)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Jobs left queued/running by a previous process instance.
    pub fn list_non_terminal_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status IN ('queued', 'running') \
             ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], map_job)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Transition a queued job to running and open a new attempt.
    pub fn mark_running(
        &self,
        job_id: &str,
        timestamp: DateTime<Utc>,
        message: &str,
        code: &str,
    ) -> Result<Option<JobTransition>, StoreError> {
        let mut session = self.factory.session()?;
        let tx = session.transaction()?;
        let Some(job) = get_job_tx(&tx, job_id)? else {
            return Ok(None);
        };
        if job.status != JobStatus::Queued {
            return Ok(Some(JobTransition { job, transitioned: false }));
        }

        let attempt_number = job.last_attempt_number + 1;
        tx.execute(
            "UPDATE jobs SET status = 'running', updated_at = ?1, message = ?2, code = ?3, \
             last_attempt_number = ?4 WHERE id = ?5",
            params![dt_to_sql(timestamp), message, code, attempt_number, job_id],
        )?;
        tx.execute(
            "INSERT INTO job_attempts (id, job_id, attempt_number, status, started_at) \
             VALUES (?1, ?2, ?3, 'running', ?4)",
            params![new_id(), job_id, attempt_number, dt_to_sql(timestamp)],
        )?;
        let event_index = next_event_index(&tx, job_id)?;
        append_event(
            &tx,
            job_id,
            job.task_id.as_str(),
            event_index,
            JobStatus::Running,
            Some(message),
            Some(code),
            timestamp,
        )?;
        tx.commit()?;

        let mut job = job;
        job.status = JobStatus::Running;
        job.updated_at = timestamp;
        job.message = Some(message.to_string());
        job.code = Some(code.to_string());
        job.last_attempt_number = attempt_number;
        Ok(Some(JobTransition { job, transitioned: true }))
    }

    /// Transition a job to a terminal state and append the final event.
    ///
    /// A job already in a terminal state is returned unchanged with
    /// `transitioned = false` — repeated terminal writes are no-ops.
    pub fn complete_job(
        &self,
        job_id: &str,
        status: JobStatus,
        timestamp: DateTime<Utc>,
        message: Option<&str>,
        code: Option<&str>,
        result: Option<&serde_json::Value>,
    ) -> Result<Option<JobTransition>, StoreError> {
        debug_assert!(status.is_terminal(), "terminal status required");
        let mut session = self.factory.session()?;
        let tx = session.transaction()?;
        let Some(job) = get_job_tx(&tx, job_id)? else {
            return Ok(None);
        };
        if job.status.is_terminal() {
            return Ok(Some(JobTransition { job, transitioned: false }));
        }

        complete_job_tx(&tx, &job, status, timestamp, message, code, result)?;
        tx.commit()?;

        let mut job = job;
        job.status = status;
        job.updated_at = timestamp;
        job.finished_at = Some(timestamp);
        job.message = message.map(str::to_string);
        job.code = code.map(str::to_string);
        if let Some(result) = result {
            job.result = Some(result.clone());
        }
        Ok(Some(JobTransition { job, transitioned: true }))
    }

    /// Fail all queued/running jobs left behind by previous instances.
    pub fn recover_non_terminal_jobs(
        &self,
        timestamp: DateTime<Utc>,
        message: &str,
        code: &str,
        result: &serde_json::Value,
    ) -> Result<Vec<Job>, StoreError> {
        let stale_jobs = self.list_non_terminal_jobs()?;
        if stale_jobs.is_empty() {
            return Ok(Vec::new());
        }

        let mut session = self.factory.session()?;
        let tx = session.transaction()?;
        let mut recovered = Vec::with_capacity(stale_jobs.len());
        for job in stale_jobs {
            complete_job_tx(
                &tx,
                &job,
                JobStatus::Failed,
                timestamp,
                Some(message),
                Some(code),
                Some(result),
            )?;
            let mut job = job;
            job.status = JobStatus::Failed;
            job.updated_at = timestamp;
            job.finished_at = Some(timestamp);
            job.message = Some(message.to_string());
            job.code = Some(code.to_string());
            job.result = Some(result.clone());
            recovered.push(job);
        }
        tx.commit()?;
        Ok(recovered)
    }

    pub fn list_attempts(&self, job_id: &str) -> Result<Vec<JobAttempt>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, job_id, attempt_number, status, started_at, finished_at, message, \
             code, result_json \
             FROM job_attempts WHERE job_id = ?1 ORDER BY attempt_number ASC",
        )?;
        let rows = stmt.query_map(params![job_id], map_attempt)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn get_job_tx(tx: &Transaction<'_>, job_id: &str) -> Result<Option<Job>, StoreError> {
    let mut stmt = tx.prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))?;
    let mut rows = stmt.query_map(params![job_id], map_job)?;
    Ok(rows.next().transpose()?)
}

fn next_event_index(tx: &Transaction<'_>, job_id: &str) -> Result<i64, StoreError> {
    let max: Option<i64> = tx.query_row(
        "SELECT MAX(event_index) FROM job_events WHERE job_id = ?1",
        params![job_id],
        |row| row.get(0),
    )?;
    Ok(max.map_or(JOB_EVENT_INDEX_INITIAL, |value| value + 1))
}

#[allow(clippy::too_many_arguments)]
fn append_event(
    tx: &Transaction<'_>,
    job_id: &str,
    task_id: &str,
    event_index: i64,
    status: JobStatus,
    message: Option<&str>,
    code: Option<&str>,
    timestamp: DateTime<Utc>,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO job_events (id, job_id, task_id, event_index, status, message, code, \
         created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            new_id(),
            job_id,
            task_id,
            event_index,
            status.to_string(),
            message,
            code,
            dt_to_sql(timestamp),
        ],
    )?;
    Ok(())
}

/// Shared terminal-write path: update the job row, close the latest open
/// attempt, and append the terminal lifecycle event.
fn complete_job_tx(
    tx: &Transaction<'_>,
    job: &Job,
    status: JobStatus,
    timestamp: DateTime<Utc>,
    message: Option<&str>,
    code: Option<&str>,
    result: Option<&serde_json::Value>,
) -> Result<(), StoreError> {
    let result_text = result.map(serde_json::to_string).transpose()?;
    tx.execute(
        "UPDATE jobs SET status = ?1, updated_at = ?2, finished_at = ?2, message = ?3, \
         code = ?4, result_json = COALESCE(?5, result_json) WHERE id = ?6",
        params![
            status.to_string(),
            dt_to_sql(timestamp),
            message,
            code,
            result_text,
            job.id.as_str(),
        ],
    )?;
    tx.execute(
        "UPDATE job_attempts SET status = ?1, finished_at = ?2, message = ?3, code = ?4, \
         result_json = ?5 \
         WHERE job_id = ?6 AND finished_at IS NULL \
         AND attempt_number = (SELECT MAX(attempt_number) FROM job_attempts WHERE job_id = ?6)",
        params![
            status.to_string(),
            dt_to_sql(timestamp),
            message,
            code,
            result_text,
            job.id.as_str(),
        ],
    )?;
    let event_index = next_event_index(tx, job.id.as_str())?;
    append_event(
        tx,
        job.id.as_str(),
        job.task_id.as_str(),
        event_index,
        status,
        message,
        code,
        timestamp,
    )?;
    Ok(())
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
