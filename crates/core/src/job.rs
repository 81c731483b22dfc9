// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable job entities and the job status state machine.
//!
//! Once a job reaches a terminal status it never transitions again; a
//! terminal→terminal write is a no-op returning the existing record.

use crate::task::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a durable job.
    pub struct JobId;
}

/// Lifecycle status of a durable job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

crate::simple_display! {
    JobStatus {
        Queued => "queued",
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

crate::parse_variants! {
    JobStatus {
        "queued" => Queued,
        "running" => Running,
        "succeeded" => Succeeded,
        "failed" => Failed,
        "cancelled" => Cancelled,
    }
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Event index of the initial `queued` lifecycle event.
pub const JOB_EVENT_INDEX_INITIAL: i64 = 1;

/// Durable background job lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub task_id: TaskId,
    pub action: String,
    pub status: JobStatus,
    pub params: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub message: Option<String>,
    pub code: Option<String>,
    pub last_attempt_number: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Immutable lifecycle event for a job. `event_index` is strictly
/// increasing per job, starting at [`JOB_EVENT_INDEX_INITIAL`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEventRecord {
    pub id: String,
    pub job_id: JobId,
    pub task_id: TaskId,
    pub event_index: i64,
    pub status: JobStatus,
    pub message: Option<String>,
    pub code: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Execution attempt for a job. Unique on `(job_id, attempt_number)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAttempt {
    pub id: String,
    pub job_id: JobId,
    pub attempt_number: i64,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub code: Option<String>,
    pub result: Option<serde_json::Value>,
}

/// Outcome returned by a job executor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl JobOutcome {
    pub fn ok(code: impl Into<String>) -> Self {
        Self {
            success: true,
            message: None,
            code: Some(code.into()),
            data: serde_json::Value::Null,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            code: Some(code.into()),
            data: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
