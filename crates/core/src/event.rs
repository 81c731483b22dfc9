// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain events published on the in-process event bus.
//!
//! Serializes with `{"type": "entity:name", ...fields}` format.

use crate::job::{JobId, JobStatus};
use crate::task::{ProjectId, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events emitted by services after state mutations.
///
/// Handlers observe events for a single entity in publish order;
/// cross-entity ordering is not guaranteed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    // -- tasks --
    #[serde(rename = "task:created")]
    TaskCreated {
        task_id: TaskId,
        status: TaskStatus,
        title: String,
        created_at: DateTime<Utc>,
    },

    #[serde(rename = "task:updated")]
    TaskUpdated {
        task_id: TaskId,
        fields_changed: Vec<String>,
        updated_at: DateTime<Utc>,
    },

    #[serde(rename = "task:status_changed")]
    TaskStatusChanged {
        task_id: TaskId,
        from_status: TaskStatus,
        to_status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        updated_at: DateTime<Utc>,
    },

    #[serde(rename = "task:deleted")]
    TaskDeleted { task_id: TaskId },

    // -- projects --
    #[serde(rename = "project:opened")]
    ProjectOpened { project_id: ProjectId },

    // -- automation --
    #[serde(rename = "automation:task_started")]
    AutomationTaskStarted { task_id: TaskId },

    #[serde(rename = "automation:agent_attached")]
    AutomationAgentAttached { task_id: TaskId, execution_id: String },

    #[serde(rename = "automation:review_agent_attached")]
    AutomationReviewAgentAttached { task_id: TaskId, execution_id: String },

    #[serde(rename = "automation:task_ended")]
    AutomationTaskEnded { task_id: TaskId, success: bool },

    // -- merges --
    #[serde(rename = "merge:completed")]
    MergeCompleted {
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        merge_commit: Option<String>,
    },

    #[serde(rename = "merge:failed")]
    MergeFailed { task_id: TaskId, message: String },

    // -- jobs --
    #[serde(rename = "job:submitted")]
    JobSubmitted { job_id: JobId, task_id: TaskId, action: String },

    #[serde(rename = "job:finished")]
    JobFinished { job_id: JobId, task_id: TaskId, status: JobStatus },
}

impl DomainEvent {
    /// Task the event concerns, when it has one.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            DomainEvent::TaskCreated { task_id, .. }
            | DomainEvent::TaskUpdated { task_id, .. }
            | DomainEvent::TaskStatusChanged { task_id, .. }
            | DomainEvent::TaskDeleted { task_id }
            | DomainEvent::AutomationTaskStarted { task_id }
            | DomainEvent::AutomationAgentAttached { task_id, .. }
            | DomainEvent::AutomationReviewAgentAttached { task_id, .. }
            | DomainEvent::AutomationTaskEnded { task_id, .. }
            | DomainEvent::MergeCompleted { task_id, .. }
            | DomainEvent::MergeFailed { task_id, .. }
            | DomainEvent::JobSubmitted { task_id, .. }
            | DomainEvent::JobFinished { task_id, .. } => Some(task_id),
            DomainEvent::ProjectOpened { .. } => None,
        }
    }

    /// Short summary for trace logging.
    pub fn log_summary(&self) -> String {
        let t = self.type_tag();
        match self {
            DomainEvent::TaskCreated { task_id, status, .. } => {
                format!("{t} id={task_id} status={status}")
            }
            DomainEvent::TaskStatusChanged { task_id, from_status, to_status, .. } => {
                format!("{t} id={task_id} {from_status}->{to_status}")
            }
            DomainEvent::AutomationTaskEnded { task_id, success } => {
                format!("{t} id={task_id} success={success}")
            }
            DomainEvent::JobFinished { job_id, status, .. } => {
                format!("{t} id={job_id} status={status}")
            }
            other => match other.task_id() {
                Some(id) => format!("{t} id={id}"),
                None => t.to_string(),
            },
        }
    }

    fn type_tag(&self) -> &'static str {
        match self {
            DomainEvent::TaskCreated { .. } => "task:created",
            DomainEvent::TaskUpdated { .. } => "task:updated",
            DomainEvent::TaskStatusChanged { .. } => "task:status_changed",
            DomainEvent::TaskDeleted { .. } => "task:deleted",
            DomainEvent::ProjectOpened { .. } => "project:opened",
            DomainEvent::AutomationTaskStarted { .. } => "automation:task_started",
            DomainEvent::AutomationAgentAttached { .. } => "automation:agent_attached",
            DomainEvent::AutomationReviewAgentAttached { .. } => {
                "automation:review_agent_attached"
            }
            DomainEvent::AutomationTaskEnded { .. } => "automation:task_ended",
            DomainEvent::MergeCompleted { .. } => "merge:completed",
            DomainEvent::MergeFailed { .. } => "merge:failed",
            DomainEvent::JobSubmitted { .. } => "job:submitted",
            DomainEvent::JobFinished { .. } => "job:finished",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
