// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution entities: one row per agent-process invocation, with chunked
//! JSONL logs, coding-agent turns, and per-repo HEAD snapshots.
//!
//! Execution rows are append-only after reaching a terminal status.

use crate::project::RepoId;
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for an execution process.
    pub struct ExecutionId;
}

/// Why an execution was started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionRunReason {
    #[default]
    CodingAgent,
    Review,
    Script,
}

crate::simple_display! {
    ExecutionRunReason {
        CodingAgent => "CODING_AGENT",
        Review => "REVIEW",
        Script => "SCRIPT",
    }
}

crate::parse_variants! {
    ExecutionRunReason {
        "CODING_AGENT" => CodingAgent,
        "REVIEW" => Review,
        "SCRIPT" => Script,
    }
}

/// Lifecycle status of an execution process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    #[default]
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

crate::simple_display! {
    ExecutionStatus {
        Pending => "PENDING",
        Running => "RUNNING",
        Succeeded => "SUCCEEDED",
        Failed => "FAILED",
        Cancelled => "CANCELLED",
    }
}

crate::parse_variants! {
    ExecutionStatus {
        "PENDING" => Pending,
        "RUNNING" => Running,
        "SUCCEEDED" => Succeeded,
        "FAILED" => Failed,
        "CANCELLED" => Cancelled,
    }
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// Single execution run for a workspace session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionProcess {
    pub id: ExecutionId,
    pub session_id: SessionId,
    pub run_reason: ExecutionRunReason,
    pub executor_action: serde_json::Value,
    pub status: ExecutionStatus,
    pub exit_code: Option<i64>,
    pub dropped: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One chunk of the JSONL log stream for an execution process.
///
/// Concatenating chunks ordered by `(inserted_at, id)` yields the full log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionProcessLog {
    pub id: String,
    pub execution_process_id: ExecutionId,
    pub logs: String,
    pub byte_size: i64,
    pub inserted_at: DateTime<Utc>,
}

/// Prompt/summary data for one coding-agent turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodingAgentTurn {
    pub id: String,
    pub execution_process_id: ExecutionId,
    pub agent_session_id: Option<String>,
    pub prompt: Option<String>,
    pub summary: Option<String>,
    pub seen: bool,
    pub agent_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-repo HEAD snapshot for an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionProcessRepoState {
    pub id: String,
    pub execution_process_id: ExecutionId,
    pub repo_id: RepoId,
    pub before_head_commit: Option<String>,
    pub after_head_commit: Option<String>,
    pub merge_commit: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
