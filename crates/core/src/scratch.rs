// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auxiliary entities: scratch payloads, audit events, planner proposals.

use crate::project::RepoId;
use crate::task::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum byte length retained for per-workspace notes. Writes keep the
/// last bytes, dropping the oldest content.
pub const SCRATCHPAD_LIMIT: usize = 10_240;

/// Kind of a scratch payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScratchType {
    WorkspaceNotes,
}

crate::simple_display! {
    ScratchType {
        WorkspaceNotes => "WORKSPACE_NOTES",
    }
}

crate::parse_variants! {
    ScratchType {
        "WORKSPACE_NOTES" => WorkspaceNotes,
    }
}

/// Free-form scratch payload storage, keyed by composite lookups inside
/// the JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scratch {
    pub id: String,
    pub scratch_type: ScratchType,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable audit log entry for command/capability invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_type: String,
    pub actor_id: String,
    pub session_id: Option<String>,
    pub capability: String,
    pub command_name: String,
    pub payload_json: String,
    pub result_json: String,
    pub success: bool,
}

/// Lifecycle status of a planner proposal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    #[default]
    Draft,
    Approved,
    Dismissed,
}

crate::simple_display! {
    ProposalStatus {
        Draft => "DRAFT",
        Approved => "APPROVED",
        Dismissed => "DISMISSED",
    }
}

crate::parse_variants! {
    ProposalStatus {
        "DRAFT" => Draft,
        "APPROVED" => Approved,
        "DISMISSED" => Dismissed,
    }
}

/// Persisted planner proposal draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerProposal {
    pub id: String,
    pub project_id: ProjectId,
    pub repo_id: Option<RepoId>,
    pub tasks_json: serde_json::Value,
    pub todos_json: serde_json::Value,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
