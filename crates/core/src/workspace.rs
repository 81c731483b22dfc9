// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace entity: a git worktree (or set of worktrees) bound to a task.

use crate::project::RepoId;
use crate::task::{ProjectId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a workspace.
    pub struct WorkspaceId;
}

/// Lifecycle status of a workspace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkspaceStatus {
    #[default]
    Active,
    Archived,
    Deleted,
}

crate::simple_display! {
    WorkspaceStatus {
        Active => "ACTIVE",
        Archived => "ARCHIVED",
        Deleted => "DELETED",
    }
}

crate::parse_variants! {
    WorkspaceStatus {
        "ACTIVE" => Active,
        "ARCHIVED" => Archived,
        "DELETED" => Deleted,
    }
}

/// Worktree + branch pairing for a task. One primary workspace per task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub project_id: ProjectId,
    pub task_id: Option<TaskId>,
    pub branch_name: String,
    pub path: String,
    pub status: WorkspaceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Junction binding a workspace to one repo with its target branch.
/// Unique on `(workspace_id, repo_id)`; multi-repo tasks have several rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceRepo {
    pub id: String,
    pub workspace_id: WorkspaceId,
    pub repo_id: RepoId,
    pub target_branch: String,
    pub worktree_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
