// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Merge entity: one row per merge attempt for a workspace repo.

use crate::project::RepoId;
use crate::workspace::WorkspaceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a task branch is merged into its target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeType {
    #[default]
    Direct,
    Squash,
}

crate::simple_display! {
    MergeType {
        Direct => "DIRECT",
        Squash => "SQUASH",
    }
}

crate::parse_variants! {
    MergeType {
        "DIRECT" => Direct,
        "SQUASH" => Squash,
    }
}

/// PR-side status of a merge record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeStatus {
    #[default]
    Open,
    Merged,
    Closed,
}

crate::simple_display! {
    MergeStatus {
        Open => "OPEN",
        Merged => "MERGED",
        Closed => "CLOSED",
    }
}

crate::parse_variants! {
    MergeStatus {
        "OPEN" => Open,
        "MERGED" => Merged,
        "CLOSED" => Closed,
    }
}

/// Merge action and result. A failed merge does not prevent retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merge {
    pub id: String,
    pub workspace_id: WorkspaceId,
    pub repo_id: RepoId,
    pub merge_type: MergeType,
    pub target_branch_name: String,
    pub merge_commit: Option<String>,
    pub pr_url: Option<String>,
    pub pr_number: Option<i64>,
    pub pr_status: MergeStatus,
    pub pr_merged_at: Option<DateTime<Utc>>,
    pub pr_merge_commit_sha: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
