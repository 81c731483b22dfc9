// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session entity: the binding of a work surface to a workspace.

use crate::workspace::WorkspaceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a session record.
    pub struct SessionId;
}

/// Backend kind of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    /// tmux terminal session (PAIR)
    Tmux,
    /// External editor launcher with a startup bundle (PAIR)
    Editor,
    /// Agent process supervised by the automation service (AUTO)
    Acp,
    /// One-shot script execution
    Script,
}

crate::simple_display! {
    SessionType {
        Tmux => "TMUX",
        Editor => "EDITOR",
        Acp => "ACP",
        Script => "SCRIPT",
    }
}

crate::parse_variants! {
    SessionType {
        "TMUX" => Tmux,
        "EDITOR" => Editor,
        "ACP" => Acp,
        "SCRIPT" => Script,
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    #[default]
    Active,
    Closed,
    Failed,
}

crate::simple_display! {
    SessionStatus {
        Active => "ACTIVE",
        Closed => "CLOSED",
        Failed => "FAILED",
    }
}

crate::parse_variants! {
    SessionStatus {
        "ACTIVE" => Active,
        "CLOSED" => Closed,
        "FAILED" => Failed,
    }
}

/// Session record for an execution backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub workspace_id: WorkspaceId,
    pub session_type: SessionType,
    pub status: SessionStatus,
    /// Backend-specific handle (tmux session name, bundle path, pid).
    pub external_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}
