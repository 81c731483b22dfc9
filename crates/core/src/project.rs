// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project and repository entities.

use crate::task::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

crate::define_id! {
    /// Unique identifier for a filesystem git repository record.
    pub struct RepoId;
}

/// Root aggregate owning tasks, workspaces, and repo associations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: String,
    pub last_opened_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn create(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: ProjectId::new(),
            name: name.into(),
            description: String::new(),
            last_opened_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A filesystem git repository. `path` is canonical and unique.
///
/// `scripts` is a free-form string map used for metadata (plugin
/// connection records live here under plugin-owned keys).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub id: RepoId,
    pub name: String,
    pub path: String,
    pub display_name: Option<String>,
    pub default_working_dir: Option<String>,
    pub default_branch: String,
    pub scripts: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Repo {
    pub fn create(
        name: impl Into<String>,
        path: impl Into<String>,
        default_branch: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RepoId::new(),
            name: name.into(),
            path: path.into(),
            display_name: None,
            default_working_dir: None,
            default_branch: default_branch.into(),
            scripts: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Junction linking a project to a repo. Unique on `(project_id, repo_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRepo {
    pub id: String,
    pub project_id: ProjectId,
    pub repo_id: RepoId,
    pub is_primary: bool,
    pub display_order: i64,
    pub created_at: DateTime<Utc>,
}
