// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace repository: workspaces and the workspace↔repo junction.

use crate::error::StoreError;
use crate::factory::SessionFactory;
use crate::row::{dt_col, dt_to_sql, enum_col};
use chrono::{DateTime, Utc};
use kagan_core::{
    new_id, ProjectId, RepoId, TaskId, Workspace, WorkspaceId, WorkspaceRepo, WorkspaceStatus,
};
use rusqlite::{params, Row};

const WORKSPACE_COLUMNS: &str =
    "id, project_id, task_id, branch_name, path, status, created_at, updated_at";

fn map_workspace(row: &Row<'_>) -> rusqlite::Result<Workspace> {
    Ok(Workspace {
        id: WorkspaceId::from_string(row.get::<_, String>(0)?),
        project_id: ProjectId::from_string(row.get::<_, String>(1)?),
        task_id: row.get::<_, Option<String>>(2)?.map(TaskId::from_string),
        branch_name: row.get(3)?,
        path: row.get(4)?,
        status: enum_col(row, 5, WorkspaceStatus::parse)?,
        created_at: dt_col(row, 6)?,
        updated_at: dt_col(row, 7)?,
    })
}

fn map_workspace_repo(row: &Row<'_>) -> rusqlite::Result<WorkspaceRepo> {
    Ok(WorkspaceRepo {
        id: row.get(0)?,
        workspace_id: WorkspaceId::from_string(row.get::<_, String>(1)?),
        repo_id: RepoId::from_string(row.get::<_, String>(2)?),
        target_branch: row.get(3)?,
        worktree_path: row.get(4)?,
        created_at: dt_col(row, 5)?,
        updated_at: dt_col(row, 6)?,
    })
}

/// Repository for workspaces.
#[derive(Clone)]
pub struct WorkspaceRepository {
    factory: SessionFactory,
}

impl WorkspaceRepository {
    pub fn new(factory: SessionFactory) -> Self {
        Self { factory }
    }

    pub fn create(&self, workspace: &Workspace) -> Result<(), StoreError> {
        let session = self.factory.session()?;
        session.conn()?.execute(
            "INSERT INTO workspaces \
             (id, project_id, task_id, branch_name, path, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                workspace.id.as_str(),
                workspace.project_id.as_str(),
                workspace.task_id.as_ref().map(|id| id.as_str().to_string()),
                workspace.branch_name,
                workspace.path,
                workspace.status.to_string(),
                dt_to_sql(workspace.created_at),
                dt_to_sql(workspace.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, workspace_id: &str) -> Result<Option<Workspace>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![workspace_id], map_workspace)?;
        Ok(rows.next().transpose()?)
    }

    /// Primary (most recent active) workspace for a task.
    pub fn get_for_task(&self, task_id: &str) -> Result<Option<Workspace>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces \
             WHERE task_id = ?1 AND status = 'ACTIVE' \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query_map(params![task_id], map_workspace)?;
        Ok(rows.next().transpose()?)
    }

    pub fn list_for_project(&self, project_id: &str) -> Result<Vec<Workspace>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE project_id = ?1 \
             ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![project_id], map_workspace)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn set_status(
        &self,
        workspace_id: &str,
        status: WorkspaceStatus,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let session = self.factory.session()?;
        session.conn()?.execute(
            "UPDATE workspaces SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.to_string(), dt_to_sql(now), workspace_id],
        )?;
        Ok(())
    }

    pub fn add_repo(&self, workspace_repo: &WorkspaceRepo) -> Result<(), StoreError> {
        let session = self.factory.session()?;
        session.conn()?.execute(
            "INSERT INTO workspace_repos \
             (id, workspace_id, repo_id, target_branch, worktree_path, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                workspace_repo.id,
                workspace_repo.workspace_id.as_str(),
                workspace_repo.repo_id.as_str(),
                workspace_repo.target_branch,
                workspace_repo.worktree_path,
                dt_to_sql(workspace_repo.created_at),
                dt_to_sql(workspace_repo.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn list_repos(&self, workspace_id: &str) -> Result<Vec<WorkspaceRepo>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, workspace_id, repo_id, target_branch, worktree_path, \
             created_at, updated_at \
             FROM workspace_repos WHERE workspace_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![workspace_id], map_workspace_repo)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Build a fresh workspace-repo junction row.
    pub fn new_repo_row(
        workspace_id: WorkspaceId,
        repo_id: RepoId,
        target_branch: impl Into<String>,
        worktree_path: Option<String>,
        now: DateTime<Utc>,
    ) -> WorkspaceRepo {
        WorkspaceRepo {
            id: new_id(),
            workspace_id,
            repo_id,
            target_branch: target_branch.into(),
            worktree_path,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
#[path = "workspaces_tests.rs"]
mod tests;
