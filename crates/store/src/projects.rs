// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project and repo repositories, including the project↔repo junction and
//! the persisted app state row.

use crate::error::StoreError;
use crate::factory::SessionFactory;
use crate::row::{dt_col, dt_to_sql, json_col, opt_dt_col, opt_dt_to_sql};
use chrono::{DateTime, Utc};
use kagan_core::{new_id, Project, ProjectId, ProjectRepo, Repo, RepoId};
use rusqlite::{params, Row};
use std::collections::BTreeMap;

fn map_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: ProjectId::from_string(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        last_opened_at: opt_dt_col(row, 3)?,
        created_at: dt_col(row, 4)?,
        updated_at: dt_col(row, 5)?,
    })
}

fn map_repo(row: &Row<'_>) -> rusqlite::Result<Repo> {
    let scripts: BTreeMap<String, String> =
        serde_json::from_value(json_col(row, 6)?).unwrap_or_default();
    Ok(Repo {
        id: RepoId::from_string(row.get::<_, String>(0)?),
        name: row.get(1)?,
        path: row.get(2)?,
        display_name: row.get(3)?,
        default_working_dir: row.get(4)?,
        default_branch: row.get(5)?,
        scripts,
        created_at: dt_col(row, 7)?,
        updated_at: dt_col(row, 8)?,
    })
}

const PROJECT_COLUMNS: &str =
    "id, name, description, last_opened_at, created_at, updated_at";
const REPO_COLUMNS: &str = "id, name, path, display_name, default_working_dir, \
     default_branch, scripts, created_at, updated_at";

/// Repository for projects and the app-state row.
#[derive(Clone)]
pub struct ProjectRepository {
    factory: SessionFactory,
}

impl ProjectRepository {
    pub fn new(factory: SessionFactory) -> Self {
        Self { factory }
    }

    pub fn create(&self, project: &Project) -> Result<(), StoreError> {
        let session = self.factory.session()?;
        session.conn()?.execute(
            "INSERT INTO projects (id, name, description, last_opened_at, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                project.id.as_str(),
                project.name,
                project.description,
                opt_dt_to_sql(project.last_opened_at),
                dt_to_sql(project.created_at),
                dt_to_sql(project.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![project_id], map_project)?;
        Ok(rows.next().transpose()?)
    }

    pub fn list(&self) -> Result<Vec<Project>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], map_project)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn touch_last_opened(
        &self,
        project_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let session = self.factory.session()?;
        session.conn()?.execute(
            "UPDATE projects SET last_opened_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![dt_to_sql(now), project_id],
        )?;
        Ok(())
    }

    /// Persist the last-active project/repo pair under a fixed key.
    pub fn save_app_state(
        &self,
        project_id: Option<&str>,
        repo_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let session = self.factory.session()?;
        session.conn()?.execute(
            "INSERT INTO app_state (key, last_active_project_id, last_active_repo_id, updated_at) \
             VALUES ('app', ?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET last_active_project_id = ?1, \
             last_active_repo_id = ?2, updated_at = ?3",
            params![project_id, repo_id, dt_to_sql(now)],
        )?;
        Ok(())
    }

    pub fn load_app_state(&self) -> Result<(Option<String>, Option<String>), StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(
            "SELECT last_active_project_id, last_active_repo_id FROM app_state WHERE key = 'app'",
        )?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok((row.get(0)?, row.get(1)?)),
            None => Ok((None, None)),
        }
    }
}

/// Repository for repos and their project/workspace junctions.
#[derive(Clone)]
pub struct RepoRepository {
    factory: SessionFactory,
}

impl RepoRepository {
    pub fn new(factory: SessionFactory) -> Self {
        Self { factory }
    }

    pub fn create(&self, repo: &Repo) -> Result<(), StoreError> {
        let session = self.factory.session()?;
        session.conn()?.execute(
            "INSERT INTO repos (id, name, path, display_name, default_working_dir, \
             default_branch, scripts, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                repo.id.as_str(),
                repo.name,
                repo.path,
                repo.display_name,
                repo.default_working_dir,
                repo.default_branch,
                serde_json::to_string(&repo.scripts)?,
                dt_to_sql(repo.created_at),
                dt_to_sql(repo.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, repo_id: &str) -> Result<Option<Repo>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {REPO_COLUMNS} FROM repos WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![repo_id], map_repo)?;
        Ok(rows.next().transpose()?)
    }

    pub fn get_by_path(&self, path: &str) -> Result<Option<Repo>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {REPO_COLUMNS} FROM repos WHERE path = ?1"))?;
        let mut rows = stmt.query_map(params![path], map_repo)?;
        Ok(rows.next().transpose()?)
    }

    /// Get the repo for `path`, creating it when missing.
    pub fn get_or_create(
        &self,
        name: &str,
        path: &str,
        default_branch: &str,
        now: DateTime<Utc>,
    ) -> Result<Repo, StoreError> {
        if let Some(repo) = self.get_by_path(path)? {
            return Ok(repo);
        }
        let repo = Repo::create(name, path, default_branch, now);
        self.create(&repo)?;
        Ok(repo)
    }

    pub fn list_for_project(&self, project_id: &str) -> Result<Vec<Repo>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT r.id, r.name, r.path, r.display_name, r.default_working_dir, \
             r.default_branch, r.scripts, r.created_at, r.updated_at \
             FROM repos r \
             JOIN project_repos pr ON pr.repo_id = r.id \
             WHERE pr.project_id = ?1 \
             ORDER BY pr.display_order ASC, r.name ASC"
        ))?;
        let rows = stmt.query_map(params![project_id], map_repo)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn add_to_project(
        &self,
        project_id: &str,
        repo_id: &str,
        is_primary: bool,
        display_order: i64,
        now: DateTime<Utc>,
    ) -> Result<ProjectRepo, StoreError> {
        let id = new_id();
        let session = self.factory.session()?;
        session.conn()?.execute(
            "INSERT OR IGNORE INTO project_repos \
             (id, project_id, repo_id, is_primary, display_order, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, project_id, repo_id, is_primary, display_order, dt_to_sql(now)],
        )?;
        Ok(ProjectRepo {
            id,
            project_id: ProjectId::from_string(project_id),
            repo_id: RepoId::from_string(repo_id),
            is_primary,
            display_order,
            created_at: now,
        })
    }

    pub fn remove_from_project(
        &self,
        project_id: &str,
        repo_id: &str,
    ) -> Result<bool, StoreError> {
        let session = self.factory.session()?;
        let deleted = session.conn()?.execute(
            "DELETE FROM project_repos WHERE project_id = ?1 AND repo_id = ?2",
            params![project_id, repo_id],
        )?;
        Ok(deleted > 0)
    }

    pub fn update_default_branch(
        &self,
        repo_id: &str,
        branch: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let session = self.factory.session()?;
        session.conn()?.execute(
            "UPDATE repos SET default_branch = ?1, updated_at = ?2 WHERE id = ?3",
            params![branch, dt_to_sql(now), repo_id],
        )?;
        Ok(())
    }

    /// Merge plugin-owned metadata keys into `scripts`.
    pub fn merge_scripts(
        &self,
        repo_id: &str,
        entries: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Repo>, StoreError> {
        let Some(mut repo) = self.get(repo_id)? else {
            return Ok(None);
        };
        repo.scripts.extend(entries.clone());
        let session = self.factory.session()?;
        session.conn()?.execute(
            "UPDATE repos SET scripts = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(&repo.scripts)?, dt_to_sql(now), repo_id],
        )?;
        repo.updated_at = now;
        Ok(Some(repo))
    }
}

#[cfg(test)]
#[path = "projects_tests.rs"]
mod tests;
