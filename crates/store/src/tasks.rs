// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task repository: CRUD, search, counts, and task links.

use crate::error::StoreError;
use crate::factory::SessionFactory;
use crate::row::{dt_col, dt_to_sql, enum_col, json_col, opt_enum_col};
use chrono::{DateTime, Utc};
use kagan_core::{
    PairTerminalBackend, ProjectId, Task, TaskId, TaskPriority, TaskStatus, TaskType,
};
use rusqlite::{params, Row};
use std::collections::HashMap;

const TASK_COLUMNS: &str = "id, project_id, parent_id, title, description, status, priority, \
     task_type, terminal_backend, agent_backend, base_branch, acceptance_criteria, \
     created_at, updated_at";

fn map_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let criteria = json_col(row, 11)?;
    let acceptance_criteria: Vec<String> = serde_json::from_value(criteria).unwrap_or_default();
    Ok(Task {
        id: TaskId::from_string(row.get::<_, String>(0)?),
        project_id: ProjectId::from_string(row.get::<_, String>(1)?),
        parent_id: row.get::<_, Option<String>>(2)?.map(TaskId::from_string),
        title: row.get(3)?,
        description: row.get(4)?,
        status: enum_col(row, 5, TaskStatus::parse)?,
        priority: enum_col(row, 6, TaskPriority::parse)?,
        task_type: enum_col(row, 7, TaskType::parse)?,
        terminal_backend: opt_enum_col(row, 8, PairTerminalBackend::parse)?,
        agent_backend: row.get(9)?,
        base_branch: row.get(10)?,
        acceptance_criteria,
        created_at: dt_col(row, 12)?,
        updated_at: dt_col(row, 13)?,
    })
}

/// Partial update applied by [`TaskRepository::update`]. `None` fields are
/// left untouched; `terminal_backend`/`base_branch` use a nested option so
/// callers can clear them explicitly.
#[derive(Debug, Default, Clone)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub task_type: Option<TaskType>,
    pub terminal_backend: Option<Option<PairTerminalBackend>>,
    pub agent_backend: Option<Option<String>>,
    pub base_branch: Option<Option<String>>,
    pub acceptance_criteria: Option<Vec<String>>,
}

impl TaskPatch {
    /// Names of the fields this patch touches, for `TaskUpdated` events.
    pub fn fields_changed(&self) -> Vec<String> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push("title".to_string());
        }
        if self.description.is_some() {
            fields.push("description".to_string());
        }
        if self.status.is_some() {
            fields.push("status".to_string());
        }
        if self.priority.is_some() {
            fields.push("priority".to_string());
        }
        if self.task_type.is_some() {
            fields.push("task_type".to_string());
        }
        if self.terminal_backend.is_some() {
            fields.push("terminal_backend".to_string());
        }
        if self.agent_backend.is_some() {
            fields.push("agent_backend".to_string());
        }
        if self.base_branch.is_some() {
            fields.push("base_branch".to_string());
        }
        if self.acceptance_criteria.is_some() {
            fields.push("acceptance_criteria".to_string());
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields_changed().is_empty()
    }
}

/// Repository for tasks and task links.
#[derive(Clone)]
pub struct TaskRepository {
    factory: SessionFactory,
}

impl TaskRepository {
    pub fn new(factory: SessionFactory) -> Self {
        Self { factory }
    }

    pub fn create(&self, task: &Task) -> Result<(), StoreError> {
        let session = self.factory.session()?;
        session.conn()?.execute(
            "INSERT INTO tasks (id, project_id, parent_id, title, description, status, \
             priority, task_type, terminal_backend, agent_backend, base_branch, \
             acceptance_criteria, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                task.id.as_str(),
                task.project_id.as_str(),
                task.parent_id.as_ref().map(|id| id.as_str().to_string()),
                task.title,
                task.description,
                task.status.to_string(),
                task.priority.to_string(),
                task.task_type.to_string(),
                task.terminal_backend.map(|b| b.to_string()),
                task.agent_backend,
                task.base_branch,
                serde_json::to_string(&task.acceptance_criteria)?,
                dt_to_sql(task.created_at),
                dt_to_sql(task.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![task_id], map_task)?;
        Ok(rows.next().transpose()?)
    }

    pub fn get_all(&self, project_id: Option<&str>) -> Result<Vec<Task>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let tasks = match project_id {
            Some(project_id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ?1 \
                     ORDER BY created_at ASC, id ASC"
                ))?;
                let rows = stmt.query_map(params![project_id], map_task)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at ASC, id ASC"
                ))?;
                let rows = stmt.query_map([], map_task)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(tasks)
    }

    pub fn get_by_status(
        &self,
        status: TaskStatus,
        project_id: Option<&str>,
    ) -> Result<Vec<Task>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let tasks = match project_id {
            Some(project_id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE status = ?1 AND project_id = ?2 \
                     ORDER BY created_at ASC, id ASC"
                ))?;
                let rows = stmt.query_map(params![status.to_string(), project_id], map_task)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE status = ?1 \
                     ORDER BY created_at ASC, id ASC"
                ))?;
                let rows = stmt.query_map(params![status.to_string()], map_task)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(tasks)
    }

    /// Tasks matching the given IDs within one project.
    pub fn get_by_ids(
        &self,
        task_ids: &[String],
        project_id: &str,
    ) -> Result<Vec<Task>, StoreError> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let placeholders = vec!["?"; task_ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE project_id = ? AND id IN ({placeholders})"
        ))?;
        let mut args: Vec<&dyn rusqlite::ToSql> = vec![&project_id];
        for id in task_ids {
            args.push(id);
        }
        let rows = stmt.query_map(args.as_slice(), map_task)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update(
        &self,
        task_id: &str,
        patch: &TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>, StoreError> {
        {
            let session = self.factory.session()?;
            let conn = session.conn()?;

            let mut sets: Vec<String> = Vec::new();
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            let mut push = |sets: &mut Vec<String>,
                            args: &mut Vec<Box<dyn rusqlite::ToSql>>,
                            column: &str,
                            value: Box<dyn rusqlite::ToSql>| {
                args.push(value);
                sets.push(format!("{column} = ?{}", args.len()));
            };

            if let Some(ref title) = patch.title {
                push(&mut sets, &mut args, "title", Box::new(title.clone()));
            }
            if let Some(ref description) = patch.description {
                push(&mut sets, &mut args, "description", Box::new(description.clone()));
            }
            if let Some(status) = patch.status {
                push(&mut sets, &mut args, "status", Box::new(status.to_string()));
            }
            if let Some(priority) = patch.priority {
                push(&mut sets, &mut args, "priority", Box::new(priority.to_string()));
            }
            if let Some(task_type) = patch.task_type {
                push(&mut sets, &mut args, "task_type", Box::new(task_type.to_string()));
            }
            if let Some(ref backend) = patch.terminal_backend {
                push(
                    &mut sets,
                    &mut args,
                    "terminal_backend",
                    Box::new(backend.map(|b| b.to_string())),
                );
            }
            if let Some(ref agent) = patch.agent_backend {
                push(&mut sets, &mut args, "agent_backend", Box::new(agent.clone()));
            }
            if let Some(ref branch) = patch.base_branch {
                push(&mut sets, &mut args, "base_branch", Box::new(branch.clone()));
            }
            if let Some(ref criteria) = patch.acceptance_criteria {
                push(
                    &mut sets,
                    &mut args,
                    "acceptance_criteria",
                    Box::new(serde_json::to_string(criteria)?),
                );
            }

            if sets.is_empty() {
                drop(session);
                return self.get(task_id);
            }

            push(&mut sets, &mut args, "updated_at", Box::new(dt_to_sql(now)));
            args.push(Box::new(task_id.to_string()));
            let sql = format!(
                "UPDATE tasks SET {} WHERE id = ?{}",
                sets.join(", "),
                args.len()
            );
            let arg_refs: Vec<&dyn rusqlite::ToSql> =
                args.iter().map(|a| a.as_ref()).collect();
            let changed = conn.execute(&sql, arg_refs.as_slice())?;
            if changed == 0 {
                return Ok(None);
            }
        }
        self.get(task_id)
    }

    /// Delete a task together with its links (both directions).
    pub fn delete(&self, task_id: &str) -> Result<bool, StoreError> {
        let mut session = self.factory.session()?;
        let tx = session.transaction()?;
        tx.execute(
            "DELETE FROM task_links WHERE task_id = ?1 OR ref_task_id = ?1",
            params![task_id],
        )?;
        let deleted = tx.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    pub fn search(&self, query: &str) -> Result<Vec<Task>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let pattern = format!("%{query}%");
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE title LIKE ?1 OR description LIKE ?1 \
             ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![pattern], map_task)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn counts(&self) -> Result<HashMap<TaskStatus, i64>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")?;
        let mut counts = HashMap::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            if let Some(status) = TaskStatus::parse(&status) {
                counts.insert(status, count);
            }
        }
        Ok(counts)
    }

    /// Replace all outgoing links of a task in one transaction.
    ///
    /// Callers pass validated ref IDs; insertion happens in ascending
    /// order so the stored sequence is deterministic.
    pub fn replace_task_links(
        &self,
        task_id: &str,
        ref_task_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut sorted: Vec<&String> = ref_task_ids.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut session = self.factory.session()?;
        let tx = session.transaction()?;
        tx.execute("DELETE FROM task_links WHERE task_id = ?1", params![task_id])?;
        for ref_id in sorted {
            if ref_id.as_str() == task_id {
                continue;
            }
            tx.execute(
                "INSERT OR IGNORE INTO task_links (task_id, ref_task_id, created_at) \
                 VALUES (?1, ?2, ?3)",
                params![task_id, ref_id, dt_to_sql(now)],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_task_links(&self, task_id: &str) -> Result<Vec<String>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(
            "SELECT ref_task_id FROM task_links WHERE task_id = ?1 ORDER BY ref_task_id ASC",
        )?;
        let rows = stmt.query_map(params![task_id], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
