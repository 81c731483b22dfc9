// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution repository (C8): append-only execution runs with chunked
//! JSONL logs, coding-agent turns, and per-repo HEAD snapshots.

use crate::error::StoreError;
use crate::factory::SessionFactory;
use crate::row::{dt_col, dt_to_sql, enum_col, json_col, opt_dt_col, opt_dt_to_sql};
use chrono::{DateTime, Utc};
use kagan_core::{
    new_id, CodingAgentTurn, ExecutionId, ExecutionProcess, ExecutionProcessLog,
    ExecutionProcessRepoState, ExecutionRunReason, ExecutionStatus, RepoId, SessionId,
};
use rusqlite::{params, Row};
use std::collections::HashMap;

const EXECUTION_COLUMNS: &str = "id, session_id, run_reason, executor_action, status, \
     exit_code, dropped, started_at, completed_at, error, metadata, created_at, updated_at";

fn map_execution(row: &Row<'_>) -> rusqlite::Result<ExecutionProcess> {
    Ok(ExecutionProcess {
        id: ExecutionId::from_string(row.get::<_, String>(0)?),
        session_id: SessionId::from_string(row.get::<_, String>(1)?),
        run_reason: enum_col(row, 2, ExecutionRunReason::parse)?,
        executor_action: json_col(row, 3)?,
        status: enum_col(row, 4, ExecutionStatus::parse)?,
        exit_code: row.get(5)?,
        dropped: row.get(6)?,
        started_at: dt_col(row, 7)?,
        completed_at: opt_dt_col(row, 8)?,
        error: row.get(9)?,
        metadata: json_col(row, 10)?,
        created_at: dt_col(row, 11)?,
        updated_at: dt_col(row, 12)?,
    })
}

fn map_log(row: &Row<'_>) -> rusqlite::Result<ExecutionProcessLog> {
    Ok(ExecutionProcessLog {
        id: row.get(0)?,
        execution_process_id: ExecutionId::from_string(row.get::<_, String>(1)?),
        logs: row.get(2)?,
        byte_size: row.get(3)?,
        inserted_at: dt_col(row, 4)?,
    })
}

fn map_turn(row: &Row<'_>) -> rusqlite::Result<CodingAgentTurn> {
    Ok(CodingAgentTurn {
        id: row.get(0)?,
        execution_process_id: ExecutionId::from_string(row.get::<_, String>(1)?),
        agent_session_id: row.get(2)?,
        prompt: row.get(3)?,
        summary: row.get(4)?,
        seen: row.get(5)?,
        agent_message_id: row.get(6)?,
        created_at: dt_col(row, 7)?,
        updated_at: dt_col(row, 8)?,
    })
}

/// Repository for execution processes and their satellites.
#[derive(Clone)]
pub struct ExecutionRepository {
    factory: SessionFactory,
}

impl ExecutionRepository {
    pub fn new(factory: SessionFactory) -> Self {
        Self { factory }
    }

    /// Open a new execution row in RUNNING state.
    pub fn create(
        &self,
        session_id: &SessionId,
        run_reason: ExecutionRunReason,
        executor_action: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<ExecutionProcess, StoreError> {
        let execution = ExecutionProcess {
            id: ExecutionId::new(),
            session_id: *session_id,
            run_reason,
            executor_action: executor_action.clone(),
            status: ExecutionStatus::Running,
            exit_code: None,
            dropped: false,
            started_at: now,
            completed_at: None,
            error: None,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            created_at: now,
            updated_at: now,
        };
        let session = self.factory.session()?;
        session.conn()?.execute(
            "INSERT INTO execution_processes \
             (id, session_id, run_reason, executor_action, status, exit_code, dropped, \
             started_at, completed_at, error, metadata, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                execution.id.as_str(),
                execution.session_id.as_str(),
                execution.run_reason.to_string(),
                serde_json::to_string(&execution.executor_action)?,
                execution.status.to_string(),
                execution.exit_code,
                execution.dropped,
                dt_to_sql(execution.started_at),
                opt_dt_to_sql(execution.completed_at),
                execution.error,
                serde_json::to_string(&execution.metadata)?,
                dt_to_sql(execution.created_at),
                dt_to_sql(execution.updated_at),
            ],
        )?;
        Ok(execution)
    }

    pub fn get(&self, execution_id: &str) -> Result<Option<ExecutionProcess>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM execution_processes WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![execution_id], map_execution)?;
        Ok(rows.next().transpose()?)
    }

    /// Transition an execution to a terminal status. Returns the updated
    /// row, or the unchanged row when it is already terminal — terminal
    /// transitions happen exactly once.
    pub fn complete(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        exit_code: Option<i64>,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<ExecutionProcess>, StoreError> {
        debug_assert!(status.is_terminal());
        {
            let session = self.factory.session()?;
            session.conn()?.execute(
                "UPDATE execution_processes \
                 SET status = ?1, exit_code = ?2, error = ?3, completed_at = ?4, updated_at = ?4 \
                 WHERE id = ?5 AND status IN ('PENDING', 'RUNNING')",
                params![status.to_string(), exit_code, error, dt_to_sql(now), execution_id],
            )?;
        }
        self.get(execution_id)
    }

    /// Append one chunk of JSONL log output.
    pub fn append_log(
        &self,
        execution_id: &str,
        logs: &str,
        now: DateTime<Utc>,
    ) -> Result<ExecutionProcessLog, StoreError> {
        let log = ExecutionProcessLog {
            id: new_id(),
            execution_process_id: ExecutionId::from_string(execution_id),
            logs: logs.to_string(),
            byte_size: logs.len() as i64,
            inserted_at: now,
        };
        let session = self.factory.session()?;
        session.conn()?.execute(
            "INSERT INTO execution_process_logs \
             (id, execution_process_id, logs, byte_size, inserted_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                log.id,
                log.execution_process_id.as_str(),
                log.logs,
                log.byte_size,
                dt_to_sql(log.inserted_at),
            ],
        )?;
        Ok(log)
    }

    /// Log chunks in insertion order; concatenation yields the full log.
    pub fn log_entries(
        &self,
        execution_id: &str,
    ) -> Result<Vec<ExecutionProcessLog>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, execution_process_id, logs, byte_size, inserted_at \
             FROM execution_process_logs WHERE execution_process_id = ?1 \
             ORDER BY inserted_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![execution_id], map_log)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Full reassembled log text.
    pub fn full_log(&self, execution_id: &str) -> Result<String, StoreError> {
        let entries = self.log_entries(execution_id)?;
        Ok(entries.into_iter().map(|entry| entry.logs).collect())
    }

    pub fn append_agent_turn(
        &self,
        execution_id: &str,
        agent_session_id: Option<&str>,
        prompt: Option<&str>,
        summary: Option<&str>,
        agent_message_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CodingAgentTurn, StoreError> {
        let turn = CodingAgentTurn {
            id: new_id(),
            execution_process_id: ExecutionId::from_string(execution_id),
            agent_session_id: agent_session_id.map(str::to_string),
            prompt: prompt.map(str::to_string),
            summary: summary.map(str::to_string),
            seen: false,
            agent_message_id: agent_message_id.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        let session = self.factory.session()?;
        session.conn()?.execute(
            "INSERT INTO coding_agent_turns \
             (id, execution_process_id, agent_session_id, prompt, summary, seen, \
             agent_message_id, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                turn.id,
                turn.execution_process_id.as_str(),
                turn.agent_session_id,
                turn.prompt,
                turn.summary,
                turn.seen,
                turn.agent_message_id,
                dt_to_sql(turn.created_at),
                dt_to_sql(turn.updated_at),
            ],
        )?;
        Ok(turn)
    }

    pub fn list_agent_turns(
        &self,
        execution_id: &str,
    ) -> Result<Vec<CodingAgentTurn>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, execution_process_id, agent_session_id, prompt, summary, seen, \
             agent_message_id, created_at, updated_at \
             FROM coding_agent_turns WHERE execution_process_id = ?1 \
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![execution_id], map_turn)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Record the before-HEAD snapshot for a repo, returning the row ID.
    pub fn add_repo_state(
        &self,
        execution_id: &str,
        repo_id: &RepoId,
        before_head_commit: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let id = new_id();
        let session = self.factory.session()?;
        session.conn()?.execute(
            "INSERT INTO execution_process_repo_states \
             (id, execution_process_id, repo_id, before_head_commit, after_head_commit, \
             merge_commit, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, NULL, NULL, ?5, ?5)",
            params![id, execution_id, repo_id.as_str(), before_head_commit, dt_to_sql(now)],
        )?;
        Ok(id)
    }

    /// Fill in the after-HEAD snapshot once the run finished.
    pub fn finish_repo_state(
        &self,
        repo_state_id: &str,
        after_head_commit: Option<&str>,
        merge_commit: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let session = self.factory.session()?;
        session.conn()?.execute(
            "UPDATE execution_process_repo_states \
             SET after_head_commit = ?1, merge_commit = ?2, updated_at = ?3 WHERE id = ?4",
            params![after_head_commit, merge_commit, dt_to_sql(now), repo_state_id],
        )?;
        Ok(())
    }

    pub fn list_repo_states(
        &self,
        execution_id: &str,
    ) -> Result<Vec<ExecutionProcessRepoState>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, execution_process_id, repo_id, before_head_commit, after_head_commit, \
             merge_commit, created_at, updated_at \
             FROM execution_process_repo_states WHERE execution_process_id = ?1 \
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![execution_id], |row| {
            Ok(ExecutionProcessRepoState {
                id: row.get(0)?,
                execution_process_id: ExecutionId::from_string(row.get::<_, String>(1)?),
                repo_id: RepoId::from_string(row.get::<_, String>(2)?),
                before_head_commit: row.get(3)?,
                after_head_commit: row.get(4)?,
                merge_commit: row.get(5)?,
                created_at: dt_col(row, 6)?,
                updated_at: dt_col(row, 7)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Most recent execution for a task (joined via session → workspace).
    pub fn latest_for_task(&self, task_id: &str) -> Result<Option<ExecutionProcess>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM execution_processes \
             WHERE session_id IN (\
                 SELECT s.id FROM sessions s \
                 JOIN workspaces w ON w.id = s.workspace_id \
                 WHERE w.task_id = ?1) \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query_map(params![task_id], map_execution)?;
        Ok(rows.next().transpose()?)
    }

    /// One most-recent RUNNING execution per task for the given task set.
    pub fn running_for_tasks(
        &self,
        task_ids: &[String],
    ) -> Result<HashMap<String, ExecutionProcess>, StoreError> {
        if task_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let placeholders = vec!["?"; task_ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT w.task_id, e.id, e.session_id, e.run_reason, e.executor_action, e.status, \
             e.exit_code, e.dropped, e.started_at, e.completed_at, e.error, e.metadata, \
             e.created_at, e.updated_at \
             FROM execution_processes e \
             JOIN sessions s ON s.id = e.session_id \
             JOIN workspaces w ON w.id = s.workspace_id \
             WHERE e.status = 'RUNNING' AND w.task_id IN ({placeholders}) \
             ORDER BY e.created_at DESC, e.id DESC"
        ))?;
        let args: Vec<&dyn rusqlite::ToSql> =
            task_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        let mut rows = stmt.query(args.as_slice())?;
        let mut running: HashMap<String, ExecutionProcess> = HashMap::new();
        while let Some(row) = rows.next()? {
            let task_id: String = row.get(0)?;
            if running.contains_key(&task_id) {
                continue;
            }
            let execution = ExecutionProcess {
                id: ExecutionId::from_string(row.get::<_, String>(1)?),
                session_id: SessionId::from_string(row.get::<_, String>(2)?),
                run_reason: enum_col(row, 3, ExecutionRunReason::parse)?,
                executor_action: json_col(row, 4)?,
                status: enum_col(row, 5, ExecutionStatus::parse)?,
                exit_code: row.get(6)?,
                dropped: row.get(7)?,
                started_at: dt_col(row, 8)?,
                completed_at: opt_dt_col(row, 9)?,
                error: row.get(10)?,
                metadata: json_col(row, 11)?,
                created_at: dt_col(row, 12)?,
                updated_at: dt_col(row, 13)?,
            };
            running.insert(task_id, execution);
        }
        Ok(running)
    }

    pub fn count_for_task(&self, task_id: &str) -> Result<i64, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM execution_processes \
             WHERE session_id IN (\
                 SELECT s.id FROM sessions s \
                 JOIN workspaces w ON w.id = s.workspace_id \
                 WHERE w.task_id = ?1)",
            params![task_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
#[path = "executions_tests.rs"]
mod tests;
