// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auxiliary repositories: audit events, scratch payloads, session
//! records, and planner proposals.

use crate::error::StoreError;
use crate::factory::SessionFactory;
use crate::row::{dt_col, dt_to_sql, enum_col, json_col, opt_dt_col, opt_dt_to_sql};
use chrono::{DateTime, Utc};
use kagan_core::{
    new_id, AuditEvent, PlannerProposal, ProjectId, ProposalStatus, RepoId, Scratch, ScratchType,
    Session, SessionId, SessionStatus, SessionType, WorkspaceId, SCRATCHPAD_LIMIT,
};
use rusqlite::{params, Row};

/// Immutable audit log of command/capability invocations.
#[derive(Clone)]
pub struct AuditRepository {
    factory: SessionFactory,
}

impl AuditRepository {
    pub fn new(factory: SessionFactory) -> Self {
        Self { factory }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        actor_type: &str,
        actor_id: &str,
        session_id: Option<&str>,
        capability: &str,
        command_name: &str,
        payload_json: &str,
        result_json: &str,
        success: bool,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let session = self.factory.session()?;
        session.conn()?.execute(
            "INSERT INTO audit_events (id, occurred_at, actor_type, actor_id, session_id, \
             capability, command_name, payload_json, result_json, success) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                new_id(),
                dt_to_sql(now),
                actor_type,
                actor_id,
                session_id,
                capability,
                command_name,
                payload_json,
                result_json,
                success,
            ],
        )?;
        Ok(())
    }

    pub fn list_events(&self, limit: usize) -> Result<Vec<AuditEvent>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, occurred_at, actor_type, actor_id, session_id, capability, \
             command_name, payload_json, result_json, success \
             FROM audit_events ORDER BY occurred_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(AuditEvent {
                id: row.get(0)?,
                occurred_at: dt_col(row, 1)?,
                actor_type: row.get(2)?,
                actor_id: row.get(3)?,
                session_id: row.get(4)?,
                capability: row.get(5)?,
                command_name: row.get(6)?,
                payload_json: row.get(7)?,
                result_json: row.get(8)?,
                success: row.get(9)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

/// Per-task scratchpad storage inside the scratch table.
#[derive(Clone)]
pub struct ScratchRepository {
    factory: SessionFactory,
}

impl ScratchRepository {
    pub fn new(factory: SessionFactory) -> Self {
        Self { factory }
    }

    pub fn get_scratchpad(&self, task_id: &str) -> Result<String, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(
            "SELECT payload FROM scratches \
             WHERE scratch_type = ?1 AND json_extract(payload, '$.task_id') = ?2",
        )?;
        let mut rows =
            stmt.query_map(params![ScratchType::WorkspaceNotes.to_string(), task_id], |row| {
                row.get::<_, String>(0)
            })?;
        match rows.next().transpose()? {
            None => Ok(String::new()),
            Some(text) => {
                let payload: serde_json::Value = serde_json::from_str(&text)?;
                Ok(payload
                    .get("content")
                    .and_then(|value| value.as_str())
                    .unwrap_or_default()
                    .to_string())
            }
        }
    }

    /// Write the scratchpad, keeping only the last [`SCRATCHPAD_LIMIT`]
    /// bytes of content.
    pub fn update_scratchpad(
        &self,
        task_id: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let content = tail_bytes(content, SCRATCHPAD_LIMIT);
        let payload = serde_json::json!({ "task_id": task_id, "content": content });
        let payload_text = serde_json::to_string(&payload)?;

        let session = self.factory.session()?;
        let conn = session.conn()?;
        let updated = conn.execute(
            "UPDATE scratches SET payload = ?1, updated_at = ?2 \
             WHERE scratch_type = ?3 AND json_extract(payload, '$.task_id') = ?4",
            params![
                payload_text,
                dt_to_sql(now),
                ScratchType::WorkspaceNotes.to_string(),
                task_id
            ],
        )?;
        if updated == 0 {
            conn.execute(
                "INSERT INTO scratches (id, scratch_type, payload, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![
                    new_id(),
                    ScratchType::WorkspaceNotes.to_string(),
                    payload_text,
                    dt_to_sql(now)
                ],
            )?;
        }
        Ok(())
    }

    pub fn delete_scratchpad(&self, task_id: &str) -> Result<bool, StoreError> {
        let session = self.factory.session()?;
        let deleted = session.conn()?.execute(
            "DELETE FROM scratches \
             WHERE scratch_type = ?1 AND json_extract(payload, '$.task_id') = ?2",
            params![ScratchType::WorkspaceNotes.to_string(), task_id],
        )?;
        Ok(deleted > 0)
    }

    pub fn get_raw(&self, scratch_id: &str) -> Result<Option<Scratch>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, scratch_type, payload, created_at, updated_at FROM scratches \
             WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![scratch_id], |row| {
            Ok(Scratch {
                id: row.get(0)?,
                scratch_type: enum_col(row, 1, ScratchType::parse)?,
                payload: json_col(row, 2)?,
                created_at: dt_col(row, 3)?,
                updated_at: dt_col(row, 4)?,
            })
        })?;
        Ok(rows.next().transpose()?)
    }
}

/// Keep the trailing `limit` bytes of `content` on a char boundary.
fn tail_bytes(content: &str, limit: usize) -> &str {
    if content.len() <= limit {
        return content;
    }
    let mut start = content.len() - limit;
    while !content.is_char_boundary(start) {
        start += 1;
    }
    &content[start..]
}

fn map_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: SessionId::from_string(row.get::<_, String>(0)?),
        workspace_id: WorkspaceId::from_string(row.get::<_, String>(1)?),
        session_type: enum_col(row, 2, SessionType::parse)?,
        status: enum_col(row, 3, SessionStatus::parse)?,
        external_id: row.get(4)?,
        started_at: dt_col(row, 5)?,
        ended_at: opt_dt_col(row, 6)?,
    })
}

const SESSION_COLUMNS: &str =
    "id, workspace_id, session_type, status, external_id, started_at, ended_at";

/// Session records bound to workspaces.
#[derive(Clone)]
pub struct SessionRecordRepository {
    factory: SessionFactory,
}

impl SessionRecordRepository {
    pub fn new(factory: SessionFactory) -> Self {
        Self { factory }
    }

    pub fn create(
        &self,
        workspace_id: &WorkspaceId,
        session_type: SessionType,
        external_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Session, StoreError> {
        let record = Session {
            id: SessionId::new(),
            workspace_id: *workspace_id,
            session_type,
            status: SessionStatus::Active,
            external_id: external_id.map(str::to_string),
            started_at: now,
            ended_at: None,
        };
        let session = self.factory.session()?;
        session.conn()?.execute(
            "INSERT INTO sessions \
             (id, workspace_id, session_type, status, external_id, started_at, ended_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id.as_str(),
                record.workspace_id.as_str(),
                record.session_type.to_string(),
                record.status.to_string(),
                record.external_id,
                dt_to_sql(record.started_at),
                opt_dt_to_sql(record.ended_at),
            ],
        )?;
        Ok(record)
    }

    pub fn get(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![session_id], map_session)?;
        Ok(rows.next().transpose()?)
    }

    /// Most recent active session for a workspace.
    pub fn get_active_for_workspace(
        &self,
        workspace_id: &str,
    ) -> Result<Option<Session>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE workspace_id = ?1 AND status = 'ACTIVE' \
             ORDER BY started_at DESC, id DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query_map(params![workspace_id], map_session)?;
        Ok(rows.next().transpose()?)
    }

    pub fn close(
        &self,
        session_id: &str,
        status: SessionStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        {
            let session = self.factory.session()?;
            session.conn()?.execute(
                "UPDATE sessions SET status = ?1, ended_at = ?2 WHERE id = ?3",
                params![status.to_string(), dt_to_sql(now), session_id],
            )?;
        }
        self.get(session_id)
    }

    pub fn close_by_external_id(
        &self,
        external_id: &str,
        status: SessionStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let found = {
            let session = self.factory.session()?;
            let conn = session.conn()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions \
                 WHERE external_id = ?1 AND status = 'ACTIVE' \
                 ORDER BY started_at DESC, id DESC LIMIT 1"
            ))?;
            let mut rows = stmt.query_map(params![external_id], map_session)?;
            rows.next().transpose()?
        };
        match found {
            None => Ok(None),
            Some(record) => self.close(record.id.as_str(), status, now),
        }
    }
}

/// Persisted planner proposal drafts.
#[derive(Clone)]
pub struct PlannerRepository {
    factory: SessionFactory,
}

impl PlannerRepository {
    pub fn new(factory: SessionFactory) -> Self {
        Self { factory }
    }

    pub fn save(
        &self,
        project_id: &ProjectId,
        repo_id: Option<&RepoId>,
        tasks_json: &serde_json::Value,
        todos_json: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<PlannerProposal, StoreError> {
        let proposal = PlannerProposal {
            id: new_id(),
            project_id: *project_id,
            repo_id: repo_id.copied(),
            tasks_json: tasks_json.clone(),
            todos_json: todos_json.clone(),
            status: ProposalStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        let session = self.factory.session()?;
        session.conn()?.execute(
            "INSERT INTO planner_proposals \
             (id, project_id, repo_id, tasks_json, todos_json, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                proposal.id,
                proposal.project_id.as_str(),
                proposal.repo_id.as_ref().map(|id| id.as_str().to_string()),
                serde_json::to_string(&proposal.tasks_json)?,
                serde_json::to_string(&proposal.todos_json)?,
                proposal.status.to_string(),
                dt_to_sql(now),
            ],
        )?;
        Ok(proposal)
    }

    pub fn get(&self, proposal_id: &str) -> Result<Option<PlannerProposal>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, repo_id, tasks_json, todos_json, status, created_at, \
             updated_at FROM planner_proposals WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![proposal_id], map_proposal)?;
        Ok(rows.next().transpose()?)
    }

    pub fn list_pending(&self, project_id: &str) -> Result<Vec<PlannerProposal>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, repo_id, tasks_json, todos_json, status, created_at, \
             updated_at FROM planner_proposals \
             WHERE project_id = ?1 AND status = 'DRAFT' \
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![project_id], map_proposal)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update_status(
        &self,
        proposal_id: &str,
        status: ProposalStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<PlannerProposal>, StoreError> {
        {
            let session = self.factory.session()?;
            session.conn()?.execute(
                "UPDATE planner_proposals SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.to_string(), dt_to_sql(now), proposal_id],
            )?;
        }
        self.get(proposal_id)
    }

    pub fn delete(&self, proposal_id: &str) -> Result<bool, StoreError> {
        let session = self.factory.session()?;
        let deleted = session
            .conn()?
            .execute("DELETE FROM planner_proposals WHERE id = ?1", params![proposal_id])?;
        Ok(deleted > 0)
    }
}

fn map_proposal(row: &Row<'_>) -> rusqlite::Result<PlannerProposal> {
    Ok(PlannerProposal {
        id: row.get(0)?,
        project_id: ProjectId::from_string(row.get::<_, String>(1)?),
        repo_id: row.get::<_, Option<String>>(2)?.map(RepoId::from_string),
        tasks_json: json_col(row, 3)?,
        todos_json: json_col(row, 4)?,
        status: enum_col(row, 5, ProposalStatus::parse)?,
        created_at: dt_col(row, 6)?,
        updated_at: dt_col(row, 7)?,
    })
}

/// Repository for merge records.
#[derive(Clone)]
pub struct MergeRepository {
    factory: SessionFactory,
}

impl MergeRepository {
    pub fn new(factory: SessionFactory) -> Self {
        Self { factory }
    }

    pub fn record(
        &self,
        workspace_id: &WorkspaceId,
        repo_id: &RepoId,
        merge_type: kagan_core::MergeType,
        target_branch_name: &str,
        merge_commit: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<kagan_core::Merge, StoreError> {
        let merge = kagan_core::Merge {
            id: new_id(),
            workspace_id: *workspace_id,
            repo_id: *repo_id,
            merge_type,
            target_branch_name: target_branch_name.to_string(),
            merge_commit: merge_commit.map(str::to_string),
            pr_url: None,
            pr_number: None,
            pr_status: kagan_core::MergeStatus::Merged,
            pr_merged_at: None,
            pr_merge_commit_sha: None,
            created_at: now,
            updated_at: now,
        };
        let session = self.factory.session()?;
        session.conn()?.execute(
            "INSERT INTO merges (id, workspace_id, repo_id, merge_type, target_branch_name, \
             merge_commit, pr_url, pr_number, pr_status, pr_merged_at, pr_merge_commit_sha, \
             created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, ?7, NULL, NULL, ?8, ?8)",
            params![
                merge.id,
                merge.workspace_id.as_str(),
                merge.repo_id.as_str(),
                merge.merge_type.to_string(),
                merge.target_branch_name,
                merge.merge_commit,
                merge.pr_status.to_string(),
                dt_to_sql(now),
            ],
        )?;
        Ok(merge)
    }

    pub fn list_for_workspace(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<kagan_core::Merge>, StoreError> {
        let session = self.factory.session()?;
        let conn = session.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, workspace_id, repo_id, merge_type, target_branch_name, merge_commit, \
             pr_url, pr_number, pr_status, pr_merged_at, pr_merge_commit_sha, created_at, \
             updated_at FROM merges WHERE workspace_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![workspace_id], |row| {
            Ok(kagan_core::Merge {
                id: row.get(0)?,
                workspace_id: WorkspaceId::from_string(row.get::<_, String>(1)?),
                repo_id: RepoId::from_string(row.get::<_, String>(2)?),
                merge_type: enum_col(row, 3, kagan_core::MergeType::parse)?,
                target_branch_name: row.get(4)?,
                merge_commit: row.get(5)?,
                pr_url: row.get(6)?,
                pr_number: row.get(7)?,
                pr_status: enum_col(row, 8, kagan_core::MergeStatus::parse)?,
                pr_merged_at: opt_dt_col(row, 9)?,
                pr_merge_commit_sha: row.get(10)?,
                created_at: dt_col(row, 11)?,
                updated_at: dt_col(row, 12)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
#[path = "auxiliary_tests.rs"]
mod tests;
