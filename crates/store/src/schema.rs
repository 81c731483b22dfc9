// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema definition and the additive compatibility pass.
//!
//! JSON payloads are TEXT columns; timestamps are RFC 3339 TEXT. There are
//! no destructive migrations: legacy databases only ever gain columns.

use rusqlite::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    last_opened_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_projects_name ON projects(name);

CREATE TABLE IF NOT EXISTS repos (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    path TEXT NOT NULL UNIQUE,
    display_name TEXT,
    default_working_dir TEXT,
    default_branch TEXT NOT NULL DEFAULT 'main',
    scripts TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_repos_name ON repos(name);

CREATE TABLE IF NOT EXISTS project_repos (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id),
    repo_id TEXT NOT NULL REFERENCES repos(id),
    is_primary INTEGER NOT NULL DEFAULT 0,
    display_order INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(project_id, repo_id)
);

CREATE TABLE IF NOT EXISTS app_state (
    key TEXT PRIMARY KEY,
    last_active_project_id TEXT,
    last_active_repo_id TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id),
    parent_id TEXT REFERENCES tasks(id),
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'BACKLOG',
    priority TEXT NOT NULL DEFAULT 'MEDIUM',
    task_type TEXT NOT NULL DEFAULT 'PAIR',
    terminal_backend TEXT,
    agent_backend TEXT,
    base_branch TEXT,
    acceptance_criteria TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_tasks_project ON tasks(project_id);
CREATE INDEX IF NOT EXISTS ix_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS ix_tasks_parent ON tasks(parent_id);

CREATE TABLE IF NOT EXISTS task_links (
    task_id TEXT NOT NULL REFERENCES tasks(id),
    ref_task_id TEXT NOT NULL REFERENCES tasks(id),
    created_at TEXT NOT NULL,
    PRIMARY KEY (task_id, ref_task_id)
);

CREATE TABLE IF NOT EXISTS workspaces (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id),
    task_id TEXT REFERENCES tasks(id),
    branch_name TEXT NOT NULL,
    path TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'ACTIVE',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_workspaces_project ON workspaces(project_id);
CREATE INDEX IF NOT EXISTS ix_workspaces_task ON workspaces(task_id);
CREATE INDEX IF NOT EXISTS ix_workspaces_status ON workspaces(status);

CREATE TABLE IF NOT EXISTS workspace_repos (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL REFERENCES workspaces(id),
    repo_id TEXT NOT NULL REFERENCES repos(id),
    target_branch TEXT NOT NULL,
    worktree_path TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(workspace_id, repo_id)
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL REFERENCES workspaces(id),
    session_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'ACTIVE',
    external_id TEXT,
    started_at TEXT NOT NULL,
    ended_at TEXT
);
CREATE INDEX IF NOT EXISTS ix_sessions_workspace ON sessions(workspace_id);
CREATE INDEX IF NOT EXISTS ix_sessions_external ON sessions(external_id);
CREATE INDEX IF NOT EXISTS ix_sessions_status ON sessions(status);

CREATE TABLE IF NOT EXISTS execution_processes (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    run_reason TEXT NOT NULL DEFAULT 'CODING_AGENT',
    executor_action TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL DEFAULT 'RUNNING',
    exit_code INTEGER,
    dropped INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    error TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_executions_session ON execution_processes(session_id);
CREATE INDEX IF NOT EXISTS ix_executions_status ON execution_processes(status);
CREATE INDEX IF NOT EXISTS ix_executions_created ON execution_processes(created_at);

CREATE TABLE IF NOT EXISTS execution_process_logs (
    id TEXT PRIMARY KEY,
    execution_process_id TEXT NOT NULL REFERENCES execution_processes(id),
    logs TEXT NOT NULL,
    byte_size INTEGER NOT NULL,
    inserted_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_execution_logs_process
    ON execution_process_logs(execution_process_id, inserted_at, id);

CREATE TABLE IF NOT EXISTS coding_agent_turns (
    id TEXT PRIMARY KEY,
    execution_process_id TEXT NOT NULL REFERENCES execution_processes(id),
    agent_session_id TEXT,
    prompt TEXT,
    summary TEXT,
    seen INTEGER NOT NULL DEFAULT 0,
    agent_message_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_agent_turns_process ON coding_agent_turns(execution_process_id);

CREATE TABLE IF NOT EXISTS execution_process_repo_states (
    id TEXT PRIMARY KEY,
    execution_process_id TEXT NOT NULL REFERENCES execution_processes(id),
    repo_id TEXT NOT NULL REFERENCES repos(id),
    before_head_commit TEXT,
    after_head_commit TEXT,
    merge_commit TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_repo_states_process
    ON execution_process_repo_states(execution_process_id);

CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL,
    action TEXT NOT NULL,
    status TEXT NOT NULL,
    params_json TEXT NOT NULL DEFAULT '{}',
    result_json TEXT,
    message TEXT,
    code TEXT,
    last_attempt_number INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    finished_at TEXT
);
CREATE INDEX IF NOT EXISTS ix_jobs_task ON jobs(task_id);
CREATE INDEX IF NOT EXISTS ix_jobs_status ON jobs(status);
CREATE INDEX IF NOT EXISTS ix_jobs_created ON jobs(created_at);

CREATE TABLE IF NOT EXISTS job_events (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL REFERENCES jobs(id),
    task_id TEXT NOT NULL,
    event_index INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL,
    message TEXT,
    code TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(job_id, event_index)
);
CREATE INDEX IF NOT EXISTS ix_job_events_job ON job_events(job_id);
CREATE INDEX IF NOT EXISTS ix_job_events_task ON job_events(task_id);

CREATE TABLE IF NOT EXISTS job_attempts (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL REFERENCES jobs(id),
    attempt_number INTEGER NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    message TEXT,
    code TEXT,
    result_json TEXT,
    UNIQUE(job_id, attempt_number)
);
CREATE INDEX IF NOT EXISTS ix_job_attempts_job ON job_attempts(job_id);

CREATE TABLE IF NOT EXISTS merges (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL REFERENCES workspaces(id),
    repo_id TEXT NOT NULL REFERENCES repos(id),
    merge_type TEXT NOT NULL DEFAULT 'DIRECT',
    target_branch_name TEXT NOT NULL,
    merge_commit TEXT,
    pr_url TEXT,
    pr_number INTEGER,
    pr_status TEXT NOT NULL DEFAULT 'OPEN',
    pr_merged_at TEXT,
    pr_merge_commit_sha TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_merges_workspace ON merges(workspace_id);

CREATE TABLE IF NOT EXISTS scratches (
    id TEXT PRIMARY KEY,
    scratch_type TEXT NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_scratches_type ON scratches(scratch_type);

CREATE TABLE IF NOT EXISTS audit_events (
    id TEXT PRIMARY KEY,
    occurred_at TEXT NOT NULL,
    actor_type TEXT NOT NULL DEFAULT 'system',
    actor_id TEXT NOT NULL DEFAULT '',
    session_id TEXT,
    capability TEXT NOT NULL DEFAULT '',
    command_name TEXT NOT NULL DEFAULT '',
    payload_json TEXT NOT NULL DEFAULT '{}',
    result_json TEXT NOT NULL DEFAULT '{}',
    success INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS ix_audit_occurred ON audit_events(occurred_at);
CREATE INDEX IF NOT EXISTS ix_audit_capability ON audit_events(capability);

CREATE TABLE IF NOT EXISTS planner_proposals (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id),
    repo_id TEXT,
    tasks_json TEXT NOT NULL DEFAULT '[]',
    todos_json TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'DRAFT',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_proposals_project ON planner_proposals(project_id);
"#;

/// Create all tables and indexes.
pub fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

/// Additive column-additions for known legacy databases.
///
/// Runs on every initialize; each step is a no-op when the column already
/// exists.
pub fn ensure_schema_compatibility(conn: &Connection) -> rusqlite::Result<()> {
    ensure_column(conn, "tasks", "terminal_backend", "TEXT")?;
    ensure_column(conn, "jobs", "last_attempt_number", "INTEGER NOT NULL DEFAULT 0")?;
    Ok(())
}

fn ensure_column(
    conn: &Connection,
    table: &str,
    column: &str,
    decl: &str,
) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(());
        }
    }
    conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"), [])?;
    Ok(())
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
