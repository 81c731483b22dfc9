// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn has_column(conn: &Connection, table: &str, column: &str) -> bool {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})")).unwrap();
    let mut rows = stmt.query([]).unwrap();
    while let Some(row) = rows.next().unwrap() {
        let name: String = row.get(1).unwrap();
        if name == column {
            return true;
        }
    }
    false
}

#[test]
fn create_schema_is_idempotent() {
    let conn = Connection::open_in_memory().unwrap();
    create_schema(&conn).unwrap();
    create_schema(&conn).unwrap();
}

#[test]
fn compatibility_pass_adds_missing_terminal_backend() {
    let conn = Connection::open_in_memory().unwrap();
    // Legacy tasks table without terminal_backend.
    conn.execute_batch(
        "CREATE TABLE tasks (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'BACKLOG',
            priority TEXT NOT NULL DEFAULT 'MEDIUM',
            task_type TEXT NOT NULL DEFAULT 'PAIR',
            agent_backend TEXT,
            base_branch TEXT,
            acceptance_criteria TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE jobs (
            id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL,
            action TEXT NOT NULL,
            status TEXT NOT NULL,
            params_json TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )
    .unwrap();
    assert!(!has_column(&conn, "tasks", "terminal_backend"));

    ensure_schema_compatibility(&conn).unwrap();
    assert!(has_column(&conn, "tasks", "terminal_backend"));
    assert!(has_column(&conn, "jobs", "last_attempt_number"));

    // Re-running is a no-op.
    ensure_schema_compatibility(&conn).unwrap();
}

#[test]
fn job_events_reject_duplicate_event_index() {
    let conn = Connection::open_in_memory().unwrap();
    create_schema(&conn).unwrap();
    conn.execute(
        "INSERT INTO jobs (id, task_id, action, status, created_at, updated_at) \
         VALUES ('j1', 't1', 'noop', 'queued', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO job_events (id, job_id, task_id, event_index, status, created_at) \
         VALUES ('e1', 'j1', 't1', 1, 'queued', '2026-01-01T00:00:00Z')",
        [],
    )
    .unwrap();
    let duplicate = conn.execute(
        "INSERT INTO job_events (id, job_id, task_id, event_index, status, created_at) \
         VALUES ('e2', 'j1', 't1', 1, 'running', '2026-01-01T00:00:01Z')",
        [],
    );
    assert!(duplicate.is_err());
}
