// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::auxiliary::SessionRecordRepository;
use crate::projects::ProjectRepository;
use crate::tasks::TaskRepository;
use crate::workspaces::WorkspaceRepository;
use chrono::Duration;
use kagan_core::{Project, SessionType, Task, Workspace, WorkspaceStatus};
use serde_json::json;

struct Fixture {
    executions: ExecutionRepository,
    session_id: SessionId,
    task_id: String,
}

fn setup() -> Fixture {
    let factory = SessionFactory::open_in_memory().unwrap();
    let now = Utc::now();

    let project = Project::create("P", now);
    ProjectRepository::new(factory.clone()).create(&project).unwrap();

    let task = Task::create(project.id, "t", "", now);
    TaskRepository::new(factory.clone()).create(&task).unwrap();

    let workspace = Workspace {
        id: kagan_core::WorkspaceId::new(),
        project_id: project.id,
        task_id: Some(task.id),
        branch_name: "kagan/test".to_string(),
        path: "/tmp/ws".to_string(),
        status: WorkspaceStatus::Active,
        created_at: now,
        updated_at: now,
    };
    WorkspaceRepository::new(factory.clone()).create(&workspace).unwrap();

    let session = SessionRecordRepository::new(factory.clone())
        .create(&workspace.id, SessionType::Acp, None, now)
        .unwrap();

    Fixture {
        executions: ExecutionRepository::new(factory),
        session_id: session.id,
        task_id: task.id.as_str().to_string(),
    }
}

#[test]
fn create_opens_running_execution() {
    let fx = setup();
    let execution = fx
        .executions
        .create(&fx.session_id, ExecutionRunReason::CodingAgent, &json!({"agent": "claude"}), Utc::now())
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Running);
    assert!(execution.completed_at.is_none());

    let loaded = fx.executions.get(execution.id.as_str()).unwrap().unwrap();
    assert_eq!(loaded.executor_action["agent"], "claude");
}

#[test]
fn complete_transitions_exactly_once() {
    let fx = setup();
    let execution = fx
        .executions
        .create(&fx.session_id, ExecutionRunReason::CodingAgent, &json!({}), Utc::now())
        .unwrap();

    let done = fx
        .executions
        .complete(execution.id.as_str(), ExecutionStatus::Succeeded, Some(0), None, Utc::now())
        .unwrap()
        .unwrap();
    assert_eq!(done.status, ExecutionStatus::Succeeded);
    assert!(done.completed_at.is_some());

    // A late duplicate terminal signal is ignored.
    let still = fx
        .executions
        .complete(
            execution.id.as_str(),
            ExecutionStatus::Failed,
            Some(1),
            Some("late"),
            Utc::now(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(still.status, ExecutionStatus::Succeeded);
    assert!(still.error.is_none());
}

#[test]
fn log_chunks_reassemble_in_insertion_order() {
    let fx = setup();
    let execution = fx
        .executions
        .create(&fx.session_id, ExecutionRunReason::CodingAgent, &json!({}), Utc::now())
        .unwrap();

    let base = Utc::now();
    fx.executions
        .append_log(execution.id.as_str(), "{\"line\":1}\n", base)
        .unwrap();
    fx.executions
        .append_log(execution.id.as_str(), "{\"line\":2}\n", base + Duration::milliseconds(5))
        .unwrap();
    fx.executions
        .append_log(execution.id.as_str(), "{\"line\":3}\n", base + Duration::milliseconds(9))
        .unwrap();

    let entries = fx.executions.log_entries(execution.id.as_str()).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].byte_size, entries[0].logs.len() as i64);

    let full = fx.executions.full_log(execution.id.as_str()).unwrap();
    assert_eq!(full, "{\"line\":1}\n{\"line\":2}\n{\"line\":3}\n");
}

#[test]
fn agent_turns_are_listed_in_order() {
    let fx = setup();
    let execution = fx
        .executions
        .create(&fx.session_id, ExecutionRunReason::CodingAgent, &json!({}), Utc::now())
        .unwrap();

    let base = Utc::now();
    fx.executions
        .append_agent_turn(execution.id.as_str(), Some("sess-1"), Some("do it"), None, None, base)
        .unwrap();
    fx.executions
        .append_agent_turn(
            execution.id.as_str(),
            Some("sess-1"),
            None,
            Some("did it"),
            Some("msg-2"),
            base + Duration::milliseconds(3),
        )
        .unwrap();

    let turns = fx.executions.list_agent_turns(execution.id.as_str()).unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].prompt.as_deref(), Some("do it"));
    assert_eq!(turns[1].summary.as_deref(), Some("did it"));
    assert!(!turns[0].seen);
}

#[test]
fn repo_states_record_before_and_after() {
    let fx = setup();
    let execution = fx
        .executions
        .create(&fx.session_id, ExecutionRunReason::CodingAgent, &json!({}), Utc::now())
        .unwrap();

    let repo_id = kagan_core::RepoId::new();
    let state_id = fx
        .executions
        .add_repo_state(execution.id.as_str(), &repo_id, Some("abc123"), Utc::now())
        .unwrap();
    fx.executions
        .finish_repo_state(&state_id, Some("def456"), None, Utc::now())
        .unwrap();

    let states = fx.executions.list_repo_states(execution.id.as_str()).unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].before_head_commit.as_deref(), Some("abc123"));
    assert_eq!(states[0].after_head_commit.as_deref(), Some("def456"));
}

#[test]
fn latest_for_task_joins_through_workspace() {
    let fx = setup();
    let first = fx
        .executions
        .create(&fx.session_id, ExecutionRunReason::CodingAgent, &json!({}), Utc::now())
        .unwrap();
    let second = fx
        .executions
        .create(
            &fx.session_id,
            ExecutionRunReason::Review,
            &json!({}),
            Utc::now() + Duration::milliseconds(10),
        )
        .unwrap();

    let latest = fx.executions.latest_for_task(&fx.task_id).unwrap().unwrap();
    assert_eq!(latest.id, second.id);
    assert_ne!(latest.id, first.id);
    assert_eq!(fx.executions.count_for_task(&fx.task_id).unwrap(), 2);
}

#[test]
fn running_map_returns_most_recent_running_per_task() {
    let fx = setup();
    let stale = fx
        .executions
        .create(&fx.session_id, ExecutionRunReason::CodingAgent, &json!({}), Utc::now())
        .unwrap();
    fx.executions
        .complete(stale.id.as_str(), ExecutionStatus::Failed, Some(1), None, Utc::now())
        .unwrap();
    let running = fx
        .executions
        .create(
            &fx.session_id,
            ExecutionRunReason::CodingAgent,
            &json!({}),
            Utc::now() + Duration::milliseconds(10),
        )
        .unwrap();

    let map = fx.executions.running_for_tasks(&[fx.task_id.clone()]).unwrap();
    assert_eq!(map.len(), 1);
    assert_eq!(map[&fx.task_id].id, running.id);

    assert!(fx.executions.running_for_tasks(&[]).unwrap().is_empty());
}
