// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    in_progress_success = { TaskStatus::InProgress, true, TaskStatus::Review },
    in_progress_failure = { TaskStatus::InProgress, false, TaskStatus::InProgress },
    backlog_success = { TaskStatus::Backlog, true, TaskStatus::Backlog },
    review_success = { TaskStatus::Review, true, TaskStatus::Review },
    done_success = { TaskStatus::Done, true, TaskStatus::Done },
)]
fn agent_complete_transition(from: TaskStatus, success: bool, expected: TaskStatus) {
    assert_eq!(from.after_agent_complete(success), expected);
}

#[test]
fn agent_complete_is_idempotent_once_in_review() {
    let after = TaskStatus::InProgress.after_agent_complete(true);
    assert_eq!(after, TaskStatus::Review);
    assert_eq!(after.after_agent_complete(true), TaskStatus::Review);
}

#[parameterized(
    review = { TaskStatus::Review, TaskStatus::Done },
    backlog = { TaskStatus::Backlog, TaskStatus::Backlog },
    in_progress = { TaskStatus::InProgress, TaskStatus::InProgress },
    done = { TaskStatus::Done, TaskStatus::Done },
)]
fn review_pass_transition(from: TaskStatus, expected: TaskStatus) {
    assert_eq!(from.after_review_pass(), expected);
}

#[parameterized(
    review = { TaskStatus::Review, TaskStatus::InProgress },
    backlog = { TaskStatus::Backlog, TaskStatus::Backlog },
    done = { TaskStatus::Done, TaskStatus::Done },
)]
fn review_reject_transition(from: TaskStatus, expected: TaskStatus) {
    assert_eq!(from.after_review_reject(), expected);
}

#[test]
fn status_display_round_trips_through_parse() {
    for status in [
        TaskStatus::Backlog,
        TaskStatus::InProgress,
        TaskStatus::Review,
        TaskStatus::Done,
    ] {
        assert_eq!(TaskStatus::parse(&status.to_string()), Some(status));
    }
    assert_eq!(TaskStatus::parse("NOT_A_STATUS"), None);
}

#[test]
fn create_sets_defaults() {
    let now = Utc::now();
    let task = Task::create(ProjectId::new(), "title", "desc", now);
    assert_eq!(task.status, TaskStatus::Backlog);
    assert_eq!(task.priority, TaskPriority::Medium);
    assert_eq!(task.task_type, TaskType::Pair);
    assert_eq!(task.created_at, now);
    assert_eq!(task.id.as_str().len(), 8);
}

#[test]
fn agent_config_falls_back_to_builtin_claude() {
    let task = Task::builder().build();
    let config = KaganConfig::default();
    let agent = task.agent_config(&config);
    assert_eq!(agent.short_name, "claude");
}

#[test]
fn agent_config_prefers_task_override() {
    let mut config = KaganConfig::default();
    let mut agent = fallback_agent_config();
    agent.short_name = "opencode".to_string();
    config.agents.insert("opencode".to_string(), agent);

    let task = Task::builder().agent_backend("opencode").build();
    assert_eq!(task.agent_config(&config).short_name, "opencode");
}

#[test]
fn terminal_backend_resolution_order() {
    let config = KaganConfig::default();
    let task = Task::builder()
        .terminal_backend(PairTerminalBackend::Cursor)
        .build();
    assert_eq!(task.resolve_terminal_backend(&config), PairTerminalBackend::Cursor);

    let task = Task::builder().build();
    assert_eq!(
        task.resolve_terminal_backend(&config),
        config.general.default_pair_terminal_backend
    );
}
