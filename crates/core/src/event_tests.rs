// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn serializes_with_type_tag() {
    let event = DomainEvent::TaskDeleted { task_id: TaskId::from_string("abcd1234") };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "task:deleted");
    assert_eq!(json["task_id"], "abcd1234");
}

#[test]
fn round_trips_through_json() {
    let event = DomainEvent::TaskStatusChanged {
        task_id: TaskId::from_string("abcd1234"),
        from_status: TaskStatus::InProgress,
        to_status: TaskStatus::Review,
        reason: Some("agent_complete".to_string()),
        updated_at: Utc::now(),
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: DomainEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn task_id_helper_covers_task_events() {
    let id = TaskId::from_string("abcd1234");
    let event = DomainEvent::AutomationTaskEnded { task_id: id, success: true };
    assert_eq!(event.task_id(), Some(&id));

    let event = DomainEvent::ProjectOpened { project_id: ProjectId::from_string("11112222") };
    assert_eq!(event.task_id(), None);
}

#[test]
fn log_summary_includes_transition() {
    let event = DomainEvent::TaskStatusChanged {
        task_id: TaskId::from_string("abcd1234"),
        from_status: TaskStatus::Review,
        to_status: TaskStatus::Done,
        reason: None,
        updated_at: Utc::now(),
    };
    assert_eq!(event.log_summary(), "task:status_changed id=abcd1234 REVIEW->DONE");
}
