// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task service: canonical CRUD, status-transition helpers, task-link
//! synchronization, scratchpad access, and event emission.

use crate::error::ServiceError;
use crate::events::EventBus;
use chrono::Utc;
use kagan_core::{
    DomainEvent, ProjectId, Session, SessionStatus, SessionType, Task, TaskStatus, WorkspaceId,
};
use kagan_store::{
    ScratchRepository, SessionRecordRepository, TaskPatch, TaskRepository,
};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn mention_regex() -> &'static Regex {
    static MENTION_RE: OnceLock<Regex> = OnceLock::new();
    MENTION_RE.get_or_init(|| match Regex::new(r"@([0-9A-Za-z]{8})") {
        Ok(re) => re,
        Err(_) => unreachable!("mention pattern is a valid regex"),
    })
}

/// Extract the unique set of `@XXXXXXXX` task mentions from a description.
pub fn extract_task_mentions(description: &str) -> BTreeSet<String> {
    mention_regex()
        .captures_iter(description)
        .map(|captures| captures[1].to_string())
        .collect()
}

/// Task service backed by the task repository and the event bus.
#[derive(Clone)]
pub struct TaskService {
    repo: TaskRepository,
    sessions: SessionRecordRepository,
    scratch: ScratchRepository,
    events: EventBus,
}

impl TaskService {
    pub fn new(
        repo: TaskRepository,
        sessions: SessionRecordRepository,
        scratch: ScratchRepository,
        events: EventBus,
    ) -> Self {
        Self { repo, sessions, scratch, events }
    }

    pub fn create_task(
        &self,
        project_id: ProjectId,
        title: &str,
        description: &str,
    ) -> Result<Task, ServiceError> {
        if title.trim().is_empty() {
            return Err(ServiceError::Invalid("task title must not be empty".to_string()));
        }
        let task = Task::create(project_id, title, description, Utc::now());
        self.repo.create(&task)?;
        self.events.publish(DomainEvent::TaskCreated {
            task_id: task.id,
            status: task.status,
            title: task.title.clone(),
            created_at: task.created_at,
        });
        self.sync_task_links(&task)?;
        Ok(task)
    }

    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>, ServiceError> {
        Ok(self.repo.get(task_id)?)
    }

    pub fn list_tasks(
        &self,
        project_id: Option<&str>,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>, ServiceError> {
        let tasks = match status {
            Some(status) => self.repo.get_by_status(status, project_id)?,
            None => self.repo.get_all(project_id)?,
        };
        Ok(tasks)
    }

    pub fn search(&self, query: &str) -> Result<Vec<Task>, ServiceError> {
        Ok(self.repo.search(query)?)
    }

    pub fn delete_task(&self, task_id: &str) -> Result<bool, ServiceError> {
        let deleted = self.repo.delete(task_id)?;
        if deleted {
            self.events.publish(DomainEvent::TaskDeleted {
                task_id: kagan_core::TaskId::from_string(task_id),
            });
        }
        Ok(deleted)
    }

    /// Apply a partial update.
    ///
    /// Emits `TaskUpdated` with the touched field list, and
    /// `TaskStatusChanged` only when the stored status actually changed
    /// value — an update carrying the current status is a no-change.
    pub fn update_fields(
        &self,
        task_id: &str,
        patch: &TaskPatch,
    ) -> Result<Option<Task>, ServiceError> {
        let Some(current) = self.repo.get(task_id)? else {
            return Ok(None);
        };
        let Some(updated) = self.repo.update(task_id, patch, Utc::now())? else {
            return Ok(None);
        };

        self.events.publish(DomainEvent::TaskUpdated {
            task_id: updated.id,
            fields_changed: patch.fields_changed(),
            updated_at: updated.updated_at,
        });

        if patch.status.is_some() && current.status != updated.status {
            self.events.publish(DomainEvent::TaskStatusChanged {
                task_id: updated.id,
                from_status: current.status,
                to_status: updated.status,
                reason: None,
                updated_at: updated.updated_at,
            });
        }

        if patch.description.is_some() {
            self.sync_task_links(&updated)?;
        }

        Ok(Some(updated))
    }

    /// Move a task to a new status, emitting both change events.
    pub fn set_status(
        &self,
        task_id: &str,
        to_status: TaskStatus,
        reason: Option<&str>,
    ) -> Result<Option<Task>, ServiceError> {
        let Some(current) = self.repo.get(task_id)? else {
            return Ok(None);
        };
        let patch = TaskPatch { status: Some(to_status), ..TaskPatch::default() };
        let Some(updated) = self.repo.update(task_id, &patch, Utc::now())? else {
            return Ok(None);
        };

        self.events.publish(DomainEvent::TaskStatusChanged {
            task_id: updated.id,
            from_status: current.status,
            to_status: updated.status,
            reason: reason.map(str::to_string),
            updated_at: updated.updated_at,
        });
        self.events.publish(DomainEvent::TaskUpdated {
            task_id: updated.id,
            fields_changed: vec!["status".to_string()],
            updated_at: updated.updated_at,
        });
        Ok(Some(updated))
    }

    /// Alias of [`set_status`](Self::set_status).
    pub fn move_task(
        &self,
        task_id: &str,
        new_status: TaskStatus,
    ) -> Result<Option<Task>, ServiceError> {
        self.set_status(task_id, new_status, None)
    }

    /// Deterministic transition driven by agent completion.
    pub fn sync_status_from_agent_complete(
        &self,
        task_id: &str,
        success: bool,
    ) -> Result<Option<Task>, ServiceError> {
        let Some(task) = self.repo.get(task_id)? else {
            return Ok(None);
        };
        let next = task.status.after_agent_complete(success);
        if next == task.status {
            return Ok(Some(task));
        }
        self.set_status(task_id, next, Some("agent_complete"))
    }

    /// REVIEW → DONE on a passing review.
    pub fn sync_status_from_review_pass(
        &self,
        task_id: &str,
    ) -> Result<Option<Task>, ServiceError> {
        let Some(task) = self.repo.get(task_id)? else {
            return Ok(None);
        };
        let next = task.status.after_review_pass();
        if next == task.status {
            return Ok(Some(task));
        }
        self.set_status(task_id, next, Some("review_passed"))
    }

    /// REVIEW → IN_PROGRESS on a rejected review.
    pub fn sync_status_from_review_reject(
        &self,
        task_id: &str,
        reason: Option<&str>,
    ) -> Result<Option<Task>, ServiceError> {
        let Some(task) = self.repo.get(task_id)? else {
            return Ok(None);
        };
        let next = task.status.after_review_reject();
        if next == task.status {
            return Ok(Some(task));
        }
        self.set_status(task_id, next, reason)
    }

    pub fn get_task_links(&self, task_id: &str) -> Result<Vec<String>, ServiceError> {
        Ok(self.repo.get_task_links(task_id)?)
    }

    pub fn get_scratchpad(&self, task_id: &str) -> Result<String, ServiceError> {
        Ok(self.scratch.get_scratchpad(task_id)?)
    }

    pub fn update_scratchpad(&self, task_id: &str, content: &str) -> Result<(), ServiceError> {
        Ok(self.scratch.update_scratchpad(task_id, content, Utc::now())?)
    }

    pub fn create_session_record(
        &self,
        workspace_id: &WorkspaceId,
        session_type: SessionType,
        external_id: Option<&str>,
    ) -> Result<Session, ServiceError> {
        Ok(self.sessions.create(workspace_id, session_type, external_id, Utc::now())?)
    }

    pub fn close_session_record(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<Option<Session>, ServiceError> {
        Ok(self.sessions.close(session_id, status, Utc::now())?)
    }

    pub fn close_session_by_external_id(
        &self,
        external_id: &str,
        status: SessionStatus,
    ) -> Result<Option<Session>, ServiceError> {
        Ok(self.sessions.close_by_external_id(external_id, status, Utc::now())?)
    }

    /// Re-derive task links from description mentions.
    ///
    /// Mentions that don't resolve to a task in the same project — and
    /// self-references — are silently dropped.
    fn sync_task_links(&self, task: &Task) -> Result<(), ServiceError> {
        let mentions = extract_task_mentions(&task.description);
        if mentions.is_empty() {
            self.repo.replace_task_links(task.id.as_str(), &[], Utc::now())?;
            return Ok(());
        }

        let mentioned: Vec<String> = mentions.into_iter().collect();
        let valid = self.repo.get_by_ids(&mentioned, task.project_id.as_str())?;
        let ref_ids: Vec<String> = valid
            .iter()
            .filter(|candidate| candidate.id != task.id)
            .map(|candidate| candidate.id.as_str().to_string())
            .collect();
        self.repo.replace_task_links(task.id.as_str(), &ref_ids, Utc::now())?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
