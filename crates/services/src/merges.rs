// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Merge service: direct and squash-merge orchestration, rejection
//! feedback, and exploratory close-out.

use crate::error::ServiceError;
use crate::events::EventBus;
use crate::tasks::TaskService;
use crate::workspaces::WorkspaceService;
use chrono::Utc;
use kagan_core::{DomainEvent, KaganConfig, MergeType, Task, TaskStatus};
use kagan_adapters::{GitOps, MergeConflict};
use kagan_store::{MergeRepository, TaskPatch};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Where a rejected task lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionAction {
    Backlog,
    InProgress,
}

/// Outcome of a merge-task request.
#[derive(Debug, Clone)]
pub struct MergeTaskResult {
    pub success: bool,
    pub message: String,
    pub merge_commits: Vec<String>,
    pub conflict: Option<MergeConflict>,
}

/// Merge orchestration over the workspace's repositories.
pub struct MergeService {
    tasks: TaskService,
    workspaces: Arc<WorkspaceService>,
    merges: MergeRepository,
    git_ops: Arc<dyn GitOps>,
    events: EventBus,
    config: KaganConfig,
    /// Global mutex held around manual merges when `serialize_merges` is
    /// set, so concurrent operators cannot race on the same target branch.
    merge_lock: Mutex<()>,
}

impl MergeService {
    pub fn new(
        tasks: TaskService,
        workspaces: Arc<WorkspaceService>,
        merges: MergeRepository,
        git_ops: Arc<dyn GitOps>,
        events: EventBus,
        config: KaganConfig,
    ) -> Self {
        Self {
            tasks,
            workspaces,
            merges,
            git_ops,
            events,
            config,
            merge_lock: Mutex::new(()),
        }
    }

    /// True iff the diff vs base is empty across all workspace repos.
    /// Callers use this to offer "close without merge".
    pub async fn has_no_changes(&self, task: &Task) -> Result<bool, ServiceError> {
        self.workspaces.has_no_changes(task.id.as_str()).await
    }

    /// Merge a task's workspace into its target branches.
    ///
    /// On success: merge rows are recorded, the task moves to DONE, and
    /// the workspace is archived. On failure the task stays in REVIEW and
    /// the failure is surfaced for the UI.
    pub async fn merge_task(&self, task: &Task) -> Result<MergeTaskResult, ServiceError> {
        let _guard = if self.config.general.serialize_merges {
            Some(self.merge_lock.lock().await)
        } else {
            None
        };

        let Some(workspace) = self.workspaces.get_for_task(task.id.as_str())? else {
            return Err(ServiceError::not_found("workspace", task.id.as_str()));
        };
        let specs = self.workspaces.repo_specs(&workspace)?;
        if specs.is_empty() {
            return Err(ServiceError::Invalid(format!(
                "workspace {} has no repositories",
                workspace.id
            )));
        }

        let merge_type = MergeType::Squash;
        let mut merge_commits = Vec::new();
        for spec in &specs {
            let result = self
                .git_ops
                .merge_squash(
                    &spec.repo_path,
                    &workspace.branch_name,
                    &spec.target_branch,
                    None,
                )
                .await?;

            if !result.success {
                self.events.publish(DomainEvent::MergeFailed {
                    task_id: task.id,
                    message: result.message.clone(),
                });
                return Ok(MergeTaskResult {
                    success: false,
                    message: result.message,
                    merge_commits,
                    conflict: result.conflict,
                });
            }

            self.merges.record(
                &workspace.id,
                &spec.repo_id,
                merge_type,
                &spec.target_branch,
                result.commit_sha.as_deref(),
                Utc::now(),
            )?;
            if let Some(sha) = result.commit_sha {
                merge_commits.push(sha);
            }
        }

        self.tasks.set_status(task.id.as_str(), TaskStatus::Done, Some("merged"))?;
        self.workspaces.archive(task.id.as_str(), true).await?;
        self.events.publish(DomainEvent::MergeCompleted {
            task_id: task.id,
            merge_commit: merge_commits.first().cloned(),
        });

        Ok(MergeTaskResult {
            success: true,
            message: "Merged".to_string(),
            merge_commits,
            conflict: None,
        })
    }

    /// Append rejection feedback to the task description (with a
    /// timestamped separator) and move the task to the requested status.
    pub fn apply_rejection_feedback(
        &self,
        task: &Task,
        feedback: Option<&str>,
        action: RejectionAction,
    ) -> Result<Option<Task>, ServiceError> {
        let to_status = match action {
            RejectionAction::Backlog => TaskStatus::Backlog,
            RejectionAction::InProgress => TaskStatus::InProgress,
        };

        if let Some(feedback) = feedback.filter(|text| !text.trim().is_empty()) {
            let stamp = Utc::now().format("%Y-%m-%d %H:%M UTC");
            let description = format!(
                "{}\n\n--- Review feedback ({stamp}) ---\n{}",
                task.description.trim_end(),
                feedback.trim()
            );
            let patch = TaskPatch {
                description: Some(description),
                ..TaskPatch::default()
            };
            self.tasks.update_fields(task.id.as_str(), &patch)?;
        }

        self.tasks.set_status(task.id.as_str(), to_status, Some("review_rejected"))
    }

    /// Archive the workspace without merging and mark the task DONE.
    pub async fn close_exploratory(&self, task: &Task) -> Result<Option<Task>, ServiceError> {
        self.workspaces.archive(task.id.as_str(), true).await?;
        self.tasks.set_status(task.id.as_str(), TaskStatus::Done, Some("closed_without_merge"))
    }

    /// Build the remediation note appended when a rebase or merge hits
    /// conflicts.
    pub fn conflict_remediation_note(conflict: &MergeConflict) -> String {
        let mut note = String::from("Merge conflicts must be resolved before this task can merge:\n");
        for file in &conflict.files {
            note.push_str(&format!("- {file}\n"));
        }
        note.push_str(
            "Resolve the conflicts in the task workspace, commit, and request review again.",
        );
        note
    }

    /// Sanity accessor for the target repo path of a single-repo task.
    pub fn primary_repo_path(&self, task: &Task) -> Result<Option<String>, ServiceError> {
        let Some(workspace) = self.workspaces.get_for_task(task.id.as_str())? else {
            return Ok(None);
        };
        let specs = self.workspaces.repo_specs(&workspace)?;
        Ok(specs.first().map(|spec| spec.repo_path.display().to_string()))
    }

    /// Direct (no-ff) merge path for repos configured without squash.
    pub async fn merge_direct(
        &self,
        task: &Task,
        repo_path: &Path,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<MergeTaskResult, ServiceError> {
        let _guard = if self.config.general.serialize_merges {
            Some(self.merge_lock.lock().await)
        } else {
            None
        };
        let result = self
            .git_ops
            .merge_branch(repo_path, source_branch, target_branch)
            .await?;
        if !result.success {
            self.events.publish(DomainEvent::MergeFailed {
                task_id: task.id,
                message: result.message.clone(),
            });
        }
        Ok(MergeTaskResult {
            success: result.success,
            message: result.message,
            merge_commits: result.commit_sha.into_iter().collect(),
            conflict: result.conflict,
        })
    }
}

#[cfg(test)]
#[path = "merges_tests.rs"]
mod tests;
