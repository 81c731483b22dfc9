// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in request dispatch map.
//!
//! Every `(capability, method)` pair owns a typed parameter record; params
//! are validated against it before any handler logic runs. The dispatcher
//! never leaks a raw error — service failures map onto stable codes.

use crate::bootstrap::AppContext;
use crate::plugins::HandlerFuture;
use kagan_core::{CapabilityProfile, ProjectId, TaskStatus};
use kagan_services::{RejectionAction, ServiceError, SessionError, SpawnResult};
use kagan_store::TaskPatch;
use kagan_wire::ErrorBody;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

type BuiltinHandler = fn(Arc<AppContext>, serde_json::Value) -> HandlerFuture;

/// One built-in operation entry.
pub struct BuiltinOperation {
    pub handler: BuiltinHandler,
    pub minimum_profile: CapabilityProfile,
    pub mutating: bool,
}

pub type DispatchMap = HashMap<(String, String), BuiltinOperation>;

/// Lookup key for a `(capability, method)` pair.
pub fn dispatch_key(capability: &str, method: &str) -> (String, String) {
    (capability.to_string(), method.to_string())
}

fn entry(
    handler: BuiltinHandler,
    minimum_profile: CapabilityProfile,
    mutating: bool,
) -> BuiltinOperation {
    BuiltinOperation { handler, minimum_profile, mutating }
}

/// Build the dispatch map for all built-in operations.
pub fn build_request_dispatch_map() -> DispatchMap {
    use CapabilityProfile::{Maintainer, Operator, Viewer};

    let mut map: DispatchMap = HashMap::new();
    let mut add = |capability: &str, method: &str, operation: BuiltinOperation| {
        map.insert(dispatch_key(capability, method), operation);
    };

    add("core", "ping", entry(core_ping, Viewer, false));
    add("core", "status", entry(core_status, Viewer, false));

    add("tasks", "create", entry(tasks_create, Operator, true));
    add("tasks", "get", entry(tasks_get, Viewer, false));
    add("tasks", "list", entry(tasks_list, Viewer, false));
    add("tasks", "update", entry(tasks_update, Operator, true));
    add("tasks", "move", entry(tasks_move, Operator, true));
    add("tasks", "delete", entry(tasks_delete, Maintainer, true));
    add("tasks", "links", entry(tasks_links, Viewer, false));
    add("tasks", "get_scratchpad", entry(tasks_get_scratchpad, Viewer, false));
    add("tasks", "update_scratchpad", entry(tasks_update_scratchpad, Operator, true));

    add("jobs", "submit", entry(jobs_submit, Operator, true));
    add("jobs", "get", entry(jobs_get, Viewer, false));
    add("jobs", "wait", entry(jobs_wait, Viewer, false));
    add("jobs", "cancel", entry(jobs_cancel, Operator, true));
    add("jobs", "events", entry(jobs_events, Viewer, false));

    add("workspaces", "diff", entry(workspaces_diff, Viewer, false));
    add("workspaces", "rebase", entry(workspaces_rebase, Operator, true));

    add("sessions", "create", entry(sessions_create, Operator, true));
    add("sessions", "exists", entry(sessions_exists, Viewer, false));

    add("merges", "merge", entry(merges_merge, Operator, true));
    add("merges", "has_no_changes", entry(merges_has_no_changes, Viewer, false));
    add("merges", "reject", entry(merges_reject, Operator, true));
    add("merges", "close_exploratory", entry(merges_close_exploratory, Operator, true));

    add("automation", "start", entry(automation_start, Operator, true));
    add("automation", "stop", entry(automation_stop, Operator, true));
    add("automation", "status", entry(automation_status, Viewer, false));

    map
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: serde_json::Value) -> Result<T, ErrorBody> {
    serde_json::from_value(params).map_err(|error| {
        ErrorBody::new(kagan_wire::INVALID_PARAMS, format!("invalid params: {error}"))
    })
}

fn service_error(error: ServiceError) -> ErrorBody {
    if error.is_closing() {
        return ErrorBody::new(kagan_wire::REPOSITORY_CLOSING, "core is shutting down");
    }
    match error {
        ServiceError::NotFound { .. } => {
            ErrorBody::new(kagan_wire::NOT_FOUND, error.to_string())
        }
        ServiceError::Invalid(_) => ErrorBody::new(kagan_wire::INVALID_PARAMS, error.to_string()),
        other => ErrorBody::new(kagan_wire::CORE_INTERNAL_ERROR, other.to_string()),
    }
}

fn session_error(error: SessionError) -> ErrorBody {
    match error {
        SessionError::InvalidWorktreePath { ref expected } => {
            ErrorBody::new(kagan_wire::INVALID_WORKTREE_PATH, error.to_string())
                .with_details(serde_json::json!({ "expected": expected }))
                .with_next_tool("sessions_exists")
        }
        SessionError::CreateFailed(message) => {
            ErrorBody::new(kagan_wire::SESSION_CREATE_FAILED, message)
        }
        SessionError::Service(inner) => service_error(inner),
    }
}

fn json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ErrorBody> {
    serde_json::to_value(value).map_err(|error| {
        ErrorBody::new(kagan_wire::CORE_INTERNAL_ERROR, format!("encode failed: {error}"))
    })
}

fn require_task(
    ctx: &Arc<AppContext>,
    task_id: &str,
) -> Result<kagan_core::Task, ErrorBody> {
    ctx.tasks
        .get_task(task_id)
        .map_err(service_error)?
        .ok_or_else(|| ErrorBody::new(kagan_wire::NOT_FOUND, format!("no task {task_id}")))
}

// -- core --

fn core_ping(_ctx: Arc<AppContext>, _params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move { Ok(serde_json::json!({ "pong": true })) })
}

fn core_status(ctx: Arc<AppContext>, _params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        Ok(serde_json::json!({
            "active_agents": ctx.automation.active_count(),
            "plugins": ctx
                .plugins
                .registered_manifests()
                .iter()
                .map(|manifest| manifest.id.clone())
                .collect::<Vec<_>>(),
        }))
    })
}

// -- tasks --

#[derive(Deserialize)]
struct TasksCreateParams {
    project_id: String,
    title: String,
    #[serde(default)]
    description: String,
}

fn tasks_create(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: TasksCreateParams = parse_params(params)?;
        let task = ctx
            .tasks
            .create_task(
                ProjectId::from_string(&params.project_id),
                &params.title,
                &params.description,
            )
            .map_err(service_error)?;
        json(&task)
    })
}

#[derive(Deserialize)]
struct TaskIdParams {
    task_id: String,
}

fn tasks_get(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: TaskIdParams = parse_params(params)?;
        let task = require_task(&ctx, &params.task_id)?;
        json(&task)
    })
}

#[derive(Deserialize)]
struct TasksListParams {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

fn tasks_list(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: TasksListParams = parse_params(params)?;
        let status = match params.status.as_deref() {
            None => None,
            Some(value) => Some(TaskStatus::parse(value).ok_or_else(|| {
                ErrorBody::new(
                    kagan_wire::INVALID_PARAMS,
                    format!("unknown task status {value:?}"),
                )
            })?),
        };
        let tasks = ctx
            .tasks
            .list_tasks(params.project_id.as_deref(), status)
            .map_err(service_error)?;
        json(&tasks)
    })
}

#[derive(Deserialize)]
struct TasksUpdateParams {
    task_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    task_type: Option<String>,
    #[serde(default)]
    agent_backend: Option<String>,
    #[serde(default)]
    base_branch: Option<String>,
    #[serde(default)]
    acceptance_criteria: Option<Vec<String>>,
}

fn tasks_update(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: TasksUpdateParams = parse_params(params)?;
        let mut patch = TaskPatch {
            title: params.title,
            description: params.description,
            acceptance_criteria: params.acceptance_criteria,
            ..TaskPatch::default()
        };
        if let Some(ref value) = params.status {
            patch.status = Some(TaskStatus::parse(value).ok_or_else(|| {
                ErrorBody::new(
                    kagan_wire::INVALID_PARAMS,
                    format!("unknown task status {value:?}"),
                )
            })?);
        }
        if let Some(ref value) = params.priority {
            patch.priority = Some(kagan_core::TaskPriority::parse(value).ok_or_else(|| {
                ErrorBody::new(
                    kagan_wire::INVALID_PARAMS,
                    format!("unknown priority {value:?}"),
                )
            })?);
        }
        if let Some(ref value) = params.task_type {
            patch.task_type = Some(kagan_core::TaskType::parse(value).ok_or_else(|| {
                ErrorBody::new(
                    kagan_wire::INVALID_PARAMS,
                    format!("unknown task type {value:?}"),
                )
            })?);
        }
        if let Some(value) = params.agent_backend {
            patch.agent_backend = Some(Some(value));
        }
        if let Some(value) = params.base_branch {
            patch.base_branch = Some(Some(value));
        }

        let task = ctx
            .tasks
            .update_fields(&params.task_id, &patch)
            .map_err(service_error)?
            .ok_or_else(|| {
                ErrorBody::new(kagan_wire::NOT_FOUND, format!("no task {}", params.task_id))
            })?;
        json(&task)
    })
}

#[derive(Deserialize)]
struct TasksMoveParams {
    task_id: String,
    status: String,
}

fn tasks_move(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: TasksMoveParams = parse_params(params)?;
        let status = TaskStatus::parse(&params.status).ok_or_else(|| {
            ErrorBody::new(
                kagan_wire::INVALID_PARAMS,
                format!("unknown task status {:?}", params.status),
            )
        })?;
        let task = ctx
            .tasks
            .move_task(&params.task_id, status)
            .map_err(service_error)?
            .ok_or_else(|| {
                ErrorBody::new(kagan_wire::NOT_FOUND, format!("no task {}", params.task_id))
            })?;
        json(&task)
    })
}

fn tasks_delete(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: TaskIdParams = parse_params(params)?;
        let deleted = ctx.tasks.delete_task(&params.task_id).map_err(service_error)?;
        Ok(serde_json::json!({ "deleted": deleted }))
    })
}

fn tasks_links(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: TaskIdParams = parse_params(params)?;
        let links = ctx.tasks.get_task_links(&params.task_id).map_err(service_error)?;
        Ok(serde_json::json!({ "links": links }))
    })
}

fn tasks_get_scratchpad(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: TaskIdParams = parse_params(params)?;
        let content = ctx.tasks.get_scratchpad(&params.task_id).map_err(service_error)?;
        Ok(serde_json::json!({ "content": content }))
    })
}

#[derive(Deserialize)]
struct ScratchpadParams {
    task_id: String,
    content: String,
}

fn tasks_update_scratchpad(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: ScratchpadParams = parse_params(params)?;
        ctx.tasks
            .update_scratchpad(&params.task_id, &params.content)
            .map_err(service_error)?;
        Ok(serde_json::json!({ "success": true }))
    })
}

// -- jobs --

#[derive(Deserialize)]
struct JobsSubmitParams {
    task_id: String,
    action: String,
    #[serde(default)]
    params: serde_json::Value,
}

fn jobs_submit(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: JobsSubmitParams = parse_params(params)?;
        let mut job_params = params.params;
        if job_params.is_null() {
            job_params = serde_json::json!({});
        }
        if job_params.get("task_id").is_none() {
            job_params["task_id"] = serde_json::json!(params.task_id);
        }
        let job = ctx
            .jobs
            .submit(
                &kagan_core::TaskId::from_string(&params.task_id),
                &params.action,
                job_params,
            )
            .await
            .map_err(service_error)?;
        json(&job)
    })
}

#[derive(Deserialize)]
struct JobIdParams {
    job_id: String,
    task_id: String,
}

fn jobs_get(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: JobIdParams = parse_params(params)?;
        let job = ctx.jobs.get(&params.job_id).await.map_err(service_error)?;
        match job {
            Some(job) if job.task_id == params.task_id.as_str() => json(&job),
            _ => Err(ErrorBody::new(
                kagan_wire::NOT_FOUND,
                format!("no job {}", params.job_id),
            )),
        }
    })
}

#[derive(Deserialize)]
struct JobsWaitParams {
    job_id: String,
    task_id: String,
    #[serde(default)]
    timeout_seconds: Option<f64>,
}

fn jobs_wait(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: JobsWaitParams = parse_params(params)?;
        let general = &ctx.config.general;
        let max = general.tasks_wait_max_timeout_seconds as f64;
        let timeout = params
            .timeout_seconds
            .unwrap_or(general.tasks_wait_default_timeout_seconds as f64)
            .clamp(0.0, max);
        let job = ctx
            .jobs
            .wait(
                &params.job_id,
                &params.task_id,
                Some(Duration::from_secs_f64(timeout)),
            )
            .await
            .map_err(service_error)?
            .ok_or_else(|| {
                ErrorBody::new(kagan_wire::NOT_FOUND, format!("no job {}", params.job_id))
            })?;
        json(&job)
    })
}

fn jobs_cancel(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: JobIdParams = parse_params(params)?;
        let job = ctx
            .jobs
            .cancel(&params.job_id, &params.task_id)
            .await
            .map_err(service_error)?
            .ok_or_else(|| {
                ErrorBody::new(kagan_wire::NOT_FOUND, format!("no job {}", params.job_id))
            })?;
        json(&job)
    })
}

#[derive(Deserialize)]
struct JobsEventsParams {
    job_id: String,
    task_id: String,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    limit: Option<usize>,
}

fn jobs_events(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: JobsEventsParams = parse_params(params)?;
        let events = ctx
            .jobs
            .events(&params.job_id, &params.task_id)
            .await
            .map_err(service_error)?
            .ok_or_else(|| {
                ErrorBody::new(kagan_wire::NOT_FOUND, format!("no job {}", params.job_id))
            })?;
        let total = events.len();
        let page: Vec<_> = events
            .into_iter()
            .skip(params.offset)
            .take(params.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(serde_json::json!({ "total": total, "events": page }))
    })
}

// -- workspaces --

fn workspaces_diff(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: TaskIdParams = parse_params(params)?;
        let diffs = ctx.workspaces.diff(&params.task_id).await.map_err(service_error)?;
        json(&diffs)
    })
}

#[derive(Deserialize)]
struct WorkspacesRebaseParams {
    task_id: String,
    #[serde(default)]
    base: Option<String>,
}

fn workspaces_rebase(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: WorkspacesRebaseParams = parse_params(params)?;
        let outcome = ctx
            .workspaces
            .rebase_onto_base(&params.task_id, params.base.as_deref())
            .await
            .map_err(service_error)?;
        Ok(serde_json::json!({
            "success": outcome.success,
            "message": outcome.message,
            "conflict_files": outcome.conflict_files,
        }))
    })
}

// -- sessions --

#[derive(Deserialize)]
struct SessionsCreateParams {
    task_id: String,
    #[serde(default = "default_true")]
    reuse_if_exists: bool,
    #[serde(default)]
    worktree_path: Option<String>,
}

fn default_true() -> bool {
    true
}

fn sessions_create(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: SessionsCreateParams = parse_params(params)?;
        let task = require_task(&ctx, &params.task_id)?;
        if let Some(ref provided) = params.worktree_path {
            ctx.sessions
                .validate_worktree_path(&params.task_id, std::path::Path::new(provided))
                .map_err(session_error)?;
        }
        let created = ctx
            .sessions
            .create_session(&task, params.reuse_if_exists)
            .await
            .map_err(session_error)?;
        Ok(serde_json::json!({
            "session_name": created.session_name,
            "backend": created.backend.to_string(),
            "reused": created.reused,
        }))
    })
}

fn sessions_exists(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: TaskIdParams = parse_params(params)?;
        let task = require_task(&ctx, &params.task_id)?;
        let exists = ctx
            .sessions
            .session_exists(&task)
            .await
            .map_err(session_error)?;
        Ok(serde_json::json!({ "exists": exists }))
    })
}

// -- merges --

fn merges_merge(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: TaskIdParams = parse_params(params)?;
        let task = require_task(&ctx, &params.task_id)?;
        let result = ctx.merges.merge_task(&task).await.map_err(service_error)?;
        Ok(serde_json::json!({
            "success": result.success,
            "message": result.message,
            "merge_commits": result.merge_commits,
            "conflict_files": result
                .conflict
                .map(|conflict| conflict.files)
                .unwrap_or_default(),
        }))
    })
}

fn merges_has_no_changes(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: TaskIdParams = parse_params(params)?;
        let task = require_task(&ctx, &params.task_id)?;
        let empty = ctx.merges.has_no_changes(&task).await.map_err(service_error)?;
        Ok(serde_json::json!({ "has_no_changes": empty }))
    })
}

#[derive(Deserialize)]
struct MergesRejectParams {
    task_id: String,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    to_backlog: bool,
}

fn merges_reject(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: MergesRejectParams = parse_params(params)?;
        let task = require_task(&ctx, &params.task_id)?;
        let action = if params.to_backlog {
            RejectionAction::Backlog
        } else {
            RejectionAction::InProgress
        };
        let task = ctx
            .merges
            .apply_rejection_feedback(&task, params.feedback.as_deref(), action)
            .map_err(service_error)?
            .ok_or_else(|| {
                ErrorBody::new(kagan_wire::NOT_FOUND, format!("no task {}", params.task_id))
            })?;
        json(&task)
    })
}

fn merges_close_exploratory(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: TaskIdParams = parse_params(params)?;
        let task = require_task(&ctx, &params.task_id)?;
        let task = ctx
            .merges
            .close_exploratory(&task)
            .await
            .map_err(service_error)?
            .ok_or_else(|| {
                ErrorBody::new(kagan_wire::NOT_FOUND, format!("no task {}", params.task_id))
            })?;
        json(&task)
    })
}

// -- automation --

fn automation_start(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: TaskIdParams = parse_params(params)?;
        let task = require_task(&ctx, &params.task_id)?;
        let result = ctx.automation.spawn_for_task(&task).await.map_err(service_error)?;
        let payload = match result {
            SpawnResult::Started { execution_id } => serde_json::json!({
                "started": true,
                "execution_id": execution_id.as_str(),
            }),
            SpawnResult::AlreadyRunning => serde_json::json!({
                "started": false,
                "reason": "already_running",
            }),
            SpawnResult::AtCapacity => serde_json::json!({
                "started": false,
                "reason": "at_capacity",
            }),
        };
        Ok(payload)
    })
}

fn automation_stop(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: TaskIdParams = parse_params(params)?;
        let stopped = ctx.automation.stop_task(&params.task_id).await;
        Ok(serde_json::json!({ "stopped": stopped }))
    })
}

fn automation_status(ctx: Arc<AppContext>, params: serde_json::Value) -> HandlerFuture {
    Box::pin(async move {
        let params: TaskIdParams = parse_params(params)?;
        Ok(serde_json::json!({
            "running": ctx.automation.is_running(&params.task_id),
            "active_agents": ctx.automation.active_count(),
        }))
    })
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
