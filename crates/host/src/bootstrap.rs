// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application bootstrap: wires repositories, services, and plugins into
//! one `AppContext`, and owns the ordered shutdown sequence.

use crate::plugins::{register_example_plugins, PluginError, PluginRegistry};
use async_trait::async_trait;
use kagan_core::{DomainEvent, JobOutcome, KaganConfig, TaskStatus, TaskType};
use kagan_adapters::{
    GitOperationsAdapter, GitOps, GitWorktreeAdapter, SystemGitRunner, WorktreeGit,
};
use kagan_services::{
    AutomationService, EventBus, JobExecutor, JobService, MergeService, RejectionAction,
    SessionService, SpawnResult, TaskService, WorkspaceService,
};
use kagan_store::{
    AuditRepository, ExecutionRepository, JobRepository, MergeRepository, PlannerRepository,
    ProjectRepository, RepoRepository, ScratchRepository, SessionFactory,
    SessionRecordRepository, TaskRepository, WorkspaceRepository,
};
use std::path::Path;
use std::sync::{Arc, OnceLock, Weak};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Store(#[from] kagan_store::StoreError),

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Central container for the core's services and repositories.
pub struct AppContext {
    pub config: KaganConfig,
    pub factory: SessionFactory,
    pub event_bus: EventBus,
    pub tasks: TaskService,
    pub projects: ProjectRepository,
    pub repos: RepoRepository,
    pub workspaces: Arc<WorkspaceService>,
    pub sessions: Arc<SessionService>,
    pub executions: ExecutionRepository,
    pub automation: AutomationService,
    pub merges: Arc<MergeService>,
    pub jobs: JobService,
    pub audit: AuditRepository,
    pub planner: PlannerRepository,
    pub plugins: PluginRegistry,
}

impl AppContext {
    /// Ordered shutdown:
    /// 1. mark the session factory closing so new sessions fail fast,
    /// 2. stop automation workers (their aborted runs skip persistence),
    /// 3. shut down the job service (cancel writes are idempotent),
    /// 4. dispose the database handle.
    pub async fn close(&self) {
        self.factory.mark_closing();
        self.automation.shutdown().await;
        self.jobs.shutdown().await;
        self.factory.close();
    }
}

/// Job executor dispatching durable actions onto the core services.
///
/// Holds a weak context reference because the context owns the job
/// service that owns this executor.
pub struct CoreJobExecutor {
    ctx: OnceLock<Weak<AppContext>>,
}

impl CoreJobExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self { ctx: OnceLock::new() })
    }

    fn bind(&self, ctx: &Arc<AppContext>) {
        let _ = self.ctx.set(Arc::downgrade(ctx));
    }

    fn context(&self) -> Option<Arc<AppContext>> {
        self.ctx.get().and_then(Weak::upgrade)
    }
}

#[async_trait]
impl JobExecutor for CoreJobExecutor {
    async fn execute(
        &self,
        action: &str,
        params: &serde_json::Value,
    ) -> Result<JobOutcome, Box<dyn std::error::Error + Send + Sync>> {
        let Some(ctx) = self.context() else {
            return Ok(JobOutcome::error("CORE_SHUTTING_DOWN", "core context is gone"));
        };
        execute_job_action(&ctx, action, params).await
    }
}

/// Execute one durable job action.
pub async fn execute_job_action(
    ctx: &Arc<AppContext>,
    action: &str,
    params: &serde_json::Value,
) -> Result<JobOutcome, Box<dyn std::error::Error + Send + Sync>> {
    let task_id = params
        .get("task_id")
        .and_then(|value| value.as_str())
        .unwrap_or_default()
        .to_string();

    match action {
        "start_agent" => {
            let Some(task) = ctx.tasks.get_task(&task_id)? else {
                return Ok(JobOutcome::error("TASK_NOT_FOUND", format!("no task {task_id}")));
            };
            if task.task_type != TaskType::Auto {
                return Ok(JobOutcome::error(
                    "TASK_NOT_AUTO",
                    format!("task {task_id} is not an AUTO task"),
                ));
            }
            if task.status == TaskStatus::Backlog {
                ctx.tasks.move_task(&task_id, TaskStatus::InProgress)?;
            }
            let task = ctx
                .tasks
                .get_task(&task_id)?
                .ok_or_else(|| format!("task {task_id} disappeared"))?;
            match ctx.automation.spawn_for_task(&task).await? {
                SpawnResult::Started { execution_id } => {
                    let mut outcome = JobOutcome::ok("AGENT_STARTED");
                    outcome.data = serde_json::json!({
                        "execution_id": execution_id.as_str(),
                    });
                    Ok(outcome)
                }
                SpawnResult::AlreadyRunning => Ok(JobOutcome::ok("AGENT_ALREADY_RUNNING")),
                SpawnResult::AtCapacity => Ok(JobOutcome::error(
                    "AT_CAPACITY",
                    "automation is at max_concurrent_agents",
                )),
            }
        }
        "stop_agent" => {
            let stopped = ctx.automation.stop_task(&task_id).await;
            if stopped {
                Ok(JobOutcome::ok("AGENT_STOPPED"))
            } else {
                Ok(JobOutcome::error("AGENT_NOT_RUNNING", "no active agent for task"))
            }
        }
        "merge" => {
            let Some(task) = ctx.tasks.get_task(&task_id)? else {
                return Ok(JobOutcome::error("TASK_NOT_FOUND", format!("no task {task_id}")));
            };
            let result = ctx.merges.merge_task(&task).await?;
            if result.success {
                let mut outcome = JobOutcome::ok("MERGED");
                outcome.data = serde_json::json!({ "merge_commits": result.merge_commits });
                Ok(outcome)
            } else {
                Ok(JobOutcome::error("MERGE_FAILED", result.message))
            }
        }
        "sync" => {
            let outcome = ctx.workspaces.rebase_onto_base(&task_id, None).await?;
            if outcome.success {
                Ok(JobOutcome::ok("REBASED"))
            } else {
                let Some(task) = ctx.tasks.get_task(&task_id)? else {
                    return Ok(JobOutcome::error("REBASE_CONFLICT", outcome.message));
                };
                // Conflict handoff: note the files and send the task back
                // to IN_PROGRESS for remediation.
                let note = MergeService::conflict_remediation_note(&kagan_adapters::MergeConflict {
                    op: "rebase".to_string(),
                    files: outcome.conflict_files.clone(),
                });
                ctx.merges
                    .apply_rejection_feedback(&task, Some(&note), RejectionAction::InProgress)?;
                Ok(JobOutcome::error("REBASE_CONFLICT", outcome.message))
            }
        }
        "noop" => Ok(JobOutcome::ok("OK")),
        other => Ok(JobOutcome::error(
            "UNKNOWN_ACTION",
            format!("unknown job action {other}"),
        )),
    }
}

/// Create a fully wired `AppContext`.
pub fn create_app_context(
    config: KaganConfig,
    db_path: &Path,
) -> Result<Arc<AppContext>, BootstrapError> {
    let factory = SessionFactory::open(db_path)?;
    build_app_context(config, factory)
}

/// Create an `AppContext` over an in-memory store (tests).
pub fn create_app_context_in_memory(
    config: KaganConfig,
) -> Result<Arc<AppContext>, BootstrapError> {
    let factory = SessionFactory::open_in_memory()?;
    build_app_context(config, factory)
}

fn build_app_context(
    config: KaganConfig,
    factory: SessionFactory,
) -> Result<Arc<AppContext>, BootstrapError> {
    let event_bus = EventBus::new();

    let task_repo = TaskRepository::new(factory.clone());
    let projects = ProjectRepository::new(factory.clone());
    let repos = RepoRepository::new(factory.clone());
    let executions = ExecutionRepository::new(factory.clone());
    let audit = AuditRepository::new(factory.clone());
    let planner = PlannerRepository::new(factory.clone());

    let tasks = TaskService::new(
        task_repo,
        SessionRecordRepository::new(factory.clone()),
        ScratchRepository::new(factory.clone()),
        event_bus.clone(),
    );

    let runner = Arc::new(SystemGitRunner);
    let worktree_git: Arc<dyn WorktreeGit> = Arc::new(GitWorktreeAdapter::new(
        Arc::clone(&runner) as Arc<dyn kagan_adapters::GitRunner>,
        config.general.worktree_base_ref_strategy,
    ));
    let git_ops: Arc<dyn GitOps> = Arc::new(GitOperationsAdapter::new(
        runner as Arc<dyn kagan_adapters::GitRunner>,
    ));

    let workspaces = Arc::new(WorkspaceService::new(
        WorkspaceRepository::new(factory.clone()),
        repos.clone(),
        worktree_git,
        Arc::clone(&git_ops),
    ));
    let sessions = Arc::new(SessionService::new(
        tasks.clone(),
        Arc::clone(&workspaces),
        config.clone(),
    ));
    let automation = AutomationService::new(
        tasks.clone(),
        Arc::clone(&workspaces),
        executions.clone(),
        repos.clone(),
        config.clone(),
        event_bus.clone(),
        Arc::clone(&git_ops),
    );
    let merges = Arc::new(MergeService::new(
        tasks.clone(),
        Arc::clone(&workspaces),
        MergeRepository::new(factory.clone()),
        Arc::clone(&git_ops),
        event_bus.clone(),
        config.clone(),
    ));

    let executor = CoreJobExecutor::new();
    let jobs = JobService::new(
        Arc::clone(&executor) as Arc<dyn JobExecutor>,
        JobRepository::new(factory.clone()),
        event_bus.clone(),
    );

    let mut plugins = PluginRegistry::new();
    register_example_plugins(&mut plugins)?;

    let ctx = Arc::new(AppContext {
        config,
        factory,
        event_bus: event_bus.clone(),
        tasks,
        projects,
        repos,
        workspaces,
        sessions,
        executions,
        automation,
        merges,
        jobs,
        audit,
        planner,
        plugins,
    });
    executor.bind(&ctx);

    // Keep the last-opened marker fresh as projects are opened.
    let projects_handler = ctx.projects.clone();
    event_bus.add_handler(Arc::new(move |event| {
        if let DomainEvent::ProjectOpened { project_id } = event {
            let _ = projects_handler.touch_last_opened(project_id.as_str(), chrono::Utc::now());
        }
    }));

    Ok(ctx)
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;
