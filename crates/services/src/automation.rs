// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Automation service: supervises AUTO agent processes.
//!
//! One worker task per active AUTO task, capped globally by
//! `max_concurrent_agents`. The service keeps no internal pending queue —
//! a spawn request at capacity is reported back and the durable job
//! service is the queuing abstraction.
//!
//! Worker lifecycle: STARTING (workspace + execution row + subprocess) →
//! RUNNING (event stream consumed, logs chunked to storage) → terminal.
//! Terminal transitions happen exactly once; duplicate signals after a
//! cancellation are ignored by the execution repository.

use crate::error::ServiceError;
use crate::events::EventBus;
use crate::tasks::TaskService;
use crate::workspaces::{RepoSpec, WorkspaceService};
use chrono::Utc;
use kagan_core::{
    DomainEvent, ExecutionId, ExecutionRunReason, ExecutionStatus, KaganConfig, SessionType,
    Task, TaskType, Workspace,
};
use kagan_adapters::GitOps;
use kagan_store::{ExecutionRepository, RepoRepository, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Maximum bytes per execution-log DB write; small lines are coalesced up
/// to this bound so a chatty agent cannot stall its own stdout.
pub const MAX_LOG_CHUNK_BYTES: usize = 32 * 1024;

/// Lines buffered before a flush even when under the byte bound.
const MAX_LOG_CHUNK_LINES: usize = 64;

/// Grace period between SIGINT and SIGKILL on cancellation.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Terminator the worker agent emits when it finished its task.
pub const COMPLETE_MARKER: &str = "<complete/>";

/// Terminators the review agent emits with its verdict.
pub const REVIEW_PASS_MARKER: &str = "<review_pass/>";
pub const REVIEW_REJECT_OPEN: &str = "<review_reject>";
pub const REVIEW_REJECT_CLOSE: &str = "</review_reject>";

/// Outcome of a spawn request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnResult {
    Started { execution_id: ExecutionId },
    AtCapacity,
    AlreadyRunning,
}

struct WorkerHandle {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

struct AutomationInner {
    tasks: TaskService,
    workspaces: Arc<WorkspaceService>,
    executions: ExecutionRepository,
    repos: RepoRepository,
    config: KaganConfig,
    events: EventBus,
    git_ops: Arc<dyn GitOps>,
    workers: Mutex<HashMap<String, WorkerHandle>>,
}

/// Supervisor for AUTO agent processes.
#[derive(Clone)]
pub struct AutomationService {
    inner: Arc<AutomationInner>,
}

impl AutomationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tasks: TaskService,
        workspaces: Arc<WorkspaceService>,
        executions: ExecutionRepository,
        repos: RepoRepository,
        config: KaganConfig,
        events: EventBus,
        git_ops: Arc<dyn GitOps>,
    ) -> Self {
        Self {
            inner: Arc::new(AutomationInner {
                tasks,
                workspaces,
                executions,
                repos,
                config,
                events,
                git_ops,
                workers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn active_count(&self) -> usize {
        self.inner.workers.lock().len()
    }

    pub fn is_running(&self, task_id: &str) -> bool {
        self.inner.workers.lock().contains_key(task_id)
    }

    /// Start an agent worker for an AUTO task.
    ///
    /// Either starts immediately or reports `AtCapacity`; the caller
    /// decides whether to queue via the job service or tell the user.
    pub async fn spawn_for_task(&self, task: &Task) -> Result<SpawnResult, ServiceError> {
        if task.task_type != TaskType::Auto {
            return Err(ServiceError::Invalid(format!(
                "task {} is not an AUTO task",
                task.id
            )));
        }

        let token = CancellationToken::new();
        {
            let mut workers = self.inner.workers.lock();
            if workers.contains_key(task.id.as_str()) {
                return Ok(SpawnResult::AlreadyRunning);
            }
            if workers.len() >= self.inner.config.general.max_concurrent_agents {
                return Ok(SpawnResult::AtCapacity);
            }
            workers.insert(
                task.id.as_str().to_string(),
                WorkerHandle { token: token.clone(), join: None },
            );
        }

        match self.start_worker(task, token).await {
            Ok(execution_id) => Ok(SpawnResult::Started { execution_id }),
            Err(error) => {
                self.inner.workers.lock().remove(task.id.as_str());
                Err(error)
            }
        }
    }

    async fn start_worker(
        &self,
        task: &Task,
        token: CancellationToken,
    ) -> Result<ExecutionId, ServiceError> {
        let inner = &self.inner;

        let workspace = match inner.workspaces.get_for_task(task.id.as_str())? {
            Some(workspace) => workspace,
            None => {
                let specs = self.project_repo_specs(task)?;
                inner.workspaces.provision(task, &specs).await?
            }
        };

        let session = inner.tasks.create_session_record(
            &workspace.id,
            SessionType::Acp,
            Some(&format!("kagan-auto-{}", task.id)),
        )?;

        let agent = task.agent_config(&inner.config);
        let execution = inner.executions.create(
            &session.id,
            ExecutionRunReason::CodingAgent,
            &serde_json::json!({
                "agent": agent.short_name,
                "task_id": task.id.as_str(),
            }),
            Utc::now(),
        )?;

        let mut repo_states = Vec::new();
        for row in inner.workspaces.list_repos(workspace.id.as_str())? {
            let Some(worktree) = row.worktree_path.clone() else {
                continue;
            };
            let before = inner
                .git_ops
                .head_commit(Path::new(&worktree))
                .await
                .ok()
                .filter(|sha| !sha.is_empty());
            let state_id = inner.executions.add_repo_state(
                execution.id.as_str(),
                &row.repo_id,
                before.as_deref(),
                Utc::now(),
            )?;
            repo_states.push((state_id, PathBuf::from(worktree)));
        }

        inner.events.publish(DomainEvent::AutomationTaskStarted { task_id: task.id });
        inner.events.publish(DomainEvent::AutomationAgentAttached {
            task_id: task.id,
            execution_id: execution.id.as_str().to_string(),
        });

        let worker_inner = Arc::clone(&self.inner);
        let worker_task = task.clone();
        let execution_id = execution.id;
        let worker_token = token.clone();
        let join = tokio::spawn(async move {
            run_worker(
                worker_inner,
                worker_task,
                workspace,
                execution_id,
                repo_states,
                worker_token,
            )
            .await;
        });

        if let Some(handle) = self.inner.workers.lock().get_mut(task.id.as_str()) {
            handle.join = Some(join);
        }
        Ok(execution.id)
    }

    fn project_repo_specs(&self, task: &Task) -> Result<Vec<RepoSpec>, ServiceError> {
        let repos = self.inner.repos.list_for_project(task.project_id.as_str())?;
        if repos.is_empty() {
            return Err(ServiceError::Invalid(format!(
                "project {} has no repositories",
                task.project_id
            )));
        }
        Ok(repos
            .into_iter()
            .map(|repo| RepoSpec {
                repo_id: repo.id,
                repo_path: PathBuf::from(&repo.path),
                target_branch: task
                    .base_branch
                    .clone()
                    .unwrap_or_else(|| repo.default_branch.clone()),
            })
            .collect())
    }

    /// Cooperatively stop the worker for a task and wait for it to
    /// finalize persistence.
    pub async fn stop_task(&self, task_id: &str) -> bool {
        let handle = self.inner.workers.lock().remove(task_id);
        let Some(mut handle) = handle else {
            return false;
        };
        handle.token.cancel();
        if let Some(join) = handle.join.take() {
            let _ = join.await;
        }
        true
    }

    /// Stop all workers (service shutdown).
    pub async fn shutdown(&self) {
        let task_ids: Vec<String> = self.inner.workers.lock().keys().cloned().collect();
        for task_id in task_ids {
            self.stop_task(&task_id).await;
        }
    }

    /// Wait for a worker to finish without cancelling it (tests and
    /// synchronous callers).
    pub async fn wait_for_task(&self, task_id: &str) {
        let join = {
            let mut workers = self.inner.workers.lock();
            workers.get_mut(task_id).and_then(|handle| handle.join.take())
        };
        if let Some(join) = join {
            let _ = join.await;
        }
        self.inner.workers.lock().remove(task_id);
    }
}

/// Outcome of one supervised agent run.
struct AgentRunOutcome {
    status: ExecutionStatus,
    exit_code: Option<i64>,
    error: Option<String>,
    saw_complete: bool,
    review_verdict: Option<ReviewVerdict>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReviewVerdict {
    Pass,
    Reject { reason: String },
}

async fn run_worker(
    inner: Arc<AutomationInner>,
    task: Task,
    workspace: Workspace,
    execution_id: ExecutionId,
    repo_states: Vec<(String, PathBuf)>,
    token: CancellationToken,
) {
    let agent = task.agent_config(&inner.config);
    let prompt = build_worker_prompt(&task);
    let outcome = supervise_agent(
        &inner,
        &task,
        &workspace,
        execution_id,
        &agent,
        &prompt,
        &token,
    )
    .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(error) if error.is_closing() => {
            // Repository is shutting down: abort without terminal state so
            // startup recovery owns this run.
            tracing::debug!(task_id = %task.id, "repository closing; abandoning agent run");
            inner.workers.lock().remove(task.id.as_str());
            return;
        }
        Err(error) => AgentRunOutcome {
            status: ExecutionStatus::Failed,
            exit_code: None,
            error: Some(error.to_string()),
            saw_complete: false,
            review_verdict: None,
        },
    };

    if let Err(error) = finalize_worker(&inner, &task, &workspace, execution_id, repo_states, outcome, &token).await
    {
        if error.is_closing() {
            tracing::debug!(task_id = %task.id, "repository closing during finalize");
        } else {
            tracing::error!(task_id = %task.id, error = %error, "agent worker finalize failed");
        }
    }

    inner.workers.lock().remove(task.id.as_str());
}

async fn finalize_worker(
    inner: &Arc<AutomationInner>,
    task: &Task,
    workspace: &Workspace,
    execution_id: ExecutionId,
    repo_states: Vec<(String, PathBuf)>,
    outcome: AgentRunOutcome,
    token: &CancellationToken,
) -> Result<(), ServiceError> {
    inner.executions.complete(
        execution_id.as_str(),
        outcome.status,
        outcome.exit_code,
        outcome.error.as_deref(),
        Utc::now(),
    )?;

    for (state_id, worktree) in &repo_states {
        let after = inner
            .git_ops
            .head_commit(worktree)
            .await
            .ok()
            .filter(|sha| !sha.is_empty());
        inner
            .executions
            .finish_repo_state(state_id, after.as_deref(), None, Utc::now())?;
    }

    match outcome.status {
        ExecutionStatus::Succeeded => {
            inner
                .tasks
                .sync_status_from_agent_complete(task.id.as_str(), true)?;

            if inner.config.general.auto_review && !token.is_cancelled() {
                run_review(inner, task, workspace, token).await?;
            }
            inner
                .events
                .publish(DomainEvent::AutomationTaskEnded { task_id: task.id, success: true });
        }
        ExecutionStatus::Cancelled => {
            inner
                .events
                .publish(DomainEvent::AutomationTaskEnded { task_id: task.id, success: false });
        }
        _ => {
            inner
                .tasks
                .sync_status_from_agent_complete(task.id.as_str(), false)?;
            inner
                .events
                .publish(DomainEvent::AutomationTaskEnded { task_id: task.id, success: false });
        }
    }
    Ok(())
}

/// Attach a read-only review agent after a successful run.
async fn run_review(
    inner: &Arc<AutomationInner>,
    task: &Task,
    workspace: &Workspace,
    token: &CancellationToken,
) -> Result<(), ServiceError> {
    let session = inner.tasks.create_session_record(
        &workspace.id,
        SessionType::Acp,
        Some(&format!("kagan-review-{}", task.id)),
    )?;
    let agent = task.agent_config(&inner.config);
    let execution = inner.executions.create(
        &session.id,
        ExecutionRunReason::Review,
        &serde_json::json!({
            "agent": agent.short_name,
            "task_id": task.id.as_str(),
        }),
        Utc::now(),
    )?;
    inner.events.publish(DomainEvent::AutomationReviewAgentAttached {
        task_id: task.id,
        execution_id: execution.id.as_str().to_string(),
    });

    let diff_summary = inner
        .workspaces
        .diff(task.id.as_str())
        .await
        .map(|diffs| {
            diffs
                .iter()
                .flat_map(|repo| repo.files.iter())
                .map(|file| format!("{} (+{} -{})", file.path, file.additions, file.deletions))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();
    let prompt = build_review_prompt(task, &diff_summary);

    let outcome =
        supervise_agent(inner, task, workspace, execution.id, &agent, &prompt, token).await?;
    inner.executions.complete(
        execution.id.as_str(),
        outcome.status,
        outcome.exit_code,
        outcome.error.as_deref(),
        Utc::now(),
    )?;

    match outcome.review_verdict {
        Some(ReviewVerdict::Pass) => {
            inner.tasks.sync_status_from_review_pass(task.id.as_str())?;
        }
        Some(ReviewVerdict::Reject { reason }) => {
            inner
                .tasks
                .sync_status_from_review_reject(task.id.as_str(), Some(&reason))?;
        }
        // No verdict (crash or cancellation): the task stays in REVIEW
        // for a human decision.
        None => {}
    }
    Ok(())
}

/// Spawn the agent subprocess and consume its event stream.
async fn supervise_agent(
    inner: &Arc<AutomationInner>,
    task: &Task,
    workspace: &Workspace,
    execution_id: ExecutionId,
    agent: &kagan_core::AgentConfig,
    prompt: &str,
    token: &CancellationToken,
) -> Result<AgentRunOutcome, ServiceError> {
    let Some(run_command) = agent.run_command_for_os() else {
        return Ok(AgentRunOutcome {
            status: ExecutionStatus::Failed,
            exit_code: None,
            error: Some(format!("agent {} has no run command", agent.short_name)),
            saw_complete: false,
            review_verdict: None,
        });
    };

    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(run_command)
        .current_dir(&workspace.path)
        .env("KAGAN_TASK_ID", task.id.as_str())
        .env("KAGAN_WORKTREE_PATH", &workspace.path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(error) => {
            return Ok(AgentRunOutcome {
                status: ExecutionStatus::Failed,
                exit_code: None,
                error: Some(format!("failed to spawn agent: {error}")),
                saw_complete: false,
                review_verdict: None,
            });
        }
    };

    // The startup prompt goes to the agent's stdin, then EOF.
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(prompt.as_bytes()).await;
        drop(stdin);
    }

    let stderr_tail = Arc::new(Mutex::new(String::new()));
    let stderr_task = child.stderr.take().map(|stderr| {
        let tail = Arc::clone(&stderr_tail);
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buffer = String::new();
            let _ = reader.read_to_string(&mut buffer).await;
            if let Some(line) = buffer.lines().rev().find(|line| !line.trim().is_empty()) {
                *tail.lock() = line.to_string();
            }
        })
    });

    let stdout = child.stdout.take();
    let mut consumer = StreamConsumer::new(inner, execution_id);
    let mut cancelled = false;

    if let Some(stdout) = stdout {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                next = lines.next_line() => {
                    match next {
                        Ok(Some(line)) => consumer.consume_line(&line)?,
                        Ok(None) => break,
                        Err(error) => {
                            tracing::warn!(error = %error, "agent stdout read failed");
                            break;
                        }
                    }
                }
                _ = token.cancelled() => {
                    cancelled = true;
                    break;
                }
            }
        }
    }

    consumer.flush()?;

    let exit_code = if cancelled {
        terminate_child(&mut child).await;
        None
    } else {
        match child.wait().await {
            Ok(status) => status.code().map(i64::from),
            Err(_) => None,
        }
    };

    if let Some(stderr_task) = stderr_task {
        let _ = stderr_task.await;
    }

    if cancelled {
        return Ok(AgentRunOutcome {
            status: ExecutionStatus::Cancelled,
            exit_code: None,
            error: None,
            saw_complete: consumer.saw_complete,
            review_verdict: consumer.review_verdict,
        });
    }

    let success = consumer.saw_complete && exit_code == Some(0);
    let status = if success { ExecutionStatus::Succeeded } else { ExecutionStatus::Failed };
    let error = if success {
        None
    } else {
        let tail = stderr_tail.lock().clone();
        Some(if tail.is_empty() {
            format!("agent exited without completing (exit code {exit_code:?})")
        } else {
            tail
        })
    };

    Ok(AgentRunOutcome {
        status,
        exit_code,
        error,
        saw_complete: consumer.saw_complete,
        review_verdict: consumer.review_verdict,
    })
}

/// SIGINT, bounded grace, then SIGKILL.
async fn terminate_child(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGINT,
        );
    }
    match tokio::time::timeout(CANCEL_GRACE, child.wait()).await {
        Ok(_) => {}
        Err(_) => {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
    }
}

/// Chunked log persistence plus event projection for one agent stream.
struct StreamConsumer<'a> {
    inner: &'a Arc<AutomationInner>,
    execution_id: ExecutionId,
    buffer: String,
    buffered_lines: usize,
    saw_complete: bool,
    review_verdict: Option<ReviewVerdict>,
}

impl<'a> StreamConsumer<'a> {
    fn new(inner: &'a Arc<AutomationInner>, execution_id: ExecutionId) -> Self {
        Self {
            inner,
            execution_id,
            buffer: String::new(),
            buffered_lines: 0,
            saw_complete: false,
            review_verdict: None,
        }
    }

    fn consume_line(&mut self, line: &str) -> Result<(), ServiceError> {
        if line.contains(COMPLETE_MARKER) {
            self.saw_complete = true;
        }
        if line.contains(REVIEW_PASS_MARKER) {
            self.review_verdict = Some(ReviewVerdict::Pass);
        } else if let Some(reason) = parse_review_reject(line) {
            self.review_verdict = Some(ReviewVerdict::Reject { reason });
        }

        self.project_turn(line)?;

        self.buffer.push_str(line);
        self.buffer.push('\n');
        self.buffered_lines += 1;
        if self.buffer.len() >= MAX_LOG_CHUNK_BYTES || self.buffered_lines >= MAX_LOG_CHUNK_LINES {
            self.flush()?;
        }
        Ok(())
    }

    /// Project coding-agent turn events from the JSONL stream.
    fn project_turn(&self, line: &str) -> Result<(), ServiceError> {
        let Ok(event) = serde_json::from_str::<serde_json::Value>(line) else {
            return Ok(());
        };
        if event.get("type").and_then(|value| value.as_str()) != Some("turn") {
            return Ok(());
        }
        self.inner.executions.append_agent_turn(
            self.execution_id.as_str(),
            event.get("agent_session_id").and_then(|value| value.as_str()),
            event.get("prompt").and_then(|value| value.as_str()),
            event.get("summary").and_then(|value| value.as_str()),
            event.get("message_id").and_then(|value| value.as_str()),
            Utc::now(),
        )?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ServiceError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        match self
            .inner
            .executions
            .append_log(self.execution_id.as_str(), &self.buffer, Utc::now())
        {
            Ok(_) => {}
            Err(StoreError::Closing) => return Err(StoreError::Closing.into()),
            Err(error) => {
                tracing::warn!(error = %error, "failed to persist log chunk, shedding");
            }
        }
        self.buffer.clear();
        self.buffered_lines = 0;
        Ok(())
    }
}

fn parse_review_reject(line: &str) -> Option<String> {
    let start = line.find(REVIEW_REJECT_OPEN)?;
    let rest = &line[start + REVIEW_REJECT_OPEN.len()..];
    let end = rest.find(REVIEW_REJECT_CLOSE).unwrap_or(rest.len());
    Some(rest[..end].trim().to_string())
}

/// Prompt for the worker agent run.
pub fn build_worker_prompt(task: &Task) -> String {
    let mut prompt = format!(
        "You are working autonomously on task {id}: {title}\n\n{description}\n",
        id = task.id,
        title = task.title,
        description = task.description,
    );
    if !task.acceptance_criteria.is_empty() {
        prompt.push_str("\nAcceptance criteria:\n");
        for criterion in &task.acceptance_criteria {
            prompt.push_str(&format!("- {criterion}\n"));
        }
    }
    prompt.push_str(
        "\nCommit all changes inside this worktree. When the task is complete, \
         emit a line containing <complete/> and exit.\n",
    );
    prompt
}

/// Prompt for the read-only review agent run.
pub fn build_review_prompt(task: &Task, diff_summary: &str) -> String {
    format!(
        "Review the completed work for task {id}: {title}\n\n\
         Task description:\n{description}\n\n\
         Changed files:\n{diff}\n\n\
         Inspect the diff against the base branch. Do not modify any files.\n\
         If the work satisfies the task, emit a line containing <review_pass/>.\n\
         If it does not, emit <review_reject>reason</review_reject> with a short reason.\n",
        id = task.id,
        title = task.title,
        description = task.description,
        diff = diff_summary,
    )
}

#[cfg(test)]
#[path = "automation_tests.rs"]
mod tests;
