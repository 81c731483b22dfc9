// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable job service: a crash-safe, cancellable queue of background
//! actions with an append-only per-job lifecycle event stream.
//!
//! Terminal transitions are exactly-once: the repository refuses to
//! overwrite a terminal row, `cancel` persists before signalling the
//! worker, and startup recovery fails every job left queued/running by a
//! previous process before any new submission is accepted.

use crate::error::ServiceError;
use crate::events::EventBus;
use async_trait::async_trait;
use chrono::Utc;
use kagan_core::{DomainEvent, Job, JobEventRecord, JobId, JobOutcome, JobStatus, TaskId};
use kagan_store::{JobRepository, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Executor invoked for each job action.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(
        &self,
        action: &str,
        params: &serde_json::Value,
    ) -> Result<JobOutcome, Box<dyn std::error::Error + Send + Sync>>;
}

struct WorkerEntry {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct ServiceState {
    workers: HashMap<String, WorkerEntry>,
    terminal: HashMap<String, watch::Sender<bool>>,
}

struct JobServiceInner {
    executor: Arc<dyn JobExecutor>,
    repository: JobRepository,
    events: EventBus,
    state: Mutex<ServiceState>,
    recovered: AtomicBool,
}

/// DB-backed job runner with in-process synchronization primitives.
#[derive(Clone)]
pub struct JobService {
    inner: Arc<JobServiceInner>,
}

impl JobService {
    pub fn new(executor: Arc<dyn JobExecutor>, repository: JobRepository, events: EventBus) -> Self {
        Self {
            inner: Arc::new(JobServiceInner {
                executor,
                repository,
                events,
                state: Mutex::new(ServiceState::default()),
                recovered: AtomicBool::new(false),
            }),
        }
    }

    /// Submit a new job: persists the queued row plus the initial
    /// lifecycle event, then starts a worker bound to the job ID.
    pub async fn submit(
        &self,
        task_id: &TaskId,
        action: &str,
        params: serde_json::Value,
    ) -> Result<Job, ServiceError> {
        self.ensure_recovered().await?;
        let job_id = JobId::new();

        let mut state = self.inner.state.lock().await;
        let job = self.inner.repository.create_job(
            &job_id,
            task_id,
            action,
            &params,
            Utc::now(),
            "Job queued",
            "JOB_QUEUED",
        )?;

        let (terminal_tx, _) = watch::channel(false);
        state.terminal.insert(job_id.as_str().to_string(), terminal_tx);

        let token = CancellationToken::new();
        let worker_inner = Arc::clone(&self.inner);
        let worker_job_id = job_id.as_str().to_string();
        let worker_token = token.clone();
        let join = tokio::spawn(async move {
            run_job(worker_inner, worker_job_id, worker_token).await;
        });
        state.workers.insert(
            job_id.as_str().to_string(),
            WorkerEntry { token, join: Some(join) },
        );
        drop(state);

        self.inner.events.publish(DomainEvent::JobSubmitted {
            job_id,
            task_id: *task_id,
            action: action.to_string(),
        });
        Ok(job)
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<Job>, ServiceError> {
        self.ensure_recovered().await?;
        Ok(self.inner.repository.get_job(job_id)?)
    }

    /// Lifecycle events in ascending `event_index` order. `None` when the
    /// job does not exist or belongs to a different task.
    pub async fn events(
        &self,
        job_id: &str,
        task_id: &str,
    ) -> Result<Option<Vec<JobEventRecord>>, ServiceError> {
        self.ensure_recovered().await?;
        let Some(job) = self.inner.repository.get_job(job_id)? else {
            return Ok(None);
        };
        if job.task_id != task_id {
            return Ok(None);
        }
        Ok(Some(self.inner.repository.list_events(job_id)?))
    }

    /// Wait for a job to reach a terminal state.
    ///
    /// Returns immediately when the job is already terminal (or when
    /// `timeout` is zero). A job found running in the database with no
    /// in-process worker is failed with `JOB_RUNNER_MISSING`.
    pub async fn wait(
        &self,
        job_id: &str,
        task_id: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Job>, ServiceError> {
        self.ensure_recovered().await?;

        let mut receiver = {
            let mut state = self.inner.state.lock().await;
            let Some(job) = self.inner.repository.get_job(job_id)? else {
                return Ok(None);
            };
            if job.task_id != task_id {
                return Ok(None);
            }
            if job.status.is_terminal() {
                return Ok(Some(job));
            }

            if !state.terminal.contains_key(job_id) && !state.workers.contains_key(job_id) {
                // In-flight in the DB, but no runner in this process.
                let message = "Job runner was not active for this in-flight job";
                let transition = self.inner.repository.complete_job(
                    job_id,
                    JobStatus::Failed,
                    Utc::now(),
                    Some(message),
                    Some("JOB_RUNNER_MISSING"),
                    Some(&serde_json::json!({
                        "success": false,
                        "message": message,
                        "code": "JOB_RUNNER_MISSING",
                    })),
                )?;
                if let Some(transition) = transition {
                    if transition.transitioned {
                        set_terminal(&mut state, job_id);
                    }
                    return Ok(Some(transition.job));
                }
                return Ok(None);
            }

            let sender = state
                .terminal
                .entry(job_id.to_string())
                .or_insert_with(|| watch::channel(false).0);
            sender.subscribe()
        };

        match timeout {
            Some(limit) if limit.is_zero() => {}
            Some(limit) => {
                let _ = tokio::time::timeout(limit, wait_for_terminal(&mut receiver)).await;
            }
            None => wait_for_terminal(&mut receiver).await,
        }

        let Some(job) = self.inner.repository.get_job(job_id)? else {
            return Ok(None);
        };
        if job.task_id != task_id {
            return Ok(None);
        }
        Ok(Some(job))
    }

    /// Cancel a job. Valid only for the owning task; terminal jobs are
    /// returned unchanged. The terminal row is written first, then the
    /// worker is signalled, so persistence cannot be lost to shutdown.
    pub async fn cancel(
        &self,
        job_id: &str,
        task_id: &str,
    ) -> Result<Option<Job>, ServiceError> {
        self.ensure_recovered().await?;

        let (record, entry) = {
            let mut state = self.inner.state.lock().await;
            let Some(job) = self.inner.repository.get_job(job_id)? else {
                return Ok(None);
            };
            if job.task_id != task_id {
                return Ok(None);
            }
            if job.status.is_terminal() {
                return Ok(Some(job));
            }

            let transition = self.inner.repository.complete_job(
                job_id,
                JobStatus::Cancelled,
                Utc::now(),
                Some("Job cancelled"),
                Some("JOB_CANCELLED"),
                Some(&serde_json::json!({
                    "success": false,
                    "message": "Job cancelled",
                    "code": "JOB_CANCELLED",
                })),
            )?;
            let Some(transition) = transition else {
                return Ok(None);
            };
            if transition.transitioned {
                set_terminal(&mut state, job_id);
            }
            (transition.job, state.workers.remove(job_id))
        };

        if let Some(mut entry) = entry {
            entry.token.cancel();
            if let Some(join) = entry.join.take() {
                let _ = join.await;
            }
        }

        self.inner.events.publish(DomainEvent::JobFinished {
            job_id: record.id,
            task_id: record.task_id,
            status: record.status,
        });
        Ok(Some(record))
    }

    /// Cancel all outstanding workers. Worker cleanup paths write
    /// `cancelled` through the idempotent terminal transition, so a job
    /// already completed by `cancel` is never overwritten.
    pub async fn shutdown(&self) {
        let entries: Vec<WorkerEntry> = {
            let mut state = self.inner.state.lock().await;
            state.workers.drain().map(|(_, entry)| entry).collect()
        };
        for mut entry in entries {
            entry.token.cancel();
            if let Some(join) = entry.join.take() {
                let _ = join.await;
            }
        }
    }

    /// Startup recovery: fail every job left queued/running by a previous
    /// process instance, exactly once, before accepting submissions.
    async fn ensure_recovered(&self) -> Result<(), ServiceError> {
        if self.inner.recovered.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut state = self.inner.state.lock().await;
        if self.inner.recovered.load(Ordering::SeqCst) {
            return Ok(());
        }

        let message = "Job interrupted by previous service shutdown";
        match self.inner.repository.recover_non_terminal_jobs(
            Utc::now(),
            message,
            "JOB_RECOVERED_INTERRUPTED",
            &serde_json::json!({
                "success": false,
                "message": message,
                "code": "JOB_RECOVERED_INTERRUPTED",
            }),
        ) {
            Ok(recovered) => {
                for job in &recovered {
                    set_terminal(&mut state, job.id.as_str());
                }
                if !recovered.is_empty() {
                    tracing::info!(count = recovered.len(), "recovered interrupted jobs");
                }
            }
            Err(StoreError::Closing) => {}
            Err(error) => return Err(error.into()),
        }
        self.inner.recovered.store(true, Ordering::SeqCst);
        Ok(())
    }
}

async fn wait_for_terminal(receiver: &mut watch::Receiver<bool>) {
    loop {
        if *receiver.borrow() {
            return;
        }
        if receiver.changed().await.is_err() {
            return;
        }
    }
}

fn set_terminal(state: &mut ServiceState, job_id: &str) {
    if let Some(sender) = state.terminal.remove(job_id) {
        let _ = sender.send(true);
    }
}

async fn run_job(inner: Arc<JobServiceInner>, job_id: String, token: CancellationToken) {
    let run = async {
        let (action, params, task_id) = {
            let mut state = inner.state.lock().await;
            let transition = inner.repository.mark_running(
                &job_id,
                Utc::now(),
                "Job running",
                "JOB_RUNNING",
            )?;
            let Some(transition) = transition else {
                state.workers.remove(&job_id);
                return Ok::<(), StoreError>(());
            };
            if !transition.transitioned {
                if transition.job.status.is_terminal() {
                    set_terminal(&mut state, &job_id);
                }
                return Ok(());
            }
            (
                transition.job.action.clone(),
                transition.job.params.clone(),
                transition.job.task_id,
            )
        };

        let outcome = tokio::select! {
            _ = token.cancelled() => None,
            result = inner.executor.execute(&action, &params) => Some(result),
        };

        let (status, message, code, result_json) = match outcome {
            // Cancelled: `cancel` (or shutdown) owns the terminal intent;
            // this write is a no-op when it already landed.
            None => (
                JobStatus::Cancelled,
                Some("Job cancelled".to_string()),
                Some("JOB_CANCELLED".to_string()),
                serde_json::json!({
                    "success": false,
                    "message": "Job cancelled",
                    "code": "JOB_CANCELLED",
                }),
            ),
            Some(Ok(outcome)) => {
                let status =
                    if outcome.success { JobStatus::Succeeded } else { JobStatus::Failed };
                let result_json = serde_json::to_value(&outcome)
                    .unwrap_or_else(|_| serde_json::json!({"success": outcome.success}));
                (status, outcome.message, outcome.code, result_json)
            }
            Some(Err(error)) => {
                tracing::error!(job_id = %job_id, error = %error, "job execution failed");
                let message = error.to_string();
                (
                    JobStatus::Failed,
                    Some(message.clone()),
                    Some("JOB_EXECUTION_ERROR".to_string()),
                    serde_json::json!({
                        "success": false,
                        "message": message,
                        "code": "JOB_EXECUTION_ERROR",
                    }),
                )
            }
        };

        let mut state = inner.state.lock().await;
        let transition = inner.repository.complete_job(
            &job_id,
            status,
            Utc::now(),
            message.as_deref(),
            code.as_deref(),
            Some(&result_json),
        )?;
        if let Some(transition) = transition {
            if transition.transitioned {
                set_terminal(&mut state, &job_id);
                inner.events.publish(DomainEvent::JobFinished {
                    job_id: transition.job.id,
                    task_id,
                    status: transition.job.status,
                });
            }
        }
        Ok(())
    };

    match run.await {
        Ok(()) => {}
        Err(StoreError::Closing) => {
            // Repository is closing: skip persistence, unblock waiters.
            let mut state = inner.state.lock().await;
            set_terminal(&mut state, &job_id);
        }
        Err(error) => {
            tracing::error!(job_id = %job_id, error = %error, "job worker persistence failed");
        }
    }

    // Bookkeeping always completes, even after errors.
    let mut state = inner.state.lock().await;
    state.workers.remove(&job_id);
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
