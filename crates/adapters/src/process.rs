// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared subprocess runner: capture/checked execution with a bounded
//! retry policy and a structured error taxonomy.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Retry behavior for subprocess execution.
#[derive(Debug, Clone, Copy)]
pub struct ProcessRetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub retry_on_timeout: bool,
    pub retry_on_nonzero: bool,
    pub retry_on_oserror: bool,
}

impl Default for ProcessRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            retry_on_timeout: true,
            retry_on_nonzero: false,
            retry_on_oserror: true,
        }
    }
}

impl ProcessRetryPolicy {
    /// Default transient-failure policy for git: two attempts, 100 ms apart.
    pub fn git_default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(100),
            ..Self::default()
        }
    }

    fn normalized(self) -> Self {
        Self {
            max_attempts: self.max_attempts.max(1),
            ..self
        }
    }
}

/// Captured result of a subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub returncode: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessResult {
    /// Decode stdout as UTF-8 with replacement.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Decode stderr as UTF-8 with replacement.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Structured process failure with machine-readable code and command
/// context.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("[PROCESS_TIMEOUT] {} (timed out after {attempts} attempts)", command.join(" "))]
    Timeout { command: Vec<String>, attempts: u32 },

    #[error("[PROCESS_NONZERO_EXIT] {} (rc={returncode}): {detail}", command.join(" "))]
    NonzeroExit {
        command: Vec<String>,
        returncode: i32,
        attempts: u32,
        stdout: String,
        stderr: String,
        detail: String,
    },

    #[error("[PROCESS_OS_ERROR] {}: {source}", command.join(" "))]
    Os {
        command: Vec<String>,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Stable machine-readable code for the IPC boundary.
    pub fn code(&self) -> &'static str {
        match self {
            ProcessError::Timeout { .. } => "PROCESS_TIMEOUT",
            ProcessError::NonzeroExit { .. } => "PROCESS_NONZERO_EXIT",
            ProcessError::Os { .. } => "PROCESS_OS_ERROR",
        }
    }
}

/// Execution options shared by the capture/checked entry points.
#[derive(Debug, Default, Clone)]
pub struct ExecOptions {
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub env_remove: Vec<String>,
    pub timeout: Option<Duration>,
    pub retry: ProcessRetryPolicy,
}

fn build_command(program: &str, args: &[String], options: &ExecOptions) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(ref cwd) = options.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &options.env {
        cmd.env(key, value);
    }
    for key in &options.env_remove {
        cmd.env_remove(key);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    // Dropping the in-flight future (timeout path) must not leak children.
    cmd.kill_on_drop(true);
    cmd
}

fn command_vec(program: &str, args: &[String]) -> Vec<String> {
    let mut command = Vec::with_capacity(args.len() + 1);
    command.push(program.to_string());
    command.extend(args.iter().cloned());
    command
}

enum AttemptOutcome {
    Done(ProcessResult),
    Timeout,
    Os(std::io::Error),
}

async fn run_once(program: &str, args: &[String], options: &ExecOptions) -> AttemptOutcome {
    let mut cmd = build_command(program, args, options);
    let spawned = cmd.spawn();
    let child = match spawned {
        Ok(child) => child,
        Err(error) => return AttemptOutcome::Os(error),
    };

    let wait = child.wait_with_output();
    let output = match options.timeout {
        None => wait.await,
        Some(limit) => match tokio::time::timeout(limit, wait).await {
            Ok(output) => output,
            Err(_) => return AttemptOutcome::Timeout,
        },
    };

    match output {
        Ok(output) => AttemptOutcome::Done(ProcessResult {
            returncode: output.status.code().unwrap_or(1),
            stdout: output.stdout,
            stderr: output.stderr,
        }),
        Err(error) => AttemptOutcome::Os(error),
    }
}

/// Run a subprocess and capture stdout/stderr.
///
/// Retries apply to OS errors and timeouts (and non-zero exits when the
/// policy opts in); a non-zero return code is still an `Ok` result here.
pub async fn run_exec_capture(
    program: &str,
    args: &[String],
    options: &ExecOptions,
) -> Result<ProcessResult, ProcessError> {
    let policy = options.retry.normalized();
    let command = command_vec(program, args);
    let mut attempt = 1;

    loop {
        match run_once(program, args, options).await {
            AttemptOutcome::Done(result) => {
                if result.returncode != 0
                    && policy.retry_on_nonzero
                    && attempt < policy.max_attempts
                {
                    attempt += 1;
                    tokio::time::sleep(policy.delay).await;
                    continue;
                }
                if result.returncode != 0 {
                    tracing::debug!(
                        command = %command.join(" "),
                        returncode = result.returncode,
                        "subprocess exited non-zero"
                    );
                }
                return Ok(result);
            }
            AttemptOutcome::Timeout => {
                if policy.retry_on_timeout && attempt < policy.max_attempts {
                    attempt += 1;
                    tokio::time::sleep(policy.delay).await;
                    continue;
                }
                return Err(ProcessError::Timeout { command, attempts: attempt });
            }
            AttemptOutcome::Os(error) => {
                if policy.retry_on_oserror && attempt < policy.max_attempts {
                    attempt += 1;
                    tokio::time::sleep(policy.delay).await;
                    continue;
                }
                return Err(ProcessError::Os { command, attempts: attempt, source: error });
            }
        }
    }
}

/// Run a subprocess and raise a structured error when execution fails,
/// including a non-zero return code.
pub async fn run_exec_checked(
    program: &str,
    args: &[String],
    options: &ExecOptions,
) -> Result<ProcessResult, ProcessError> {
    let result = run_exec_capture(program, args, options).await?;
    if result.returncode != 0 {
        let stdout = result.stdout_text().trim().to_string();
        let stderr = result.stderr_text().trim().to_string();
        let detail = if !stderr.is_empty() {
            stderr.clone()
        } else if !stdout.is_empty() {
            stdout.clone()
        } else {
            "process exited with a non-zero status".to_string()
        };
        return Err(ProcessError::NonzeroExit {
            command: command_vec(program, args),
            returncode: result.returncode,
            attempts: options.retry.normalized().max_attempts,
            stdout,
            stderr,
            detail,
        });
    }
    Ok(result)
}

/// Spawn a detached subprocess for external launchers (editor windows).
///
/// The child gets its own process group and null stdio so it outlives the
/// core process.
pub fn spawn_detached(
    command: &[String],
    cwd: Option<&std::path::Path>,
) -> std::io::Result<std::process::Child> {
    let (program, args) = command.split_first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command")
    })?;
    let mut cmd = std::process::Command::new(program);
    cmd.args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd.spawn()
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
