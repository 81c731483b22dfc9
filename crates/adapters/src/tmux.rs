// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin tmux subcommand runner.

use crate::process::{run_exec_checked, ExecOptions, ProcessError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TmuxError {
    #[error("tmux executable not found")]
    NotFound,

    #[error("tmux {command} failed: {detail}")]
    Command { command: String, detail: String },
}

/// Run a tmux subcommand, returning its stdout.
///
/// "No server running" surfaces as a `Command` error; callers that probe
/// for session existence treat it as "no sessions".
pub async fn run_tmux(args: &[&str]) -> Result<String, TmuxError> {
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    match run_exec_checked("tmux", &args, &ExecOptions::default()).await {
        Ok(result) => Ok(result.stdout_text()),
        Err(ProcessError::Os { ref source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            Err(TmuxError::NotFound)
        }
        Err(error) => Err(TmuxError::Command {
            command: args.first().cloned().unwrap_or_default(),
            detail: error.to_string(),
        }),
    }
}
