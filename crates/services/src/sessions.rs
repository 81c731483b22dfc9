// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session service: creates and attaches the work surface for PAIR tasks.
//!
//! tmux sessions are created detached with the agent CLI launched via
//! `send-keys`; editor backends (vscode/cursor) materialize a startup
//! bundle under `<worktree>/.kagan/` and hand off to the external
//! launcher. AUTO tasks never pass through here — the automation service
//! owns agent-process lifecycle.

use crate::error::ServiceError;
use crate::tasks::TaskService;
use crate::workspaces::WorkspaceService;
use kagan_adapters::{run_tmux, spawn_detached, TmuxError};
use kagan_core::{
    AgentConfig, KaganConfig, PairTerminalBackend, SessionType, Task, Workspace,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("worktree path does not match the workspace location (expected {expected})")]
    InvalidWorktreePath { expected: String },

    #[error("failed to create session: {0}")]
    CreateFailed(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<TmuxError> for SessionError {
    fn from(error: TmuxError) -> Self {
        SessionError::CreateFailed(error.to_string())
    }
}

impl From<std::io::Error> for SessionError {
    fn from(error: std::io::Error) -> Self {
        SessionError::CreateFailed(error.to_string())
    }
}

/// Quote a string for POSIX shells (single-quote convention).
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Build the interactive CLI launch command for an agent.
///
/// Returns `None` when the agent has no interactive command configured or
/// takes no auto-prompt (copilot and unrecognized agents launch bare).
pub fn build_launch_command(
    agent: &AgentConfig,
    prompt: &str,
    model: Option<&str>,
    mcp_config_path: Option<&Path>,
) -> Option<String> {
    let base = agent.interactive_command_for_os()?;
    let model_flag = model
        .map(|model| format!("--model {model} "))
        .unwrap_or_default();
    let quoted = shell_quote(prompt);

    let command = match agent.short_name.as_str() {
        "claude" | "codex" | "gemini" => format!("{base} {model_flag}{quoted}"),
        "opencode" => format!("{base} {model_flag}--prompt {quoted}"),
        "kimi" => {
            let mcp = mcp_config_path
                .map(|path| format!(" --mcp-config-file {}", shell_quote(&path.display().to_string())))
                .unwrap_or_default();
            format!("{base} {model_flag}--prompt {quoted}{mcp}")
        }
        _ => base.to_string(),
    };
    Some(command)
}

/// Startup prompt rendered into `start_prompt.md` and the tmux launch.
pub fn build_startup_prompt(task: &Task) -> String {
    let description = if task.description.is_empty() {
        "No description provided."
    } else {
        &task.description
    };
    format!(
        "Hello! I'm starting a pair programming session for task **{id}**.\n\n\
         Act as a Senior Developer collaborating with me on this implementation.\n\n\
         ## Task Overview\n\
         **Title:** {title}\n\n\
         **Description:**\n{description}\n\n\
         ## Important Rules\n\
         - You are in a git worktree, NOT the main repository\n\
         - Only modify files within this worktree\n\
         - COMMIT all changes before requesting review (use semantic commits: feat:, fix:, docs:)\n\
         - When complete: commit your work, then call the `kagan_request_review` MCP tool\n\n\
         ## MCP Tools Available\n\
         - `kagan_get_context` - Full task details (acceptance criteria, scratchpad)\n\
         - `kagan_update_scratchpad` - Save progress notes for future reference\n\
         - `kagan_get_parallel_tasks` - Discover concurrent work to avoid merge conflicts\n\
         - `kagan_request_review` - Submit work for review (commit first!)\n\n\
         Please confirm MCP access by calling `kagan_get_context` with task_id `{id}`, then\n\
         summarize your understanding of this task and wait for my confirmation before\n\
         beginning any implementation.\n",
        id = task.id,
        title = task.title,
    )
}

/// Contents of `<worktree>/.kagan/session.json`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionBundle {
    pub task_id: String,
    pub session_name: String,
    pub backend: String,
    pub worktree: String,
    pub prompt_file: String,
}

/// Result of a create-session request.
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session_name: String,
    pub backend: PairTerminalBackend,
    pub reused: bool,
}

/// Session service for PAIR work surfaces.
pub struct SessionService {
    tasks: TaskService,
    workspaces: Arc<WorkspaceService>,
    config: KaganConfig,
}

impl SessionService {
    pub fn new(tasks: TaskService, workspaces: Arc<WorkspaceService>, config: KaganConfig) -> Self {
        Self { tasks, workspaces, config }
    }

    fn session_name(task_id: &str) -> String {
        format!("kagan-{task_id}")
    }

    /// Verify a caller-supplied worktree path against the workspace row.
    pub fn validate_worktree_path(
        &self,
        task_id: &str,
        provided: &Path,
    ) -> Result<Workspace, SessionError> {
        let workspace = self
            .workspaces
            .get_for_task(task_id)
            .map_err(SessionError::Service)?
            .ok_or_else(|| SessionError::CreateFailed(format!("no workspace for task {task_id}")))?;
        if Path::new(&workspace.path) != provided {
            return Err(SessionError::InvalidWorktreePath { expected: workspace.path.clone() });
        }
        Ok(workspace)
    }

    /// Create (or reuse) the PAIR session for a task.
    pub async fn create_session(
        &self,
        task: &Task,
        reuse_if_exists: bool,
    ) -> Result<CreatedSession, SessionError> {
        let workspace = self
            .workspaces
            .get_for_task(task.id.as_str())?
            .ok_or_else(|| {
                SessionError::CreateFailed(format!("no workspace for task {}", task.id))
            })?;
        let worktree = PathBuf::from(&workspace.path);
        let backend = task.resolve_terminal_backend(&self.config);
        let session_name = Self::session_name(task.id.as_str());

        if reuse_if_exists && self.backend_confirms(task.id.as_str(), backend, &worktree).await {
            return Ok(CreatedSession { session_name, backend, reused: true });
        }

        match backend {
            PairTerminalBackend::Tmux => {
                self.create_tmux_session(task, &worktree, &session_name).await?
            }
            PairTerminalBackend::Vscode => {
                self.create_editor_session(task, &worktree, &session_name, "code")?
            }
            PairTerminalBackend::Cursor => {
                self.create_editor_session(task, &worktree, &session_name, "cursor")?
            }
        }

        let session_type = match backend {
            PairTerminalBackend::Tmux => SessionType::Tmux,
            _ => SessionType::Editor,
        };
        self.tasks
            .create_session_record(&workspace.id, session_type, Some(&session_name))?;

        Ok(CreatedSession { session_name, backend, reused: false })
    }

    async fn backend_confirms(
        &self,
        task_id: &str,
        backend: PairTerminalBackend,
        worktree: &Path,
    ) -> bool {
        match backend {
            PairTerminalBackend::Tmux => self.tmux_session_exists(task_id).await,
            _ => worktree.join(".kagan").join("session.json").exists(),
        }
    }

    async fn create_tmux_session(
        &self,
        task: &Task,
        worktree: &Path,
        session_name: &str,
    ) -> Result<(), SessionError> {
        let worktree_str = worktree.display().to_string();
        run_tmux(&[
            "new-session",
            "-d",
            "-s",
            session_name,
            "-c",
            &worktree_str,
            "-e",
            &format!("KAGAN_TASK_ID={}", task.id),
            "-e",
            &format!("KAGAN_TASK_TITLE={}", task.title),
            "-e",
            &format!("KAGAN_WORKTREE_PATH={worktree_str}"),
        ])
        .await?;

        let agent = task.agent_config(&self.config);
        let mcp_file = self.write_mcp_config(worktree, &agent, task)?;
        ensure_worktree_gitignored(worktree, &mcp_file)?;

        let model = self.config.general.default_model_for(&agent.short_name);
        let prompt = build_startup_prompt(task);
        let mcp_path = worktree.join(&mcp_file);
        if let Some(command) = build_launch_command(&agent, &prompt, model, Some(&mcp_path)) {
            run_tmux(&["send-keys", "-t", session_name, &command, "Enter"]).await?;
        }
        Ok(())
    }

    fn create_editor_session(
        &self,
        task: &Task,
        worktree: &Path,
        session_name: &str,
        launcher: &str,
    ) -> Result<(), SessionError> {
        let agent = task.agent_config(&self.config);
        let prompt_file = self.write_startup_bundle(task, worktree, session_name, launcher)?;
        let mcp_file = self.write_mcp_config(worktree, &agent, task)?;
        ensure_worktree_gitignored(worktree, &mcp_file)?;

        let command = vec![
            launcher.to_string(),
            "--new-window".to_string(),
            worktree.display().to_string(),
            prompt_file.display().to_string(),
        ];
        spawn_detached(&command, Some(worktree))
            .map_err(|error| SessionError::CreateFailed(error.to_string()))?;
        Ok(())
    }

    /// Materialize `start_prompt.md` and `session.json` under
    /// `<worktree>/.kagan/`; returns the prompt file path.
    fn write_startup_bundle(
        &self,
        task: &Task,
        worktree: &Path,
        session_name: &str,
        backend: &str,
    ) -> Result<PathBuf, SessionError> {
        let bundle_dir = worktree.join(".kagan");
        std::fs::create_dir_all(&bundle_dir)?;

        let prompt_file = bundle_dir.join("start_prompt.md");
        std::fs::write(&prompt_file, build_startup_prompt(task))?;

        let bundle = SessionBundle {
            task_id: task.id.as_str().to_string(),
            session_name: session_name.to_string(),
            backend: backend.to_string(),
            worktree: worktree.display().to_string(),
            prompt_file: prompt_file.display().to_string(),
        };
        let payload = serde_json::to_string_pretty(&bundle)
            .map_err(|error| SessionError::CreateFailed(error.to_string()))?;
        std::fs::write(bundle_dir.join("session.json"), payload)?;
        Ok(prompt_file)
    }

    /// Write (or merge) the agent's MCP config with a session-scoped
    /// identity. Returns the written file name relative to the worktree.
    fn write_mcp_config(
        &self,
        worktree: &Path,
        agent: &AgentConfig,
        task: &Task,
    ) -> Result<String, SessionError> {
        let identity = format!("task:{}", task.id);
        let (file_name, mcp_key, entry) = match agent.short_name.as_str() {
            "opencode" => (
                "opencode.json",
                "mcp",
                serde_json::json!({
                    "type": "local",
                    "command": ["kagan", "mcp"],
                    "enabled": true,
                    "environment": {
                        "KAGAN_SESSION_ID": identity,
                        "KAGAN_CAPABILITY_PROFILE": "pair_worker",
                    },
                }),
            ),
            "gemini" => (
                ".gemini/settings.json",
                "mcpServers",
                serde_json::json!({
                    "command": "kagan",
                    "args": ["mcp"],
                    "env": {
                        "KAGAN_SESSION_ID": identity,
                        "KAGAN_CAPABILITY_PROFILE": "pair_worker",
                    },
                }),
            ),
            _ => (
                ".mcp.json",
                "mcpServers",
                serde_json::json!({
                    "command": "kagan",
                    "args": ["mcp"],
                    "env": {
                        "KAGAN_SESSION_ID": identity,
                        "KAGAN_CAPABILITY_PROFILE": "pair_worker",
                    },
                }),
            ),
        };

        let config_path = worktree.join(file_name);
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Merge with an existing config rather than clobbering it.
        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(content) => serde_json::from_str::<serde_json::Value>(&content)
                .unwrap_or_else(|_| serde_json::json!({})),
            Err(_) => serde_json::json!({}),
        };
        if !config.is_object() {
            config = serde_json::json!({});
        }
        if file_name == "opencode.json" && config.get("$schema").is_none() {
            config["$schema"] = serde_json::json!("https://opencode.ai/config.json");
        }
        if config.get(mcp_key).is_none() {
            config[mcp_key] = serde_json::json!({});
        }
        config[mcp_key]["kagan"] = entry;

        let payload = serde_json::to_string_pretty(&config)
            .map_err(|error| SessionError::CreateFailed(error.to_string()))?;
        std::fs::write(&config_path, payload)?;
        Ok(file_name.to_string())
    }

    async fn tmux_session_exists(&self, task_id: &str) -> bool {
        match run_tmux(&["list-sessions", "-F", "#{session_name}"]).await {
            Ok(output) => output
                .lines()
                .any(|line| line.trim() == Self::session_name(task_id)),
            // No tmux server running means no sessions exist.
            Err(_) => false,
        }
    }

    /// Check whether the PAIR session for a task is alive.
    pub async fn session_exists(&self, task: &Task) -> Result<bool, SessionError> {
        let backend = task.resolve_terminal_backend(&self.config);
        match backend {
            PairTerminalBackend::Tmux => Ok(self.tmux_session_exists(task.id.as_str()).await),
            _ => {
                let Some(workspace) = self.workspaces.get_for_task(task.id.as_str())? else {
                    return Ok(false);
                };
                Ok(Path::new(&workspace.path)
                    .join(".kagan")
                    .join("session.json")
                    .exists())
            }
        }
    }

    /// Kill the PAIR session and close its record.
    pub async fn kill_session(&self, task: &Task) -> Result<(), SessionError> {
        let session_name = Self::session_name(task.id.as_str());
        if task.resolve_terminal_backend(&self.config) == PairTerminalBackend::Tmux {
            let _ = run_tmux(&["kill-session", "-t", &session_name]).await;
        }
        self.tasks
            .close_session_by_external_id(&session_name, kagan_core::SessionStatus::Closed)?;
        Ok(())
    }
}

/// Append core-generated entries to the worktree's `.gitignore`.
pub fn ensure_worktree_gitignored(worktree: &Path, mcp_file: &str) -> std::io::Result<()> {
    let gitignore = worktree.join(".gitignore");
    let mut entries: Vec<&str> = vec![mcp_file, ".kagan/"];
    entries.dedup();

    let existing = std::fs::read_to_string(&gitignore).unwrap_or_default();
    let existing_lines: std::collections::HashSet<&str> = existing.lines().collect();
    let missing: Vec<&str> = entries
        .into_iter()
        .filter(|entry| !existing_lines.contains(entry))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let mut content = existing.clone();
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str("\n# Kagan generated files\n");
    for entry in missing {
        content.push_str(entry);
        content.push('\n');
    }
    std::fs::write(&gitignore, content)
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
