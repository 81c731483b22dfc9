// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolved configuration record.
//!
//! The config is loaded once at startup from a TOML file; everything past
//! this boundary consumes the resolved [`KaganConfig`] and never touches
//! the filesystem. Unknown enum values are coerced to their defaults so a
//! stale config file cannot prevent the core from starting.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Current platform key for OS-keyed command matrices.
#[cfg(target_os = "macos")]
pub const CURRENT_OS: &str = "macos";
#[cfg(target_os = "windows")]
pub const CURRENT_OS: &str = "windows";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub const CURRENT_OS: &str = "linux";

/// Terminal backend used for PAIR sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairTerminalBackend {
    Tmux,
    Vscode,
    Cursor,
}

crate::simple_display! {
    PairTerminalBackend {
        Tmux => "tmux",
        Vscode => "vscode",
        Cursor => "cursor",
    }
}

crate::parse_variants! {
    PairTerminalBackend {
        "tmux" => Tmux,
        "vscode" => Vscode,
        "cursor" => Cursor,
    }
}

impl PairTerminalBackend {
    /// Platform default: vscode on Windows, tmux elsewhere.
    pub fn platform_default() -> Self {
        if CURRENT_OS == "windows" {
            PairTerminalBackend::Vscode
        } else {
            PairTerminalBackend::Tmux
        }
    }
}

/// Base-ref preference when creating worktrees and computing diffs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseRefStrategy {
    #[default]
    Remote,
    LocalIfAhead,
    Local,
}

crate::simple_display! {
    BaseRefStrategy {
        Remote => "remote",
        LocalIfAhead => "local_if_ahead",
        Local => "local",
    }
}

fn coerce_base_ref_strategy<'de, D>(deserializer: D) -> Result<BaseRefStrategy, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(match value.as_str() {
        "local_if_ahead" => BaseRefStrategy::LocalIfAhead,
        "local" => BaseRefStrategy::Local,
        _ => BaseRefStrategy::Remote,
    })
}

fn coerce_pair_backend<'de, D>(deserializer: D) -> Result<PairTerminalBackend, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(PairTerminalBackend::parse(&value).unwrap_or_else(PairTerminalBackend::platform_default))
}

/// General configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub max_concurrent_agents: usize,
    pub default_base_branch: String,
    pub default_worker_agent: String,
    #[serde(deserialize_with = "coerce_pair_backend")]
    pub default_pair_terminal_backend: PairTerminalBackend,
    #[serde(deserialize_with = "coerce_base_ref_strategy")]
    pub worktree_base_ref_strategy: BaseRefStrategy,
    pub auto_review: bool,
    pub auto_approve: bool,
    pub require_review_approval: bool,
    pub serialize_merges: bool,
    pub default_model_claude: Option<String>,
    pub default_model_opencode: Option<String>,
    pub default_model_codex: Option<String>,
    pub default_model_gemini: Option<String>,
    pub default_model_kimi: Option<String>,
    pub default_model_copilot: Option<String>,
    pub core_idle_timeout_seconds: u64,
    pub tasks_wait_default_timeout_seconds: u64,
    pub tasks_wait_max_timeout_seconds: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: 3,
            default_base_branch: "main".to_string(),
            default_worker_agent: "claude".to_string(),
            default_pair_terminal_backend: PairTerminalBackend::platform_default(),
            worktree_base_ref_strategy: BaseRefStrategy::Remote,
            auto_review: true,
            auto_approve: false,
            require_review_approval: false,
            serialize_merges: true,
            default_model_claude: None,
            default_model_opencode: None,
            default_model_codex: None,
            default_model_gemini: None,
            default_model_kimi: None,
            default_model_copilot: None,
            core_idle_timeout_seconds: 180,
            tasks_wait_default_timeout_seconds: 900,
            tasks_wait_max_timeout_seconds: 900,
        }
    }
}

impl GeneralConfig {
    /// Per-agent model override, keyed by the agent short name.
    pub fn default_model_for(&self, short_name: &str) -> Option<&str> {
        let model = match short_name {
            "claude" => &self.default_model_claude,
            "opencode" => &self.default_model_opencode,
            "codex" => &self.default_model_codex,
            "gemini" => &self.default_model_gemini,
            "kimi" => &self.default_model_kimi,
            "copilot" => &self.default_model_copilot,
            _ => &None,
        };
        model.as_deref()
    }
}

/// UI-related user preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub skip_pair_instructions: bool,
}

/// Configuration for a coding agent backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Unique identifier (e.g. "claude.com")
    pub identity: String,
    /// Display name (e.g. "Claude Code")
    pub name: String,
    /// CLI alias (e.g. "claude")
    pub short_name: String,
    /// OS-keyed commands for AUTO mode (structured event stream on stdout)
    pub run_command: BTreeMap<String, String>,
    /// OS-keyed interactive CLI commands for PAIR mode
    pub interactive_command: BTreeMap<String, String>,
    pub active: bool,
    /// Environment variable used to select the model, if any
    pub model_env_var: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            identity: String::new(),
            name: String::new(),
            short_name: String::new(),
            run_command: BTreeMap::new(),
            interactive_command: BTreeMap::new(),
            active: true,
            model_env_var: String::new(),
        }
    }
}

impl AgentConfig {
    /// Interactive CLI command for the current platform.
    pub fn interactive_command_for_os(&self) -> Option<&str> {
        get_os_value(&self.interactive_command)
    }

    /// AUTO-mode command for the current platform.
    pub fn run_command_for_os(&self) -> Option<&str> {
        get_os_value(&self.run_command)
    }
}

/// Get an OS-specific value with wildcard (`*`) fallback.
pub fn get_os_value(matrix: &BTreeMap<String, String>) -> Option<&str> {
    matrix
        .get(CURRENT_OS)
        .or_else(|| matrix.get("*"))
        .map(String::as_str)
}

/// Fallback agent config used when nothing is configured.
pub fn fallback_agent_config() -> AgentConfig {
    AgentConfig {
        identity: "claude.com".to_string(),
        name: "Claude Code".to_string(),
        short_name: "claude".to_string(),
        run_command: BTreeMap::from([("*".to_string(), "npx claude-code-acp".to_string())]),
        interactive_command: BTreeMap::from([("*".to_string(), "claude".to_string())]),
        active: true,
        model_env_var: "ANTHROPIC_MODEL".to_string(),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Root configuration record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KaganConfig {
    pub general: GeneralConfig,
    pub agents: BTreeMap<String, AgentConfig>,
    pub ui: UiConfig,
}

impl KaganConfig {
    /// Load configuration from a TOML file, or defaults when absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Get agent configuration by short name.
    pub fn get_agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.get(name)
    }

    /// Get the configured worker agent.
    pub fn worker_agent(&self) -> Option<&AgentConfig> {
        self.get_agent(&self.general.default_worker_agent)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
