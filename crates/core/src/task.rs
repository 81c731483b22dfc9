// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task entity and status state machine.
//!
//! Status moves BACKLOG → IN_PROGRESS → REVIEW → DONE in the nominal
//! direction; review rejection and manual intervention may move it
//! backwards. The `after_*` helpers compute the deterministic transitions
//! driven by agent completion and review outcomes.

use crate::config::{fallback_agent_config, AgentConfig, KaganConfig, PairTerminalBackend};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a task (Kanban card).
    pub struct TaskId;
}

crate::define_id! {
    /// Unique identifier for a project.
    pub struct ProjectId;
}

/// Kanban column of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Backlog,
    InProgress,
    Review,
    Done,
}

crate::simple_display! {
    TaskStatus {
        Backlog => "BACKLOG",
        InProgress => "IN_PROGRESS",
        Review => "REVIEW",
        Done => "DONE",
    }
}

crate::parse_variants! {
    TaskStatus {
        "BACKLOG" => Backlog,
        "IN_PROGRESS" => InProgress,
        "REVIEW" => Review,
        "DONE" => Done,
    }
}

impl TaskStatus {
    /// Status after an agent run completes.
    ///
    /// A successful run moves IN_PROGRESS to REVIEW; everything else
    /// (failure, or a stale signal for a task not in progress) is a no-op.
    pub fn after_agent_complete(self, success: bool) -> TaskStatus {
        if success && self == TaskStatus::InProgress {
            TaskStatus::Review
        } else {
            self
        }
    }

    /// Status after a passing review: REVIEW → DONE.
    pub fn after_review_pass(self) -> TaskStatus {
        if self == TaskStatus::Review {
            TaskStatus::Done
        } else {
            self
        }
    }

    /// Status after a rejected review: REVIEW → IN_PROGRESS.
    pub fn after_review_reject(self) -> TaskStatus {
        if self == TaskStatus::Review {
            TaskStatus::InProgress
        } else {
            self
        }
    }
}

/// Priority of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

crate::simple_display! {
    TaskPriority {
        Low => "LOW",
        Medium => "MEDIUM",
        High => "HIGH",
    }
}

crate::parse_variants! {
    TaskPriority {
        "LOW" => Low,
        "MEDIUM" => Medium,
        "HIGH" => High,
    }
}

/// Execution mode of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Human-attended terminal session
    #[default]
    Pair,
    /// Background agent supervised by the automation service
    Auto,
}

crate::simple_display! {
    TaskType {
        Pair => "PAIR",
        Auto => "AUTO",
    }
}

crate::parse_variants! {
    TaskType {
        "PAIR" => Pair,
        "AUTO" => Auto,
    }
}

/// Unit of work tracked on the Kanban board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub parent_id: Option<TaskId>,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub task_type: TaskType,
    pub terminal_backend: Option<PairTerminalBackend>,
    pub agent_backend: Option<String>,
    pub base_branch: Option<String>,
    pub acceptance_criteria: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task with a generated ID and the given timestamps.
    pub fn create(
        project_id: ProjectId,
        title: impl Into<String>,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            project_id,
            parent_id: None,
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Backlog,
            priority: TaskPriority::Medium,
            task_type: TaskType::Pair,
            terminal_backend: None,
            agent_backend: None,
            base_branch: None,
            acceptance_criteria: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Shortened ID for display.
    pub fn short_id(&self) -> &str {
        self.id.short(8)
    }

    /// Resolve the agent config with priority: task override → configured
    /// agent → configured default worker agent → built-in fallback.
    pub fn agent_config(&self, config: &KaganConfig) -> AgentConfig {
        if let Some(ref backend) = self.agent_backend {
            if let Some(agent) = config.get_agent(backend) {
                return agent.clone();
            }
        }
        if let Some(agent) = config.worker_agent() {
            return agent.clone();
        }
        fallback_agent_config()
    }

    /// Resolve the PAIR terminal backend: task override → configured
    /// default → platform default.
    pub fn resolve_terminal_backend(&self, config: &KaganConfig) -> PairTerminalBackend {
        self.terminal_backend
            .unwrap_or(config.general.default_pair_terminal_backend)
    }
}

crate::builder! {
    pub struct TaskBuilder => Task {
        into {
            title: String = "test task",
            description: String = "",
        }
        set {
            id: TaskId = TaskId::new(),
            project_id: ProjectId = ProjectId::new(),
            status: TaskStatus = TaskStatus::Backlog,
            priority: TaskPriority = TaskPriority::Medium,
            task_type: TaskType = TaskType::Pair,
            acceptance_criteria: Vec<String> = Vec::new(),
        }
        option {
            parent_id: TaskId = None,
            terminal_backend: PairTerminalBackend = None,
            agent_backend: String = None,
            base_branch: String = None,
        }
        computed {
            created_at: DateTime<Utc> = Utc::now(),
            updated_at: DateTime<Utc> = Utc::now(),
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
