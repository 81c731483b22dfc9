// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end AUTO task flow: provision a real worktree, run a scripted
//! agent, review the status sync, and squash-merge the result.

use super::support::{git, init_repo};
use chrono::Utc;
use kagan_core::{AgentConfig, KaganConfig, Project, TaskStatus, TaskType};
use kagan_host::create_app_context;
use kagan_services::SpawnResult;
use kagan_store::TaskPatch;
use std::collections::BTreeMap;

fn scripted_agent(command: &str) -> AgentConfig {
    AgentConfig {
        identity: "scripted.test".to_string(),
        name: "Scripted Agent".to_string(),
        short_name: "claude".to_string(),
        run_command: BTreeMap::from([("*".to_string(), command.to_string())]),
        interactive_command: BTreeMap::new(),
        active: true,
        model_env_var: String::new(),
    }
}

#[tokio::test]
async fn auto_task_runs_reviews_and_merges() {
    let dir = tempfile::tempdir().unwrap();
    let repo_path = dir.path().join("repo");
    std::fs::create_dir_all(&repo_path).unwrap();
    init_repo(&repo_path);

    let mut config = KaganConfig::default();
    config.general.auto_review = false;
    config.agents.insert(
        "claude".to_string(),
        scripted_agent(
            "echo agent-work > feature.txt && git add -A && \
             git commit -q -m 'feat: agent work' && echo '<complete/>'",
        ),
    );

    let db_path = dir.path().join("kagan.db");
    let ctx = create_app_context(config, &db_path).unwrap();

    // Project + repo + AUTO task.
    let project = Project::create("Demo", Utc::now());
    ctx.projects.create(&project).unwrap();
    let repo = ctx
        .repos
        .get_or_create(
            "repo",
            repo_path.to_str().unwrap(),
            "main",
            Utc::now(),
        )
        .unwrap();
    ctx.repos
        .add_to_project(project.id.as_str(), repo.id.as_str(), true, 0, Utc::now())
        .unwrap();

    let task = ctx
        .tasks
        .create_task(project.id, "agent feature", "write feature.txt")
        .unwrap();
    ctx.tasks
        .update_fields(
            task.id.as_str(),
            &TaskPatch {
                task_type: Some(TaskType::Auto),
                status: Some(TaskStatus::InProgress),
                ..TaskPatch::default()
            },
        )
        .unwrap();
    let task = ctx.tasks.get_task(task.id.as_str()).unwrap().unwrap();

    // The worker provisions a real worktree and runs the scripted agent.
    let result = ctx.automation.spawn_for_task(&task).await.unwrap();
    assert!(matches!(result, SpawnResult::Started { .. }));
    ctx.automation.wait_for_task(task.id.as_str()).await;

    let task = ctx.tasks.get_task(task.id.as_str()).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Review, "agent completion syncs to REVIEW");

    let workspace = ctx.workspaces.get_for_task(task.id.as_str()).unwrap().unwrap();
    assert!(std::path::Path::new(&workspace.path).join("feature.txt").exists());

    // The diff surface sees the agent's commit.
    let diffs = ctx.workspaces.diff(task.id.as_str()).await.unwrap();
    assert_eq!(diffs.len(), 1);
    assert!(diffs[0].files.iter().any(|file| file.path == "feature.txt"));

    // Review passes manually; merge lands the change on main.
    let merged = ctx.merges.merge_task(&task).await.unwrap();
    assert!(merged.success, "merge failed: {}", merged.message);
    assert!(repo_path.join("feature.txt").exists());
    let log = git(&repo_path, &["log", "--oneline"]);
    assert!(log.contains("Squash merge"));

    let task = ctx.tasks.get_task(task.id.as_str()).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Done);

    // The workspace was archived and its worktree removed.
    assert!(ctx.workspaces.get_for_task(task.id.as_str()).unwrap().is_none());
    ctx.close().await;
}

#[tokio::test]
async fn failed_agent_leaves_task_in_progress_with_execution_record() {
    let dir = tempfile::tempdir().unwrap();
    let repo_path = dir.path().join("repo");
    std::fs::create_dir_all(&repo_path).unwrap();
    init_repo(&repo_path);

    let mut config = KaganConfig::default();
    config.general.auto_review = false;
    config
        .agents
        .insert("claude".to_string(), scripted_agent("echo cannot-do >&2; exit 9"));

    let ctx = create_app_context(config, &dir.path().join("kagan.db")).unwrap();
    let project = Project::create("Demo", Utc::now());
    ctx.projects.create(&project).unwrap();
    let repo = ctx
        .repos
        .get_or_create("repo", repo_path.to_str().unwrap(), "main", Utc::now())
        .unwrap();
    ctx.repos
        .add_to_project(project.id.as_str(), repo.id.as_str(), true, 0, Utc::now())
        .unwrap();

    let task = ctx.tasks.create_task(project.id, "doomed", "").unwrap();
    ctx.tasks
        .update_fields(
            task.id.as_str(),
            &TaskPatch {
                task_type: Some(TaskType::Auto),
                status: Some(TaskStatus::InProgress),
                ..TaskPatch::default()
            },
        )
        .unwrap();
    let task = ctx.tasks.get_task(task.id.as_str()).unwrap().unwrap();

    ctx.automation.spawn_for_task(&task).await.unwrap();
    ctx.automation.wait_for_task(task.id.as_str()).await;

    let task = ctx.tasks.get_task(task.id.as_str()).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);

    let execution = ctx
        .executions
        .latest_for_task(task.id.as_str())
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, kagan_core::ExecutionStatus::Failed);
    assert_eq!(execution.exit_code, Some(9));
    assert_eq!(execution.error.as_deref(), Some("cannot-do"));
    ctx.close().await;
}
