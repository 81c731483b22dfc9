// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{FakeGitOps, FakeWorktreeGit};
use kagan_adapters::DiffStats;
use kagan_core::{Project, Task, TaskId};
use kagan_store::{ProjectRepository, SessionFactory, TaskRepository};
use yare::parameterized;

struct Fixture {
    service: WorkspaceService,
    worktree_git: Arc<FakeWorktreeGit>,
    git_ops: Arc<FakeGitOps>,
    task: Task,
    repo: kagan_core::Repo,
}

fn setup() -> Fixture {
    let factory = SessionFactory::open_in_memory().unwrap();
    let now = Utc::now();
    let project = Project::create("P", now);
    ProjectRepository::new(factory.clone()).create(&project).unwrap();
    let mut task = Task::create(project.id, "Build the Parser!", "", now);
    task.id = TaskId::from_string("aaaa0000");
    TaskRepository::new(factory.clone()).create(&task).unwrap();

    let repos = RepoRepository::new(factory.clone());
    let repo = kagan_core::Repo::create("repo", "/srv/repo", "main", now);
    repos.create(&repo).unwrap();

    let worktree_git = Arc::new(FakeWorktreeGit::default());
    let git_ops = Arc::new(FakeGitOps::default());
    let service = WorkspaceService::new(
        WorkspaceRepository::new(factory),
        repos,
        Arc::clone(&worktree_git) as Arc<dyn WorktreeGit>,
        Arc::clone(&git_ops) as Arc<dyn GitOps>,
    );
    Fixture { service, worktree_git, git_ops, task, repo }
}

fn single_spec(fx: &Fixture) -> Vec<RepoSpec> {
    vec![RepoSpec {
        repo_id: fx.repo.id,
        repo_path: PathBuf::from(&fx.repo.path),
        target_branch: "main".to_string(),
    }]
}

#[parameterized(
    simple = { "Fix login", "fix-login" },
    punctuation = { "Build the Parser!", "build-the-parser" },
    unicode_and_spaces = { "héllo   world", "h-llo-world" },
    empty = { "!!!", "task" },
)]
fn slugify_cases(title: &str, expected: &str) {
    assert_eq!(slugify(title), expected);
}

#[test]
fn branch_name_combines_short_id_and_slug() {
    let fx = setup();
    assert_eq!(branch_name_for(&fx.task), "kagan/aaaa0000-build-the-parser");
}

#[tokio::test]
async fn provision_single_repo_creates_one_workspace_one_junction() {
    let fx = setup();
    let workspace = fx.service.provision(&fx.task, &single_spec(&fx)).await.unwrap();

    assert_eq!(workspace.branch_name, "kagan/aaaa0000-build-the-parser");
    assert_eq!(workspace.path, "/srv/repo/.kagan/worktrees/aaaa0000");
    assert_eq!(workspace.status, WorkspaceStatus::Active);

    let repos = fx.service.list_repos(workspace.id.as_str()).unwrap();
    assert_eq!(repos.len(), 1);
    assert_eq!(repos[0].worktree_path.as_deref(), Some("/srv/repo/.kagan/worktrees/aaaa0000"));

    let calls = fx.worktree_git.recorded();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].starts_with("create_worktree /srv/repo"));
}

#[tokio::test]
async fn provision_is_idempotent_per_task() {
    let fx = setup();
    let first = fx.service.provision(&fx.task, &single_spec(&fx)).await.unwrap();
    let second = fx.service.provision(&fx.task, &single_spec(&fx)).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(fx.worktree_git.recorded().len(), 1);
}

#[tokio::test]
async fn provision_multi_repo_uses_per_repo_subdirectories() {
    let fx = setup();
    let mut specs = single_spec(&fx);
    specs.push(RepoSpec {
        repo_id: kagan_core::RepoId::new(),
        repo_path: PathBuf::from("/srv/other"),
        target_branch: "develop".to_string(),
    });

    let workspace = fx.service.provision(&fx.task, &specs).await.unwrap();
    let repos = fx.service.list_repos(workspace.id.as_str()).unwrap();
    assert_eq!(repos.len(), 2);
    let paths: Vec<&str> = repos
        .iter()
        .filter_map(|row| row.worktree_path.as_deref())
        .collect();
    assert!(paths.contains(&"/srv/repo/.kagan/worktrees/aaaa0000/repo"));
    assert!(paths.contains(&"/srv/repo/.kagan/worktrees/aaaa0000/other"));
}

#[tokio::test]
async fn provision_with_no_repos_is_invalid() {
    let fx = setup();
    let result = fx.service.provision(&fx.task, &[]).await;
    assert!(matches!(result, Err(ServiceError::Invalid(_))));
}

#[tokio::test]
async fn worktree_failure_surfaces_to_caller() {
    let fx = setup();
    *fx.worktree_git.fail_worktree_create.lock() = true;
    let result = fx.service.provision(&fx.task, &single_spec(&fx)).await;
    assert!(matches!(result, Err(ServiceError::Git(_))));
    // Nothing was persisted for the failed provisioning.
    assert!(fx.service.get_for_task(fx.task.id.as_str()).unwrap().is_none());
}

#[tokio::test]
async fn has_no_changes_consults_every_repo() {
    let fx = setup();
    fx.service.provision(&fx.task, &single_spec(&fx)).await.unwrap();
    assert!(fx.service.has_no_changes(fx.task.id.as_str()).await.unwrap());

    fx.git_ops.set_diff_stats(
        "/srv/repo/.kagan/worktrees/aaaa0000",
        DiffStats { files: 2, insertions: 10, deletions: 1 },
    );
    assert!(!fx.service.has_no_changes(fx.task.id.as_str()).await.unwrap());
}

#[tokio::test]
async fn rebase_conflict_aborts_and_reports_files() {
    let fx = setup();
    fx.service.provision(&fx.task, &single_spec(&fx)).await.unwrap();
    *fx.worktree_git.rebase_conflict.lock() =
        Some(vec!["src/lib.rs".to_string(), "src/main.rs".to_string()]);

    let outcome = fx.service.rebase_onto_base(fx.task.id.as_str(), None).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.conflict_files, vec!["src/lib.rs", "src/main.rs"]);
}

#[tokio::test]
async fn rebase_success_reports_no_conflicts() {
    let fx = setup();
    fx.service.provision(&fx.task, &single_spec(&fx)).await.unwrap();
    let outcome = fx.service.rebase_onto_base(fx.task.id.as_str(), None).await.unwrap();
    assert!(outcome.success);
    assert!(outcome.conflict_files.is_empty());
}

#[tokio::test]
async fn archive_deletes_worktrees_and_branch() {
    let fx = setup();
    let workspace = fx.service.provision(&fx.task, &single_spec(&fx)).await.unwrap();

    let archived = fx.service.archive(fx.task.id.as_str(), true).await.unwrap().unwrap();
    assert_eq!(archived.status, WorkspaceStatus::Archived);

    let calls = fx.worktree_git.recorded();
    assert!(calls
        .iter()
        .any(|call| call == "delete_worktree /srv/repo/.kagan/worktrees/aaaa0000"));
    assert!(calls
        .iter()
        .any(|call| call == &format!("delete_branch /srv/repo {}", workspace.branch_name)));

    // Archived workspaces no longer resolve for the task.
    assert!(fx.service.get_for_task(fx.task.id.as_str()).unwrap().is_none());
}
