// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace service: multi-repo worktree provisioning, diff surface,
//! rebase with conflict handoff, and archival.

use crate::error::ServiceError;
use chrono::Utc;
use kagan_core::{RepoId, Task, Workspace, WorkspaceId, WorkspaceRepo, WorkspaceStatus};
use kagan_adapters::{FileDiff, GitOps, RebaseResult, WorktreeGit};
use kagan_store::{RepoRepository, WorkspaceRepository};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One repository participating in a workspace.
#[derive(Debug, Clone)]
pub struct RepoSpec {
    pub repo_id: RepoId,
    pub repo_path: PathBuf,
    pub target_branch: String,
}

/// Per-repo diff for the workspace diff surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RepoDiff {
    pub repo_id: RepoId,
    pub worktree_path: String,
    pub target_branch: String,
    pub files: Vec<FileDiff>,
}

/// Outcome of a rebase-onto-base request.
#[derive(Debug, Clone)]
pub struct RebaseOutcome {
    pub success: bool,
    pub message: String,
    pub conflict_files: Vec<String>,
}

/// Turn a task title into a branch-name slug.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= 24 {
            break;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "task".to_string()
    } else {
        slug
    }
}

/// Branch name for a task workspace: `kagan/<short_id>-<slug>`.
pub fn branch_name_for(task: &Task) -> String {
    format!("kagan/{}-{}", task.short_id(), slugify(&task.title))
}

/// Workspace service owning the task↔workspace↔repo junction.
pub struct WorkspaceService {
    workspaces: WorkspaceRepository,
    repos: RepoRepository,
    worktree_git: Arc<dyn WorktreeGit>,
    git_ops: Arc<dyn GitOps>,
}

impl WorkspaceService {
    pub fn new(
        workspaces: WorkspaceRepository,
        repos: RepoRepository,
        worktree_git: Arc<dyn WorktreeGit>,
        git_ops: Arc<dyn GitOps>,
    ) -> Self {
        Self { workspaces, repos, worktree_git, git_ops }
    }

    /// Provision worktrees for a task across one or more repositories.
    ///
    /// Single-repo tasks get `<repo_root>/.kagan/worktrees/<task_id>`
    /// directly; multi-repo tasks get one subdirectory per repo under that
    /// workspace path. All repos share the same branch name.
    pub async fn provision(
        &self,
        task: &Task,
        specs: &[RepoSpec],
    ) -> Result<Workspace, ServiceError> {
        let Some(first) = specs.first() else {
            return Err(ServiceError::Invalid(
                "at least one repository is required to provision a workspace".to_string(),
            ));
        };
        if let Some(existing) = self.workspaces.get_for_task(task.id.as_str())? {
            return Ok(existing);
        }

        let branch = branch_name_for(task);
        let workspace_path = first
            .repo_path
            .join(".kagan")
            .join("worktrees")
            .join(task.id.as_str());

        let now = Utc::now();
        let workspace = Workspace {
            id: WorkspaceId::new(),
            project_id: task.project_id,
            task_id: Some(task.id),
            branch_name: branch.clone(),
            path: workspace_path.display().to_string(),
            status: WorkspaceStatus::Active,
            created_at: now,
            updated_at: now,
        };

        for spec in specs {
            let worktree_path = self.worktree_path_for(&workspace_path, spec, specs.len());
            self.worktree_git
                .create_worktree(&spec.repo_path, &worktree_path, &branch, &spec.target_branch)
                .await?;
        }

        self.workspaces.create(&workspace)?;
        for spec in specs {
            let worktree_path = self.worktree_path_for(&workspace_path, spec, specs.len());
            let row = WorkspaceRepository::new_repo_row(
                workspace.id,
                spec.repo_id,
                spec.target_branch.clone(),
                Some(worktree_path.display().to_string()),
                now,
            );
            self.workspaces.add_repo(&row)?;
        }

        Ok(workspace)
    }

    fn worktree_path_for(
        &self,
        workspace_path: &Path,
        spec: &RepoSpec,
        repo_count: usize,
    ) -> PathBuf {
        if repo_count == 1 {
            return workspace_path.to_path_buf();
        }
        let dir_name = spec
            .repo_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| spec.repo_id.as_str().to_string());
        workspace_path.join(dir_name)
    }

    pub fn get_for_task(&self, task_id: &str) -> Result<Option<Workspace>, ServiceError> {
        Ok(self.workspaces.get_for_task(task_id)?)
    }

    pub fn list_repos(&self, workspace_id: &str) -> Result<Vec<WorkspaceRepo>, ServiceError> {
        Ok(self.workspaces.list_repos(workspace_id)?)
    }

    /// Repo specs for a task's existing workspace.
    pub fn repo_specs(&self, workspace: &Workspace) -> Result<Vec<RepoSpec>, ServiceError> {
        let mut specs = Vec::new();
        for row in self.workspaces.list_repos(workspace.id.as_str())? {
            let repo = self.repos.get(row.repo_id.as_str())?.ok_or_else(|| {
                ServiceError::not_found("repo", row.repo_id.as_str())
            })?;
            specs.push(RepoSpec {
                repo_id: row.repo_id,
                repo_path: PathBuf::from(repo.path),
                target_branch: row.target_branch,
            });
        }
        Ok(specs)
    }

    /// Per-repo, per-file diffs for a task's workspace.
    pub async fn diff(&self, task_id: &str) -> Result<Vec<RepoDiff>, ServiceError> {
        let Some(workspace) = self.workspaces.get_for_task(task_id)? else {
            return Ok(Vec::new());
        };
        let mut diffs = Vec::new();
        for row in self.workspaces.list_repos(workspace.id.as_str())? {
            let Some(worktree) = row.worktree_path.clone() else {
                continue;
            };
            let base_ref = self
                .worktree_git
                .resolve_base_ref(Path::new(&worktree), &row.target_branch)
                .await?;
            let files = self
                .git_ops
                .get_file_diffs(Path::new(&worktree), &base_ref)
                .await?;
            diffs.push(RepoDiff {
                repo_id: row.repo_id,
                worktree_path: worktree,
                target_branch: row.target_branch,
                files,
            });
        }
        Ok(diffs)
    }

    /// True iff the diff against base is empty across all workspace repos.
    pub async fn has_no_changes(&self, task_id: &str) -> Result<bool, ServiceError> {
        let Some(workspace) = self.workspaces.get_for_task(task_id)? else {
            return Ok(true);
        };
        for row in self.workspaces.list_repos(workspace.id.as_str())? {
            let Some(worktree) = row.worktree_path else {
                continue;
            };
            let base_ref = self
                .worktree_git
                .resolve_base_ref(Path::new(&worktree), &row.target_branch)
                .await?;
            let stats = self
                .git_ops
                .get_diff_stats(Path::new(&worktree), &base_ref)
                .await?;
            if stats.files > 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Rebase every workspace repo onto its resolved base.
    ///
    /// On conflict: the rebase is aborted and the conflicting file list is
    /// returned so higher layers can build a remediation note.
    pub async fn rebase_onto_base(
        &self,
        task_id: &str,
        base_override: Option<&str>,
    ) -> Result<RebaseOutcome, ServiceError> {
        let Some(workspace) = self.workspaces.get_for_task(task_id)? else {
            return Err(ServiceError::not_found("workspace", task_id));
        };
        for row in self.workspaces.list_repos(workspace.id.as_str())? {
            let Some(worktree) = row.worktree_path else {
                continue;
            };
            let base = base_override.unwrap_or(&row.target_branch);
            let base_ref = self
                .worktree_git
                .resolve_base_ref(Path::new(&worktree), base)
                .await?;
            match self
                .worktree_git
                .rebase_onto(Path::new(&worktree), &base_ref)
                .await?
            {
                RebaseResult::Success => {}
                RebaseResult::Conflict { files } => {
                    return Ok(RebaseOutcome {
                        success: false,
                        message: format!("Rebase onto {base_ref} hit conflicts"),
                        conflict_files: files,
                    });
                }
            }
        }
        Ok(RebaseOutcome {
            success: true,
            message: "Rebased onto base".to_string(),
            conflict_files: Vec::new(),
        })
    }

    /// Archive a task's workspace, optionally removing worktrees and the
    /// task branch from disk.
    pub async fn archive(
        &self,
        task_id: &str,
        delete_worktrees: bool,
    ) -> Result<Option<Workspace>, ServiceError> {
        let Some(workspace) = self.workspaces.get_for_task(task_id)? else {
            return Ok(None);
        };

        if delete_worktrees {
            for row in self.workspaces.list_repos(workspace.id.as_str())? {
                let Some(worktree) = row.worktree_path else {
                    continue;
                };
                if let Err(error) =
                    self.worktree_git.delete_worktree(Path::new(&worktree)).await
                {
                    tracing::warn!(
                        worktree = %worktree,
                        error = %error,
                        "failed to remove worktree during archive"
                    );
                }
                if let Some(repo) = self.repos.get(row.repo_id.as_str())? {
                    let _ = self
                        .worktree_git
                        .delete_branch(Path::new(&repo.path), &workspace.branch_name, true)
                        .await;
                }
            }
        }

        self.workspaces
            .set_status(workspace.id.as_str(), WorkspaceStatus::Archived, Utc::now())?;
        Ok(self.workspaces.get(workspace.id.as_str())?)
    }
}

#[cfg(test)]
#[path = "workspaces_tests.rs"]
mod tests;
