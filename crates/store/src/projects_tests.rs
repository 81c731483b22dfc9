// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kagan_core::Task;

fn setup() -> (SessionFactory, ProjectRepository, RepoRepository) {
    let factory = SessionFactory::open_in_memory().unwrap();
    (
        factory.clone(),
        ProjectRepository::new(factory.clone()),
        RepoRepository::new(factory),
    )
}

#[test]
fn project_round_trip() {
    let (_factory, projects, _repos) = setup();
    let project = Project::create("Kagan", Utc::now());
    projects.create(&project).unwrap();

    let loaded = projects.get(project.id.as_str()).unwrap().unwrap();
    assert_eq!(loaded.name, "Kagan");
    assert!(loaded.last_opened_at.is_none());

    projects.touch_last_opened(project.id.as_str(), Utc::now()).unwrap();
    let loaded = projects.get(project.id.as_str()).unwrap().unwrap();
    assert!(loaded.last_opened_at.is_some());
}

#[test]
fn repo_path_is_unique() {
    let (_factory, _projects, repos) = setup();
    let now = Utc::now();
    repos.create(&Repo::create("a", "/tmp/x", "main", now)).unwrap();
    assert!(repos.create(&Repo::create("b", "/tmp/x", "main", now)).is_err());
}

#[test]
fn get_or_create_reuses_existing_path() {
    let (_factory, _projects, repos) = setup();
    let now = Utc::now();
    let first = repos.get_or_create("repo", "/tmp/x", "main", now).unwrap();
    let second = repos.get_or_create("other-name", "/tmp/x", "main", now).unwrap();
    assert_eq!(first.id, second.id);
}

#[test]
fn project_repo_junction_is_unique_and_ordered() {
    let (_factory, projects, repos) = setup();
    let now = Utc::now();
    let project = Project::create("P", now);
    projects.create(&project).unwrap();
    let alpha = repos.get_or_create("alpha", "/tmp/a", "main", now).unwrap();
    let beta = repos.get_or_create("beta", "/tmp/b", "main", now).unwrap();

    repos
        .add_to_project(project.id.as_str(), beta.id.as_str(), false, 1, now)
        .unwrap();
    repos
        .add_to_project(project.id.as_str(), alpha.id.as_str(), true, 0, now)
        .unwrap();
    // Duplicate insert is ignored.
    repos
        .add_to_project(project.id.as_str(), alpha.id.as_str(), true, 0, now)
        .unwrap();

    let listed = repos.list_for_project(project.id.as_str()).unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].name, "alpha");

    assert!(repos.remove_from_project(project.id.as_str(), beta.id.as_str()).unwrap());
    assert_eq!(repos.list_for_project(project.id.as_str()).unwrap().len(), 1);
}

#[test]
fn merge_scripts_preserves_foreign_keys_and_merges() {
    let (_factory, _projects, repos) = setup();
    let now = Utc::now();
    let repo = repos.get_or_create("repo", "/tmp/x", "main", now).unwrap();

    let mut entries = BTreeMap::new();
    entries.insert("github.connection".to_string(), "{\"owner\":\"acme\"}".to_string());
    let updated = repos.merge_scripts(repo.id.as_str(), &entries, now).unwrap().unwrap();
    assert_eq!(updated.scripts.len(), 1);

    let mut more = BTreeMap::new();
    more.insert("ci.hook".to_string(), "lint".to_string());
    let updated = repos.merge_scripts(repo.id.as_str(), &more, now).unwrap().unwrap();
    assert_eq!(updated.scripts.len(), 2);
    assert_eq!(updated.scripts["github.connection"], "{\"owner\":\"acme\"}");
}

#[test]
fn app_state_round_trip() {
    let (factory, projects, _repos) = setup();
    let now = Utc::now();
    let project = Project::create("P", now);
    projects.create(&project).unwrap();
    let task = Task::create(project.id, "t", "", now);
    crate::tasks::TaskRepository::new(factory).create(&task).unwrap();

    assert_eq!(projects.load_app_state().unwrap(), (None, None));
    projects
        .save_app_state(Some(project.id.as_str()), None, now)
        .unwrap();
    let (active_project, active_repo) = projects.load_app_state().unwrap();
    assert_eq!(active_project.as_deref(), Some(project.id.as_str()));
    assert!(active_repo.is_none());
}
