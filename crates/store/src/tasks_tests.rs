// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::projects::ProjectRepository;
use kagan_core::Project;

fn setup() -> (SessionFactory, TaskRepository, ProjectId) {
    let factory = SessionFactory::open_in_memory().unwrap();
    let projects = ProjectRepository::new(factory.clone());
    let project = Project::create("Test Project", Utc::now());
    projects.create(&project).unwrap();
    (factory.clone(), TaskRepository::new(factory), project.id)
}

fn insert_task(repo: &TaskRepository, project_id: ProjectId, title: &str) -> Task {
    let task = Task::create(project_id, title, "", Utc::now());
    repo.create(&task).unwrap();
    task
}

fn insert_task_with_id(repo: &TaskRepository, project_id: ProjectId, id: &str) -> Task {
    let mut task = Task::create(project_id, format!("task {id}"), "", Utc::now());
    task.id = TaskId::from_string(id);
    repo.create(&task).unwrap();
    task
}

#[test]
fn create_and_get_round_trip() {
    let (_factory, repo, project_id) = setup();
    let task = insert_task(&repo, project_id, "build the thing");

    let loaded = repo.get(task.id.as_str()).unwrap().unwrap();
    assert_eq!(loaded.title, "build the thing");
    assert_eq!(loaded.status, TaskStatus::Backlog);
    assert_eq!(loaded.priority, TaskPriority::Medium);
    assert_eq!(loaded.project_id, project_id);
}

#[test]
fn get_missing_returns_none() {
    let (_factory, repo, _project_id) = setup();
    assert!(repo.get("00000000").unwrap().is_none());
}

#[test]
fn update_patches_only_given_fields() {
    let (_factory, repo, project_id) = setup();
    let task = insert_task(&repo, project_id, "original");

    let patch = TaskPatch {
        title: Some("renamed".to_string()),
        status: Some(TaskStatus::InProgress),
        ..TaskPatch::default()
    };
    let updated = repo.update(task.id.as_str(), &patch, Utc::now()).unwrap().unwrap();
    assert_eq!(updated.title, "renamed");
    assert_eq!(updated.status, TaskStatus::InProgress);
    assert_eq!(updated.description, "");
    assert!(updated.updated_at >= task.updated_at);
}

#[test]
fn empty_patch_returns_current_row() {
    let (_factory, repo, project_id) = setup();
    let task = insert_task(&repo, project_id, "untouched");
    let updated = repo
        .update(task.id.as_str(), &TaskPatch::default(), Utc::now())
        .unwrap()
        .unwrap();
    assert_eq!(updated.title, "untouched");
}

#[test]
fn patch_fields_changed_lists_touched_fields() {
    let patch = TaskPatch {
        description: Some("d".to_string()),
        status: Some(TaskStatus::Review),
        ..TaskPatch::default()
    };
    assert_eq!(patch.fields_changed(), vec!["description", "status"]);
    assert!(TaskPatch::default().is_empty());
}

#[test]
fn get_by_status_filters_by_project() {
    let (factory, repo, project_id) = setup();
    insert_task(&repo, project_id, "one");
    let projects = ProjectRepository::new(factory);
    let other = Project::create("Other", Utc::now());
    projects.create(&other).unwrap();
    insert_task(&repo, other.id, "two");

    let backlog = repo.get_by_status(TaskStatus::Backlog, Some(project_id.as_str())).unwrap();
    assert_eq!(backlog.len(), 1);
    assert_eq!(backlog[0].title, "one");

    let all_backlog = repo.get_by_status(TaskStatus::Backlog, None).unwrap();
    assert_eq!(all_backlog.len(), 2);
}

#[test]
fn replace_task_links_is_delete_then_insert() {
    let (_factory, repo, project_id) = setup();
    let task = insert_task_with_id(&repo, project_id, "aaaa0000");
    insert_task_with_id(&repo, project_id, "bbbb1111");
    insert_task_with_id(&repo, project_id, "cccc2222");

    repo.replace_task_links(
        task.id.as_str(),
        &["cccc2222".to_string(), "bbbb1111".to_string()],
        Utc::now(),
    )
    .unwrap();
    assert_eq!(
        repo.get_task_links(task.id.as_str()).unwrap(),
        vec!["bbbb1111", "cccc2222"]
    );

    repo.replace_task_links(task.id.as_str(), &["bbbb1111".to_string()], Utc::now())
        .unwrap();
    assert_eq!(repo.get_task_links(task.id.as_str()).unwrap(), vec!["bbbb1111"]);
}

#[test]
fn replace_task_links_skips_self_reference() {
    let (_factory, repo, project_id) = setup();
    let task = insert_task_with_id(&repo, project_id, "aaaa0000");
    insert_task_with_id(&repo, project_id, "bbbb1111");

    repo.replace_task_links(
        task.id.as_str(),
        &["aaaa0000".to_string(), "bbbb1111".to_string()],
        Utc::now(),
    )
    .unwrap();
    assert_eq!(repo.get_task_links(task.id.as_str()).unwrap(), vec!["bbbb1111"]);
}

#[test]
fn delete_removes_task_and_links() {
    let (_factory, repo, project_id) = setup();
    let task = insert_task_with_id(&repo, project_id, "aaaa0000");
    let other = insert_task_with_id(&repo, project_id, "bbbb1111");
    repo.replace_task_links(task.id.as_str(), &["bbbb1111".to_string()], Utc::now())
        .unwrap();
    repo.replace_task_links(other.id.as_str(), &["aaaa0000".to_string()], Utc::now())
        .unwrap();

    assert!(repo.delete(task.id.as_str()).unwrap());
    assert!(repo.get(task.id.as_str()).unwrap().is_none());
    // Incoming links to the deleted task are gone too.
    assert!(repo.get_task_links(other.id.as_str()).unwrap().is_empty());
    assert!(!repo.delete(task.id.as_str()).unwrap());
}

#[test]
fn search_matches_title_and_description() {
    let (_factory, repo, project_id) = setup();
    insert_task(&repo, project_id, "fix the parser");
    let mut task = Task::create(project_id, "unrelated", "parser crash notes", Utc::now());
    task.id = TaskId::from_string("dddd3333");
    repo.create(&task).unwrap();
    insert_task(&repo, project_id, "other work");

    let hits = repo.search("parser").unwrap();
    assert_eq!(hits.len(), 2);
}

#[test]
fn counts_group_by_status() {
    let (_factory, repo, project_id) = setup();
    insert_task(&repo, project_id, "a");
    let task = insert_task(&repo, project_id, "b");
    let patch = TaskPatch { status: Some(TaskStatus::Done), ..TaskPatch::default() };
    repo.update(task.id.as_str(), &patch, Utc::now()).unwrap();

    let counts = repo.counts().unwrap();
    assert_eq!(counts.get(&TaskStatus::Backlog), Some(&1));
    assert_eq!(counts.get(&TaskStatus::Done), Some(&1));
}

#[test]
fn get_by_ids_scopes_to_project() {
    let (factory, repo, project_id) = setup();
    insert_task_with_id(&repo, project_id, "aaaa0000");
    let projects = ProjectRepository::new(factory);
    let other = Project::create("Other", Utc::now());
    projects.create(&other).unwrap();
    insert_task_with_id(&repo, other.id, "bbbb1111");

    let found = repo
        .get_by_ids(
            &["aaaa0000".to_string(), "bbbb1111".to_string()],
            project_id.as_str(),
        )
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "aaaa0000");
}
