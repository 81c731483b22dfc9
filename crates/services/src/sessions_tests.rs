// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kagan_core::fallback_agent_config;
use std::collections::BTreeMap;
use yare::parameterized;

fn agent(short_name: &str, base: &str) -> AgentConfig {
    AgentConfig {
        identity: format!("{short_name}.example"),
        name: short_name.to_string(),
        short_name: short_name.to_string(),
        run_command: BTreeMap::new(),
        interactive_command: BTreeMap::from([("*".to_string(), base.to_string())]),
        active: true,
        model_env_var: String::new(),
    }
}

#[parameterized(
    plain = { "hello", "hello" },
    with_space = { "two words", "'two words'" },
    with_quote = { "it's", r"'it'\''s'" },
    empty = { "", "''" },
    path_like = { "/tmp/a.md", "/tmp/a.md" },
)]
fn shell_quote_cases(input: &str, expected: &str) {
    assert_eq!(shell_quote(input), expected);
}

#[test]
fn claude_takes_positional_prompt() {
    let cmd = build_launch_command(&agent("claude", "claude"), "do work", None, None).unwrap();
    assert_eq!(cmd, "claude 'do work'");
}

#[test]
fn claude_with_model_flag() {
    let cmd = build_launch_command(&agent("claude", "claude"), "p", Some("opus"), None).unwrap();
    assert_eq!(cmd, "claude --model opus p");
}

#[test]
fn opencode_uses_prompt_flag() {
    let cmd =
        build_launch_command(&agent("opencode", "opencode"), "do work", Some("sonnet"), None)
            .unwrap();
    assert_eq!(cmd, "opencode --model sonnet --prompt 'do work'");
}

#[parameterized(
    codex = { "codex" },
    gemini = { "gemini" },
)]
fn codex_and_gemini_take_positional_prompt(name: &str) {
    let cmd = build_launch_command(&agent(name, name), "fix it", None, None).unwrap();
    assert_eq!(cmd, format!("{name} 'fix it'"));
}

#[test]
fn kimi_gets_prompt_and_mcp_config_flags() {
    let cmd = build_launch_command(
        &agent("kimi", "kimi"),
        "go",
        None,
        Some(Path::new("/ws/.mcp.json")),
    )
    .unwrap();
    assert_eq!(cmd, "kimi --prompt go --mcp-config-file /ws/.mcp.json");
}

#[test]
fn copilot_launches_bare() {
    let cmd = build_launch_command(&agent("copilot", "copilot"), "ignored", None, None).unwrap();
    assert_eq!(cmd, "copilot");
}

#[test]
fn missing_interactive_command_yields_none() {
    let mut config = agent("claude", "claude");
    config.interactive_command.clear();
    assert!(build_launch_command(&config, "p", None, None).is_none());
}

#[test]
fn startup_prompt_mentions_task_and_rules() {
    let task = Task::builder()
        .title("Fix the login flow")
        .description("Users get logged out randomly.")
        .build();
    let prompt = build_startup_prompt(&task);
    assert!(prompt.contains(task.id.as_str()));
    assert!(prompt.contains("Fix the login flow"));
    assert!(prompt.contains("Users get logged out randomly."));
    assert!(prompt.contains("git worktree"));
    assert!(prompt.contains("kagan_request_review"));
}

#[test]
fn startup_prompt_defaults_empty_description() {
    let task = Task::builder().build();
    assert!(build_startup_prompt(&task).contains("No description provided."));
}

#[test]
fn fallback_agent_builds_claude_command() {
    let cmd =
        build_launch_command(&fallback_agent_config(), "hello there", None, None).unwrap();
    assert_eq!(cmd, "claude 'hello there'");
}

#[test]
fn gitignore_augmentation_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    ensure_worktree_gitignored(dir.path(), ".mcp.json").unwrap();
    let first = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert!(first.contains(".mcp.json"));
    assert!(first.contains(".kagan/"));

    ensure_worktree_gitignored(dir.path(), ".mcp.json").unwrap();
    let second = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn gitignore_augmentation_preserves_existing_content() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".gitignore"), "target/\n").unwrap();
    ensure_worktree_gitignored(dir.path(), "opencode.json").unwrap();
    let content = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert!(content.starts_with("target/\n"));
    assert!(content.contains("opencode.json"));
}

#[test]
fn session_bundle_serializes_expected_fields() {
    let bundle = SessionBundle {
        task_id: "aaaa0000".to_string(),
        session_name: "kagan-aaaa0000".to_string(),
        backend: "vscode".to_string(),
        worktree: "/ws".to_string(),
        prompt_file: "/ws/.kagan/start_prompt.md".to_string(),
    };
    let value = serde_json::to_value(&bundle).unwrap();
    assert_eq!(value["task_id"], "aaaa0000");
    assert_eq!(value["backend"], "vscode");
    assert_eq!(value["prompt_file"], "/ws/.kagan/start_prompt.md");
}
