// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::bootstrap::create_app_context_in_memory;
use kagan_core::KaganConfig;
use kagan_wire::{read_response, write_request, CoreRequest};
use serde_json::json;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(2);

async fn roundtrip(socket: &Path, request: &CoreRequest) -> kagan_wire::CoreResponse {
    let stream = tokio::net::UnixStream::connect(socket).await.unwrap();
    let (mut reader, mut writer) = stream.into_split();
    write_request(&mut writer, request, TIMEOUT).await.unwrap();
    read_response(&mut reader, TIMEOUT).await.unwrap()
}

#[tokio::test]
async fn listener_serves_register_and_ping() {
    let mut config = KaganConfig::default();
    config.general.core_idle_timeout_seconds = 0; // never idle-exit in tests
    let ctx = create_app_context_in_memory(config).unwrap();
    let host = Arc::new(CoreHost::new(ctx));

    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("kagan.sock");
    let listener = Listener::bind(&socket, Arc::clone(&host)).unwrap();
    assert_eq!(listener.socket_path(), socket.as_path());

    let shutdown = CancellationToken::new();
    let run = tokio::spawn(listener.run(shutdown.clone()));

    let response = roundtrip(
        &socket,
        &CoreRequest::new("sess-1", "core", "register_session", json!({"profile": "operator"})),
    )
    .await;
    assert!(response.ok);

    let response = roundtrip(&socket, &CoreRequest::new("sess-1", "core", "ping", json!({}))).await;
    assert!(response.ok);
    assert_eq!(response.result.unwrap()["pong"], true);

    shutdown.cancel();
    run.await.unwrap();
    assert!(!socket.exists());
}

#[tokio::test]
async fn bind_replaces_stale_socket_file() {
    let ctx = create_app_context_in_memory(KaganConfig::default()).unwrap();
    let host = Arc::new(CoreHost::new(ctx));

    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("kagan.sock");
    std::fs::write(&socket, b"stale").unwrap();
    let listener = Listener::bind(&socket, host).unwrap();
    drop(listener);
}

#[tokio::test]
async fn idle_timeout_exits_with_no_sessions() {
    let mut config = KaganConfig::default();
    config.general.core_idle_timeout_seconds = 1;
    let ctx = create_app_context_in_memory(config).unwrap();
    let host = Arc::new(CoreHost::new(ctx));

    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("kagan.sock");
    let listener = Listener::bind(&socket, host).unwrap();

    let shutdown = CancellationToken::new();
    let run = tokio::spawn(listener.run(shutdown));

    // With no sessions registering, the listener exits on its own.
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();
}
