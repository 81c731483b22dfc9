// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix-socket listener for the core's IPC channel.
//!
//! Each connection carries one length-prefixed request/response exchange;
//! connections are handled on spawned tasks so the accept loop never
//! blocks. When the idle timeout is configured, the listener exits once
//! the host has had no sessions and no activity for that long.

use crate::host::CoreHost;
use kagan_wire::{read_request, write_response, ProtocolError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-exchange IO timeout.
const IPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between idle-timeout checks.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Socket listener bound to one core host.
pub struct Listener {
    unix: UnixListener,
    socket_path: PathBuf,
    host: Arc<CoreHost>,
}

impl Listener {
    /// Bind the Unix socket, replacing a stale socket file if present.
    pub fn bind(socket_path: &Path, host: Arc<CoreHost>) -> std::io::Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let unix = UnixListener::bind(socket_path)?;
        Ok(Self {
            unix,
            socket_path: socket_path.to_path_buf(),
            host,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Run the accept loop until `shutdown` fires or the idle timeout
    /// expires.
    pub async fn run(self, shutdown: CancellationToken) {
        let idle_timeout = self.host.context().config.general.core_idle_timeout_seconds;
        let idle_limit = (idle_timeout > 0).then(|| Duration::from_secs(idle_timeout));
        let mut idle_tick = tokio::time::interval(IDLE_POLL_INTERVAL);

        info!(socket = %self.socket_path.display(), "listening");
        loop {
            tokio::select! {
                accepted = self.unix.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let host = Arc::clone(&self.host);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, &host).await {
                                    log_connection_error(e);
                                }
                            });
                        }
                        Err(e) => error!("accept error: {}", e),
                    }
                }
                _ = idle_tick.tick() => {
                    if let Some(limit) = idle_limit {
                        if self.host.active_session_count() == 0
                            && self.host.idle_duration() >= limit
                        {
                            info!("no sessions for {}s, exiting", limit.as_secs());
                            break;
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    debug!("listener shutdown requested");
                    break;
                }
            }
        }
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

fn log_connection_error(error: ProtocolError) {
    match error {
        ProtocolError::ConnectionClosed => debug!("client disconnected"),
        ProtocolError::Timeout => warn!("connection timeout"),
        other => error!("connection error: {}", other),
    }
}

async fn handle_connection(
    stream: tokio::net::UnixStream,
    host: &Arc<CoreHost>,
) -> Result<(), ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();
    let request = read_request(&mut reader, IPC_TIMEOUT).await?;
    debug!(
        capability = %request.capability,
        method = %request.method,
        "received request"
    );
    let response = host.handle_request(request).await;
    write_response(&mut writer, &response, IPC_TIMEOUT).await
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
