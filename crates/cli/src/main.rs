// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kagan` binary: starts the headless orchestration core.

use anyhow::Context;
use clap::{Parser, Subcommand};
use kagan_adapters::InstanceLock;
use kagan_core::KaganConfig;
use kagan_host::{create_app_context, CoreHost, Listener};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kagan", about = "Kagan orchestration core", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the headless core and listen on the IPC socket.
    Start {
        /// Repository the core instance is bound to (instance lock key).
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Path to config.toml (defaults apply when missing).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Path to the SQLite database.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Path to the Unix socket.
        #[arg(long)]
        socket: Option<PathBuf>,
    },
}

fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("KAGAN_STATE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("kagan")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Start { repo, config, db, socket } => start(repo, config, db, socket).await,
    }
}

async fn start(
    repo: PathBuf,
    config_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
    socket_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let state = state_dir();
    std::fs::create_dir_all(&state)
        .with_context(|| format!("failed to create state dir {}", state.display()))?;

    let config_path = config_path.unwrap_or_else(|| state.join("config.toml"));
    let db_path = db_path.unwrap_or_else(|| state.join("kagan.db"));
    let socket_path = socket_path.unwrap_or_else(|| state.join("kagan.sock"));

    // One core per repository; a second instance is rejected up front.
    let _lock = InstanceLock::acquire(&repo)
        .with_context(|| format!("another instance owns {}", repo.display()))?;

    let config =
        KaganConfig::load(&config_path).with_context(|| "failed to load configuration")?;
    let ctx = create_app_context(config, &db_path).with_context(|| "failed to open store")?;

    let host = Arc::new(CoreHost::new(Arc::clone(&ctx)));
    let listener = Listener::bind(&socket_path, Arc::clone(&host))
        .with_context(|| format!("failed to bind {}", socket_path.display()))?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            signal_token.cancel();
        }
    });

    listener.run(shutdown).await;
    ctx.close().await;
    Ok(())
}
