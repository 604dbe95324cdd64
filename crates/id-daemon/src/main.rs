// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use id_core::DispatcherConfig;
use id_daemon::{build_app, AppState};
use id_forge::GithubForgeClient;
use id_state::{FollowupStateStore, ProcessedStateStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "issue-dispatcherd", version, about = "Webhook-driven issue/PR-feedback router")]
struct Args {
    /// Host to bind the HTTP receiver to.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind the HTTP receiver to.
    #[arg(long)]
    port: Option<u16>,

    /// Path to the declarative routing rule-set file.
    #[arg(long)]
    routing_file: Option<PathBuf>,

    /// Directory holding the two persistent JSON stores.
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Enable verbose request/response debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = DispatcherConfig::from_env();
    if let Some(host) = args.host {
        config.bind_host = host;
    }
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(routing_file) = args.routing_file {
        config.routing_file = routing_file;
    }
    if let Some(state_dir) = args.state_dir {
        config.state_dir = state_dir;
    }

    tokio::fs::create_dir_all(&config.state_dir)
        .await
        .with_context(|| format!("create state dir {}", config.state_dir.display()))?;
    if let Some(parent) = config.log_file.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }

    let filter = if args.debug {
        EnvFilter::new("id_daemon=debug,id_followup=debug,id_dispatch=debug,id_forge=debug,info")
    } else {
        EnvFilter::new("info")
    };
    let file_appender = tracing_appender::rolling::never(
        config.log_file.parent().unwrap_or(&config.log_dir),
        config
            .log_file
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("issue-dispatcher.log")),
    );
    let (non_blocking, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr.and(non_blocking)))
        .init();

    let processed = ProcessedStateStore::load(config.state_dir.join("processed_deliveries.json"));
    let followups = FollowupStateStore::load(config.state_dir.join("review_followups.json"));
    let forge = Arc::new(GithubForgeClient::new(
        config.forge_api_base.clone(),
        config.forge_token.clone(),
    ));

    let bind = format!("{}:{}", config.bind_host, config.bind_port);
    let state = Arc::new(AppState {
        config,
        processed,
        followups,
        forge,
    });

    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(bind = %bind, "issue-dispatcherd listening");

    axum::serve(listener, app).await.context("serve")
}
