#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use cp_config::ManagerConfig;
use cp_manager::{build_app, dispatch::run_dispatch_pool, ManagerState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cp-manager", version, about = "Control-plane executor dispatch loop")]
struct Args {
    /// Optional TOML config file; `CP_MANAGER_*` env vars override it.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ManagerConfig::load(args.config.as_deref())
        .context("loading cp-manager configuration")?;
    config.validate().context("validating cp-manager configuration")?;

    let filter = config
        .log_level
        .as_deref()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new("cp_manager=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let bind_addr = config.bind_addr.clone();
    let worker_concurrency = config.worker_concurrency;
    let state = Arc::new(ManagerState::new(config));

    tokio::fs::create_dir_all(&state.config.workspace_root)
        .await
        .context("creating workspace root")?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("bind {bind_addr}"))?;
    info!(bind = %bind_addr, workers = worker_concurrency, "cp-manager listening");

    let app = build_app(state.clone());
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => result.context("serve")?,
        () = run_dispatch_pool(state) => {}
    }

    Ok(())
}
