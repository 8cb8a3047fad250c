#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use cp_backend::{build_app, AppState};
use cp_config::BackendConfig;
use cp_stager::LocalDiskBlobStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cp-backend", version, about = "Control-plane HTTP store")]
struct Args {
    /// Optional TOML config file; `CP_BACKEND_*` env vars override it.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = BackendConfig::load(args.config.as_deref())
        .context("loading cp-backend configuration")?;
    config.validate().context("validating cp-backend configuration")?;

    let filter = config
        .log_level
        .as_deref()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new("cp_backend=info,cp_db=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let pool = cp_db::connect(&config.database_url)
        .await
        .context("connecting to control-plane database")?;
    cp_db::migrate(&pool).await.context("running database migrations")?;

    let blob_store = Arc::new(LocalDiskBlobStore::new(&config.blob_store_root));

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState {
        pool,
        blob_store,
        http: reqwest::Client::new(),
        config,
    });

    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("bind {bind_addr}"))?;
    info!(bind = %bind_addr, "cp-backend listening");

    axum::serve(listener, app).await.context("serve")
}
