// =============================================================================
// Taskhive Planning Backend - Main Entry Point
// =============================================================================
//
// Description:
//   Binary entry point. Loads configuration (TOML merged with
//   TASKHIVE_* environment variables), initializes tracing, builds the
//   service container over the selected storage backend, and serves
//   the HTTP/WebSocket API until shutdown.
//
// =============================================================================

use std::sync::Arc;

use clap::Parser;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

use taskhive::config::{Config, DatabaseBackend};
use taskhive::database::{self, MemoryDatabase, PgDatabase};
use taskhive::{api, Services};

#[derive(Parser, Debug)]
#[command(name = "taskhive", about = "Task planning backend", version)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut figment = Figment::new();
    if let Some(path) = &args.config {
        figment = figment.merge(Toml::file(path));
    }
    let config: Config = figment
        .merge(Env::prefixed("TASKHIVE_").split("__"))
        .extract()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🐝 taskhive starting");

    match config.database.backend {
        DatabaseBackend::Memory => {
            warn!("using the volatile in-memory store; data is lost on restart");
            run(&config, Arc::new(MemoryDatabase::new())).await
        }
        DatabaseBackend::Postgres => {
            let db = PgDatabase::connect(&config.database).await?;
            run(&config, Arc::new(db)).await
        }
    }
}

async fn run<D>(config: &Config, db: Arc<D>) -> Result<(), Box<dyn std::error::Error>>
where
    D: database::Data + 'static,
{
    let services = Arc::new(Services::build(db));
    let app = api::create_router(services);

    let addr = format!("{}:{}", config.server.address, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("taskhive stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
        return;
    }
    info!("shutdown signal received");
}
