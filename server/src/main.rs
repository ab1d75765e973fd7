//! sowpilot-server: HTTP job control surface for the analysis pipeline.

mod error;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use sowpilot::{load_config, Database, LogBroadcaster, Orchestrator};

use crate::error::ServerError;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "sowpilot-server", version, about = "Run the sowpilot job control API")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, env = "SOWPILOT_CONFIG", default_value = "sowpilot.json")]
    config: PathBuf,

    /// Listen address, overriding `server.bind`.
    #[arg(long, env = "SOWPILOT_BIND")]
    bind: Option<String>,
}

fn init_logging() -> Result<(), ServerError> {
    tracing_log::LogTracer::init().map_err(|e| ServerError::Logging(e.to_string()))?;

    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ServerError::Logging(e.to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    init_logging()?;
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    let db_path = config.database_path();
    let db = Database::open(&db_path)?;
    info!("Database ready at {}", db_path.display());

    let log_feed = LogBroadcaster::default();
    let (orchestrator, dispatcher) = Orchestrator::from_config(&config, db, Some(log_feed.clone()))?;
    let _dispatcher = dispatcher.spawn();

    let state = AppState::new(Arc::new(orchestrator), log_feed);
    let bind = cli.bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = TcpListener::bind(&bind).await?;
    info!("Listening on {}", bind);

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
