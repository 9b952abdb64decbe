use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use whiskr::config::Config;
use whiskr::geocode::build_geocoder;
use whiskr::AppState;

#[derive(Parser, Debug)]
#[command(name = "whiskr")]
#[command(author, version, about = "A small cat registry backend", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "whiskr.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting whiskr v{}", env!("CARGO_PKG_VERSION"));

    // Error responses carry the internal chain only outside production
    whiskr::api::error::set_expose_stack(!config.server.is_production());

    // Ensure data and uploads directories exist
    std::fs::create_dir_all(&config.server.data_dir)
        .with_context(|| format!("Failed to create {}", config.server.data_dir.display()))?;
    std::fs::create_dir_all(&config.storage.uploads_dir)
        .with_context(|| format!("Failed to create {}", config.storage.uploads_dir.display()))?;

    // Initialize database
    let db = whiskr::db::init(&config.server.data_dir).await?;

    // Ensure the bootstrapped admin account exists
    whiskr::api::auth::ensure_admin_user(
        &db,
        &config.auth.admin_email,
        &config.auth.admin_password,
    )
    .await?;

    // Geocoding collaborator
    let geocoder = build_geocoder(&config.geocoding);

    // Create app state and router
    let state = Arc::new(AppState::new(config.clone(), db, geocoder));
    let app = whiskr::api::create_router(state);

    // Start API server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
