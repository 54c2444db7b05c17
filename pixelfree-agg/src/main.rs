//! pixelfree-agg - Federated photo aggregation service
//!
//! Serves recent photo posts from a Pixelfed/Mastodon-compatible instance,
//! selected by hashtag and/or account, to the PixelFree viewer.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pixelfree_agg::config::{CliOverrides, ServiceConfig};
use pixelfree_agg::services::PixelfedClient;
use pixelfree_agg::AppState;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for pixelfree-agg
#[derive(Parser, Debug)]
#[command(name = "pixelfree-agg")]
#[command(about = "Federated photo aggregation service for PixelFree")]
#[command(version)]
struct Args {
    /// Path to pixelfree.toml
    #[arg(short, long, env = "PIXELFREE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PIXELFREE_PORT")]
    port: Option<u16>,

    /// Pixelfed/Mastodon instance base URL
    #[arg(long, env = "PIXELFED_INSTANCE")]
    instance_url: Option<String>,

    /// OAuth token set written by the login flow
    #[arg(long, env = "PIXELFREE_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Fixed bearer token (skips the token file)
    #[arg(long, env = "PIXELFREE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// OAuth client id for token refresh
    #[arg(long, env = "PIXELFED_CLIENT_ID")]
    client_id: Option<String>,

    /// OAuth client secret for token refresh
    #[arg(long, env = "PIXELFED_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "PIXELFREE_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing starts so the TOML log level can apply;
    // a missing file is reported once the subscriber is up
    let config_path = pixelfree_common::config::config_path(args.config.as_deref());
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let toml_config = match (&config_path, config_exists) {
        (Some(path), true) => pixelfree_common::config::load_toml_config(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        _ => Default::default(),
    };

    let config = ServiceConfig::resolve(
        CliOverrides {
            instance_url: args.instance_url,
            port: args.port,
            token_file: args.token_file,
            access_token: args.access_token,
            client_id: args.client_id,
            client_secret: args.client_secret,
            log_level: args.log_level,
        },
        &toml_config,
    );

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "pixelfree_agg={},pixelfree_common={},tower_http={}",
                    config.log_level, config.log_level, config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pixelfree-agg v{}", env!("CARGO_PKG_VERSION"));
    match (&config_path, config_exists) {
        (Some(path), true) => info!("Config file: {}", path.display()),
        (Some(path), false) => info!("No config file at {}; using defaults", path.display()),
        (None, _) => info!("No config directory available; using defaults"),
    }
    info!("Instance: {}", config.instance_url);

    let client = PixelfedClient::new(
        config.instance_url.clone(),
        config.timeout,
        config.retry_policy,
    )
    .context("Failed to build Pixelfed client")?;
    let tokens = config
        .token_provider()
        .context("Failed to initialize access token provider")?;

    let state = AppState::from_upstream(Arc::new(client), tokens);
    let app = pixelfree_agg::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
