//! Snap Vault - image galleries with public and owner-only access.
//!
//! This binary starts the HTTP server and configures all components.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snap_vault::{
    config::{Cli, Command, Config, SignConfig},
    media::MediaService,
    server::{auth::TokenAuth, create_router, RouterConfig},
    store::LocalStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(config) => run_serve(config).await,
        Command::Sign(config) => run_sign(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: Config) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Snap Vault v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Data dir: {}", config.data_dir.display());
    info!("  Upload limit: {} bytes", config.max_upload_bytes);
    match &config.cors_origins {
        Some(origins) => info!("  CORS origins: {}", origins.join(", ")),
        None => info!("  CORS origins: any"),
    }

    let store = match LocalStore::open(&config.data_dir).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(
                "Failed to open data dir {}: {}",
                config.data_dir.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    };

    let media = MediaService::new(Arc::clone(&store), store);
    let router = create_router(media, build_router_config(&config));

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/v1/healthcheck", addr);

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "snap_vault=debug,tower_http=debug"
    } else {
        "snap_vault=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the serve Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new(config.auth_secret_or_empty())
        .with_max_upload_bytes(config.max_upload_bytes)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Sign Command
// =============================================================================

fn run_sign(config: SignConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let auth = TokenAuth::new(&config.secret);
    let token = auth.sign(config.user_id, Duration::from_secs(config.ttl));
    println!("{}", token);

    ExitCode::SUCCESS
}
