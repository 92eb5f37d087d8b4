//! Hero Sync Server - authoritative entity simulation over WebSocket
//!
//! This is the main entry point for the server. It handles:
//! - The tick-driven engine task that owns the simulation
//! - WebSocket connections for viewers, controls and chat
//! - HTTP health endpoint

use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hero_sync::app::AppState;
use hero_sync::config::Config;
use hero_sync::game::{EngineCommand, LifecycleRequest};
use hero_sync::http::build_router;
use hero_sync::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Hero Sync Server");
    info!(
        "Server address: {}, policy: {:?}, tick rate: {}",
        config.server_addr, config.policy, config.world.tick_rate
    );

    // Create application state; the engine is spawned separately
    let addr: SocketAddr = config.server_addr;
    let auto_start = config.auto_start;
    let (state, engine) = AppState::new(config);
    let engine_handle = state.engine.clone();
    let engine_task = tokio::spawn(engine.run());

    if auto_start {
        engine_handle
            .send(EngineCommand::Lifecycle(LifecycleRequest::Start))
            .await
            .context("engine exited before start")?;
    }

    // Build router
    let router = build_router(state);

    // Start server
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let shutdown_handle = engine_handle.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Close viewers first so upgraded connections drain
            if let Err(e) = shutdown_handle.shutdown().await {
                warn!(error = %e, "Engine already stopped");
            }
        })
        .await?;

    if let Err(e) = engine_task.await {
        error!(error = %e, "Engine task failed");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
