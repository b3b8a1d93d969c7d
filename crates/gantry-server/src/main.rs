// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gantry - PaaS Control Plane HTTP Server
//!
//! Serves the control-plane API:
//! - users, teams, and token authentication
//! - app lifecycle with route reconciliation
//! - service catalog, instances, and app bindings

use std::sync::Arc;

use tracing::{info, warn};

use gantry_core::config::{routers_from_env, Config};
use gantry_core::router::RouterRegistry;
use gantry_core::store::{PostgresStore, Store};
use gantry_server::{build_router, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry=info,gantry_core=info,gantry_server=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let server_config = ServerConfig::from_env()?;
    let config = Config::from_env()?;

    info!(port = server_config.http_port, "Starting Gantry");

    // Connect to database
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&server_config.database_url)
        .await?;

    info!("Connected to database");

    gantry_core::migrations::run(&pool).await?;

    info!("Database schema verified");

    let registry = Arc::new(RouterRegistry::from_configs(&routers_from_env()?)?);
    match registry.default_name() {
        Some(name) => info!(router = %name, "Default router configured"),
        None => warn!("No routers configured; app creation will fail"),
    }

    let store: Arc<dyn Store> = Arc::new(PostgresStore::new(pool));
    let state = AppState::new(store, registry, config);

    let queue = Arc::clone(&state.queue);
    let worker = queue.start();

    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], server_config.http_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "API server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    queue.shutdown();
    worker.await?;
    info!("Shutdown complete");
    Ok(())
}
