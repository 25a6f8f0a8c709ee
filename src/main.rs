// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Neighbourhood Patrol API Server
//!
//! Coordinates SOS alerts between neighbours: real-time relay over
//! WebSocket, an alert record in the shared chat log, and push
//! notifications to registered devices.

use neighbourhood_patrol::{
    config::{Config, StoreBackend},
    db::{DirectoryStore, FirestoreDb, MemoryStore},
    services::{FcmGateway, PushGateway},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Neighbourhood Patrol API");

    let db: Arc<dyn DirectoryStore> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory directory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Push is best-effort: run without it rather than refuse to start.
    let gateway: Arc<dyn PushGateway> = match FcmGateway::new(&config).await {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            tracing::error!(error = %e, "Cloud Messaging unavailable, push notifications disabled");
            Arc::new(FcmGateway::new_offline(&config.gcp_project_id))
        }
    };

    // Build shared state (starts the alert coordinator)
    let port = config.port;
    let state = Arc::new(AppState::new(config, db, gateway));

    // Build router
    let app = neighbourhood_patrol::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("neighbourhood_patrol=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();

    Ok(())
}
