// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! VideoTube identity API server
//!
//! Registers users, runs access/refresh token sessions and serves channel
//! profiles and watch histories.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use videotube_identity::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, InMemoryDb, Store},
    services::CloudinaryStorage,
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting VideoTube identity API");

    let db: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Firestore => {
            let db = FirestoreDb::new(&config.gcp_project_id).await?;
            tracing::info!(project = %config.gcp_project_id, "Firestore store connected");
            Arc::new(db)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(InMemoryDb::new())
        }
    };

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    let storage = Arc::new(CloudinaryStorage::new(&config));
    tracing::info!(
        cloud = %config.cloudinary_cloud_name,
        upload_dir = %config.upload_dir.display(),
        "Object storage initialized"
    );

    let state = Arc::new(AppState::new(config.clone(), db, storage));

    // Build router
    let app = videotube_identity::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
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
                .add_directive("videotube_identity=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
