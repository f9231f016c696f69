//! HTTP prediction service

pub mod error;
pub mod handlers;

use crate::predict::predictor::Predictor;
use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

/// Prediction context shared by every request
pub type SharedPredictor = Arc<Predictor>;

pub fn create_router(predictor: SharedPredictor) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/predict", post(handlers::predict))
        .route("/health", get(handlers::health))
        .with_state(predictor)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Bind `addr` and serve until Ctrl-C
pub async fn serve(predictor: SharedPredictor, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Serving predictions on http://{}", addr);

    axum::serve(listener, create_router(predictor))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
