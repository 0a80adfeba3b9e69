use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::sync::{RwLock, broadcast};
use tower_http::cors::{Any, CorsLayer};

use super::{alerts, routes};
use crate::config::PairWatch;
use crate::dispatch::store::AlertDb;
use crate::engine::AlertRecord;

/// Current watchlist as published by the driver after each refresh.
pub type SharedWatchlist = Arc<RwLock<Vec<PairWatch>>>;

#[derive(Clone)]
pub struct AppState {
    pub db: AlertDb,
    pub alert_tx: broadcast::Sender<AlertRecord>,
    pub watchlist: SharedWatchlist,
    pub started_at: i64,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/alerts", get(routes::alerts))
        .route("/api/watchlist", get(routes::watchlist))
        .route("/api/health", get(routes::health))
        .route("/ws/alerts", get(alerts::ws_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run(state: AppState, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!("API server listening on port {port}");
    axum::serve(listener, router(state)).await
}
