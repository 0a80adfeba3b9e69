use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::server::AppState;
use super::types::*;
use crate::dispatch::store;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

pub async fn alerts(
    State(state): State<AppState>,
    Query(params): Query<AlertsParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let network = params
        .network
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_lowercase);

    let stored = {
        let conn = state.db.lock().unwrap_or_else(|p| p.into_inner());
        store::recent_alerts(&conn, limit, network.as_deref())
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    };

    let alerts = stored
        .into_iter()
        .map(|alert| AlertView {
            reason_tags: reason_tags(&alert.record.reasons),
            alert,
        })
        .collect();

    Ok(Json(AlertsResponse { alerts, limit }))
}

pub async fn watchlist(State(state): State<AppState>) -> impl IntoResponse {
    let entries = state.watchlist.read().await.clone();
    Json(entries)
}

pub async fn health(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let (alert_count, latest_alert_ts) = {
        let conn = state.db.lock().unwrap_or_else(|p| p.into_inner());
        let count = store::count_alerts(&conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        let latest = store::latest_alert_ts(&conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        (count, latest)
    };
    let watched_pairs = state.watchlist.read().await.len();

    Ok(Json(HealthResponse {
        status: "ok",
        alert_count,
        latest_alert_ts,
        watched_pairs,
        uptime_secs: chrono::Utc::now().timestamp() - state.started_at,
    }))
}
