use crate::server::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.started_at.elapsed().as_secs(),
        "cache": state.bundles.stats(),
        "websocket": state.connection.status(),
        "spriteSyncRunning": state.sprite_sync.is_running(),
    }))
}

// GET /health/ready
pub async fn ready(State(state): State<AppState>) -> Response {
    if state.bundles.stats().has_bundle_cached {
        Json(json!({ "ready": true })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ready": false, "reason": "Bundle not yet cached" })),
        )
            .into_response()
    }
}

// GET /health/live
pub async fn live() -> Json<Value> {
    Json(json!({ "alive": true }))
}
