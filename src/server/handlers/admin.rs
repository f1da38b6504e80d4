use crate::atlas::SyncOutcome;
use crate::server::error::ApiError;
use crate::server::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct SyncQuery {
    pub force: Option<String>,
}

impl SyncQuery {
    fn force(&self) -> bool {
        matches!(self.force.as_deref(), Some("1") | Some("true"))
    }
}

// POST /admin/sprites/sync
pub async fn sync_sprites(State(state): State<AppState>, Query(query): Query<SyncQuery>) -> Response {
    let force = query.force();
    tracing::info!(force, "Manual sprite sync requested");

    match state.sprite_sync.sync(force).await {
        None => ApiError::new(StatusCode::CONFLICT, "SYNC_IN_PROGRESS", "A sprite sync is already running").into_response(),
        Some(outcome @ SyncOutcome::Error { .. }) => (StatusCode::BAD_GATEWAY, Json(outcome)).into_response(),
        Some(outcome) => {
            if outcome.is_success() {
                state.sprite_index.clear();
            }
            Json(outcome).into_response()
        }
    }
}
