use crate::server::error::ApiError;
use axum::Json;
use serde_json::{json, Value};

// GET /
pub async fn root() -> Json<Value> {
    Json(json!({
        "name": "MG API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Unofficial Magic Garden API",
        "endpoints": {
            "data": "/data",
            "live": "/live",
            "assets": "/assets",
            "health": "/health",
        },
    }))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("Endpoint not found")
}
