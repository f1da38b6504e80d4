use crate::atlas::catalog::CatalogQuery;
use crate::atlas::cosmetics::CosmeticsQuery;
use crate::server::error::{ApiError, ApiResult};
use crate::server::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

pub const SPRITE_CATEGORIES: &[&str] = &[
    "seeds", "plants", "tallPlants", "mutations", "pets", "decor", "items", "objects", "ui", "animations",
    "weather", "tiles", "winter",
];

pub fn is_valid_category(category: &str) -> bool {
    SPRITE_CATEGORIES.contains(&category.trim())
}

/// Strips NULs, `..` and path separators. `None` unless a non-empty name
/// ending in `.png` is left.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let cleaned = name.trim().replace('\0', "").replace("..", "").replace(['/', '\\'], "");
    if !cleaned.ends_with(".png") || cleaned == ".png" {
        return None;
    }
    Some(cleaned)
}

fn sprite_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=86400"));
    headers
}

// GET /assets/sprites/{category}/{name}
pub async fn serve_sprite(
    State(state): State<AppState>,
    Path((category, name)): Path<(String, String)>,
) -> ApiResult<Response> {
    if !is_valid_category(&category) {
        tracing::warn!(category = %category, "Invalid sprite category requested");
        return Err(ApiError::bad_request(format!(
            "Invalid category '{}'. Allowed: {}",
            category,
            SPRITE_CATEGORIES.join(", ")
        )));
    }
    let Some(file) = sanitize_filename(&name) else {
        tracing::warn!(name = %name, "Invalid sprite filename requested");
        return Err(ApiError::bad_request("Invalid sprite filename"));
    };

    let export_dir = &state.config.sprites.export_dir;
    let candidate = export_dir.join("sprite").join(category.trim()).join(&file);
    let not_found = || ApiError::not_found(format!("Sprite not found: {}/{}", category, file));

    let (Ok(root), Ok(resolved)) = (
        tokio::fs::canonicalize(export_dir).await,
        tokio::fs::canonicalize(&candidate).await,
    ) else {
        tracing::debug!(path = %candidate.display(), "Sprite file not found");
        return Err(not_found());
    };
    if !resolved.starts_with(&root) {
        tracing::error!(path = %resolved.display(), export_dir = %root.display(), "Path traversal attempt detected");
        return Err(ApiError::forbidden("Access denied"));
    }

    match tokio::fs::read(&resolved).await {
        Ok(bytes) => Ok((sprite_headers(), bytes).into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(not_found()),
        Err(e) => {
            tracing::error!(path = %resolved.display(), "Error serving sprite file: {}", e);
            Err(ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "SPRITE_SERVE_ERROR",
                "Error serving sprite file",
            ))
        }
    }
}

// GET /assets/sprites
pub async fn list_sprite_categories(State(state): State<AppState>) -> Json<Value> {
    let mut categories = SPRITE_CATEGORIES.to_vec();
    categories.sort_unstable();
    let base = &state.config.sprites.base_url;
    Json(json!({
        "categories": categories,
        "baseUrl": base,
        "usage": {
            "endpoint": "GET /assets/sprites/{category}/{name}.png",
            "example": format!("{}/assets/sprites/seeds/Carrot.png", base),
        },
    }))
}

// GET /assets/sprite-data
pub async fn sprite_data(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<Value>> {
    let base_url = state.versions.asset_base_url().await?;
    let catalog = state.catalogs.get(&base_url).await?;
    Ok(Json(catalog.payload(&query)))
}

// GET /assets/cosmetics
pub async fn cosmetics(
    State(state): State<AppState>,
    Query(query): Query<CosmeticsQuery>,
) -> ApiResult<Json<Value>> {
    let base_url = state.versions.asset_base_url().await?;
    let catalog = state.cosmetics.get(&base_url).await?;
    Ok(Json(catalog.payload(query.full)))
}

// GET /assets/audios
pub async fn audios(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let base_url = state.versions.asset_base_url().await?;
    let catalog = state.audio.get(&base_url).await?;
    Ok(Json(catalog.payload()))
}
