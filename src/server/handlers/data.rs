use crate::extractors::Category;
use crate::format::{combined_to_table, to_table, TableFormat};
use crate::server::error::{ApiError, ApiResult};
use crate::server::state::AppState;
use crate::transform::SpriteTransformer;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub const DATA_CACHE_CONTROL: &str = "public, max-age=300, stale-while-revalidate=60";

#[derive(Debug, Default, Deserialize)]
pub struct DataQuery {
    pub format: Option<String>,
}

impl DataQuery {
    fn table_format(&self) -> ApiResult<Option<TableFormat>> {
        match self.format.as_deref().map(str::trim) {
            None | Some("") | Some("json") => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(ApiError::bad_request),
        }
    }
}

/// Weak validator over the non-empty parts joined by `|`.
pub fn weak_etag(parts: &[&str]) -> Option<String> {
    let raw = parts.iter().filter(|p| !p.is_empty()).copied().collect::<Vec<_>>().join("|");
    if raw.is_empty() {
        return None;
    }
    let digest = Sha256::digest(raw.as_bytes());
    Some(format!("W/\"{}\"", &hex::encode(digest)[..40]))
}

pub fn is_fresh(headers: &HeaderMap, etag: &str) -> bool {
    let Some(header) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let header = header.trim();
    header == "*" || header.split(',').any(|tag| tag.trim() == etag)
}

/// `decors` is accepted alongside `decor`.
fn parse_category(name: &str) -> ApiResult<Category> {
    let name = if name.eq_ignore_ascii_case("decors") { "decor" } else { name };
    name.parse::<Category>().map_err(ApiError::from)
}

async fn sprite_version(state: &AppState) -> Option<String> {
    match state.store.load_version().await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Failed to read stored version: {:#}", e);
            None
        }
    }
}

fn data_etag(state: &AppState, key: &str, version: Option<&str>) -> Option<String> {
    let bundle = state.bundles.peek_bundle()?;
    weak_etag(&["data", key, &bundle.url, version.unwrap_or("")])
}

fn cache_headers(response: &mut Response, etag: Option<&str>) {
    let headers = response.headers_mut();
    if let Some(v) = etag.and_then(|e| HeaderValue::from_str(e).ok()) {
        headers.insert(header::ETAG, v);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(DATA_CACHE_CONTROL));
}

fn not_modified(state: &AppState, headers: &HeaderMap, key: &str, version: Option<&str>) -> Option<Response> {
    let etag = data_etag(state, key, version)?;
    if !is_fresh(headers, &etag) {
        return None;
    }
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    cache_headers(&mut response, Some(&etag));
    Some(response)
}

fn cache_key(name: &str, format: Option<TableFormat>) -> String {
    match format {
        Some(f) => format!("{}.{}", name, f.extension()),
        None => name.to_string(),
    }
}

/// Category data with sprite references rewritten to URLs.
pub async fn transformed(state: &AppState, category: Category, version: Option<String>) -> ApiResult<Value> {
    let raw = state.bundles.get_category_cached(category).await?;
    let index = state.sprite_index.clone();
    let urls = state.sprite_urls.clone();
    // sprite lookups hit the filesystem on a cold index
    tokio::task::spawn_blocking(move || {
        SpriteTransformer::new(&index, &urls, version.as_deref()).transform(category, &raw)
    })
    .await
    .map_err(|e| ApiError::internal(format!("transform task failed: {}", e)))
}

fn render(state: &AppState, key: &str, version: Option<&str>, data: Value, format: Option<TableFormat>, combined: bool) -> Response {
    let mut response = match format {
        Some(fmt) => {
            let body = if combined { combined_to_table(&data, fmt) } else { to_table(&data, fmt) };
            ([(header::CONTENT_TYPE, fmt.content_type())], body).into_response()
        }
        None => Json(data).into_response(),
    };
    let etag = data_etag(state, key, version);
    cache_headers(&mut response, etag.as_deref());
    response
}

// GET /data
pub async fn get_all(
    State(state): State<AppState>,
    Query(query): Query<DataQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let format = query.table_format()?;
    let version = sprite_version(&state).await;
    let key = cache_key("all", format);
    if let Some(response) = not_modified(&state, &headers, &key, version.as_deref()) {
        return Ok(response);
    }

    let results = futures::future::join_all(
        Category::ALL.into_iter().map(|c| transformed(&state, c, version.clone())),
    )
    .await;

    let mut all = Map::new();
    for (category, result) in Category::ALL.into_iter().zip(results) {
        all.insert(category.as_str().to_string(), result?);
    }
    Ok(render(&state, &key, version.as_deref(), Value::Object(all), format, true))
}

// GET /data/{category}
pub async fn get_category(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DataQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let category = parse_category(&name)?;
    let format = query.table_format()?;
    let version = sprite_version(&state).await;
    let key = cache_key(category.as_str(), format);
    if let Some(response) = not_modified(&state, &headers, &key, version.as_deref()) {
        return Ok(response);
    }

    let data = transformed(&state, category, version.clone()).await?;
    Ok(render(&state, &key, version.as_deref(), data, format, false))
}
