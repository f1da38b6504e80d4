use crate::error::{FetchError, MiningError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

/// JSON error body: `{ "error": { "code", "message", "details"? } }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", message)
    }

    pub fn upstream(err: &FetchError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "UPSTREAM_FAILED", "Upstream request failed")
            .with_details(json!({ "originalMessage": err.to_string() }))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "code": self.code, "message": self.message });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(json!({ "error": body }))).into_response()
    }
}

impl From<MiningError> for ApiError {
    fn from(err: MiningError) -> Self {
        tracing::error!("{}", err);
        match &err {
            MiningError::Fetch(fetch) => ApiError::upstream(fetch),
            MiningError::UnknownCategory(name) => ApiError::not_found(format!("Unknown category '{}'", name)),
            MiningError::NotFound { category }
            | MiningError::InvalidShape { category }
            | MiningError::Evaluation { category, .. } => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.code(), format!("Failed to extract {} data", category))
                    .with_details(json!({ "originalMessage": err.to_string() }))
            }
            MiningError::Match(_) | MiningError::Task(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.code(), "Failed to extract data")
                    .with_details(json!({ "originalMessage": err.to_string() }))
            }
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        tracing::error!("{}", err);
        ApiError::upstream(&err)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
