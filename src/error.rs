use thiserror::Error;

/// The scanner ran off the end of the text before the opening delimiter closed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unbalanced '{open}' starting at offset {start}: text ended at depth {depth}")]
pub struct MatchError {
    pub open: char,
    pub start: usize,
    pub depth: usize,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("evaluation exceeded {limit_ms}ms")]
    Timeout { limit_ms: u128 },
    #[error("{0}")]
    Runtime(String),
}

impl EvalError {
    pub fn runtime(message: impl Into<String>) -> Self {
        EvalError::Runtime(message.into())
    }
}

/// Network or HTTP failure on an upstream resource. Cloneable so every caller
/// awaiting a coalesced fetch receives the same error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("fetch {url} failed: {reason}")]
pub struct FetchError {
    pub url: String,
    pub status: Option<u16>,
    pub reason: String,
}

impl FetchError {
    pub fn new(url: impl Into<String>, reason: impl ToString) -> Self {
        Self { url: url.into(), status: None, reason: reason.to_string() }
    }

    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self { url: url.into(), status: Some(status), reason: format!("HTTP {}", status) }
    }

    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        Self {
            url: url.to_string(),
            status: err.status().map(|s| s.as_u16()),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum MiningError {
    #[error("[{category}] not found (signatures not matched)")]
    NotFound { category: String },
    #[error("[{category}] extraction OK but evaluated to a non-object")]
    InvalidShape { category: String },
    #[error("[{category}] evaluation failed: {source}")]
    Evaluation { category: String, source: EvalError },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("unknown category: {0}")]
    UnknownCategory(String),
    #[error("extraction task failed: {0}")]
    Task(String),
}

impl MiningError {
    /// Machine-readable code surfaced by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            MiningError::NotFound { .. }
            | MiningError::InvalidShape { .. }
            | MiningError::Evaluation { .. }
            | MiningError::Match(_)
            | MiningError::Task(_) => "EXTRACTION_FAILED",
            MiningError::Fetch(_) => "UPSTREAM_FAILED",
            MiningError::UnknownCategory(_) => "NOT_FOUND",
        }
    }
}
