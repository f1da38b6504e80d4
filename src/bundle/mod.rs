pub mod cache;
pub mod locator;
pub mod resolver;
pub mod scanner;

pub use cache::{BundleCache, CacheStats};
pub use locator::{locate_literal, ObjectLiteralHit};
pub use resolver::{BundleSource, FetchedBundle, HttpBundleSource};

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Immutable snapshot of the game's main script, identified by its URL.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub url: String,
    pub text: Arc<str>,
    pub fetched_at: DateTime<Utc>,
}

impl Bundle {
    pub fn new(url: impl Into<String>, text: impl Into<Arc<str>>) -> Self {
        Self { url: url.into(), text: text.into(), fetched_at: Utc::now() }
    }
}
