use super::resolver::BundleSource;
use super::Bundle;
use crate::error::{FetchError, MiningError};
use crate::extractors::{Category, ExtractorRegistry, MiningContext};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub const DEFAULT_BUNDLE_TTL: Duration = Duration::from_secs(300);

type PendingFetch = Shared<BoxFuture<'static, Result<(Arc<Bundle>, Arc<MiningContext>), FetchError>>>;

struct LoadedBundle {
    bundle: Arc<Bundle>,
    context: Arc<MiningContext>,
    loaded_at: Instant,
}

#[derive(Default)]
struct BundleSlot {
    current: Option<LoadedBundle>,
    pending: Option<PendingFetch>,
}

struct CategoryEntry {
    bundle_url: String,
    data: Arc<Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub has_bundle_cached: bool,
    pub bundle_url: Option<String>,
    pub bundle_fetched_at: Option<String>,
    /// Milliseconds since the bundle was fetched.
    pub bundle_age: Option<u64>,
    pub categories_cached: Vec<String>,
}

struct Inner {
    source: Arc<dyn BundleSource>,
    ttl: Duration,
    slot: Mutex<BundleSlot>,
    categories: Mutex<HashMap<String, CategoryEntry>>,
    sandbox_timeout: Duration,
    registry: ExtractorRegistry,
}

/// Owns the current bundle and everything derived from it.
///
/// `EMPTY → FETCHING → CACHED(url) → FETCHING → CACHED(url')`. Concurrent
/// callers during a fetch await the same future. Every bundle URL gets its own
/// [`MiningContext`], so an extraction still running against the previous
/// bundle can only write into that bundle's enums and sprite-id table. When a
/// refresh lands on a different URL, category results are dropped before the
/// new bundle becomes visible.
#[derive(Clone)]
pub struct BundleCache {
    inner: Arc<Inner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl BundleCache {
    pub fn new(source: Arc<dyn BundleSource>, ttl: Duration, sandbox_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                ttl,
                slot: Mutex::new(BundleSlot::default()),
                categories: Mutex::new(HashMap::new()),
                sandbox_timeout,
                registry: ExtractorRegistry::new(),
            }),
        }
    }

    /// Mining context of the bundle held right now, without fetching.
    pub fn peek_context(&self) -> Option<Arc<MiningContext>> {
        lock(&self.inner.slot).current.as_ref().map(|l| l.context.clone())
    }

    /// Current bundle, fetching when missing or older than the TTL.
    pub async fn get_bundle(&self) -> Result<Arc<Bundle>, FetchError> {
        Ok(self.load().await?.0)
    }

    /// Current bundle together with the mining context that belongs to it.
    async fn load(&self) -> Result<(Arc<Bundle>, Arc<MiningContext>), FetchError> {
        let pending = {
            let mut slot = lock(&self.inner.slot);
            if let Some(loaded) = &slot.current {
                if loaded.loaded_at.elapsed() < self.inner.ttl {
                    return Ok((loaded.bundle.clone(), loaded.context.clone()));
                }
            }
            match &slot.pending {
                Some(pending) => pending.clone(),
                None => {
                    let fut = Self::refresh(self.inner.clone()).boxed().shared();
                    slot.pending = Some(fut.clone());
                    fut
                }
            }
        };
        pending.await
    }

    async fn refresh(inner: Arc<Inner>) -> Result<(Arc<Bundle>, Arc<MiningContext>), FetchError> {
        let fetched = inner.source.fetch_bundle().await;

        let mut slot = lock(&inner.slot);
        slot.pending = None;
        let fetched = fetched?;

        let context = match slot.current.take() {
            Some(previous) if previous.bundle.url == fetched.main_url => previous.context,
            Some(previous) => {
                tracing::info!(
                    old_url = %previous.bundle.url,
                    new_url = %fetched.main_url,
                    "Bundle version changed, clearing caches"
                );
                lock(&inner.categories).clear();
                previous.context.clear();
                Arc::new(MiningContext::new(inner.sandbox_timeout))
            }
            None => Arc::new(MiningContext::new(inner.sandbox_timeout)),
        };

        let bundle = Arc::new(Bundle::new(fetched.main_url, fetched.text));
        slot.current = Some(LoadedBundle { bundle: bundle.clone(), context: context.clone(), loaded_at: Instant::now() });
        Ok((bundle, context))
    }

    /// Category data for the current bundle, extracted at most once per bundle URL.
    pub async fn get_category_cached(&self, category: Category) -> Result<Arc<Value>, MiningError> {
        let (bundle, context) = self.load().await?;
        let inner = self.inner.clone();
        self.cached_or_extract(bundle, category.as_str(), move |text| {
            inner.registry.extract(category, text, &context)
        })
        .await
    }

    /// Same caching as [`get_category_cached`](Self::get_category_cached) with a
    /// caller-supplied extractor. Extraction runs on the blocking pool.
    pub async fn get_category_with<F>(&self, name: &str, extract: F) -> Result<Arc<Value>, MiningError>
    where
        F: FnOnce(&str) -> Result<Value, MiningError> + Send + 'static,
    {
        let bundle = self.get_bundle().await?;
        self.cached_or_extract(bundle, name, extract).await
    }

    async fn cached_or_extract<F>(&self, bundle: Arc<Bundle>, name: &str, extract: F) -> Result<Arc<Value>, MiningError>
    where
        F: FnOnce(&str) -> Result<Value, MiningError> + Send + 'static,
    {
        if let Some(entry) = lock(&self.inner.categories).get(name) {
            if entry.bundle_url == bundle.url {
                tracing::debug!(category = name, "Category cache hit");
                return Ok(entry.data.clone());
            }
        }

        tracing::debug!(category = name, "Category cache miss, extracting");
        let started = Instant::now();
        let text = bundle.text.clone();
        let data = tokio::task::spawn_blocking(move || extract(&*text))
            .await
            .map_err(|e| MiningError::Task(e.to_string()))??;
        let data = Arc::new(data);
        tracing::info!(category = name, elapsed_ms = started.elapsed().as_millis() as u64, "Category extracted");

        // a refresh may have replaced the bundle while extraction ran
        let still_current = lock(&self.inner.slot)
            .current
            .as_ref()
            .is_some_and(|l| l.bundle.url == bundle.url);
        if still_current {
            lock(&self.inner.categories).insert(
                name.to_string(),
                CategoryEntry { bundle_url: bundle.url.clone(), data: data.clone() },
            );
        }
        Ok(data)
    }

    /// Bundle held right now, without fetching.
    pub fn peek_bundle(&self) -> Option<Arc<Bundle>> {
        lock(&self.inner.slot).current.as_ref().map(|l| l.bundle.clone())
    }

    pub fn invalidate_all(&self) {
        if let Some(previous) = lock(&self.inner.slot).current.take() {
            previous.context.clear();
        }
        lock(&self.inner.categories).clear();
        tracing::info!("All caches invalidated");
    }

    pub fn stats(&self) -> CacheStats {
        let slot = lock(&self.inner.slot);
        let mut categories_cached: Vec<String> = lock(&self.inner.categories).keys().cloned().collect();
        categories_cached.sort();
        CacheStats {
            has_bundle_cached: slot.current.is_some(),
            bundle_url: slot.current.as_ref().map(|l| l.bundle.url.clone()),
            bundle_fetched_at: slot.current.as_ref().map(|l| l.bundle.fetched_at.to_rfc3339()),
            bundle_age: slot.current.as_ref().map(|l| l.loaded_at.elapsed().as_millis() as u64),
            categories_cached,
        }
    }
}
