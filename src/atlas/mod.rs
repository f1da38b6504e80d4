//! Sprite atlases: manifest discovery, per-frame digests, diffing against the
//! last export, and PNG export of changed frames. The cosmetic and audio
//! bundles of the same manifest are listed here too.

pub mod audio;
pub mod catalog;
pub mod cosmetics;
pub mod diff;
pub mod export;
pub mod manifest;
pub mod sync;
pub mod types;

pub use audio::AudioCache;
pub use catalog::{CatalogCache, SpriteCatalog};
pub use cosmetics::CosmeticsCache;
pub use manifest::ManifestLoader;
pub use sync::{SpriteSync, SyncOutcome};

use crate::error::FetchError;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

type PendingLoad<V> = Shared<BoxFuture<'static, Result<V, FetchError>>>;

enum Slot<V> {
    Ready(V),
    Pending(PendingLoad<V>),
}

/// Results keyed by asset base URL. Concurrent loads of one key share a single
/// future; failures are not cached.
pub(crate) struct KeyedCache<V> {
    slots: Mutex<HashMap<String, Slot<V>>>,
}

impl<V> Default for KeyedCache<V> {
    fn default() -> Self {
        Self { slots: Mutex::new(HashMap::new()) }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<V: Clone + Send + Sync + 'static> KeyedCache<V> {
    pub(crate) async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let pending = {
            let mut slots = lock(&self.slots);
            match slots.get(key) {
                Some(Slot::Ready(value)) => return Ok(value.clone()),
                Some(Slot::Pending(p)) => p.clone(),
                None => {
                    let p = load().boxed().shared();
                    slots.insert(key.to_string(), Slot::Pending(p.clone()));
                    p
                }
            }
        };

        let result = pending.clone().await;

        let mut slots = lock(&self.slots);
        let ours = matches!(slots.get(key), Some(Slot::Pending(p)) if p.ptr_eq(&pending));
        if ours {
            match &result {
                Ok(value) => {
                    slots.insert(key.to_string(), Slot::Ready(value.clone()));
                }
                Err(_) => {
                    slots.remove(key);
                }
            }
        }
        result
    }

    #[cfg(test)]
    fn contains(&self, key: &str) -> bool {
        matches!(lock(&self.slots).get(key), Some(Slot::Ready(_)))
    }
}

/// GET a JSON document with the given timeout.
pub async fn fetch_json(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<serde_json::Value, FetchError> {
    let resp = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))?;
    if !resp.status().is_success() {
        return Err(FetchError::status(url, resp.status().as_u16()));
    }
    resp.json().await.map_err(|e| FetchError::from_reqwest(url, e))
}

/// Resolves an asset path against the versioned asset base URL.
pub fn join_url(base: &str, path: &str) -> Result<String, FetchError> {
    let base_url = url::Url::parse(base).map_err(|e| FetchError::new(base, e))?;
    base_url
        .join(path.trim_start_matches('/'))
        .map(String::from)
        .map_err(|e| FetchError::new(path, e))
}
