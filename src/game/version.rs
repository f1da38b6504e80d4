use crate::error::FetchError;
use crate::bundle::resolver::USER_AGENT;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const VERSION_PATH: &str = "/platform/v1/version";
const VERSION_TIMEOUT: Duration = Duration::from_secs(8);
pub const VERSION_TTL: Duration = Duration::from_secs(60);

type PendingVersion = Shared<BoxFuture<'static, Result<String, FetchError>>>;

#[derive(Deserialize)]
struct VersionResponse {
    version: Option<serde_json::Value>,
}

#[derive(Default)]
struct VersionSlot {
    cached: Option<(String, Instant)>,
    pending: Option<PendingVersion>,
}

struct Inner {
    client: Client,
    origin: String,
    slot: Mutex<VersionSlot>,
}

/// Client for the game's version endpoint. Answers from a short-lived cache and
/// shares one request between concurrent callers.
#[derive(Clone)]
pub struct VersionClient {
    inner: Arc<Inner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl VersionClient {
    pub fn new(client: Client, origin: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                origin: origin.trim_end_matches('/').to_string(),
                slot: Mutex::new(VersionSlot::default()),
            }),
        }
    }

    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    pub async fn current(&self) -> Result<String, FetchError> {
        let pending = {
            let mut slot = lock(&self.inner.slot);
            if let Some((version, at)) = &slot.cached {
                if at.elapsed() < VERSION_TTL {
                    return Ok(version.clone());
                }
            }
            match &slot.pending {
                Some(p) => p.clone(),
                None => {
                    let fut = Self::fetch(self.inner.clone()).boxed().shared();
                    slot.pending = Some(fut.clone());
                    fut
                }
            }
        };
        pending.await
    }

    async fn fetch(inner: Arc<Inner>) -> Result<String, FetchError> {
        let url = format!("{}{}", inner.origin, VERSION_PATH);
        let result = fetch_version(&inner.client, &url).await;

        let mut slot = lock(&inner.slot);
        slot.pending = None;
        let version = result?;
        tracing::info!(version = %version, "Game version fetched");
        slot.cached = Some((version.clone(), Instant::now()));
        Ok(version)
    }

    /// Forgets the cached version, typically after a version-mismatch close.
    pub fn invalidate(&self) {
        lock(&self.inner.slot).cached = None;
    }

    /// `<origin>/version/<v>/assets/` for the current version.
    pub async fn asset_base_url(&self) -> Result<String, FetchError> {
        let version = self.current().await?;
        Ok(asset_base_url(&self.inner.origin, &version))
    }
}

pub fn asset_base_url(origin: &str, version: &str) -> String {
    format!("{}/version/{}/assets/", origin.trim_end_matches('/'), version)
}

async fn fetch_version(client: &Client, url: &str) -> Result<String, FetchError> {
    tracing::debug!(url = %url, "Fetching game version");
    let resp = client
        .get(url)
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .timeout(VERSION_TIMEOUT)
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))?;
    if !resp.status().is_success() {
        return Err(FetchError::status(url, resp.status().as_u16()));
    }
    let body: VersionResponse = resp.json().await.map_err(|e| FetchError::from_reqwest(url, e))?;
    parse_version(body.version).ok_or_else(|| FetchError::new(url, "version not found in response"))
}

fn parse_version(raw: Option<serde_json::Value>) -> Option<String> {
    let version = raw?.as_str()?.trim().to_string();
    (!version.is_empty()).then_some(version)
}
