use crate::atlas::{AudioCache, CatalogCache, CosmeticsCache, ManifestLoader, SpriteSync};
use crate::bundle::resolver::USER_AGENT;
use crate::bundle::{BundleCache, BundleSource, HttpBundleSource};
use crate::config::AppConfig;
use crate::game::{StateStore, VersionClient};
use crate::live::LiveHub;
use crate::server::rate_limit::RateLimiter;
use crate::sprites::{SpriteIndex, SpriteUrls};
use crate::ws::GameConnection;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;

/// SSE streams get a tenth of the regular request budget.
const STREAM_LIMIT_DIVISOR: u32 = 10;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub http_client: reqwest::Client,
    pub bundles: BundleCache,
    pub versions: VersionClient,
    pub store: StateStore,
    pub catalogs: CatalogCache,
    pub cosmetics: CosmeticsCache,
    pub audio: AudioCache,
    pub sprite_sync: Arc<SpriteSync>,
    pub sprite_index: Arc<SpriteIndex>,
    pub sprite_urls: Arc<SpriteUrls>,
    pub live: Arc<LiveHub>,
    pub connection: Arc<GameConnection>,
    pub limiter: Arc<RateLimiter>,
    pub stream_limiter: Arc<RateLimiter>,
    pub started_at: Instant,
}

pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .gzip(true)
        .build()
        .context("building HTTP client")
}

impl AppState {
    /// State wired to the real game endpoints.
    pub fn new(config: AppConfig) -> Result<Self> {
        let client = http_client()?;
        let source = Arc::new(HttpBundleSource::new(client.clone(), config.game.page_url.clone()));
        Ok(Self::with_source(config, client, source))
    }

    /// Same wiring with a caller-supplied bundle source.
    pub fn with_source(config: AppConfig, client: reqwest::Client, source: Arc<dyn BundleSource>) -> Self {
        let bundles = BundleCache::new(source, config.bundle_ttl(), config.sandbox_timeout());

        let versions = VersionClient::new(client.clone(), &config.game.origin);
        let store = StateStore::new(config.storage.data_dir.clone());
        let manifests = ManifestLoader::new(client.clone());
        let catalogs = CatalogCache::new(manifests.clone());
        let cosmetics = CosmeticsCache::new(manifests.clone());
        let audio = AudioCache::new(manifests);
        let sprite_sync = Arc::new(SpriteSync::new(
            versions.clone(),
            store.clone(),
            catalogs.clone(),
            config.sprites.export_dir.clone(),
        ));
        let sprite_index = Arc::new(SpriteIndex::new(&config.sprites.export_dir));
        let sprite_urls = Arc::new(SpriteUrls::new(&config.sprites.base_url));

        let live = Arc::new(LiveHub::new());
        let connection = Arc::new(GameConnection::new(
            config.connection_options(),
            versions.clone(),
            store.clone(),
            live.clone(),
        ));

        let window = config.rate_limit_window();
        let max = config.rate_limit.max_requests;
        let limiter = Arc::new(RateLimiter::new(window, max));
        let stream_limiter = Arc::new(RateLimiter::new(window, (max / STREAM_LIMIT_DIVISOR).max(1)));

        Self {
            config: Arc::new(config),
            http_client: client,
            bundles,
            versions,
            store,
            catalogs,
            cosmetics,
            audio,
            sprite_sync,
            sprite_index,
            sprite_urls,
            live,
            connection,
            limiter,
            stream_limiter,
            started_at: Instant::now(),
        }
    }
}
