use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const CONFIG_FILE: &str = "mg_config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub game: GameConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub sprites: SpritesConfig,
    pub rate_limit: RateLimitConfig,
    pub websocket: WebSocketConfig,
    pub sandbox: SandboxConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0:3000".into(), trust_proxy_headers: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub origin: String,
    pub page_url: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            origin: "https://magicgarden.gg".into(),
            page_url: "https://magicgarden.gg/r/test".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub bundle_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { bundle_ttl_secs: 300 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("./data") }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpritesConfig {
    pub export_dir: PathBuf,
    /// Public origin prepended to sprite URLs in data payloads.
    pub base_url: String,
}

impl Default for SpritesConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("./sprites_dump"),
            base_url: "http://localhost:3000".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_secs: u64,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { enabled: true, window_secs: 60, max_requests: 100 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub enabled: bool,
    pub auto_reconnect: bool,
    pub max_retries: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self { enabled: true, auto_reconnect: true, max_retries: 999, min_delay_ms: 500, max_delay_ms: 8000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub timeout_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self { timeout_ms: crate::sandbox::DEFAULT_TIMEOUT.as_millis() as u64 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {}={:?}: {}", key, raw, e)),
        None => Ok(None),
    }
}

/// Anything but `false`/`0` counts as enabled.
fn env_flag(key: &str) -> Option<bool> {
    env_string(key).map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0"))
}

impl AppConfig {
    /// `mg_config.toml` when present, then environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::from_file(Path::new(CONFIG_FILE))?;
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => toml::from_str(&raw).with_context(|| format!("parsing {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_string("BIND_ADDR") {
            self.server.bind_addr = v;
        } else if let Some(port) = env_parse::<u16>("PORT")? {
            self.server.bind_addr = format!("0.0.0.0:{}", port);
        }
        if let Some(v) = env_flag("TRUST_PROXY_HEADERS") {
            self.server.trust_proxy_headers = v;
        }
        if let Some(v) = env_string("GAME_ORIGIN") {
            self.game.origin = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = env_string("GAME_PAGE_URL") {
            self.game.page_url = v;
        }
        if let Some(v) = env_parse("CACHE_BUNDLE_TTL_SECS")? {
            self.cache.bundle_ttl_secs = v;
        }
        if let Some(v) = env_string("DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
        if let Some(v) = env_string("SPRITES_EXPORT_DIR") {
            self.sprites.export_dir = PathBuf::from(v);
        }
        if let Some(v) = env_string("SPRITES_BASE_URL") {
            self.sprites.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = env_flag("RATE_LIMIT_ENABLED") {
            self.rate_limit.enabled = v;
        }
        if let Some(v) = env_parse("RATE_LIMIT_WINDOW_SECS")? {
            self.rate_limit.window_secs = v;
        }
        if let Some(v) = env_parse("RATE_LIMIT_MAX")? {
            self.rate_limit.max_requests = v;
        }
        if let Some(v) = env_flag("WS_ENABLED") {
            self.websocket.enabled = v;
        }
        if let Some(v) = env_flag("WS_AUTO_RECONNECT") {
            self.websocket.auto_reconnect = v;
        }
        if let Some(v) = env_parse("WS_MAX_RETRIES")? {
            self.websocket.max_retries = v;
        }
        if let Some(v) = env_parse("WS_MIN_DELAY_MS")? {
            self.websocket.min_delay_ms = v;
        }
        if let Some(v) = env_parse("WS_MAX_DELAY_MS")? {
            self.websocket.max_delay_ms = v;
        }
        if let Some(v) = env_parse("SANDBOX_TIMEOUT_MS")? {
            self.sandbox.timeout_ms = v;
        }
        if let Some(v) = env_string("LOG_LEVEL") {
            self.logging.level = v;
        }
        Ok(())
    }

    pub fn bundle_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.bundle_ttl_secs)
    }

    pub fn sandbox_timeout(&self) -> Duration {
        Duration::from_millis(self.sandbox.timeout_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit.window_secs.max(1))
    }

    pub fn connection_options(&self) -> crate::ws::ConnectionOptions {
        crate::ws::ConnectionOptions {
            origin: self.game.origin.clone(),
            auto_reconnect: self.websocket.auto_reconnect,
            max_retries: self.websocket.max_retries,
            min_delay: Duration::from_millis(self.websocket.min_delay_ms),
            max_delay: Duration::from_millis(self.websocket.max_delay_ms),
            ..Default::default()
        }
    }
}
