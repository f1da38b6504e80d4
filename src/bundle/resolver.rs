use crate::error::FetchError;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

pub const USER_AGENT: &str = "MG-API/1.0";

const PAGE_TIMEOUT: Duration = Duration::from_secs(8);
const BUNDLE_TIMEOUT: Duration = Duration::from_secs(20);

static INDEX_SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"src="([^"]*/assets/index-[^"]+\.js)""#).unwrap());

static MAIN_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"assets/main-[^"']+\.js"#).unwrap());

static INDEX_TAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/assets/index-[^/]+\.js(\?.*)?$").unwrap());

/// The main bundle as downloaded, before it enters the cache.
#[derive(Debug, Clone)]
pub struct FetchedBundle {
    pub index_url: String,
    pub main_url: String,
    pub text: String,
}

/// Anything that can produce the current main bundle. The HTTP implementation
/// walks page → index → main; tests substitute in-memory fixtures.
#[async_trait]
pub trait BundleSource: Send + Sync {
    async fn fetch_bundle(&self) -> Result<FetchedBundle, FetchError>;
}

pub struct HttpBundleSource {
    client: reqwest::Client,
    page_url: String,
}

impl HttpBundleSource {
    pub fn new(client: reqwest::Client, page_url: impl Into<String>) -> Self {
        Self { client, page_url: page_url.into() }
    }
}

#[async_trait]
impl BundleSource for HttpBundleSource {
    async fn fetch_bundle(&self) -> Result<FetchedBundle, FetchError> {
        fetch_main_bundle(&self.client, &self.page_url).await
    }
}

pub async fn fetch_text(client: &reqwest::Client, url: &str, timeout: Duration) -> Result<String, FetchError> {
    let resp = client
        .get(url)
        .header("user-agent", USER_AGENT)
        .header("accept", "*/*")
        .header("cache-control", "no-cache")
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))?;

    if !resp.status().is_success() {
        return Err(FetchError::status(url, resp.status().as_u16()));
    }

    resp.text().await.map_err(|e| FetchError::from_reqwest(url, e))
}

/// `src="…/assets/index-<hash>.js"` in the entry HTML.
pub fn parse_index_ref(html: &str) -> Option<&str> {
    INDEX_SRC_RE.captures(html).and_then(|cap| cap.get(1)).map(|m| m.as_str())
}

/// First `assets/main-<hash>.js` mention in the index script.
pub fn parse_main_ref(index_js: &str) -> Option<&str> {
    MAIN_REF_RE.find(index_js).map(|m| m.as_str())
}

/// Resolves `assets/main-….js` against the directory that holds `assets/index-….js`.
pub fn resolve_main_url(index_url: &str, main_rel: &str) -> Result<String, FetchError> {
    let base = INDEX_TAIL_RE.replace(index_url, "/");
    let base = url::Url::parse(&base).map_err(|e| FetchError::new(index_url, e))?;
    base.join(main_rel)
        .map(String::from)
        .map_err(|e| FetchError::new(main_rel, e))
}

/// Page HTML → index script → main bundle URL.
pub async fn resolve_main_from_page(client: &reqwest::Client, page_url: &str) -> Result<(String, String), FetchError> {
    tracing::debug!("Resolving main bundle from {}", page_url);
    let html = fetch_text(client, page_url, PAGE_TIMEOUT).await?;

    let index_rel = parse_index_ref(&html).ok_or_else(|| FetchError::new(page_url, "index-*.js not found in HTML"))?;
    let index_url = url::Url::parse(page_url)
        .and_then(|base| base.join(index_rel))
        .map(String::from)
        .map_err(|e| FetchError::new(page_url, e))?;

    let index_js = fetch_text(client, &index_url, PAGE_TIMEOUT).await?;
    let main_rel = parse_main_ref(&index_js).ok_or_else(|| FetchError::new(&index_url, "main-*.js not found in index"))?;
    let main_url = resolve_main_url(&index_url, main_rel)?;

    tracing::debug!("Bundle URLs resolved: index={}, main={}", index_url, main_url);
    Ok((index_url, main_url))
}

pub async fn fetch_main_bundle(client: &reqwest::Client, page_url: &str) -> Result<FetchedBundle, FetchError> {
    let (index_url, main_url) = resolve_main_from_page(client, page_url).await?;
    let text = fetch_text(client, &main_url, BUNDLE_TIMEOUT).await?;
    tracing::info!(url = %main_url, size = text.len(), "Main bundle fetched");
    Ok(FetchedBundle { index_url, main_url, text })
}
