//! Cosmetic images from the manifest's `cosmetic` bundle. Files are named
//! `cosmetic/<cat>_<name>.png`.

use super::manifest::{Manifest, ManifestLoader};
use super::{join_url, KeyedCache};
use crate::error::FetchError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, LazyLock};

pub const COSMETIC_BUNDLE: &str = "cosmetic";

static COSMETIC_SRC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^cosmetic/.+\.png$").unwrap());

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CosmeticsQuery {
    #[serde(default, deserialize_with = "super::catalog::query_flag")]
    pub full: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cosmetic {
    pub cat: String,
    pub name: String,
    pub base: String,
    pub src: String,
    pub url: String,
}

/// Cosmetics in manifest order.
#[derive(Debug, Clone)]
pub struct CosmeticCatalog {
    pub base_url: String,
    pub items: Vec<Cosmetic>,
}

impl CosmeticCatalog {
    pub fn from_manifest(base_url: &str, manifest: &Manifest) -> Result<Self, FetchError> {
        let bundle = manifest
            .bundle_by_name(COSMETIC_BUNDLE)
            .ok_or_else(|| FetchError::new(base_url, "no 'cosmetic' bundle in manifest"))?;

        let mut items = Vec::new();
        for src in bundle.all_sources() {
            if !COSMETIC_SRC_RE.is_match(src) {
                continue;
            }
            let file = src.rsplit('/').next().unwrap_or(src);
            let base = &file[..file.len() - ".png".len()];
            let Some((cat, name)) = base.split_once('_') else {
                continue;
            };
            items.push(Cosmetic {
                cat: cat.to_string(),
                name: name.to_string(),
                base: base.to_string(),
                src: src.to_string(),
                url: join_url(base_url, src)?,
            });
        }

        tracing::info!(base_url, count = items.len(), "Cosmetics catalog built");
        Ok(Self { base_url: base_url.to_string(), items })
    }

    /// Grouped by category in order of first appearance. Without `full` each
    /// item is reduced to `id`, `name` and `url`.
    pub fn payload(&self, full: bool) -> Value {
        let mut groups: Vec<(&str, Vec<Value>)> = Vec::new();
        for item in &self.items {
            let rendered = if full {
                serde_json::to_value(item).unwrap_or(Value::Null)
            } else {
                json!({ "id": item.base, "name": item.name, "url": item.url })
            };
            match groups.iter_mut().find(|(cat, _)| *cat == item.cat) {
                Some((_, list)) => list.push(rendered),
                None => groups.push((item.cat.as_str(), vec![rendered])),
            }
        }
        let categories: Vec<Value> =
            groups.into_iter().map(|(cat, items)| json!({ "cat": cat, "items": items })).collect();
        json!({ "baseUrl": self.base_url, "count": self.items.len(), "categories": categories })
    }
}

/// Cosmetics per asset base URL.
#[derive(Clone)]
pub struct CosmeticsCache {
    manifests: ManifestLoader,
    cache: Arc<KeyedCache<Arc<CosmeticCatalog>>>,
}

impl CosmeticsCache {
    pub fn new(manifests: ManifestLoader) -> Self {
        Self { manifests, cache: Arc::new(KeyedCache::default()) }
    }

    pub async fn get(&self, base_url: &str) -> Result<Arc<CosmeticCatalog>, FetchError> {
        let manifests = self.manifests.clone();
        let base = base_url.to_string();
        self.cache
            .get_or_load(base_url, move || async move {
                let manifest = manifests.load(&base).await?;
                Ok(Arc::new(CosmeticCatalog::from_manifest(&base, &manifest)?))
            })
            .await
    }
}
