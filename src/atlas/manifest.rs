use super::{fetch_json, join_url, KeyedCache};
use crate::error::FetchError;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub const MANIFEST_FILENAME: &str = "manifest.json";
const MANIFEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Path fragments that mark an asset as part of a sprite atlas.
const ATLAS_MARKERS: &[&str] = &["sprite", "tiles", "weather"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub bundles: Vec<ManifestBundle>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestBundle {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub assets: Vec<ManifestAsset>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestAsset {
    #[serde(default, deserialize_with = "string_list")]
    pub src: Vec<String>,
}

/// Keeps only the string members of `src`; anything else is an empty list.
fn string_list<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(de)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

impl Manifest {
    pub fn bundle_by_name(&self, name: &str) -> Option<&ManifestBundle> {
        self.bundles.iter().find(|b| b.name.as_deref() == Some(name))
    }

    pub fn default_bundle(&self) -> Option<&ManifestBundle> {
        self.bundle_by_name("default")
    }
}

impl ManifestBundle {
    /// Every distinct source path, in manifest order.
    pub fn all_sources(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.assets
            .iter()
            .flat_map(|a| a.src.iter())
            .map(String::as_str)
            .filter(|src| seen.insert(*src))
            .collect()
    }

    /// JSON sources in manifest order, excluding the manifest itself.
    pub fn json_files(&self) -> Vec<&str> {
        self.all_sources()
            .into_iter()
            .filter(|src| src.ends_with(".json") && *src != MANIFEST_FILENAME)
            .collect()
    }

    /// Atlas JSON files: the listed sprite/tiles/weather JSON plus a `.json`
    /// companion guessed for every matching `.webp` image.
    pub fn atlas_files(&self) -> Vec<String> {
        let is_atlas = |src: &str| ATLAS_MARKERS.iter().any(|m| src.contains(m));

        let mut out: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |path: String| {
            if seen.insert(path.clone()) {
                out.push(path);
            }
        };

        for src in self.json_files().into_iter().filter(|s| is_atlas(*s)) {
            push(src.to_string());
        }
        for src in self.all_sources().into_iter().filter(|s| s.ends_with(".webp") && is_atlas(*s)) {
            push(src.replacen(".webp", ".json", 1));
        }
        out
    }
}

/// Manifest per asset base URL, fetched once.
#[derive(Clone)]
pub struct ManifestLoader {
    client: reqwest::Client,
    cache: Arc<KeyedCache<Arc<Manifest>>>,
}

impl ManifestLoader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client, cache: Arc::new(KeyedCache::default()) }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn load(&self, base_url: &str) -> Result<Arc<Manifest>, FetchError> {
        let client = self.client.clone();
        let url = join_url(base_url, MANIFEST_FILENAME)?;
        self.cache
            .get_or_load(base_url, move || async move {
                tracing::debug!(url = %url, "Fetching asset manifest");
                let raw = fetch_json(&client, &url, MANIFEST_TIMEOUT).await?;
                let manifest: Manifest =
                    serde_json::from_value(raw).map_err(|e| FetchError::new(&url, e))?;
                Ok(Arc::new(manifest))
            })
            .await
    }
}
