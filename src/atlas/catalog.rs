use super::manifest::{Manifest, ManifestLoader};
use super::types::{Anchor, AtlasDocument, FrameRect, Size};
use super::{fetch_json, join_url, KeyedCache};
use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const ATLAS_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameEntry {
    pub cat: String,
    pub id: String,
    pub name: String,
    pub key: String,
    pub source_json: String,
    pub atlas_image_src: Option<String>,
    pub url: Option<String>,
    pub frame: Option<FrameRect>,
    pub rotated: bool,
    pub trimmed: bool,
    pub anchor: Option<Anchor>,
    pub source_size: Option<Size>,
    pub sprite_source_size: Option<FrameRect>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationEntry {
    pub cat: String,
    pub id: String,
    pub name: String,
    pub key: String,
    pub frames: Vec<String>,
    pub source_json: String,
    pub atlas_image_src: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SpriteEntry {
    Frame(FrameEntry),
    Animation(AnimationEntry),
}

impl SpriteEntry {
    pub fn cat(&self) -> &str {
        match self {
            SpriteEntry::Frame(f) => &f.cat,
            SpriteEntry::Animation(a) => &a.cat,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SpriteEntry::Frame(f) => &f.id,
            SpriteEntry::Animation(a) => &a.id,
        }
    }

    /// Reduced view used when the caller did not ask for full records.
    fn compact(&self) -> Value {
        match self {
            SpriteEntry::Frame(f) => json!({
                "type": "frame",
                "id": f.id,
                "name": f.name,
                "url": f.url,
                "frame": f.frame,
            }),
            SpriteEntry::Animation(a) => json!({
                "type": "animation",
                "id": a.id,
                "name": a.name,
                "url": a.url,
                "frames": a.frames,
            }),
        }
    }
}

/// Last path segment of a frame key.
pub fn normalize_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Export directory for a frame key: `sprite/<group>/<name>` groups map to
/// plural folder names; weather frames and the tiles atlas get their own.
pub fn category_for(key: &str, source_json: &str) -> String {
    if key.is_empty() {
        return "misc".to_string();
    }
    if key.starts_with("weather/") {
        return "weather".to_string();
    }
    if source_json.contains("tiles") {
        return "tiles".to_string();
    }
    let Some(rest) = key.strip_prefix("sprite/") else {
        return "misc".to_string();
    };
    let group = rest.split('/').next().filter(|g| !g.is_empty()).unwrap_or("misc");
    group_category(group).to_string()
}

/// Folder name for a `sprite/<group>/…` group.
pub fn group_category(group: &str) -> &str {
    match group {
        "seed" => "seeds",
        "mutation" | "mutation-overlay" => "mutations",
        "plant" => "plants",
        "tallplant" => "tallPlants",
        "pet" => "pets",
        "object" => "objects",
        "item" => "items",
        "animation" => "animations",
        other => other,
    }
}

/// `meta.image` is relative to the directory of the atlas JSON.
pub fn resolve_meta_image(source_json: &str, image: &str) -> String {
    let dir = match source_json.rfind('/') {
        Some(i) => &source_json[..=i],
        None => "",
    };
    format!("{}{}", dir, image.trim_start_matches('/'))
}

/// Query-string switch: only `1` and `true` turn it on.
pub(crate) fn query_flag<'de, D: serde::Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    let raw = Option::<String>::deserialize(de)?;
    Ok(matches!(raw.as_deref().map(str::trim), Some("1") | Some("true")))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogQuery {
    #[serde(default, deserialize_with = "query_flag")]
    pub full: bool,
    #[serde(default, deserialize_with = "query_flag")]
    pub flat: bool,
    #[serde(default)]
    pub cat: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

/// Every frame and animation of the default bundle's atlases, in manifest order.
#[derive(Debug, Clone)]
pub struct SpriteCatalog {
    pub base_url: String,
    pub entries: Vec<SpriteEntry>,
}

impl SpriteCatalog {
    pub async fn load(client: &reqwest::Client, base_url: &str, manifest: &Manifest) -> Result<Self, FetchError> {
        let bundle = manifest
            .default_bundle()
            .ok_or_else(|| FetchError::new(base_url, "no 'default' bundle in manifest"))?;

        let mut catalog = SpriteCatalog { base_url: base_url.to_string(), entries: Vec::new() };
        let mut loaded: HashSet<String> = HashSet::new();
        // (path, optional) stack; related packs are pushed after their parent
        let mut queue: Vec<(String, bool)> =
            bundle.json_files().into_iter().rev().map(|s| (s.to_string(), false)).collect();

        while let Some((src, optional)) = queue.pop() {
            if !loaded.insert(src.clone()) {
                continue;
            }
            let url = join_url(base_url, &src)?;
            let raw = match fetch_json(client, &url, ATLAS_TIMEOUT).await {
                Ok(raw) => raw,
                Err(e) if optional => {
                    tracing::debug!(src = %src, "optional atlas pack unavailable: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let doc = match AtlasDocument::from_value(raw) {
                Ok(doc) => doc,
                Err(e) if optional => {
                    tracing::debug!(src = %src, "optional atlas pack malformed: {}", e);
                    continue;
                }
                Err(e) => return Err(FetchError::new(url, e)),
            };

            catalog.add_document(base_url, &src, &doc);
            for rel in doc.meta.related_multi_packs.iter().rev() {
                queue.push((rel.clone(), true));
            }
        }

        tracing::info!(base_url, entries = catalog.entries.len(), "Sprite catalog loaded");
        Ok(catalog)
    }

    pub fn add_document(&mut self, base_url: &str, source_json: &str, doc: &AtlasDocument) {
        let image_src = doc.meta.image.as_deref().map(|img| resolve_meta_image(source_json, img));
        let url = image_src.as_deref().and_then(|src| join_url(base_url, src).ok());

        for (key, f) in &doc.frames {
            self.entries.push(SpriteEntry::Frame(FrameEntry {
                cat: category_for(key, source_json),
                id: key.clone(),
                name: normalize_name(key).to_string(),
                key: key.clone(),
                source_json: source_json.to_string(),
                atlas_image_src: image_src.clone(),
                url: url.clone(),
                frame: f.frame,
                rotated: f.rotated,
                trimmed: f.trimmed,
                anchor: f.anchor,
                source_size: f.source_size,
                sprite_source_size: f.sprite_source_size,
            }));
        }

        for (name, frames) in &doc.animations {
            if frames.is_empty() {
                continue;
            }
            self.entries.push(SpriteEntry::Animation(AnimationEntry {
                cat: "animations".to_string(),
                id: name.clone(),
                name: normalize_name(name).to_string(),
                key: name.clone(),
                frames: frames.clone(),
                source_json: source_json.to_string(),
                atlas_image_src: image_src.clone(),
                url: url.clone(),
            }));
        }
    }

    pub fn frames(&self) -> impl Iterator<Item = &FrameEntry> {
        self.entries.iter().filter_map(|e| match e {
            SpriteEntry::Frame(f) => Some(f),
            SpriteEntry::Animation(_) => None,
        })
    }

    /// Filtered listing, grouped by category in order of first appearance
    /// unless `flat` is set.
    pub fn payload(&self, query: &CatalogQuery) -> Value {
        let search = query.search.as_deref().unwrap_or("").trim().to_lowercase();
        let cat = query.cat.as_deref().unwrap_or("").trim();

        let selected: Vec<&SpriteEntry> = self
            .entries
            .iter()
            .filter(|e| cat.is_empty() || e.cat() == cat)
            .filter(|e| search.is_empty() || e.id().to_lowercase().contains(&search))
            .collect();

        let render = |e: &SpriteEntry| {
            if query.full {
                serde_json::to_value(e).unwrap_or(Value::Null)
            } else {
                e.compact()
            }
        };

        if query.flat {
            let items: Vec<Value> = selected.iter().map(|e| render(*e)).collect();
            return json!({ "baseUrl": self.base_url, "count": items.len(), "items": items });
        }

        let mut groups: Vec<(&str, Vec<Value>)> = Vec::new();
        for e in &selected {
            match groups.iter_mut().find(|(c, _)| *c == e.cat()) {
                Some((_, items)) => items.push(render(*e)),
                None => groups.push((e.cat(), vec![render(*e)])),
            }
        }
        let categories: Vec<Value> =
            groups.into_iter().map(|(cat, items)| json!({ "cat": cat, "items": items })).collect();
        json!({ "baseUrl": self.base_url, "count": selected.len(), "categories": categories })
    }
}

/// Catalog per asset base URL, built once per game version.
#[derive(Clone)]
pub struct CatalogCache {
    manifests: ManifestLoader,
    cache: Arc<KeyedCache<Arc<SpriteCatalog>>>,
}

impl CatalogCache {
    pub fn new(manifests: ManifestLoader) -> Self {
        Self { manifests, cache: Arc::new(KeyedCache::default()) }
    }

    pub fn manifests(&self) -> &ManifestLoader {
        &self.manifests
    }

    pub async fn get(&self, base_url: &str) -> Result<Arc<SpriteCatalog>, FetchError> {
        let manifests = self.manifests.clone();
        let base = base_url.to_string();
        self.cache
            .get_or_load(base_url, move || async move {
                let manifest = manifests.load(&base).await?;
                let catalog = SpriteCatalog::load(manifests.client(), &base, &manifest).await?;
                Ok(Arc::new(catalog))
            })
            .await
    }
}
