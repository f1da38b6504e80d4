//! TexturePacker-style atlas documents and the digest persisted between syncs.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(default)]
    pub frame: Option<FrameRect>,
    #[serde(default)]
    pub rotated: bool,
    #[serde(default)]
    pub trimmed: bool,
    #[serde(default)]
    pub source_size: Option<Size>,
    #[serde(default)]
    pub sprite_source_size: Option<FrameRect>,
    #[serde(default)]
    pub anchor: Option<Anchor>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AtlasMeta {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub related_multi_packs: Vec<String>,
}

/// A fetched atlas JSON. Frames keep document order; `raw` is kept for the
/// whole-document hash.
#[derive(Debug, Clone)]
pub struct AtlasDocument {
    pub frames: Vec<(String, Frame)>,
    pub animations: Vec<(String, Vec<String>)>,
    pub meta: AtlasMeta,
    pub raw: Value,
}

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default, deserialize_with = "ordered_entries")]
    frames: Vec<(String, Frame)>,
    #[serde(default, deserialize_with = "ordered_entries")]
    animations: Vec<(String, Vec<String>)>,
    #[serde(default)]
    meta: AtlasMeta,
}

fn ordered_entries<'de, D, T>(de: D) -> Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let map = Option::<Map<String, Value>>::deserialize(de)?.unwrap_or_default();
    map.into_iter()
        .map(|(k, v)| serde_json::from_value(v).map(|t| (k, t)).map_err(serde::de::Error::custom))
        .collect()
}

impl AtlasDocument {
    pub fn from_value(raw: Value) -> Result<Self, serde_json::Error> {
        let doc = RawDocument::deserialize(&raw)?;
        Ok(Self { frames: doc.frames, animations: doc.animations, meta: doc.meta, raw })
    }

    pub fn frame(&self, key: &str) -> Option<&Frame> {
        self.frames.iter().find(|(k, _)| k == key).map(|(_, f)| f)
    }

    pub fn frame_keys(&self) -> impl Iterator<Item = &str> {
        self.frames.iter().map(|(k, _)| k.as_str())
    }
}

/// Digest of one atlas as stored in `atlases.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasMetadata {
    pub source_json: String,
    pub hash: String,
    pub frame_count: usize,
    /// frame key → short content hash
    #[serde(default)]
    pub frames: BTreeMap<String, String>,
    pub last_updated: String,
}

/// source path → digest
pub type StoredAtlases = BTreeMap<String, AtlasMetadata>;
