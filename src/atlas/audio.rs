//! Audio from the manifest's `audio` bundle: ambience/music tracks paired by
//! theme name, and the sound-effect sheet with its timing atlas.

use super::manifest::{Manifest, ManifestLoader};
use super::{fetch_json, join_url, KeyedCache};
use crate::error::FetchError;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

pub const AUDIO_BUNDLE: &str = "audio";
const SFX_ATLAS_TIMEOUT: Duration = Duration::from_secs(8);

static THEME_TRACK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^audio/(ambience|music)/(.+)\.mp3$").unwrap());
static SFX_AUDIO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^audio/sfx/sfx\.mp3$").unwrap());
static SFX_ATLAS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^audio/sfx/sfx\.json$").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioTheme {
    pub name: String,
    pub ambience: Option<String>,
    pub music: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SfxClip {
    pub name: String,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
}

/// Track URLs found in the audio bundle, before the sfx atlas is fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioSources {
    pub themes: Vec<AudioTheme>,
    pub sfx_audio_url: Option<String>,
    pub sfx_atlas_url: Option<String>,
}

impl AudioSources {
    pub fn from_manifest(base_url: &str, manifest: &Manifest) -> Result<Self, FetchError> {
        let bundle = manifest
            .bundle_by_name(AUDIO_BUNDLE)
            .ok_or_else(|| FetchError::new(base_url, "no 'audio' bundle in manifest"))?;

        let mut out = AudioSources::default();
        let mut by_name: HashMap<String, usize> = HashMap::new();
        for src in bundle.all_sources() {
            if let Some(caps) = THEME_TRACK_RE.captures(src) {
                let url = join_url(base_url, src)?;
                let name = caps[2].to_string();
                let idx = *by_name.entry(name.clone()).or_insert_with(|| {
                    out.themes.push(AudioTheme { name, ambience: None, music: None });
                    out.themes.len() - 1
                });
                let theme = &mut out.themes[idx];
                if caps[1].eq_ignore_ascii_case("ambience") {
                    theme.ambience = Some(url);
                } else {
                    theme.music = Some(url);
                }
            } else if SFX_AUDIO_RE.is_match(src) {
                out.sfx_audio_url = Some(join_url(base_url, src)?);
            } else if SFX_ATLAS_RE.is_match(src) {
                out.sfx_atlas_url = Some(join_url(base_url, src)?);
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub struct AudioCatalog {
    pub base_url: String,
    pub themes: Vec<AudioTheme>,
    pub sfx_url: Option<String>,
    pub sfx: Vec<SfxClip>,
}

fn seconds(v: Option<&Value>) -> Option<f64> {
    let n = match v? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// `[start, end]`, `{start, end}` or `{start, duration}`.
pub fn normalize_segment(seg: &Value) -> Option<(f64, f64)> {
    match seg {
        Value::Array(pair) if pair.len() >= 2 => Some((seconds(pair.first())?, seconds(pair.get(1))?)),
        Value::Object(obj) => {
            let start = seconds(obj.get("start"))?;
            let end = seconds(obj.get("end")).or_else(|| seconds(obj.get("duration")).map(|d| start + d))?;
            Some((start, end))
        }
        _ => None,
    }
}

fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

/// Clips of the sfx atlas in document order; malformed segments are dropped.
pub fn sfx_clips(atlas: &Value) -> Vec<SfxClip> {
    let Some(entries) = atlas.as_object() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|(name, seg)| {
            let (start, end) = normalize_segment(seg)?;
            Some(SfxClip {
                name: name.clone(),
                start: round2(start),
                end: round2(end),
                duration: round2((end - start).max(0.0)),
            })
        })
        .collect()
}

impl AudioCatalog {
    pub async fn load(client: &reqwest::Client, base_url: &str, manifest: &Manifest) -> Result<Self, FetchError> {
        let sources = AudioSources::from_manifest(base_url, manifest)?;
        let atlas = match &sources.sfx_atlas_url {
            Some(url) => Some(fetch_json(client, url, SFX_ATLAS_TIMEOUT).await?),
            None => None,
        };
        // clips are only useful alongside the sheet they index into
        let sfx = match (&atlas, &sources.sfx_audio_url) {
            (Some(atlas), Some(_)) => sfx_clips(atlas),
            _ => Vec::new(),
        };
        tracing::info!(base_url, themes = sources.themes.len(), sfx = sfx.len(), "Audio catalog built");
        Ok(Self { base_url: base_url.to_string(), themes: sources.themes, sfx_url: sources.sfx_audio_url, sfx })
    }

    pub fn payload(&self) -> Value {
        json!({
            "baseUrl": self.base_url,
            "themes": self.themes,
            "sfx": { "url": self.sfx_url, "items": self.sfx },
        })
    }
}

/// Audio catalog per asset base URL.
#[derive(Clone)]
pub struct AudioCache {
    manifests: ManifestLoader,
    cache: Arc<KeyedCache<Arc<AudioCatalog>>>,
}

impl AudioCache {
    pub fn new(manifests: ManifestLoader) -> Self {
        Self { manifests, cache: Arc::new(KeyedCache::default()) }
    }

    pub async fn get(&self, base_url: &str) -> Result<Arc<AudioCatalog>, FetchError> {
        let manifests = self.manifests.clone();
        let base = base_url.to_string();
        self.cache
            .get_or_load(base_url, move || async move {
                let manifest = manifests.load(&base).await?;
                let catalog = AudioCatalog::load(manifests.client(), &base, &manifest).await?;
                Ok(Arc::new(catalog))
            })
            .await
    }
}
