use crate::atlas::diff::AtlasChange;
use crate::atlas::types::StoredAtlases;
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const VERSION_FILE: &str = "version.json";
const ATLASES_FILE: &str = "atlases.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub version: String,
    pub last_updated: String,
}

/// Sync state kept under the data directory: the last known game version and
/// the atlas digests of the last successful export.
#[derive(Debug, Clone)]
pub struct StateStore {
    data_dir: PathBuf,
}

impl StateStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    async fn read_optional(&self, name: &str) -> Result<Option<String>> {
        let path = self.data_dir.join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("{} not found (first run)", path.display());
                Ok(None)
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .with_context(|| format!("creating {}", self.data_dir.display()))?;
        let path = self.data_dir.join(name);
        let text = serde_json::to_string_pretty(value)?;
        tokio::fs::write(&path, text)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub async fn load_version(&self) -> Result<Option<String>> {
        let Some(text) = self.read_optional(VERSION_FILE).await? else {
            return Ok(None);
        };
        let record: VersionRecord = serde_json::from_str(&text).context("parsing version.json")?;
        Ok(Some(record.version).filter(|v| !v.is_empty()))
    }

    pub async fn save_version(&self, version: &str) -> Result<()> {
        let record = VersionRecord {
            version: version.trim().to_string(),
            last_updated: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        self.write_json(VERSION_FILE, &record).await?;
        tracing::info!(version = %record.version, "Version saved");
        Ok(())
    }

    /// Compares against the stored version and records `current` when it differs.
    /// An unreadable record counts as no record.
    pub async fn version_changed(&self, current: &str) -> Result<bool> {
        let stored = self.load_version().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load stored version: {:#}", e);
            None
        });
        let changed = stored.as_deref() != Some(current);
        if changed && !current.is_empty() {
            self.save_version(current).await?;
            tracing::warn!(from = ?stored, to = %current, "Game version changed");
        }
        Ok(changed)
    }

    pub async fn load_atlases(&self) -> Result<StoredAtlases> {
        match self.read_optional(ATLASES_FILE).await? {
            Some(text) => serde_json::from_str(&text).context("parsing atlases.json"),
            None => Ok(BTreeMap::new()),
        }
    }

    pub async fn save_atlases(&self, atlases: &StoredAtlases) -> Result<()> {
        self.write_json(ATLASES_FILE, atlases).await?;
        tracing::info!(atlas_count = atlases.len(), "Atlases metadata saved");
        Ok(())
    }

    /// Merges the digests of processed atlases into the stored set.
    pub async fn update_atlases<'a>(
        &self,
        changes: impl IntoIterator<Item = (&'a String, &'a AtlasChange)>,
    ) -> Result<StoredAtlases> {
        let mut stored = self.load_atlases().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load stored atlases: {:#}", e);
            BTreeMap::new()
        });
        for (source, change) in changes {
            stored.insert(source.clone(), change.new_meta.clone());
        }
        self.save_atlases(&stored).await?;
        Ok(stored)
    }
}
