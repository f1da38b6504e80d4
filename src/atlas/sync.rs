use super::catalog::CatalogCache;
use super::diff::compare_all_atlases;
use super::export::{export_sprites, ExportOptions};
use super::manifest::ManifestLoader;
use super::types::AtlasDocument;
use super::{fetch_json, join_url};
use crate::game::version::asset_base_url;
use crate::game::{StateStore, VersionClient};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

pub const SYNC_WATCHDOG: Duration = Duration::from_secs(5 * 60);
const ATLAS_JSON_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    VersionUnchanged,
    NoSpriteChanges,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum SyncOutcome {
    Success {
        exported: usize,
        added: usize,
        modified: usize,
        removed: usize,
        elapsed_ms: u64,
        full_export: bool,
    },
    Skipped {
        reason: SkipReason,
        version_updated: bool,
    },
    Error {
        message: String,
    },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SyncOutcome::Error { .. })
    }
}

/// Clears the running flag and disarms the watchdog however the sync ends.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    watchdog: JoinHandle<()>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.watchdog.abort();
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Keeps exported sprites in step with the live game version. One sync runs at
/// a time; a sync that outlives the watchdog terminates the process.
pub struct SpriteSync {
    versions: VersionClient,
    store: StateStore,
    catalogs: CatalogCache,
    export_dir: PathBuf,
    watchdog: Duration,
    running: AtomicBool,
}

impl SpriteSync {
    pub fn new(versions: VersionClient, store: StateStore, catalogs: CatalogCache, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            versions,
            store,
            catalogs,
            export_dir: export_dir.into(),
            watchdog: SYNC_WATCHDOG,
            running: AtomicBool::new(false),
        }
    }

    pub fn versions(&self) -> &VersionClient {
        &self.versions
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn manifests(&self) -> &ManifestLoader {
        self.catalogs.manifests()
    }

    /// Runs one sync. Returns `None` when another sync is already in progress.
    pub async fn sync(&self, force: bool) -> Option<SyncOutcome> {
        if self.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            tracing::warn!("Sprite sync already in progress, ignoring duplicate request");
            return None;
        }

        let limit = self.watchdog;
        let _guard = RunGuard {
            running: &self.running,
            watchdog: tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                tracing::error!("Sprite sync timeout after {:?}, forcing exit", limit);
                std::process::exit(1);
            }),
        };

        Some(match self.run(force).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Sprite sync failed: {:#}", e);
                SyncOutcome::Error { message: format!("{:#}", e) }
            }
        })
    }

    async fn run(&self, force: bool) -> Result<SyncOutcome> {
        let current = self.versions.current().await.context("fetching game version")?;
        let stored = self.store.load_version().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load stored version: {:#}", e);
            None
        });
        let version_changed = stored.as_deref() != Some(current.as_str());
        tracing::info!(current = %current, stored = ?stored, version_changed, force, "Version check");

        if !version_changed && !force {
            tracing::info!("Version unchanged, skipping sprite sync");
            return Ok(SyncOutcome::Skipped { reason: SkipReason::VersionUnchanged, version_updated: false });
        }

        let base_url = asset_base_url(self.versions.origin(), &current);
        tracing::info!(base_url = %base_url, "Fetching atlas metadata for comparison");
        let atlases = self.fetch_all_atlases(&base_url).await?;
        let stored_atlases = self.store.load_atlases().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load stored atlases: {:#}", e);
            Default::default()
        });

        let comparison = compare_all_atlases(&atlases, &stored_atlases);
        tracing::info!(
            has_changes = comparison.has_changes,
            frames_to_export = comparison.frames_to_export.len(),
            added = comparison.summary.total_added,
            modified = comparison.summary.total_modified,
            removed = comparison.summary.total_removed,
            "Atlas comparison result"
        );

        if !comparison.has_changes && !force {
            tracing::info!("No sprite changes detected, updating version only");
            self.store.save_version(&current).await?;
            return Ok(SyncOutcome::Skipped { reason: SkipReason::NoSpriteChanges, version_updated: true });
        }

        // forced with nothing changed means the export directory needs rebuilding
        let full_export = force && !comparison.has_changes;
        if full_export {
            tracing::info!(export_dir = %self.export_dir.display(), "Starting full sprite export");
        } else {
            tracing::info!(frames = comparison.frames_to_export.len(), "Starting selective sprite export");
        }

        let started = Instant::now();
        let catalog = self.catalogs.get(&base_url).await.context("loading sprite catalog")?;
        let opts = ExportOptions {
            out_dir: self.export_dir.clone(),
            restore_trim: true,
            only_keys: (!full_export).then(|| comparison.frames_to_export.clone()),
        };
        let report = export_sprites(self.manifests().client(), &catalog, opts).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        self.store.update_atlases(&comparison.atlas_changes).await?;
        self.store.save_version(&current).await?;

        tracing::info!(
            exported = report.exported,
            atlases = report.atlases,
            elapsed_ms,
            "Sprite export completed"
        );

        Ok(SyncOutcome::Success {
            exported: report.exported,
            added: comparison.summary.total_added,
            modified: comparison.summary.total_modified,
            removed: comparison.summary.total_removed,
            elapsed_ms,
            full_export,
        })
    }

    /// Every atlas JSON of the default bundle. A missing manifest is fatal;
    /// individual atlases that fail are skipped.
    async fn fetch_all_atlases(&self, base_url: &str) -> Result<Vec<(String, AtlasDocument)>> {
        let manifest = self.manifests().load(base_url).await.context("loading asset manifest")?;
        let bundle = manifest
            .default_bundle()
            .ok_or_else(|| anyhow!("no 'default' bundle in manifest"))?;
        let files = bundle.atlas_files();
        tracing::debug!(atlas_files = ?files, "Atlas files to fetch");

        let client = self.manifests().client();
        let mut out = Vec::new();
        for file in files {
            let loaded = async {
                let url = join_url(base_url, &file)?;
                let raw = fetch_json(client, &url, ATLAS_JSON_TIMEOUT).await?;
                anyhow::Ok(AtlasDocument::from_value(raw)?)
            }
            .await;
            match loaded {
                Ok(doc) => {
                    tracing::debug!(file = %file, frames = doc.frames.len(), "Atlas loaded");
                    out.push((file, doc));
                }
                Err(e) => tracing::warn!(file = %file, "Failed to fetch atlas, skipping: {:#}", e),
            }
        }
        Ok(out)
    }

    /// Whether `<export>/sprite` is missing or empty.
    pub async fn needs_initial_export(&self) -> bool {
        needs_initial_export(&self.export_dir).await
    }

    /// Sync run when the live connection opens; forced when nothing has been
    /// exported yet.
    pub async fn check_on_connect(&self) -> Option<SyncOutcome> {
        tracing::info!("Checking sprites on connection");
        let force = self.needs_initial_export().await;
        if force {
            tracing::info!(export_dir = %self.export_dir.display(), "Sprites directory missing or empty, forcing full export");
        }
        let outcome = self.sync(force).await;
        if let Some(SyncOutcome::Success { exported, added, modified, .. }) = &outcome {
            tracing::info!(exported, added, modified, "Sprites synced on connect");
        }
        outcome
    }

    /// Forced sync after the server rejected our version. Returns true when the
    /// process should restart to pick up the new build.
    pub async fn handle_version_mismatch(&self) -> bool {
        match self.sync(true).await {
            Some(SyncOutcome::Success { .. }) | Some(SyncOutcome::Skipped { .. }) => true,
            Some(SyncOutcome::Error { .. }) | None => false,
        }
    }

    /// After an ordinary disconnect: re-read the live version and sync only if
    /// it moved away from the stored one (or `fallback` when nothing is stored).
    pub async fn check_after_disconnect(&self, fallback: Option<&str>) -> Option<SyncOutcome> {
        self.versions.invalidate();
        let latest = match self.versions.current().await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("Failed version check after disconnect: {}", e);
                return None;
            }
        };
        let previous = match self.store.load_version().await {
            Ok(Some(v)) => Some(v),
            _ => fallback.map(str::to_string),
        };
        let Some(previous) = previous else {
            tracing::debug!(latest = %latest, "Skipping sprite sync check after disconnect (no stored version)");
            return None;
        };
        if previous == latest {
            tracing::debug!(version = %latest, "Game version unchanged after disconnect");
            return None;
        }
        tracing::warn!(from = %previous, to = %latest, "Game version changed after disconnect, syncing sprites");
        self.sync(false).await
    }
}

pub async fn needs_initial_export(export_dir: &Path) -> bool {
    let sprite_dir = export_dir.join("sprite");
    match tokio::fs::read_dir(&sprite_dir).await {
        Ok(mut entries) => !matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn initial_export_needed_until_something_is_written() {
        let dir = tempfile::tempdir().unwrap();
        assert!(needs_initial_export(dir.path()).await);
        std::fs::create_dir_all(dir.path().join("sprite")).unwrap();
        assert!(needs_initial_export(dir.path()).await);
        std::fs::create_dir_all(dir.path().join("sprite/plants")).unwrap();
        assert!(!needs_initial_export(dir.path()).await);
    }

    #[test]
    fn outcomes_serialize_with_status_tag() {
        let skipped = SyncOutcome::Skipped { reason: SkipReason::NoSpriteChanges, version_updated: true };
        assert_eq!(
            serde_json::to_value(&skipped).unwrap(),
            json!({"status": "skipped", "reason": "no_sprite_changes", "versionUpdated": true})
        );
        let err = SyncOutcome::Error { message: "boom".into() };
        assert_eq!(serde_json::to_value(&err).unwrap(), json!({"status": "error", "message": "boom"}));
    }
}
