use super::catalog::{FrameEntry, SpriteCatalog};
use anyhow::{Context, Result};
use bytes::Bytes;
use image::imageops;
use image::RgbaImage;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const MAX_CONCURRENT: usize = 4;
const MAX_RETRIES: u32 = 3;
const IMAGE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub out_dir: PathBuf,
    /// Pad trimmed frames back to their `sourceSize`.
    pub restore_trim: bool,
    /// Export only these frame keys; `None` exports everything.
    pub only_keys: Option<BTreeSet<String>>,
}

impl ExportOptions {
    pub fn full(out_dir: impl Into<PathBuf>) -> Self {
        Self { out_dir: out_dir.into(), restore_trim: true, only_keys: None }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub base_url: String,
    pub exported: usize,
    pub atlases: usize,
    pub out_dir: PathBuf,
}

/// Replaces characters that are invalid in file names on common filesystems.
pub fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if (c as u32) < 0x20 => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// `safe_name` with any image extension replaced by `.png`.
pub fn png_file_name(name: &str) -> String {
    let safe = safe_name(name);
    let lower = safe.to_ascii_lowercase();
    let stem = [".png", ".webp", ".jpg", ".jpeg"]
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| &safe[..safe.len() - ext.len()])
        .unwrap_or(&safe);
    format!("{}.png", stem)
}

pub fn sprite_path(out_dir: &Path, cat: &str, name: &str) -> PathBuf {
    let cat = if cat.is_empty() { "misc" } else { cat };
    out_dir.join("sprite").join(safe_name(cat)).join(png_file_name(name))
}

/// Cuts one frame out of its atlas. Rotated frames are stored turned 90°
/// clockwise, so the stored rectangle has w/h swapped.
pub fn crop_frame(atlas: &RgbaImage, entry: &FrameEntry, restore_trim: bool) -> Option<RgbaImage> {
    let rect = entry.frame?;
    let (w, h) = if entry.rotated { (rect.h, rect.w) } else { (rect.w, rect.h) };
    let fits = |start: u32, len: u32, limit: u32| start.checked_add(len).is_some_and(|end| end <= limit);
    if w == 0 || h == 0 || !fits(rect.x, w, atlas.width()) || !fits(rect.y, h, atlas.height()) {
        return None;
    }

    let mut piece = imageops::crop_imm(atlas, rect.x, rect.y, w, h).to_image();
    if entry.rotated {
        piece = imageops::rotate270(&piece);
    }

    match (entry.source_size, entry.sprite_source_size) {
        (Some(size), Some(offset)) if restore_trim && entry.trimmed && size.w > 0 && size.h > 0 => {
            let mut canvas = RgbaImage::new(size.w, size.h);
            imageops::overlay(&mut canvas, &piece, i64::from(offset.x), i64::from(offset.y));
            Some(canvas)
        }
        _ => Some(piece),
    }
}

async fn download_with_retry(client: &Client, url: &str, max_retries: u32) -> Result<Bytes> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_millis(500 * 2u64.pow(attempt - 1));
            tokio::time::sleep(delay).await;
        }

        match client.get(url).timeout(IMAGE_TIMEOUT).send().await {
            Ok(resp) => {
                if resp.status() == reqwest::StatusCode::NOT_FOUND {
                    anyhow::bail!("404 Not Found: {}", url);
                }
                let resp = resp.error_for_status()?;
                return Ok(resp.bytes().await?);
            }
            Err(e) => {
                tracing::debug!("Attempt {} failed for {}: {}", attempt + 1, url, e);
                last_err = Some(e);
            }
        }
    }

    match last_err {
        Some(e) => Err(e.into()),
        None => anyhow::bail!("no attempt made for {}", url),
    }
}

/// Decodes the atlas and writes every frame of `list`. Runs on the blocking pool.
fn write_frames(bytes: &[u8], list: &[FrameEntry], opts: &ExportOptions, pb: &ProgressBar) -> Result<usize> {
    let atlas = image::load_from_memory(bytes).context("decoding atlas image")?.to_rgba8();
    let mut written = 0;

    for entry in list {
        pb.inc(1);
        let Some(sprite) = crop_frame(&atlas, entry, opts.restore_trim) else {
            tracing::warn!(key = %entry.key, "frame outside atlas bounds, skipped");
            continue;
        };
        let name = if entry.name.is_empty() { entry.id.as_str() } else { entry.name.as_str() };
        let dest = sprite_path(&opts.out_dir, &entry.cat, name);
        if let Some(dir) = dest.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        sprite
            .save_with_format(&dest, image::ImageFormat::Png)
            .with_context(|| format!("writing {}", dest.display()))?;
        written += 1;
    }
    Ok(written)
}

/// Writes the selected frames to `<out>/sprite/<cat>/<name>.png`, fetching
/// each atlas image once.
pub async fn export_sprites(client: &Client, catalog: &SpriteCatalog, opts: ExportOptions) -> Result<ExportReport> {
    let mut by_atlas: BTreeMap<String, Vec<FrameEntry>> = BTreeMap::new();
    for entry in catalog.frames() {
        let (Some(url), Some(_)) = (&entry.url, entry.frame) else {
            continue;
        };
        if let Some(keys) = &opts.only_keys {
            if !keys.contains(&entry.key) {
                continue;
            }
        }
        by_atlas.entry(url.clone()).or_default().push(entry.clone());
    }

    tokio::fs::create_dir_all(&opts.out_dir)
        .await
        .with_context(|| format!("creating {}", opts.out_dir.display()))?;

    let total: usize = by_atlas.values().map(Vec::len).sum();
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed}] {bar:30} {pos}/{len} sprites")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let atlases = by_atlas.len();
    let opts = Arc::new(opts);
    let sem = Arc::new(Semaphore::new(MAX_CONCURRENT));
    let mut handles = Vec::new();

    for (url, list) in by_atlas {
        let client = client.clone();
        let opts = opts.clone();
        let sem = sem.clone();
        let pb = pb.clone();

        handles.push(tokio::spawn(async move {
            let _permit = sem.acquire_owned().await?;
            let bytes = download_with_retry(&client, &url, MAX_RETRIES)
                .await
                .with_context(|| format!("downloading atlas {}", url))?;
            tokio::task::spawn_blocking(move || write_frames(&bytes, &list, &opts, &pb)).await?
        }));
    }

    // drain every task before reporting so no atlas is still writing
    let mut exported = 0;
    let mut first_err = None;
    for handle in handles {
        match handle.await.map_err(anyhow::Error::from).and_then(|r| r) {
            Ok(n) => exported += n,
            Err(e) => {
                tracing::warn!("Atlas export failed: {:#}", e);
                first_err.get_or_insert(e);
            }
        }
    }

    pb.finish_with_message(format!("{} sprites exported", exported));
    if let Some(err) = first_err {
        return Err(err);
    }

    Ok(ExportReport {
        base_url: catalog.base_url.clone(),
        exported,
        atlases,
        out_dir: std::path::absolute(&opts.out_dir).unwrap_or_else(|_| opts.out_dir.clone()),
    })
}
