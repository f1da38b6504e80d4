use super::types::{AtlasDocument, AtlasMetadata, Frame, StoredAtlases};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

const FRAME_HASH_LEN: usize = 12;

/// Short hash over the fields that change a frame's exported pixels.
pub fn hash_frame(frame: &Frame) -> String {
    let data = json!({
        "frame": frame.frame,
        "rotated": frame.rotated,
        "trimmed": frame.trimmed,
        "sourceSize": frame.source_size,
        "spriteSourceSize": frame.sprite_source_size,
        "anchor": frame.anchor,
    });
    let digest = hex::encode(Sha256::digest(data.to_string().as_bytes()));
    digest[..FRAME_HASH_LEN].to_string()
}

pub fn hash_document(doc: &AtlasDocument) -> String {
    hex::encode(Sha256::digest(doc.raw.to_string().as_bytes()))
}

pub fn build_atlas_metadata(doc: &AtlasDocument, source_json: &str) -> AtlasMetadata {
    let frames: BTreeMap<String, String> =
        doc.frames.iter().map(|(key, frame)| (key.clone(), hash_frame(frame))).collect();
    AtlasMetadata {
        source_json: source_json.to_string(),
        hash: hash_document(doc),
        frame_count: frames.len(),
        frames,
        last_updated: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasDiff {
    pub changed: bool,
    pub is_new: bool,
    pub hash_changed: bool,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

pub fn compare_atlas(new_meta: &AtlasMetadata, stored: Option<&AtlasMetadata>) -> AtlasDiff {
    let Some(stored) = stored else {
        return AtlasDiff {
            changed: true,
            is_new: true,
            hash_changed: true,
            added: new_meta.frames.keys().cloned().collect(),
            ..Default::default()
        };
    };

    if new_meta.hash == stored.hash {
        return AtlasDiff::default();
    }

    let mut diff = AtlasDiff { hash_changed: true, ..Default::default() };
    for (key, hash) in &new_meta.frames {
        match stored.frames.get(key) {
            None => diff.added.push(key.clone()),
            Some(old) if old != hash => diff.modified.push(key.clone()),
            Some(_) => {}
        }
    }
    diff.removed = stored
        .frames
        .keys()
        .filter(|key| !new_meta.frames.contains_key(*key))
        .cloned()
        .collect();
    diff.changed = !diff.added.is_empty() || !diff.modified.is_empty() || !diff.removed.is_empty();
    diff
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasChange {
    pub new_meta: AtlasMetadata,
    pub diff: AtlasDiff,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub total_added: usize,
    pub total_modified: usize,
    pub total_removed: usize,
    pub atlases_changed: usize,
    pub atlases_unchanged: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasComparison {
    pub has_changes: bool,
    pub atlas_changes: BTreeMap<String, AtlasChange>,
    pub frames_to_export: BTreeSet<String>,
    pub removed_frames: BTreeSet<String>,
    pub summary: DiffSummary,
}

/// Diffs every freshly fetched atlas against its stored digest.
pub fn compare_all_atlases(atlases: &[(String, AtlasDocument)], stored: &StoredAtlases) -> AtlasComparison {
    let mut out = AtlasComparison::default();

    for (source_json, doc) in atlases {
        let new_meta = build_atlas_metadata(doc, source_json);
        let diff = compare_atlas(&new_meta, stored.get(source_json));

        if diff.changed {
            out.has_changes = true;
            out.summary.atlases_changed += 1;
            out.summary.total_added += diff.added.len();
            out.summary.total_modified += diff.modified.len();
            out.summary.total_removed += diff.removed.len();
            out.frames_to_export.extend(diff.added.iter().cloned());
            out.frames_to_export.extend(diff.modified.iter().cloned());
            out.removed_frames.extend(diff.removed.iter().cloned());
        } else {
            out.summary.atlases_unchanged += 1;
        }

        out.atlas_changes.insert(source_json.clone(), AtlasChange { new_meta, diff });
    }

    out
}
