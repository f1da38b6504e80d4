//! Maps data keys (`OrangeTulip`) to exported sprite file names (`Tulip`).
//! Exact match wins, then known name variations, then the closest name by
//! edit distance.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub const MIN_SIMILARITY: f64 = 0.6;

const COLOR_PREFIXES: &[&str] = &[
    "Orange", "Red", "Blue", "Yellow", "Green", "Purple", "Pink", "White", "Black", "Dawn", "Moon", "Violet",
];

const SUFFIXES: &[&str] = &["Plant", "Tree", "Bush", "Hedge", "Cutting", "Spore"];

/// Case-insensitive similarity in `[0, 1]`: one minus the Levenshtein distance
/// over the longer length.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    if a == b {
        return 1.0;
    }
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    1.0 - prev[b.len()] as f64 / max_len as f64
}

/// Candidate file names for a key, the key itself first.
pub fn base_names(key: &str) -> Vec<String> {
    let mut out = vec![key.to_string()];

    for color in COLOR_PREFIXES {
        if let Some(rest) = key.strip_prefix(color) {
            if !rest.is_empty() {
                out.push(rest.to_string());
            }
        }
    }

    for suffix in SUFFIXES {
        match key.strip_suffix(suffix) {
            Some(stem) => out.push(stem.to_string()),
            None => out.push(format!("{}{}", key, suffix)),
        }
    }

    if key.contains("Celestial") {
        out.push(key.replacen("Celestial", "", 1));
        out.push(key.replacen("Celestial", "CelestialPlant", 1));
        out.push(key.replacen("Celestial", "CelestialCrop", 1));
    }

    let mut seen = HashSet::new();
    out.retain(|name| seen.insert(name.clone()));
    out
}

pub fn find_best_match<'a>(key: &str, available: &'a [String], min_similarity: f64) -> Option<&'a str> {
    let exact = |name: &str| available.iter().find(|s| s.eq_ignore_ascii_case(name));

    if let Some(hit) = exact(key) {
        return Some(hit.as_str());
    }

    let names = base_names(key);
    if let Some(hit) = names.iter().find_map(|name| exact(name.as_str())) {
        return Some(hit.as_str());
    }

    // first sprite with the highest score wins ties
    let mut best: Option<(&'a str, f64)> = None;
    for sprite in available {
        let score = names.iter().map(|n| similarity(n, sprite)).fold(0.0, f64::max);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((sprite.as_str(), score));
        }
    }
    best.filter(|(_, score)| *score >= min_similarity).map(|(sprite, _)| sprite)
}

/// Sprite names present on disk per category, read once and cached until the
/// next sync.
#[derive(Debug)]
pub struct SpriteIndex {
    sprite_dir: PathBuf,
    cache: Mutex<HashMap<String, Arc<Vec<String>>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SpriteIndex {
    /// `export_dir` is the sprite export root; files live under `sprite/<cat>/`.
    pub fn new(export_dir: impl AsRef<Path>) -> Self {
        Self { sprite_dir: export_dir.as_ref().join("sprite"), cache: Mutex::new(HashMap::new()) }
    }

    pub fn available(&self, category: &str) -> Arc<Vec<String>> {
        if let Some(list) = lock(&self.cache).get(category) {
            return list.clone();
        }
        let list = Arc::new(list_png_stems(&self.sprite_dir.join(category)));
        lock(&self.cache).insert(category.to_string(), list.clone());
        list
    }

    pub fn match_name(&self, key: &str, category: &str) -> Option<String> {
        let available = self.available(category);
        find_best_match(key, &available, MIN_SIMILARITY).map(str::to_string)
    }

    /// Case-insensitive exact lookup, no variations.
    pub fn exact(&self, key: &str, category: &str) -> Option<String> {
        self.available(category).iter().find(|s| s.eq_ignore_ascii_case(key)).cloned()
    }

    pub fn clear(&self) {
        lock(&self.cache).clear();
    }
}

fn list_png_stems(dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("no sprites in {}: {}", dir.display(), e);
            return Vec::new();
        }
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().and_then(|n| n.strip_suffix(".png")).map(str::to_string))
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_is_case_insensitive() {
        assert_eq!(similarity("Carrot", "carrot"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert!((similarity("kitten", "sitting") - (1.0 - 3.0 / 7.0)).abs() < 1e-9);
    }

    #[test]
    fn base_names_strip_colors_and_toggle_suffixes() {
        let names = base_names("OrangeTulip");
        assert_eq!(names[0], "OrangeTulip");
        assert!(names.contains(&"Tulip".to_string()));
        assert!(names.contains(&"OrangeTulipPlant".to_string()));

        let names = base_names("BambooPlant");
        assert!(names.contains(&"Bamboo".to_string()));

        let names = base_names("DawnCelestial");
        assert!(names.contains(&"Celestial".to_string()));
        assert!(names.contains(&"DawnCelestialPlant".to_string()));
        assert!(names.contains(&"DawnCelestialCrop".to_string()));
    }
}
