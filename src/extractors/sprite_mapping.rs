use crate::bundle::locator::locate_literal;
use crate::sandbox::Sandbox;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};

/// String literals that only appear inside the sprite-id table.
pub const SPRITE_MAPPING_SIGNATURES: &[&str] = &[
    "\"sprite/seed/",
    "\"sprite/plant/",
    "\"sprite/pet/",
    "\"sprite/decor/",
];

const REQUIRED_GROUPS: &[&str] = &["Seed", "Plant", "Pet", "Decor"];

#[derive(Debug, Clone, PartialEq)]
pub struct SpriteMapping {
    pub var_name: Option<String>,
    pub mapping: Map<String, Value>,
}

/// Locates and evaluates the sprite-id table. The table only counts when each
/// of `Seed`, `Plant`, `Pet` and `Decor` evaluates to an object.
pub fn extract_sprite_mapping(bundle: &str, sandbox: &Sandbox) -> Option<SpriteMapping> {
    let hit = match locate_literal(bundle, SPRITE_MAPPING_SIGNATURES) {
        Ok(Some(hit)) => hit,
        Ok(None) => return None,
        Err(err) => {
            tracing::debug!("sprite mapping literal unbalanced: {}", err);
            return None;
        }
    };

    let mapping = match sandbox.eval_literal(&hit.source) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return None,
        Err(err) => {
            tracing::debug!("sprite mapping evaluation failed: {}", err);
            return None;
        }
    };

    let valid = REQUIRED_GROUPS.iter().all(|k| mapping.get(*k).is_some_and(Value::is_object));
    if !valid {
        return None;
    }

    tracing::debug!("sprite mapping found as {:?} ({} groups)", hit.var_name, mapping.len());
    Some(SpriteMapping { var_name: hit.var_name, mapping })
}

/// Holds the last successful extraction; failures are retried on the next call.
#[derive(Debug, Default)]
pub struct SpriteMappingCache {
    slot: Mutex<Option<Arc<SpriteMapping>>>,
}

impl SpriteMappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_extract(&self, bundle: &str, sandbox: &Sandbox) -> Option<Arc<SpriteMapping>> {
        if let Ok(slot) = self.slot.lock() {
            if let Some(cached) = slot.as_ref() {
                return Some(cached.clone());
            }
        }
        let found = Arc::new(extract_sprite_mapping(bundle, sandbox)?);
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(found.clone());
        }
        Some(found)
    }

    pub fn is_cached(&self) -> bool {
        self.slot.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}
