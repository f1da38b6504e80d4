pub mod bindings;
pub mod categories;
pub mod sprite_mapping;

use crate::bundle::locator::locate_literal;
use crate::error::MiningError;
use crate::sandbox::enums::EnumResolver;
use crate::sandbox::Sandbox;
use serde::Serialize;
use serde_json::Value;
use sprite_mapping::SpriteMappingCache;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Plants,
    Pets,
    Items,
    Decor,
    Eggs,
    Abilities,
    Mutations,
    Weathers,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Plants,
        Category::Pets,
        Category::Items,
        Category::Decor,
        Category::Eggs,
        Category::Abilities,
        Category::Mutations,
        Category::Weathers,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Plants => "plants",
            Category::Pets => "pets",
            Category::Items => "items",
            Category::Decor => "decor",
            Category::Eggs => "eggs",
            Category::Abilities => "abilities",
            Category::Mutations => "mutations",
            Category::Weathers => "weathers",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = MiningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| MiningError::UnknownCategory(s.to_string()))
    }
}

/// Per-build lookup state shared by every extraction: resolved enums and the
/// sprite-id table. Flushed as a unit when the bundle URL changes.
#[derive(Debug)]
pub struct MiningContext {
    pub enums: EnumResolver,
    pub sprite_mapping: SpriteMappingCache,
    sandbox_timeout: Duration,
}

impl Default for MiningContext {
    fn default() -> Self {
        Self::new(crate::sandbox::DEFAULT_TIMEOUT)
    }
}

impl MiningContext {
    pub fn new(sandbox_timeout: Duration) -> Self {
        Self {
            enums: EnumResolver::new(),
            sprite_mapping: SpriteMappingCache::new(),
            sandbox_timeout,
        }
    }

    /// Fresh sandbox with the configured time budget.
    pub fn sandbox(&self) -> Sandbox {
        Sandbox::with_timeout(self.sandbox_timeout)
    }

    pub fn clear(&self) {
        self.enums.clear();
        self.sprite_mapping.clear();
    }
}

/// One game data table: where to find it and how to prepare its sandbox.
pub trait CategoryExtractor: Send + Sync {
    fn category(&self) -> Category;
    fn signatures(&self) -> &[&'static str];
    fn build_sandbox(&self, bundle: &str, literal: &str, ctx: &MiningContext) -> Sandbox;

    fn extract(&self, bundle: &str, ctx: &MiningContext) -> Result<Value, MiningError> {
        extract_category(bundle, self.category().as_str(), self.signatures(), |js, lit| {
            self.build_sandbox(js, lit, ctx)
        })
    }
}

/// Locates the literal by signatures, evaluates it in the sandbox produced by
/// `build_sandbox` and insists on an object or array result.
pub fn extract_category(
    bundle: &str,
    name: &str,
    signatures: &[&str],
    build_sandbox: impl FnOnce(&str, &str) -> Sandbox,
) -> Result<Value, MiningError> {
    let hit = locate_literal(bundle, signatures)?.ok_or_else(|| MiningError::NotFound {
        category: name.to_string(),
    })?;
    tracing::debug!(
        category = name,
        var = ?hit.var_name,
        anchor = hit.anchor_offset,
        "literal located ({} bytes)",
        hit.source.len()
    );

    let sandbox = build_sandbox(bundle, &hit.source);
    let data = sandbox.eval_literal(&hit.source).map_err(|source| MiningError::Evaluation {
        category: name.to_string(),
        source,
    })?;

    match data {
        Value::Object(_) | Value::Array(_) => Ok(data),
        _ => Err(MiningError::InvalidShape { category: name.to_string() }),
    }
}

pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn CategoryExtractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        use categories::*;
        let extractors: Vec<Box<dyn CategoryExtractor>> = vec![
            Box::new(Plants),
            Box::new(Pets),
            Box::new(Items),
            Box::new(Decor),
            Box::new(Eggs),
            Box::new(Abilities),
            Box::new(Mutations),
            Box::new(Weathers),
        ];
        Self { extractors }
    }

    pub fn get(&self, category: Category) -> Option<&dyn CategoryExtractor> {
        self.extractors.iter().find(|e| e.category() == category).map(|e| e.as_ref())
    }

    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.extractors.iter().map(|e| e.category())
    }

    pub fn extract(&self, category: Category, bundle: &str, ctx: &MiningContext) -> Result<Value, MiningError> {
        let extractor = self
            .get(category)
            .ok_or_else(|| MiningError::UnknownCategory(category.to_string()))?;
        extractor.extract(bundle, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_parse_case_insensitively() {
        assert_eq!("Plants".parse::<Category>().unwrap(), Category::Plants);
        assert_eq!("weathers".parse::<Category>().unwrap(), Category::Weathers);
        assert!(matches!("cosmetics".parse::<Category>(), Err(MiningError::UnknownCategory(_))));
    }

    #[test]
    fn registry_covers_every_category() {
        let registry = ExtractorRegistry::new();
        let found: Vec<Category> = registry.categories().collect();
        assert_eq!(found, Category::ALL.to_vec());
    }
}
