//! Replaces bundle sprite references (`tileRef`, `iconSpriteKey`) in category
//! data with URLs of the exported PNGs.

use crate::extractors::Category;
use crate::sprites::{SpriteIndex, SpriteUrls};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum PlantPart {
    Seed,
    Grown,
}

pub struct SpriteTransformer<'a> {
    index: &'a SpriteIndex,
    urls: &'a SpriteUrls,
    version: Option<&'a str>,
}

impl<'a> SpriteTransformer<'a> {
    /// `version` is appended to every URL for cache busting.
    pub fn new(index: &'a SpriteIndex, urls: &'a SpriteUrls, version: Option<&'a str>) -> Self {
        Self { index, urls, version }
    }

    pub fn transform(&self, category: Category, data: &Value) -> Value {
        match category {
            Category::Plants => self.plants(data),
            Category::Weathers => self.weathers(data),
            Category::Abilities => data.clone(),
            Category::Pets | Category::Eggs => self.keyed(data, "pets"),
            Category::Items => self.keyed(data, "items"),
            Category::Decor => self.keyed(data, "decor"),
            Category::Mutations => self.keyed(data, "mutations"),
        }
    }

    fn url(&self, category: &str, name: Option<String>) -> Value {
        name.and_then(|n| self.urls.build(category, &n, self.version))
            .map(Value::String)
            .unwrap_or(Value::Null)
    }

    /// Each entry's own key picks the sprite; `tileRef` becomes `sprite`.
    fn keyed(&self, data: &Value, sprite_category: &str) -> Value {
        let Value::Object(entries) = data else {
            return data.clone();
        };
        let out: Map<String, Value> = entries
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::Object(fields) if fields.contains_key("tileRef") => {
                        let mut fields = fields.clone();
                        fields.shift_remove("tileRef");
                        let name = self.index.match_name(key, sprite_category);
                        fields.insert("sprite".into(), self.url(sprite_category, name));
                        Value::Object(fields)
                    }
                    other => other.clone(),
                };
                (key.clone(), value)
            })
            .collect();
        Value::Object(out)
    }

    /// Seeds come from `seeds`; grown plants prefer an exact `tallPlants`
    /// sprite and fall back to fuzzy matching in `plants`.
    fn plant_sprite(&self, tile_ref: &Value, part: PlantPart) -> Value {
        let Some(name) = tile_ref.as_str().filter(|s| !s.is_empty()) else {
            return Value::Null;
        };
        match part {
            PlantPart::Seed => self.url("seeds", self.index.match_name(name, "seeds")),
            PlantPart::Grown => match self.index.exact(name, "tallPlants") {
                Some(tall) => self.url("tallPlants", Some(tall)),
                None => self.url("plants", self.index.match_name(name, "plants")),
            },
        }
    }

    fn plant_part(&self, part_data: &Value, part: PlantPart) -> Value {
        let Value::Object(fields) = part_data else {
            return part_data.clone();
        };
        let mut fields = fields.clone();

        if let Some(tile_ref) = fields.shift_remove("tileRef") {
            let sprite = self.plant_sprite(&tile_ref, part);
            fields.insert("sprite".into(), sprite);
        }
        for (from, to) in [("immatureTileRef", "immatureSprite"), ("topmostLayerTileRef", "topmostLayerSprite")] {
            if let Some(tile_ref) = fields.shift_remove(from) {
                let sprite = self.plant_sprite(&tile_ref, PlantPart::Grown);
                fields.insert(to.into(), sprite);
            }
        }
        if let Some(Value::Object(active)) = fields.get_mut("activeState") {
            if let Some(tile_ref) = active.shift_remove("tileRef") {
                let sprite = self.plant_sprite(&tile_ref, PlantPart::Grown);
                active.insert("sprite".into(), sprite);
            }
        }
        Value::Object(fields)
    }

    /// Keeps only the seed, plant and crop stages of each plant.
    fn plants(&self, data: &Value) -> Value {
        let Value::Object(entries) = data else {
            return data.clone();
        };
        let out: Map<String, Value> = entries
            .iter()
            .map(|(key, plant)| {
                let Value::Object(stages) = plant else {
                    return (key.clone(), plant.clone());
                };
                let mut out = Map::new();
                for (stage, part) in [("seed", PlantPart::Seed), ("plant", PlantPart::Grown), ("crop", PlantPart::Grown)] {
                    match stages.get(stage) {
                        Some(Value::Null) | Some(Value::Bool(false)) | None => {}
                        Some(v) => {
                            out.insert(stage.into(), self.plant_part(v, part));
                        }
                    }
                }
                (key.clone(), Value::Object(out))
            })
            .collect();
        Value::Object(out)
    }

    fn weather(&self, value: &Value) -> Value {
        let Value::Object(fields) = value else {
            return value.clone();
        };
        let mut fields = fields.clone();
        let key = fields.shift_remove("iconSpriteKey");
        let sprite = key
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|k| self.urls.from_sprite_key(k, self.version))
            .map(Value::String)
            .unwrap_or(Value::Null);
        fields.insert("sprite".into(), sprite);
        Value::Object(fields)
    }

    /// `iconSpriteKey` becomes `sprite`; a clear-sky `Sunny` entry is always present.
    fn weathers(&self, data: &Value) -> Value {
        let mut out: Map<String, Value> = match data {
            Value::Object(entries) => entries.iter().map(|(k, v)| (k.clone(), self.weather(v))).collect(),
            _ => Map::new(),
        };
        if !out.contains_key("Sunny") {
            let sunny = json!({ "name": "Sunny", "iconSpriteKey": "sprite/ui/SunnyIcon" });
            out.insert("Sunny".into(), self.weather(&sunny));
        }
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, SpriteIndex, SpriteUrls) {
        let dir = tempfile::tempdir().unwrap();
        for (cat, name) in [("seeds", "Carrot"), ("plants", "Carrot"), ("tallPlants", "Bamboo"), ("pets", "Worm")] {
            let d = dir.path().join("sprite").join(cat);
            std::fs::create_dir_all(&d).unwrap();
            std::fs::write(d.join(format!("{}.png", name)), b"").unwrap();
        }
        let index = SpriteIndex::new(dir.path());
        (dir, index, SpriteUrls::new("http://x"))
    }

    #[test]
    fn plant_stages_resolve_to_category_urls() {
        let (_dir, index, urls) = fixture();
        let t = SpriteTransformer::new(&index, &urls, Some("7"));
        let data = json!({
            "Carrot": {"seed": {"tileRef": "Carrot"}, "plant": {"tileRef": "Carrot"}, "crop": {"tileRef": "Carrot"}, "extra": 1},
            "Bamboo": {"plant": {"tileRef": "Bamboo", "activeState": {"tileRef": "Bamboo"}}}
        });
        let out = t.transform(Category::Plants, &data);
        assert_eq!(out["Carrot"]["seed"]["sprite"], "http://x/assets/sprites/seeds/Carrot.png?v=7");
        assert_eq!(out["Carrot"]["plant"]["sprite"], "http://x/assets/sprites/plants/Carrot.png?v=7");
        assert!(out["Carrot"].get("extra").is_none());
        assert!(out["Carrot"]["seed"].get("tileRef").is_none());
        assert_eq!(out["Bamboo"]["plant"]["sprite"], "http://x/assets/sprites/tallPlants/Bamboo.png?v=7");
        assert_eq!(
            out["Bamboo"]["plant"]["activeState"]["sprite"],
            "http://x/assets/sprites/tallPlants/Bamboo.png?v=7"
        );
    }

    #[test]
    fn eggs_use_pet_sprites_and_unknowns_are_null() {
        let (_dir, index, urls) = fixture();
        let t = SpriteTransformer::new(&index, &urls, None);
        let out = t.transform(Category::Eggs, &json!({"Worm": {"tileRef": 3}, "Zzzzzzzzz": {"tileRef": 4}}));
        assert_eq!(out["Worm"]["sprite"], "http://x/assets/sprites/pets/Worm.png");
        assert_eq!(out["Zzzzzzzzz"]["sprite"], Value::Null);
    }

    #[test]
    fn weathers_always_include_sunny() {
        let (_dir, index, urls) = fixture();
        let t = SpriteTransformer::new(&index, &urls, None);
        let out = t.transform(Category::Weathers, &json!({"Rain": {"name": "Rain", "iconSpriteKey": "sprite/ui/RainIcon"}}));
        assert_eq!(out["Rain"]["sprite"], "http://x/assets/sprites/ui/RainIcon.png");
        assert!(out["Rain"].get("iconSpriteKey").is_none());
        assert_eq!(out["Sunny"]["sprite"], "http://x/assets/sprites/ui/SunnyIcon.png");
    }
}
