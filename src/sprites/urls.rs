use crate::atlas::catalog::group_category;
use regex::Regex;
use std::sync::LazyLock;

static SPRITE_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sprite/([^/]+)/(.+)$").unwrap());

/// Builds public URLs for exported sprites:
/// `<base>/assets/sprites/<category>/<name>.png?v=<version>`.
#[derive(Debug, Clone)]
pub struct SpriteUrls {
    base_url: String,
}

impl SpriteUrls {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string() }
    }

    pub fn relative(category: &str, name: &str, version: Option<&str>) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        let query = version
            .filter(|v| !v.is_empty())
            .map(|v| format!("?v={}", urlencoding::encode(v)))
            .unwrap_or_default();
        Some(format!("/assets/sprites/{}/{}.png{}", category, name, query))
    }

    pub fn build(&self, category: &str, name: &str, version: Option<&str>) -> Option<String> {
        let path = Self::relative(category, name, version)?;
        Some(format!("{}{}", self.base_url, path))
    }

    /// URL for a bundle sprite key such as `sprite/ui/FrostIcon`.
    pub fn from_sprite_key(&self, key: &str, version: Option<&str>) -> Option<String> {
        let cap = SPRITE_KEY_RE.captures(key)?;
        self.build(group_category(&cap[1]), &cap[2], version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_absolute_and_versioned() {
        let urls = SpriteUrls::new("http://localhost:3000/");
        assert_eq!(
            urls.build("seeds", "Carrot", Some("v 1")).as_deref(),
            Some("http://localhost:3000/assets/sprites/seeds/Carrot.png?v=v%201")
        );
        assert_eq!(urls.build("seeds", "", None), None);
        assert_eq!(
            urls.from_sprite_key("sprite/tallplant/Bamboo", None).as_deref(),
            Some("http://localhost:3000/assets/sprites/tallPlants/Bamboo.png")
        );
        assert_eq!(urls.from_sprite_key("weather/Rain", None), None);
    }
}
