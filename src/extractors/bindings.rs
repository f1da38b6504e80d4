//! Sandbox preparation shared by the category extractors: enum identifiers
//! referenced from a literal are resolved against the bundle, or fall back to
//! placeholders so `Rarity.Rare` still evaluates to `"Rare"`.

use super::MiningContext;
use crate::sandbox::{Binding, Sandbox};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static RARITY_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"rarity:([A-Za-z_$][\w$]*)\.").unwrap());

static WEATHER_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:requiredWeather|weather|desiredWeather|triggeredWeather):([A-Za-z_$][\w$]*)\.").unwrap()
});

static HARVEST_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"harvestType:([A-Za-z_$][\w$]*)\.").unwrap());

static TILE_REF_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\btileRef:([A-Za-z_$][\w$]*)\.").unwrap());

pub const RARITY_KEYS: &[&str] = &["Common", "Uncommon", "Rare"];
pub const WEATHER_KEYS: &[&str] = &["Rain", "Frost", "Dawn"];
pub const HARVEST_KEYS: &[&str] = &["Single", "Multiple"];

fn ids(re: &Regex, literal: &str) -> BTreeSet<String> {
    re.captures_iter(literal).map(|cap| cap[1].to_string()).collect()
}

fn bind_string_enum(sandbox: &mut Sandbox, bundle: &str, id: &str, required: &[&str], ctx: &MiningContext) {
    let binding = match ctx.enums.try_extract_string_enum(bundle, id, required) {
        Some(obj) => Binding::Real(Value::Object((*obj).clone())),
        None => {
            tracing::debug!("enum {} unresolved, using placeholder", id);
            Binding::Placeholder
        }
    };
    sandbox.bind(id, binding);
}

pub fn apply_rarity_enum(sandbox: &mut Sandbox, bundle: &str, literal: &str, ctx: &MiningContext) {
    if let Some(cap) = RARITY_ID_RE.captures(literal) {
        bind_string_enum(sandbox, bundle, &cap[1], RARITY_KEYS, ctx);
    }
}

pub fn apply_weather_enums(sandbox: &mut Sandbox, bundle: &str, literal: &str, ctx: &MiningContext) {
    for id in ids(&WEATHER_ID_RE, literal) {
        bind_string_enum(sandbox, bundle, &id, WEATHER_KEYS, ctx);
    }
}

pub fn apply_harvest_type_enum(sandbox: &mut Sandbox, bundle: &str, literal: &str, ctx: &MiningContext) {
    if let Some(cap) = HARVEST_ID_RE.captures(literal) {
        bind_string_enum(sandbox, bundle, &cap[1], HARVEST_KEYS, ctx);
    }
}

/// `tileRef:X.Name` must keep the name rather than the numeric tile index.
pub fn apply_tile_refs(sandbox: &mut Sandbox, literal: &str) {
    for id in ids(&TILE_REF_ID_RE, literal) {
        sandbox.bind(id, Binding::Placeholder);
    }
}

/// Binds the sprite-id table when the literal dereferences its variable and
/// nothing else already claimed that name.
pub fn apply_sprite_mapping(sandbox: &mut Sandbox, bundle: &str, literal: &str, ctx: &MiningContext) {
    let Some((name, mapping)) = dereferenced_mapping(bundle, literal, ctx) else {
        return;
    };
    if sandbox.is_bound(&name) {
        return;
    }
    sandbox.bind(name, Binding::Real(Value::Object(mapping)));
}

fn dereferenced_mapping(
    bundle: &str,
    literal: &str,
    ctx: &MiningContext,
) -> Option<(String, serde_json::Map<String, Value>)> {
    let mapping = ctx.sprite_mapping.get_or_extract(bundle, &ctx.sandbox())?;
    let name = mapping.var_name.as_deref()?;
    let needle = format!("{}.", name);
    let used = literal.match_indices(&needle).any(|(pos, _)| {
        pos == 0 || !crate::bundle::locator::is_ident_byte(literal.as_bytes()[pos - 1])
    });
    used.then(|| (name.to_string(), mapping.mapping.clone()))
}

/// Rarity and weather enums plus tile-ref placeholders.
pub fn build_base_sandbox(bundle: &str, literal: &str, ctx: &MiningContext) -> Sandbox {
    let mut sandbox = ctx.sandbox();
    apply_rarity_enum(&mut sandbox, bundle, literal, ctx);
    apply_weather_enums(&mut sandbox, bundle, literal, ctx);
    apply_tile_refs(&mut sandbox, literal);
    apply_sprite_mapping(&mut sandbox, bundle, literal, ctx);
    sandbox
}
