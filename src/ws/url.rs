use rand::{Rng, RngCore};
use serde_json::{json, Value};

const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Largest multiple of 58 below 256; bytes at or above it are rejected so the
/// modulo stays uniform.
const BASE58_CUTOFF: u8 = 232;

fn random_base58(len: usize, rng: &mut impl RngCore) -> String {
    let mut out = String::with_capacity(len);
    while out.len() < len {
        let b: u8 = rng.gen();
        if b < BASE58_CUTOFF {
            out.push(BASE58_ALPHABET[(b % 58) as usize] as char);
        }
    }
    out
}

/// `p_` followed by 16 base58 characters.
pub fn generate_player_id() -> String {
    format!("p_{}", random_base58(16, &mut rand::thread_rng()))
}

/// Eight lowercase hex characters.
pub fn generate_room_id() -> String {
    let bytes: [u8; 4] = rand::thread_rng().gen();
    hex::encode(bytes)
}

pub fn default_anonymous_style() -> Value {
    json!({
        "avatarBottom": "Bottom_DefaultGray.png",
        "avatarExpression": "Expression_Default.png",
        "avatarMid": "Mid_DefaultGray.png",
        "avatarTop": "Top_DefaultGray.png",
        "color": "Orange",
        "name": "Arie API",
    })
}

/// Room connect URL. Every query value except the avatar style is itself a
/// JSON string literal, quotes included.
pub fn build_ws_url(
    origin: &str,
    version: &str,
    room_id: &str,
    player_id: &str,
    anonymous_style: Option<&Value>,
) -> String {
    let ws_base = match origin.strip_prefix("http") {
        Some(rest) => format!("ws{}", rest),
        None => origin.to_string(),
    };
    let ws_base = ws_base.trim_end_matches('/');

    let quote = |v: &str| Value::String(v.to_string()).to_string();
    let mut params: Vec<(&str, String)> = vec![
        ("surface", quote("web")),
        ("platform", quote("desktop")),
        ("playerId", quote(player_id)),
        ("version", quote(version)),
        ("source", quote("manualUrl")),
        ("capabilities", quote("fbo_mipmap_unsupported")),
    ];
    if let Some(style) = anonymous_style {
        let style = match style {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        params.push(("anonymousUserStyle", style));
    }

    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
        .finish();

    format!("{}/version/{}/api/rooms/{}/connect?{}", ws_base, version, room_id, query)
}
