use super::scanner::{ceil_char_boundary, extract_balanced_braces, floor_char_boundary};
use crate::error::MatchError;

/// Bytes on each side of an anchor searched for confirmation signatures.
pub const DEFAULT_WINDOW: usize = 120_000;

/// An object literal found inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLiteralHit {
    /// Identifier assigned the literal (`X` in `X={...}`), best-effort.
    pub var_name: Option<String>,
    /// Raw `{...}` source.
    pub source: String,
    /// Offset of the anchor signature that produced this hit.
    pub anchor_offset: usize,
}

/// Finds the object literal identified by `signatures` (first is the anchor,
/// the rest must all appear within the window around it).
pub fn locate_literal(
    text: &str,
    signatures: &[&str],
) -> Result<Option<ObjectLiteralHit>, MatchError> {
    find_object_literal_by_signatures(text, signatures, DEFAULT_WINDOW)
}

pub fn find_object_literal_by_signatures(
    text: &str,
    signatures: &[&str],
    window: usize,
) -> Result<Option<ObjectLiteralHit>, MatchError> {
    let Some((anchor, confirms)) = signatures.split_first() else {
        return Ok(None);
    };
    if anchor.is_empty() {
        return Ok(None);
    }

    let mut from = 0;
    while let Some(rel) = text.get(from..).and_then(|rest| rest.find(anchor)) {
        let idx = from + rel;
        // anchors are non-empty so the next search always moves past this one
        from = ceil_char_boundary(text, idx + 1);

        let start = floor_char_boundary(text, idx.saturating_sub(window));
        let end = ceil_char_boundary(text, idx.saturating_add(window));
        let chunk = &text[start..end];

        if !confirms.iter().all(|sig| chunk.contains(sig)) {
            continue;
        }

        // `={` may begin at the anchor itself
        let search_end = ceil_char_boundary(text, idx + 2);
        let Some(eq_brace) = text[..search_end].rfind("={") else {
            continue;
        };

        let source = extract_balanced_braces(text, eq_brace + 1)?;
        return Ok(Some(ObjectLiteralHit {
            var_name: parse_var_name(text, eq_brace),
            source: source.to_string(),
            anchor_offset: idx,
        }));
    }

    Ok(None)
}

/// Identifier immediately before `={`, skipping whitespace and semicolons.
pub fn parse_var_name(text: &str, eq_brace: usize) -> Option<String> {
    let bytes = text.as_bytes();
    let mut j = eq_brace;
    while j > 0 && (bytes[j - 1].is_ascii_whitespace() || bytes[j - 1] == b';') {
        j -= 1;
    }
    let end = j;
    while j > 0 && is_ident_byte(bytes[j - 1]) {
        j -= 1;
    }
    if j == end {
        None
    } else {
        Some(text[j..end].to_string())
    }
}

pub(crate) fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}
