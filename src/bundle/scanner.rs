use crate::error::MatchError;

/// Returns the `{...}` span starting at `start`, skipping braces inside string literals.
pub fn extract_balanced_braces(text: &str, start: usize) -> Result<&str, MatchError> {
    extract_balanced(text, start, b'{', b'}')
}

/// Returns the `(...)` span starting at `start`, skipping parens inside string literals.
pub fn extract_balanced_parens(text: &str, start: usize) -> Result<&str, MatchError> {
    extract_balanced(text, start, b'(', b')')
}

/// Depth-counting scan from an opening delimiter to its partner.
///
/// Quote tracking covers `'`, `"` and backtick strings with backslash escapes.
/// Every delimiter and quote is ASCII, so walking bytes never splits a UTF-8
/// sequence and the returned slice always lands on char boundaries.
pub fn extract_balanced(
    text: &str,
    start: usize,
    open: u8,
    close: u8,
) -> Result<&str, MatchError> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_str: Option<u8> = None;
    let mut escaped = false;

    for (i, &ch) in bytes.iter().enumerate().skip(start) {
        if let Some(quote) = in_str {
            if escaped {
                escaped = false;
            } else if ch == b'\\' {
                escaped = true;
            } else if ch == quote {
                in_str = None;
            }
            continue;
        }

        match ch {
            b'\'' | b'"' | b'`' => in_str = Some(ch),
            c if c == open => depth += 1,
            c if c == close => {
                // a closer before any opener means `start` did not point at one
                if depth == 0 {
                    break;
                }
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    Err(MatchError { open: open as char, start, depth })
}

/// Largest char boundary `<= idx`.
pub fn floor_char_boundary(s: &str, idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    let mut i = idx;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest char boundary `>= idx`.
pub fn ceil_char_boundary(s: &str, idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    let mut i = idx;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
