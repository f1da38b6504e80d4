use super::{Binding, Sandbox};
use crate::bundle::locator::is_ident_byte;
use crate::bundle::scanner::{extract_balanced_braces, extract_balanced_parens};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type EnumObject = Arc<Map<String, Value>>;

const ENUM_TIMEOUT: Duration = Duration::from_millis(1000);

/// Memoized lookups of enums the bundle builds at load time.
///
/// Entries are keyed by idiom and identifier and live until [`clear`](Self::clear),
/// which the bundle cache calls whenever the bundle URL changes.
#[derive(Debug, Default)]
pub struct EnumResolver {
    memo: Mutex<HashMap<String, Option<EnumObject>>>,
}

impl EnumResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// `X=(t=>(t.A="A",...,t))(X||{})`: the object built by the invoked factory,
    /// if it carries every key in `required`.
    pub fn try_extract_string_enum(&self, bundle: &str, id: &str, required: &[&str]) -> Option<EnumObject> {
        self.memoized(format!("str:{}", id), || extract_string_enum(bundle, id, required))
    }

    /// `X=cc(...,{A:0,B:1})`: the numeric members of the last object argument.
    pub fn try_extract_numeric_enum(&self, bundle: &str, id: &str, required: &[&str]) -> Option<EnumObject> {
        self.memoized(format!("num:{}", id), || extract_numeric_enum(bundle, id, required))
    }

    pub fn clear(&self) {
        if let Ok(mut memo) = self.memo.lock() {
            memo.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.memo.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn memoized(&self, key: String, resolve: impl FnOnce() -> Option<Map<String, Value>>) -> Option<EnumObject> {
        if let Ok(memo) = self.memo.lock() {
            if let Some(hit) = memo.get(&key) {
                return hit.clone();
            }
        }
        // resolved outside the lock; a racing caller computes the same value
        let resolved = resolve().map(Arc::new);
        if let Ok(mut memo) = self.memo.lock() {
            memo.insert(key, resolved.clone());
        }
        resolved
    }
}

/// Offsets of `needle` in `text` that are not the tail of a longer identifier.
fn occurrences<'a>(text: &'a str, needle: &'a str) -> impl Iterator<Item = usize> + 'a {
    text.match_indices(needle)
        .map(|(pos, _)| pos)
        .filter(move |&pos| pos == 0 || !is_ident_byte(text.as_bytes()[pos - 1]))
}

fn has_keys(obj: &Map<String, Value>, required: &[&str]) -> bool {
    required.iter().all(|k| obj.contains_key(*k))
}

pub fn extract_string_enum(bundle: &str, id: &str, required: &[&str]) -> Option<Map<String, Value>> {
    let needle = format!("{}=(t=>", id);
    for pos in occurrences(bundle, &needle) {
        let factory_start = pos + id.len() + 1;
        let Ok(factory) = extract_balanced_parens(bundle, factory_start) else {
            continue;
        };
        // the invocation's argument list, usually `(X||{})`
        let after = factory_start + factory.len();
        let rest = &bundle[after..];
        let trimmed = rest.trim_start();
        let invocation = if trimmed.starts_with('(') {
            let args_start = after + (rest.len() - trimmed.len());
            match extract_balanced_parens(bundle, args_start) {
                Ok(args) => format!("{}{}", factory, args),
                Err(_) => continue,
            }
        } else {
            format!("{}({{}})", factory)
        };

        let mut sandbox = Sandbox::with_timeout(ENUM_TIMEOUT);
        sandbox.bind(id, Binding::Real(Value::Object(Map::new())));
        match sandbox.eval(&invocation) {
            Ok(Value::Object(obj)) if has_keys(&obj, required) => {
                tracing::debug!("resolved string enum {} ({} keys)", id, obj.len());
                return Some(obj);
            }
            Ok(_) => continue,
            Err(err) => {
                tracing::debug!("string enum candidate for {} at {} rejected: {}", id, pos, err);
                continue;
            }
        }
    }
    None
}

pub fn extract_numeric_enum(bundle: &str, id: &str, required: &[&str]) -> Option<Map<String, Value>> {
    let needle = format!("{}=", id);
    for pos in occurrences(bundle, &needle) {
        let callee_start = pos + needle.len();
        let callee_len = bundle[callee_start..].bytes().take_while(|b| is_ident_byte(*b)).count();
        let paren = callee_start + callee_len;
        if callee_len == 0 || bundle.as_bytes().get(paren) != Some(&b'(') {
            continue;
        }
        let Ok(args) = extract_balanced_parens(bundle, paren) else {
            continue;
        };
        let Some(obj_start) = last_top_level_brace(args) else {
            continue;
        };
        let Ok(literal) = extract_balanced_braces(args, obj_start) else {
            continue;
        };
        let sandbox = Sandbox::with_timeout(ENUM_TIMEOUT);
        let Ok(Value::Object(obj)) = sandbox.eval_literal(literal) else {
            continue;
        };
        let numeric: Map<String, Value> = obj.into_iter().filter(|(_, v)| v.is_number()).collect();
        if !numeric.is_empty() && has_keys(&numeric, required) {
            tracing::debug!("resolved numeric enum {} ({} keys)", id, numeric.len());
            return Some(numeric);
        }
    }
    None
}

/// Start of the last `{` sitting directly in the argument list `(...)`.
fn last_top_level_brace(args: &str) -> Option<usize> {
    let bytes = args.as_bytes();
    let mut depth = 0usize;
    let mut in_str: Option<u8> = None;
    let mut escaped = false;
    let mut last = None;
    for (i, &b) in bytes.iter().enumerate() {
        if let Some(q) = in_str {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                in_str = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => in_str = Some(b),
            b'{' | b'(' | b'[' => {
                if b == b'{' && depth == 1 {
                    last = Some(i);
                }
                depth += 1;
            }
            b'}' | b')' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brace_inside_string_argument_is_skipped() {
        assert_eq!(last_top_level_brace(r#"("{x",{A:0})"#), Some(6));
        assert_eq!(last_top_level_brace("(a,b)"), None);
        assert_eq!(last_top_level_brace("(f({a:1}),{B:2})"), Some(10));
    }

    #[test]
    fn identifier_suffix_is_not_an_occurrence() {
        let text = "xR=(t=>1);R=(t=>2)";
        let found: Vec<usize> = occurrences(text, "R=(t=>").collect();
        assert_eq!(found, vec![10]);
    }
}
