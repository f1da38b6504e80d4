use mg_api::bundle::locator::{find_object_literal_by_signatures, locate_literal};
use mg_api::bundle::scanner::{extract_balanced_braces, extract_balanced_parens};
use mg_api::sandbox::enums::{extract_numeric_enum, extract_string_enum, EnumResolver};
use mg_api::sandbox::{Binding, Sandbox};
use serde_json::json;

#[test]
fn test_braces_inside_strings_do_not_count() {
    let text = r#"X={label:"{not}",tpl:`}`,q:'{',inner:{a:1}};rest"#;
    let span = extract_balanced_braces(text, 2).unwrap();
    assert_eq!(span, r#"{label:"{not}",tpl:`}`,q:'{',inner:{a:1}}"#);
}

#[test]
fn test_truncated_input_reports_depth() {
    let text = "X={a:{b:1}";
    let err = extract_balanced_braces(text, 2).unwrap_err();
    assert_eq!(err.open, '{');
    assert_eq!(err.start, 2);
    assert_eq!(err.depth, 1);

    assert!(extract_balanced_parens("f(\"unterminated)", 1).is_err());
}

#[test]
fn test_second_anchor_wins_when_first_lacks_confirmations() {
    let padding = ";".repeat(400);
    let text = format!("A={{anchorX:1}}{}B={{anchorX:2,confirmY:3}}", padding);
    let hit = find_object_literal_by_signatures(&text, &["anchorX", "confirmY"], 50)
        .unwrap()
        .unwrap();
    assert_eq!(hit.var_name.as_deref(), Some("B"));
    assert_eq!(hit.source, "{anchorX:2,confirmY:3}");
    assert_eq!(hit.anchor_offset, text.rfind("anchorX").unwrap());
}

#[test]
fn test_missing_confirmation_finds_nothing() {
    let text = "A={anchorX:1,other:2}";
    assert_eq!(locate_literal(text, &["anchorX", "confirmY"]).unwrap(), None);
    assert_eq!(locate_literal(text, &["nowhere"]).unwrap(), None);
}

#[test]
fn test_anchor_at_literal_start() {
    let text = "let q=1;Zz={seed:{tileRef:1}}";
    let hit = locate_literal(text, &["={seed"]).unwrap().unwrap();
    assert_eq!(hit.var_name.as_deref(), Some("Zz"));
    assert_eq!(hit.source, "{seed:{tileRef:1}}");
}

#[test]
fn test_unknown_identifiers_read_their_member_name() {
    let out = Sandbox::new().eval("({x: Foo.Bar, y: [Foo.Baz, 2]})").unwrap();
    assert_eq!(out, json!({"x": "Bar", "y": ["Baz", 2]}));
}

#[test]
fn test_literal_helpers_evaluate() {
    let mut sandbox = Sandbox::new();
    sandbox.bind("K", Binding::Real(json!({"A": 3})));
    let out = sandbox
        .eval_literal("{sum:K.A*2+1,spread:{...{a:1},b:2},keys:Object.keys({p:1,q:2}),tpl:`n${K.A}`}")
        .unwrap();
    assert_eq!(out, json!({"sum": 7, "spread": {"a": 1, "b": 2}, "keys": ["p", "q"], "tpl": "n3"}));
}

#[test]
fn test_syntax_errors_surface() {
    assert!(Sandbox::new().eval_literal("{a:,}").is_err());
}

const ENUM_BUNDLE: &str = concat!(
    "var Rr;Rr=(t=>(t.Common=\"Common\",t.Uncommon=\"Uncommon\",t.Rare=\"Rare\",t))(Rr||{});",
    "const Tl=cc(\"tiles\",{Dirt:0,Grass:1,label:\"x\"});",
);

#[test]
fn test_string_enum_with_required_keys() {
    let obj = extract_string_enum(ENUM_BUNDLE, "Rr", &["Common", "Rare"]).unwrap();
    assert_eq!(obj.get("Uncommon"), Some(&json!("Uncommon")));
    assert_eq!(obj.len(), 3);
}

#[test]
fn test_string_enum_missing_key_is_none() {
    assert!(extract_string_enum(ENUM_BUNDLE, "Rr", &["Mythic"]).is_none());
    assert!(extract_string_enum(ENUM_BUNDLE, "Nope", &[]).is_none());
}

#[test]
fn test_numeric_enum_keeps_numbers_only() {
    let obj = extract_numeric_enum(ENUM_BUNDLE, "Tl", &["Dirt"]).unwrap();
    assert_eq!(obj.get("Grass"), Some(&json!(1)));
    assert!(obj.get("label").is_none());
}

#[test]
fn test_resolver_memoizes_misses_until_cleared() {
    let resolver = EnumResolver::new();
    assert!(resolver.try_extract_string_enum(ENUM_BUNDLE, "Qq", &[]).is_none());
    assert_eq!(resolver.len(), 1);
    assert!(resolver.try_extract_string_enum(ENUM_BUNDLE, "Rr", &["Rare"]).is_some());
    assert_eq!(resolver.len(), 2);
    let tiles = resolver.try_extract_numeric_enum(ENUM_BUNDLE, "Tl", &["Dirt", "Grass"]).unwrap();
    assert_eq!(tiles.get("Dirt"), Some(&json!(0)));
    assert_eq!(resolver.len(), 3);
    resolver.clear();
    assert!(resolver.is_empty());
}
