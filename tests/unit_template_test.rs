use regex::Regex;
use twice::core::template::{FragmentMap, SideEffect, is_truthy, render};

fn pattern() -> Regex {
    Regex::new(r"<%%\s+(.*?)\s+%%>").unwrap()
}

fn session_map(fields: &[(&str, &str)]) -> FragmentMap {
    let mut map = FragmentMap::new();
    for (field, value) in fields {
        map.insert("session", field, value.to_string());
    }
    map
}

#[test]
fn test_render_get_and_if() {
    let mut map = session_map(&[("name", "Ada"), ("admin", "")]);
    let body = r#"Hi <%% get session name guest %%>! <%% if session admin "yes" "no" %%>"#;
    let (output, effects) = render(&pattern(), body, &mut map);

    assert_eq!(output, "Hi Ada! no");
    assert!(effects.is_empty());
}

#[test]
fn test_render_get_falls_back_to_default() {
    let mut map = session_map(&[]);
    let (output, _) = render(&pattern(), "<%% get session name guest %%>", &mut map);
    assert_eq!(output, "guest");

    // A zero value is falsy too.
    let mut map = session_map(&[("count", "0")]);
    let (output, _) = render(&pattern(), "<%% get session count none %%>", &mut map);
    assert_eq!(output, "none");

    // Default omitted: emit nothing.
    let mut map = session_map(&[]);
    let (output, _) = render(&pattern(), "[<%% get session name %%>]", &mut map);
    assert_eq!(output, "[]");
}

#[test]
fn test_render_unless_mirrors_if() {
    let mut map = session_map(&[("admin", "1")]);
    let body = "<%% unless session admin anon member %%>";
    let (output, _) = render(&pattern(), body, &mut map);
    assert_eq!(output, "member");

    let mut map = session_map(&[]);
    let (output, _) = render(&pattern(), "<%% unless session admin anon %%>", &mut map);
    assert_eq!(output, "anon");
}

#[test]
fn test_render_unknown_command_is_emitted_verbatim() {
    let mut map = session_map(&[]);
    let body = "<%% frobnicate session name %%>";
    let (output, _) = render(&pattern(), body, &mut map);
    assert_eq!(output, body);
}

#[test]
fn test_render_bad_arity_is_emitted_verbatim() {
    let mut map = session_map(&[("admin", "1")]);
    // `if` needs two args beyond the field name.
    let body = "<%% if session admin %%>";
    let (output, _) = render(&pattern(), body, &mut map);
    assert_eq!(output, body);

    // A marker with no target at all.
    let body = "<%% get %%>";
    let (output, _) = render(&pattern(), body, &mut map);
    assert_eq!(output, body);
}

#[test]
fn test_render_without_markers_is_identity() {
    let mut map = session_map(&[]);
    let body = "plain body, no markers at all";
    let (output, effects) = render(&pattern(), body, &mut map);
    assert_eq!(output, body);
    assert!(effects.is_empty());
}

#[test]
fn test_render_incr_bumps_local_copy_and_records_effect() {
    let mut map = FragmentMap::new();
    map.insert("memcache", "hits", "41");
    let body = "<%% incr memcache hits %%><%% get memcache hits %%>";
    let (output, effects) = render(&pattern(), body, &mut map);

    // The marker itself emits nothing; the later `get` sees the bump.
    assert_eq!(output, "42");
    assert_eq!(
        effects,
        vec![SideEffect::Incr {
            kind: "memcache".to_string(),
            id: "hits".to_string(),
        }]
    );
}

#[test]
fn test_render_decr_on_absent_key_uses_default_set() {
    let mut map = FragmentMap::new();
    let body = "<%% decr memcache hits 10 %%><%% get memcache hits %%>";
    let (output, effects) = render(&pattern(), body, &mut map);

    assert_eq!(output, "10");
    assert_eq!(
        effects,
        vec![SideEffect::Set {
            kind: "memcache".to_string(),
            id: "hits".to_string(),
            value: "10".to_string(),
        }]
    );
}

#[test]
fn test_render_incr_on_absent_key_without_default_is_a_noop() {
    let mut map = FragmentMap::new();
    let (output, effects) = render(&pattern(), "[<%% incr memcache hits %%>]", &mut map);
    assert_eq!(output, "[]");
    assert!(effects.is_empty());
}

#[test]
fn test_substituted_text_is_not_rescanned() {
    let mut map = session_map(&[("name", "<%% get session name %%>")]);
    let (output, _) = render(&pattern(), "<%% get session name %%>", &mut map);
    // The value contains marker syntax, and it comes through untouched.
    assert_eq!(output, "<%% get session name %%>");
}

#[test]
fn test_truthiness() {
    assert!(!is_truthy(None));
    assert!(!is_truthy(Some("")));
    assert!(!is_truthy(Some("0")));
    assert!(is_truthy(Some("1")));
    assert!(is_truthy(Some("no")));
}
