//! Placeholder key resolution.
//!
//! A key is looked up in this order; the first hit wins:
//!
//! 1. built-ins (`ClientIp`, `Method`, `Host`, `Path`)
//! 2. local variables from `<zin-set>`
//! 3. raw imported text
//! 4. query parameters
//! 5. environment variables (only when the caller allows it)
//! 6. structured imports, addressed as `name.field`, `name[2]` or
//!    `name[2].field`
//!
//! Keys that match nothing resolve to the caller's default.

use super::context::RequestContext;
use super::value::{Map, Value};

/// Prefix marking a placeholder as an environment lookup.
pub const ENV_PREFIX: &str = "process.env.";

/// Default for unresolved placeholders that carry none.
pub const UNDEFINED: &str = "undefined";

/// Resolve `key`, falling back to `default`.
pub fn resolve(cx: &RequestContext, key: &str, default: &str, allow_env: bool) -> String {
    lookup(cx, key, allow_env).unwrap_or_else(|| default.to_owned())
}

pub fn lookup(cx: &RequestContext, key: &str, allow_env: bool) -> Option<String> {
    let builtin = match key {
        "ClientIp" => Some(&cx.client_ip),
        "Method" => Some(&cx.method),
        "Host" => Some(&cx.host),
        "Path" => Some(&cx.path),
        _ => None,
    };
    if let Some(value) = builtin {
        return Some(value.clone());
    }

    if let Some(value) = cx.local_vars.get(key) {
        return Some(value.clone());
    }
    if let Some(value) = cx.vars.raw(key) {
        return Some(value.to_owned());
    }
    if let Some(value) = cx.query.get(key) {
        return Some(value.clone());
    }
    if allow_env && let Some(value) = cx.env.get(key) {
        return Some(value.clone());
    }

    structured(cx, key)
}

/// Split `rows[1].name` into `["rows", "[1]", "name"]`.
fn segments(key: &str) -> Vec<String> {
    key.replace('[', ".[")
        .split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn structured(cx: &RequestContext, key: &str) -> Option<String> {
    let segments = segments(key);
    let (root, rest) = segments.split_first()?;

    if let Some(object) = cx.vars.object(root)
        && let Some(found) = walk(object, rest)
    {
        return Some(found);
    }

    let list = cx.vars.list(root)?;
    let (index, tail) = rest.split_first()?;
    let item = list.get(parse_index(index)?)?;
    if tail.is_empty() {
        return Some(item.to_string());
    }
    walk(item.as_object()?, tail)
}

/// Descend through nested objects. Bracketed segments are used as keys with
/// the brackets removed. Reaching a non-object before the path ends fails.
fn walk(object: &Map, path: &[String]) -> Option<String> {
    let Some((first, rest)) = path.split_first() else {
        return Some(Value::Object(object.clone()).to_string());
    };

    let mut current = object.get(strip_brackets(first))?;
    for segment in rest {
        current = current.as_object()?.get(strip_brackets(segment))?;
    }
    Some(current.to_string())
}

fn strip_brackets(segment: &str) -> &str {
    segment.trim_matches(|c| c == '[' || c == ']')
}

fn parse_index(segment: &str) -> Option<usize> {
    segment
        .strip_prefix('[')?
        .strip_suffix(']')?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::value::Imported;
    use serde_json::json;

    fn context() -> RequestContext {
        let mut cx = RequestContext::new("/srv", "/blog/");
        cx.client_ip = "10.0.0.1".into();
        cx.query.insert("q".into(), "from-query".into());
        cx.env.insert("SECRET".into(), "s3".into());
        let user = Imported::from_json(json!({"name": "Ann", "age": 30, "tags": {"a": 1}})).unwrap();
        cx.vars.bind("user", user);
        let items = Imported::from_json(json!([{"name": "A"}, {"name": "B"}, "plain"])).unwrap();
        cx.vars.bind("items", items);
        cx
    }

    #[test]
    fn test_builtins() {
        let cx = context();
        assert_eq!(resolve(&cx, "ClientIp", "x", false), "10.0.0.1");
        assert_eq!(resolve(&cx, "Path", "x", false), "/blog/");
        assert_eq!(resolve(&cx, "Method", "x", false), "GET");
    }

    #[test]
    fn test_local_beats_query() {
        let mut cx = context();
        cx.local_vars.insert("q".into(), "local".into());
        assert_eq!(resolve(&cx, "q", "x", false), "local");
    }

    #[test]
    fn test_env_requires_permission() {
        let cx = context();
        assert_eq!(resolve(&cx, "SECRET", "none", false), "none");
        assert_eq!(resolve(&cx, "SECRET", "none", true), "s3");
    }

    #[test]
    fn test_object_fields() {
        let cx = context();
        assert_eq!(resolve(&cx, "user.age", "", false), "30");
        assert_eq!(resolve(&cx, "user.name", "", false), "Ann");
        assert_eq!(resolve(&cx, "user.tags", "", false), r#"{"a":1}"#);
        assert_eq!(resolve(&cx, "user.name.first", "d", false), "d");
    }

    #[test]
    fn test_list_elements() {
        let cx = context();
        assert_eq!(resolve(&cx, "items[1].name", "", false), "B");
        assert_eq!(resolve(&cx, "items[2]", "", false), "plain");
        assert_eq!(resolve(&cx, "items[0]", "", false), r#"{"name":"A"}"#);
    }

    #[test]
    fn test_out_of_range_index_uses_default() {
        let cx = context();
        assert_eq!(resolve(&cx, "items[9].name", "none", false), "none");
        assert_eq!(resolve(&cx, "items[-1]", "none", false), "none");
        assert_eq!(resolve(&cx, "items[2].name", "none", false), "none");
    }

    #[test]
    fn test_unknown_key_uses_default() {
        let cx = context();
        assert_eq!(resolve(&cx, "nothing", UNDEFINED, false), "undefined");
    }
}
