//! `<zin-repeat for="rows">…</zin-repeat>` repeats its body once per element
//! of a bound list.
//!
//! Inside the body, `{{ field }}` and `{{ field || "default" }}` read fields of
//! the current element. Only plain identifiers are touched; other placeholders
//! are left for the variable pass.

use crate::engine::resolve::UNDEFINED;
use crate::engine::scan::{self, Block};
use crate::engine::value::{Map, Value};
use crate::engine::{Directive, RenderContext};

const EXAMPLE: &str = r#"<zin-repeat for="key"><p>Name: {{ name }}</p></zin-repeat>"#;

/// Emitted for list elements that are not objects.
const NOT_AN_OBJECT: &str = "not-an-object";

pub struct Repeat;

impl Directive for Repeat {
    fn name(&self) -> &'static str {
        "repeat"
    }

    fn marker(&self) -> &'static str {
        "<zin-repeat"
    }

    fn apply(&self, document: String, cx: &mut RenderContext<'_>) -> String {
        scan::replace_blocks(&document, "repeat", |block| expand(block, cx))
    }
}

fn expand(block: &Block<'_>, cx: &RenderContext<'_>) -> String {
    const TITLE: &str = "Failed To Load: <zin-repeat ... > ... </zin-repeat>";

    let Some(name) = block.open.non_empty("for") else {
        return cx.inline_error(
            TITLE,
            &format!(
                "The <zin-repeat> tag must carry a 'for' attribute naming a list variable. Example: {EXAMPLE}"
            ),
        );
    };
    let Some(items) = cx.request.vars.list(name) else {
        return cx.inline_error(
            TITLE,
            &format!("Variable '{name}' not found or is not iterable."),
        );
    };

    let mut out = String::new();
    for item in items {
        match item {
            Value::Object(fields) => out.push_str(&fill(block.inner, fields)),
            _ => out.push_str(NOT_AN_OBJECT),
        }
    }
    out
}

fn fill(body: &str, fields: &Map) -> String {
    scan::replace_placeholders(body, |placeholder| {
        let (key, default) = placeholder.key_and_default();
        if !is_identifier(key) {
            return None;
        }
        let value = match fields.get(key) {
            Some(value) => value.to_string(),
            None => default.unwrap_or_else(|| UNDEFINED.to_owned()),
        };
        Some(value)
    })
}

fn is_identifier(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directives::testing::apply;
    use crate::engine::RequestContext;
    use crate::engine::value::Imported;

    fn request() -> RequestContext {
        let mut request = RequestContext::new("/site", "/");
        let rows = serde_json::json!([{"name": "A", "n": 1}, {"name": "B"}, 7]);
        request.vars.bind("rows", Imported::from_json(rows).unwrap());
        request
    }

    #[test]
    fn test_repeats_in_binding_order() {
        let mut request = request();
        let out = apply(
            &Repeat,
            r#"<ul><zin-repeat for="rows">{{name}}</zin-repeat></ul>"#,
            &mut request,
        );
        assert_eq!(out, "<ul>ABnot-an-object</ul>");
    }

    #[test]
    fn test_defaults_and_foreign_placeholders() {
        let mut request = request();
        let out = apply(
            &Repeat,
            r#"<zin-repeat for="rows">{{ n || "0" }}{{ missing }}{{ user.name }};</zin-repeat>"#,
            &mut request,
        );
        assert_eq!(
            out,
            "1undefined{{ user.name }};0undefined{{ user.name }};not-an-object"
        );
    }

    #[test]
    fn test_empty_default_renders_empty() {
        let mut request = request();
        let out = apply(
            &Repeat,
            r#"<zin-repeat for="rows">[{{ missing || "" }}]</zin-repeat>"#,
            &mut request,
        );
        assert_eq!(out, "[][]not-an-object");
    }

    #[test]
    fn test_unknown_list_is_inline_error() {
        let mut request = request();
        let out = apply(&Repeat, r#"<zin-repeat for="nope">x</zin-repeat>"#, &mut request);
        assert!(out.contains("not found or is not iterable"));
    }

    #[test]
    fn test_unclosed_block_is_left_alone() {
        let mut request = request();
        let out = apply(&Repeat, r#"<zin-repeat for="rows">x"#, &mut request);
        assert_eq!(out, r#"<zin-repeat for="rows">x"#);
    }
}
