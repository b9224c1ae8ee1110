//! `<zin-set key="k" value="v" />` binds a local variable and disappears.

use super::rewrite_tags;
use crate::engine::{Directive, RenderContext};

pub struct SetVar;

impl Directive for SetVar {
    fn name(&self) -> &'static str {
        "set"
    }

    fn marker(&self) -> &'static str {
        "<zin-set"
    }

    fn apply(&self, document: String, cx: &mut RenderContext<'_>) -> String {
        rewrite_tags(&document, "set", cx, |tag, cx| {
            match (tag.non_empty("key"), tag.attr("value")) {
                (Some(key), Some(value)) => {
                    cx.request
                        .local_vars
                        .insert(key.to_owned(), value.to_owned());
                    String::new()
                }
                _ => cx.tag_error(tag.text, "missing key or value attribute"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directives::testing::apply;
    use crate::engine::RequestContext;

    #[test]
    fn test_binds_and_removes() {
        let mut request = RequestContext::new("/site", "/");
        let out = apply(
            &SetVar,
            r#"a<zin-set key="title" value="Hello"/>b<zin-set key="empty" value="" />"#,
            &mut request,
        );
        assert_eq!(out, "ab");
        assert_eq!(request.local_vars["title"], "Hello");
        assert_eq!(request.local_vars["empty"], "");
    }

    #[test]
    fn test_later_set_overrides() {
        let mut request = RequestContext::new("/site", "/");
        apply(
            &SetVar,
            r#"<zin-set key="x" value="1"/><zin-set key="x" value="2"/>"#,
            &mut request,
        );
        assert_eq!(request.local_vars["x"], "2");
    }

    #[test]
    fn test_missing_value_is_inline_error() {
        let mut request = RequestContext::new("/site", "/");
        let out = apply(&SetVar, r#"<zin-set key="x"/>"#, &mut request);
        assert!(out.contains("missing key or value attribute"));
        assert!(request.local_vars.is_empty());
    }
}
