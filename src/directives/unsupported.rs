//! Catch-all for `<zin...>` tags no earlier pass consumed.
//!
//! Each one is offered to the external module runner; tags without a module
//! (or whose module fails) become inline errors.

use crate::engine::scan;
use crate::engine::{Directive, RenderContext};

pub struct Unsupported;

impl Directive for Unsupported {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn apply(&self, document: String, cx: &mut RenderContext<'_>) -> String {
        scan::replace_tags_where(
            &document,
            |_| true,
            |tag| {
                let request = &*cx.request;
                match cx
                    .services
                    .modules
                    .run(&request.root, tag.text, request.deadline)
                {
                    Ok(output) => output,
                    Err(err) => cx.tag_error(tag.text, format!("Oops! {err}.")),
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directives::testing::{apply, apply_with, services};
    use crate::engine::RequestContext;
    use crate::engine::services::ModuleRunner;
    use crate::utils::modules::ModuleError;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Instant;

    struct Shout;

    impl ModuleRunner for Shout {
        fn run(&self, _: &Path, tag: &str, _: Option<Instant>) -> Result<String, ModuleError> {
            if tag.starts_with("<zin-shout") {
                Ok(tag.to_ascii_uppercase())
            } else {
                Err(ModuleError::NotFound(tag.to_owned()))
            }
        }
    }

    #[test]
    fn test_unknown_tags_become_errors() {
        let mut request = RequestContext::new("/site", "/");
        let out = apply(
            &Unsupported,
            r#"a<zin-nope x="1"/>b<zin-broken x="1>c"#,
            &mut request,
        );
        assert!(out.starts_with('a'));
        assert_eq!(out.matches("inline-error").count(), 2);
        assert!(out.contains("Oops! unrecognized or malformed"));
    }

    #[test]
    fn test_module_output_replaces_tag() {
        let mut request = RequestContext::new("/site", "/");
        let mut services = services();
        services.modules = Arc::new(Shout);
        let out = apply_with(
            &Unsupported,
            r#"[<zin-shout msg="hi"/>]<zinc>"#,
            &mut request,
            &services,
        );
        assert_eq!(out, r#"[<ZIN-SHOUT MSG="HI"/>]<zinc>"#);
    }
}
