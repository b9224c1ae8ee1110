//! `{{ key }}` and `{{ key || "default" }}` substitution.
//!
//! `{{ process.env.NAME }}` reads `NAME` (uppercased) from the site's `.env`.
//! Every other key follows the lookup order in [`crate::engine::resolve`].

use crate::engine::resolve::{ENV_PREFIX, UNDEFINED, resolve};
use crate::engine::scan;
use crate::engine::{Directive, RenderContext, RequestContext};

pub struct Vars;

impl Directive for Vars {
    fn name(&self) -> &'static str {
        "vars"
    }

    fn marker(&self) -> &'static str {
        "{{"
    }

    fn apply(&self, document: String, cx: &mut RenderContext<'_>) -> String {
        substitute(&document, cx.request)
    }
}

/// Replace every placeholder in `text`. Substituted values are not rescanned.
pub fn substitute(text: &str, request: &RequestContext) -> String {
    if !text.contains("{{") {
        return text.to_owned();
    }

    scan::replace_placeholders(text, |placeholder| {
        let (key, default) = placeholder.key_and_default();
        let default = default.as_deref().unwrap_or(UNDEFINED);

        let value = match key.strip_prefix(ENV_PREFIX) {
            Some(name) => resolve(request, &name.to_ascii_uppercase(), default, true),
            None => resolve(request, key, default, false),
        };
        Some(value)
    })
}
