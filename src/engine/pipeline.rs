//! Directive pipeline.
//!
//! A page is rewritten by a fixed sequence of passes. Each pass receives the
//! whole document and returns the rewritten document. Passes communicate only
//! through the request context.
//!
//! Before every pass the pipeline checks the request's error state and its
//! deadline; either one stops the pipeline and the current document is
//! returned as-is.

use super::context::{RequestContext, ServerError};
use super::services::Services;
use crate::config::RenderConfig;

/// One rewriting pass.
pub trait Directive: Send + Sync {
    /// Pass name, used in logs and error codes.
    fn name(&self) -> &'static str;

    /// Substring that must be present for the pass to have any work.
    fn marker(&self) -> &'static str {
        super::scan::TAG_OPEN
    }

    fn apply(&self, document: String, cx: &mut RenderContext<'_>) -> String;
}

/// Pipeline-wide settings, fixed before the first pass.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Content source path shown in inline errors.
    pub source: String,
    pub show_errors: bool,
    pub max_include_depth: usize,
    /// `Local` or an IANA zone name.
    pub time_zone: String,
}

impl PipelineConfig {
    /// Settings for one request. `SHOW_ERRORS` and `TIME_ZONE` in the root
    /// `.env` take precedence over the config file.
    pub fn for_request(request: &RequestContext, render: &RenderConfig) -> Self {
        let show_errors = request
            .env
            .get("SHOW_ERRORS")
            .map_or(render.show_errors, |v| v.trim().eq_ignore_ascii_case("on"));
        let time_zone = request
            .env
            .get("TIME_ZONE")
            .filter(|zone| !zone.trim().is_empty())
            .map_or_else(|| render.time_zone.clone(), |zone| zone.trim().to_owned());

        Self {
            source: request.content_source.display().to_string(),
            show_errors,
            max_include_depth: render.max_include_depth,
            time_zone,
        }
    }
}

/// What a pass sees while rewriting.
pub struct RenderContext<'a> {
    pub request: &'a mut RequestContext,
    pub config: &'a PipelineConfig,
    pub services: &'a Services,
}

impl RenderContext<'_> {
    /// Inline error annotation, or nothing when inline errors are disabled.
    pub fn inline_error(&self, title: &str, reason: &str) -> String {
        if !self.config.show_errors {
            return String::new();
        }
        format!(
            r#"<span class="zin-engine inline-error" data-source="{}" data-summary="{}">{}</span>"#,
            html_escape::encode_double_quoted_attribute(&self.config.source),
            html_escape::encode_double_quoted_attribute(reason),
            html_escape::encode_text(title),
        )
    }

    /// Inline error for a tag that could not be expanded.
    pub fn tag_error(&self, tag: &str, reason: impl AsRef<str>) -> String {
        self.inline_error(&format!("Failed To Load: {tag}"), reason.as_ref())
    }
}

pub struct Pipeline {
    passes: Vec<Box<dyn Directive>>,
}

impl Pipeline {
    pub fn new(passes: Vec<Box<dyn Directive>>) -> Self {
        Self { passes }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    pub fn run(
        &self,
        document: String,
        request: &mut RequestContext,
        config: &PipelineConfig,
        services: &Services,
    ) -> String {
        let mut cx = RenderContext {
            request,
            config,
            services,
        };
        let mut document = document;

        for pass in &self.passes {
            if cx.request.has_error() {
                break;
            }
            if cx.request.deadline_passed() {
                cx.request.fail(ServerError::new(
                    "Request Timeout",
                    "408",
                    format!("deadline passed before `{}`", pass.name()),
                ));
                break;
            }
            if !document.contains(pass.marker()) {
                continue;
            }
            document = pass.apply(document, &mut cx);
        }

        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    struct Append(&'static str);

    impl Directive for Append {
        fn name(&self) -> &'static str {
            "append"
        }
        fn marker(&self) -> &'static str {
            ""
        }
        fn apply(&self, document: String, _: &mut RenderContext<'_>) -> String {
            document + self.0
        }
    }

    struct Fail;

    impl Directive for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }
        fn marker(&self) -> &'static str {
            ""
        }
        fn apply(&self, document: String, cx: &mut RenderContext<'_>) -> String {
            cx.request.fail(ServerError::new("Broken", "500", "injected"));
            document
        }
    }

    struct Count(Arc<AtomicUsize>);

    impl Directive for Count {
        fn name(&self) -> &'static str {
            "count"
        }
        fn apply(&self, document: String, _: &mut RenderContext<'_>) -> String {
            self.0.fetch_add(1, Ordering::SeqCst);
            document
        }
    }

    fn config(show_errors: bool) -> PipelineConfig {
        PipelineConfig {
            source: "/srv/index.html".into(),
            show_errors,
            max_include_depth: 5,
            time_zone: "UTC".into(),
        }
    }

    #[test]
    fn test_passes_run_in_order() {
        let pipeline = Pipeline::new(vec![Box::new(Append("a")), Box::new(Append("b"))]);
        let mut request = RequestContext::new("/srv", "/");
        let out = pipeline.run("x".into(), &mut request, &config(false), &Services::standard());
        assert_eq!(out, "xab");
    }

    #[test]
    fn test_error_state_short_circuits() {
        let pipeline = Pipeline::new(vec![
            Box::new(Append("a")),
            Box::new(Fail),
            Box::new(Append("b")),
        ]);
        let mut request = RequestContext::new("/srv", "/");
        let out = pipeline.run("x".into(), &mut request, &config(false), &Services::standard());
        assert_eq!(out, "xa");
        assert_eq!(request.error.unwrap().title, "Broken");
    }

    #[test]
    fn test_expired_deadline_runs_nothing() {
        let pipeline = Pipeline::new(vec![Box::new(Append("a"))]);
        let mut request = RequestContext::new("/srv", "/");
        request.deadline = Some(Instant::now() - Duration::from_millis(5));
        let out = pipeline.run("x".into(), &mut request, &config(false), &Services::standard());
        assert_eq!(out, "x");
        assert_eq!(request.error.unwrap().code, "408");
    }

    #[test]
    fn test_pass_skipped_without_marker() {
        let hits = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(vec![Box::new(Count(Arc::clone(&hits)))]);
        let mut request = RequestContext::new("/srv", "/");
        pipeline.run("plain".into(), &mut request, &config(false), &Services::standard());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        pipeline.run("<zin-x/>".into(), &mut request, &config(false), &Services::standard());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inline_error_escapes_and_respects_switch() {
        let services = Services::standard();
        let mut request = RequestContext::new("/srv", "/");
        let on = config(true);
        let cx = RenderContext {
            request: &mut request,
            config: &on,
            services: &services,
        };
        let html = cx.tag_error(r#"<zin-x a="1"/>"#, "bad <input>");
        assert!(html.starts_with(r#"<span class="zin-engine inline-error""#));
        assert!(html.contains("bad &lt;input&gt;"));
        assert!(html.contains("Failed To Load: &lt;zin-x"));

        let off = config(false);
        let cx = RenderContext {
            request: &mut request,
            config: &off,
            services: &services,
        };
        assert_eq!(cx.tag_error("<zin-x/>", "bad"), "");
    }
}
