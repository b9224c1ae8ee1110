//! `<zin-include file="..." [type="RAW_CONTENT"] />`
//!
//! Inlines a file from the content root. Included content is expanded
//! recursively up to the configured depth; the page itself counts as the
//! first level. Each top-level tag starts a set of seen files that its whole
//! expansion tree shares, so a file reached twice below one tag (a cycle or a
//! diamond) is reported. Sibling top-level tags do not share that set.
//!
//! Tags still present after expansion (no `file`, or past the depth limit)
//! are swept into inline errors.

use super::rewrite_tags;
use crate::engine::scan::{self, Tag};
use crate::engine::{Directive, RenderContext};
use crate::utils::fs::{IncludeKind, classify_include, markdown_to_html};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// `type` value that disables wrapping and escapes HTML.
const RAW_CONTENT: &str = "RAW_CONTENT";

pub struct Include;

impl Directive for Include {
    fn name(&self) -> &'static str {
        "include"
    }

    fn marker(&self) -> &'static str {
        "<zin-include"
    }

    fn apply(&self, document: String, cx: &mut RenderContext<'_>) -> String {
        let page = cx.request.content_source.clone();
        let expanded = {
            let cx: &RenderContext<'_> = cx;
            scan::replace_tags_where(&document, expandable, |tag| {
                let mut seen = HashSet::from([page.clone()]);
                include_one(tag, cx, 1, &mut seen)
            })
        };

        rewrite_tags(&expanded, "include", cx, |tag, cx| {
            cx.tag_error(
                tag.text,
                "Include was not expanded: it has no 'file' attribute or lies beyond the include depth limit.",
            )
        })
    }
}

fn expandable(tag: &Tag<'_>) -> bool {
    tag.name == "include" && !tag.malformed && tag.non_empty("file").is_some()
}

fn expand(
    document: &str,
    cx: &RenderContext<'_>,
    depth: usize,
    seen: &mut HashSet<PathBuf>,
) -> String {
    if depth > cx.config.max_include_depth {
        return document.to_owned();
    }

    scan::replace_tags_where(document, expandable, |tag| include_one(tag, cx, depth, seen))
}

fn include_one(
    tag: &Tag<'_>,
    cx: &RenderContext<'_>,
    depth: usize,
    seen: &mut HashSet<PathBuf>,
) -> String {
    let Some(file) = tag.non_empty("file") else {
        return tag.text.to_owned();
    };

    let Some(kind) = classify_include(file) else {
        return cx.tag_error(
            tag.text,
            format!(
                "Unsupported file '{file}' type. Only .html, .css, .js, .md, and .txt files are allowed."
            ),
        );
    };

    let Some(path) = resolve(&cx.request.root, file) else {
        return cx.tag_error(
            tag.text,
            format!("File '{file}' points outside of the content root."),
        );
    };

    if seen.contains(&path) {
        return cx.tag_error(
            tag.text,
            format!("File '{file}' is already included at recursion depth {depth}"),
        );
    }

    let content = match cx.services.fs.read_to_string(&path) {
        Ok(content) => content,
        Err(err) => {
            return cx.tag_error(tag.text, format!("Failed to read file '{file}': {err}"));
        }
    };

    seen.insert(path);
    let content = expand(&content, cx, depth + 1, seen);

    let raw = tag
        .attr("type")
        .is_some_and(|t| t.eq_ignore_ascii_case(RAW_CONTENT));
    wrap(kind, content, raw)
}

/// Map an include path onto the content root, refusing `..` segments.
fn resolve(root: &Path, file: &str) -> Option<PathBuf> {
    let relative = file.trim_start_matches('/');
    if relative.split(['/', '\\']).any(|segment| segment == "..") {
        return None;
    }
    Some(root.join(relative))
}

fn wrap(kind: IncludeKind, content: String, raw: bool) -> String {
    if raw {
        return match kind {
            IncludeKind::Html => html_escape::encode_text(&content).into_owned(),
            _ => content,
        };
    }

    match kind {
        IncludeKind::Html | IncludeKind::Text => content,
        IncludeKind::Css => format!("<style>\n{content}\n</style>"),
        IncludeKind::Js => format!("<script type=\"text/javascript\">\n{content}\n</script>"),
        IncludeKind::Markdown => markdown_to_html(&content),
    }
}
