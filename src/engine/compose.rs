//! Template composition and title injection.
//!
//! Templates named `template.html` (configurable) are collected from the
//! directory of the request path up to the content root. Starting with the
//! most specific one, the page is wrapped into each template's children
//! placeholder. A template that contains `<html` is a complete document and
//! stops the climb.
//!
//! Templates may carry a `<zin-page name="..."/>` marker. The marker is
//! stripped, and its name becomes the page title; outer templates win over
//! inner ones. Without a marker the first `<title>` of the composed page is
//! kept, and without that the request path is used.

use super::error::EngineError;
use super::scan;
use super::services::ContentFs;
use regex::{NoExpand, Regex};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Placeholder expression a template marks its child slot with.
pub const CHILDREN: &str = ".children";

static RE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static RE_HEAD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<head(\s[^>]*)?>").unwrap());

/// Read the page at `content_source` and wrap it in its templates.
pub fn compose_page(
    fs: &dyn ContentFs,
    root: &Path,
    request_path: &str,
    content_source: &Path,
    template_name: &str,
) -> Result<String, EngineError> {
    let mut page = fs
        .read_to_string(content_source)
        .map_err(|source| EngineError::ContentRead {
            path: content_source.to_path_buf(),
            source,
        })?;

    let templates = collect_templates(fs, root, request_path, template_name);
    if templates.is_empty() {
        return Ok(page);
    }

    let mut title = None;
    for path in templates {
        let template = fs
            .read_to_string(&path)
            .map_err(|source| EngineError::TemplateRead {
                path: path.clone(),
                source,
            })?;

        let (template, marker) = extract_title_marker(&template);
        if marker.is_some() {
            title = marker;
        }

        let terminal = is_document_root(&template);
        page = fill_children(&template, &page);
        if terminal {
            break;
        }
    }

    Ok(inject_title(&page, title.as_deref(), request_path))
}

/// Template files that exist along the request path, most specific first.
pub fn collect_templates(
    fs: &dyn ContentFs,
    root: &Path,
    request_path: &str,
    template_name: &str,
) -> Vec<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    let dir = if trimmed.ends_with('/') {
        trimmed
    } else {
        trimmed.rsplit_once('/').map_or("", |(dir, _)| dir)
    };
    let segments: Vec<&str> = dir
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();

    (0..=segments.len())
        .rev()
        .map(|depth| {
            segments[..depth]
                .iter()
                .fold(root.to_path_buf(), |path, segment| path.join(segment))
                .join(template_name)
        })
        .filter(|path| fs.exists(path))
        .collect()
}

/// Strip every `<zin-page>` marker, returning the first named one.
pub fn extract_title_marker(template: &str) -> (String, Option<String>) {
    let mut title = None;
    let stripped = scan::replace_tags(template, "page", |tag| {
        if title.is_none() {
            title = tag.non_empty("name").map(str::to_owned);
        }
        String::new()
    });
    (stripped, title)
}

fn is_document_root(template: &str) -> bool {
    template.to_ascii_lowercase().contains("<html")
}

/// Substitute every children placeholder in `template` with `page`.
fn fill_children(template: &str, page: &str) -> String {
    scan::replace_placeholders(template, |placeholder| {
        (placeholder.expr == CHILDREN).then(|| page.to_owned())
    })
}

/// Settle the page title and write it into the document.
pub fn inject_title(document: &str, marker: Option<&str>, request_path: &str) -> String {
    let title = marker
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .or_else(|| {
            RE_TITLE
                .captures(document)
                .map(|caps| caps[1].trim().to_owned())
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_else(|| request_path.to_owned());
    let element = format!("<title>{title}</title>");

    if RE_TITLE.is_match(document) {
        return RE_TITLE
            .replace_all(document, NoExpand(&element))
            .into_owned();
    }
    if let Some(head) = RE_HEAD.find(document) {
        let mut out = String::with_capacity(document.len() + element.len() + 1);
        out.push_str(&document[..head.end()]);
        out.push('\n');
        out.push_str(&element);
        out.push_str(&document[head.end()..]);
        return out;
    }
    element + document
}
