//! File classification helpers.

use pulldown_cmark::{Options, Parser, html};
use std::path::Path;

/// Kinds of files `<zin-include>` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    Html,
    Css,
    Js,
    Markdown,
    Text,
}

/// Classify an include target by its (case-insensitive) extension.
pub fn classify_include(path: &str) -> Option<IncludeKind> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "html" => Some(IncludeKind::Html),
        "css" => Some(IncludeKind::Css),
        "js" => Some(IncludeKind::Js),
        "md" => Some(IncludeKind::Markdown),
        "txt" => Some(IncludeKind::Text),
        _ => None,
    }
}

/// Render CommonMark (with tables and strikethrough) to HTML.
pub fn markdown_to_html(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(text, options);

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
pub fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("csv") => "text/csv; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        // Documents
        Some("pdf") => "application/pdf",
        Some("txt" | "md") => "text/plain; charset=utf-8",

        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_include() {
        assert_eq!(classify_include("nav.HTML"), Some(IncludeKind::Html));
        assert_eq!(classify_include("a/b/readme.md"), Some(IncludeKind::Markdown));
        assert_eq!(classify_include("style.css"), Some(IncludeKind::Css));
        assert_eq!(classify_include("image.png"), None);
        assert_eq!(classify_include("Makefile"), None);
    }

    #[test]
    fn test_markdown_to_html() {
        let html = markdown_to_html("# Title\n\nsome *text*");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>text</em>"));
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("a.CSS")), "text/css; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("notes.md")), "text/plain; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("blob")), "application/octet-stream");
    }
}
