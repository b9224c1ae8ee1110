//! `robots.txt` and `sitemap.xml` generation.
//!
//! Both files are written into the content root when either one is requested
//! and either is missing or older than a day. The sitemap lists every servable
//! page; the ignore list becomes `Disallow` lines.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url>
//!     <loc>https://example.com/blog</loc>
//!     <lastmod>2025-01-01</lastmod>
//!   </url>
//! </urlset>
//! ```

use super::ignore::IgnoreList;
use crate::log;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

pub const ROBOTS_FILE: &str = "robots.txt";
pub const SITEMAP_FILE: &str = "sitemap.xml";

/// XML namespace for sitemap
const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

const MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Data files that are never listed.
const SKIPPED_EXTENSIONS: [&str; 3] = ["csv", "json", "config"];

/// Whether `request_path` names one of the generated files.
pub fn is_robomap_path(request_path: &str) -> bool {
    matches!(
        request_path.trim_start_matches('/'),
        ROBOTS_FILE | SITEMAP_FILE
    )
}

/// Regenerate both files when either is stale. Returns whether they were written.
pub fn refresh_if_stale(root: &Path, host: &str, ignored: &IgnoreList) -> Result<bool> {
    if !needs_update(&root.join(ROBOTS_FILE)) && !needs_update(&root.join(SITEMAP_FILE)) {
        return Ok(false);
    }

    let pages = collect_pages(root, ignored);
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();

    write(root, ROBOTS_FILE, &robots_txt(ignored, host))?;
    write(root, SITEMAP_FILE, &sitemap_xml(&pages, host, &today))?;
    log!("robomap"; "wrote {ROBOTS_FILE} and {SITEMAP_FILE} ({} pages)", pages.len());
    Ok(true)
}

fn needs_update(path: &Path) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) else {
        return true;
    };
    SystemTime::now()
        .duration_since(modified)
        .is_ok_and(|age| age > MAX_AGE)
}

fn write(root: &Path, name: &str, content: &str) -> Result<()> {
    let path = root.join(name);
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Root-relative paths of servable files, sorted.
fn collect_pages(root: &Path, ignored: &IgnoreList) -> Vec<String> {
    let mut pages: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(root).ok()?;
            let relative = relative.to_string_lossy().replace('\\', "/");
            is_listed(&relative, ignored).then_some(relative)
        })
        .collect();
    pages.sort();
    pages
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn is_listed(relative: &str, ignored: &IgnoreList) -> bool {
    let name = relative.rsplit('/').next().unwrap_or(relative).to_ascii_lowercase();
    if name == ROBOTS_FILE || name == SITEMAP_FILE {
        return false;
    }
    let ext = Path::new(&name).extension().and_then(|e| e.to_str());
    if ext.is_some_and(|ext| SKIPPED_EXTENSIONS.contains(&ext)) {
        return false;
    }
    !ignored.is_ignored(relative)
}

/// `blog/index.html` → `blog/index`, `about.html` → `about`, `a/` → `a`.
fn clean_path(relative: &str) -> &str {
    let path = relative.strip_suffix(".html").unwrap_or(relative);
    path.trim_end_matches('/')
}

fn robots_txt(ignored: &IgnoreList, host: &str) -> String {
    let mut robots = String::from("User-agent: *\n");
    for path in ignored.disallowed() {
        robots.push_str(&format!("Disallow: /{path}\n"));
    }
    robots.push_str("Allow: /\n");
    robots.push_str(&format!("Sitemap: https://{host}/{SITEMAP_FILE}\n"));
    robots
}

fn sitemap_xml(pages: &[String], host: &str, lastmod: &str) -> String {
    let mut xml = String::with_capacity(4096);

    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(r#"<urlset xmlns="{SITEMAP_NS}">"#));
    xml.push('\n');

    for page in pages {
        let loc = format!("https://{host}/{}", clean_path(page));
        xml.push_str("  <url>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&loc)));
        xml.push_str(&format!("    <lastmod>{lastmod}</lastmod>\n"));
        xml.push_str("  </url>\n");
    }

    xml.push_str("</urlset>\n");
    xml
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
