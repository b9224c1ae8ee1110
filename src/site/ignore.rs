//! `.zinignore`: root-relative paths that are never served.
//!
//! One entry per line, `#` comments allowed. An entry ending in `/` or `/*`
//! covers everything under that directory; any other entry matches exactly.
//! The site's secrets and server files are always forbidden.

use std::fs;
use std::path::Path;

pub const IGNORE_FILE: &str = ".zinignore";

/// Forbidden whether or not `.zinignore` lists them.
const ALWAYS: [&str; 3] = [".env", IGNORE_FILE, "zin.toml"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreList {
    /// Exact root-relative paths.
    files: Vec<String>,
    /// Directory prefixes, each ending in `/`.
    dirs: Vec<String>,
}

impl IgnoreList {
    /// Read `<root>/.zinignore`; `extra` names more always-forbidden files
    /// (the config file when it was renamed).
    pub fn load(root: &Path, extra: &[&str]) -> Self {
        let text = fs::read_to_string(root.join(IGNORE_FILE)).unwrap_or_default();
        let mut list = Self::parse(&text);
        for name in ALWAYS.iter().chain(extra) {
            list.push(name);
        }
        list
    }

    pub fn parse(text: &str) -> Self {
        let mut list = Self::default();
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .for_each(|line| list.push(line));
        list
    }

    fn push(&mut self, entry: &str) {
        let entry = entry.replace('\\', "/");
        let entry = entry.trim_start_matches('/');

        if let Some(dir) = entry.strip_suffix("/*").or_else(|| entry.strip_suffix('/')) {
            let dir = format!("{dir}/");
            if !self.dirs.contains(&dir) {
                self.dirs.push(dir);
            }
        } else if !entry.is_empty() && !self.files.iter().any(|f| f == entry) {
            self.files.push(entry.to_owned());
        }
    }

    /// Whether a request path (`/a/b.html`) or root-relative path is ignored.
    pub fn is_ignored(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        self.files.iter().any(|f| f == path) || self.dirs.iter().any(|d| path.starts_with(d))
    }

    /// Entries as `robots.txt` disallow paths, directories first.
    pub fn disallowed(&self) -> impl Iterator<Item = &str> {
        self.dirs.iter().chain(&self.files).map(String::as_str)
    }
}
