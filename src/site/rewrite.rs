//! `zin.config` rewrite rules, consulted when a requested file is missing.
//!
//! ```html
//! <zin-rewrite path="/old" to="/new.html" />
//! <zin-rewrite path="/docs" to="https://docs.example.com" />
//! ```

use crate::engine::scan;
use std::fs;
use std::path::{Path, PathBuf};

pub const REWRITE_FILE: &str = "zin.config";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// File under the content root.
    Internal(PathBuf),
    /// Absolute `http(s)` URL, answered with a redirect.
    External(String),
}

/// Rewrite for `request_path`, from the first matching rule.
pub fn find_rewrite(root: &Path, request_path: &str) -> Option<Rewrite> {
    let rules = fs::read_to_string(root.join(REWRITE_FILE)).ok()?;
    let target = scan::tags(&rules)
        .filter(|tag| tag.name == "rewrite" && !tag.malformed)
        .find(|tag| tag.attr("path") == Some(request_path))?
        .non_empty("to")?
        .to_owned();

    if target.starts_with("http://") || target.starts_with("https://") {
        return Some(Rewrite::External(target));
    }

    let relative = target.trim_start_matches('/');
    if relative.split(['/', '\\']).any(|segment| segment == "..") {
        return None;
    }
    Some(Rewrite::Internal(root.join(relative)))
}
