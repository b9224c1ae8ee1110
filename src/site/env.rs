//! Site `.env` file.
//!
//! `KEY=VALUE` per line. Blank lines and `#` comments are skipped, and one
//! layer of surrounding quotes is stripped from values.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const ENV_FILE: &str = ".env";

/// Read `<root>/.env`. A missing or unreadable file yields an empty map.
pub fn load_env(root: &Path) -> HashMap<String, String> {
    fs::read_to_string(root.join(ENV_FILE))
        .map(|text| parse_env(&text))
        .unwrap_or_default()
}

pub fn parse_env(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_owned(), unquote(value.trim()).to_owned()))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
