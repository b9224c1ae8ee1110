//! `<zin-random type="STRING" len="12" />` inserts a random string.

use super::rewrite_tags;
use crate::engine::{Directive, RenderContext};
use rand::Rng;

const DEFAULT_LENGTH: usize = 5;
const MAX_LENGTH: usize = 4096;

const DIGITS: &str = "0123456789";
const LETTERS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const MIXED: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SPECIAL: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()_+-=[]{}|;:,.<>?";
const DEFAULT: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

/// Alphabet for a `type` value (case-insensitive).
fn charset(kind: &str) -> &'static str {
    match kind.to_ascii_uppercase().as_str() {
        "INT" | "I" => DIGITS,
        "STRING" | "STR" | "S" => LETTERS,
        "MIXED" | "MIX" | "MX" => MIXED,
        "SPECIAL" | "X" => SPECIAL,
        _ => DEFAULT,
    }
}

/// `len` random characters from the alphabet named by `kind`.
pub fn generate(kind: &str, len: usize) -> String {
    let alphabet = charset(kind).as_bytes();
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(alphabet[rng.gen_range(0..alphabet.len())]))
        .collect()
}

pub struct Random;

impl Directive for Random {
    fn name(&self) -> &'static str {
        "random"
    }

    fn marker(&self) -> &'static str {
        "<zin-random"
    }

    fn apply(&self, document: String, cx: &mut RenderContext<'_>) -> String {
        rewrite_tags(&document, "random", cx, |tag, cx| {
            let requested = tag.attr("len").or_else(|| tag.attr("length"));
            let len = match requested.map(|l| l.trim().parse::<usize>()) {
                None => DEFAULT_LENGTH,
                Some(Ok(len)) if len <= MAX_LENGTH => len,
                Some(_) => {
                    return cx.tag_error(
                        tag.text,
                        format!("length must be a whole number no larger than {MAX_LENGTH}"),
                    );
                }
            };
            generate(tag.attr("type").unwrap_or_default(), len)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directives::testing::apply;
    use crate::engine::RequestContext;

    #[test]
    fn test_generate_uses_charset() {
        assert!(generate("INT", 40).bytes().all(|b| b.is_ascii_digit()));
        assert!(generate("s", 40).bytes().all(|b| b.is_ascii_alphabetic()));
        assert!(generate("MX", 40).bytes().all(|b| b.is_ascii_alphanumeric()));
        assert!(
            generate("x", 40)
                .chars()
                .all(|c| SPECIAL.contains(c))
        );
        assert!(
            generate("", 40)
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        );
    }

    #[test]
    fn test_special_mixes_symbols_with_alphanumerics() {
        let out = generate("SPECIAL", 400);
        assert!(out.chars().any(|c| c.is_ascii_alphanumeric()));
        assert!(out.chars().any(|c| c.is_ascii_punctuation()));
    }

    #[test]
    fn test_directive_lengths() {
        let mut request = RequestContext::new("/site", "/");
        let out = apply(
            &Random,
            r#"<zin-random/>|<zin-random type="INT" len="8"/>|<zin-random length="3"/>"#,
            &mut request,
        );
        let parts: Vec<_> = out.split('|').collect();
        assert_eq!(parts[0].len(), 5);
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].bytes().all(|b| b.is_ascii_digit()));
        assert_eq!(parts[2].len(), 3);
    }

    #[test]
    fn test_bad_length_is_inline_error() {
        let mut request = RequestContext::new("/site", "/");
        let out = apply(&Random, r#"<zin-random len="lots"/>"#, &mut request);
        assert!(out.contains("length must be a whole number"));
    }
}
