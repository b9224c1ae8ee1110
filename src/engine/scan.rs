//! Tokenizer for `<zin-*>` tags and `{{ ... }}` placeholders.
//!
//! Every directive finds its tags through this module instead of running its
//! own pattern, so attribute quoting and tag boundaries behave the same way in
//! every pass.
//!
//! A tag starts at `<zin`. When the next character is `-`, the tag name is the
//! run of `[A-Za-z0-9_-]` after it; when it is anything other than a word
//! character the tag has an empty name (so a bare `<zin>` is still a tag).
//! Attributes are `key="value"`, `key='value'`, `key=value` or bare `key`.
//! Keys are case-insensitive.
//!
//! A tag whose attribute list cannot be parsed is still reported, flagged as
//! malformed, and spans up to the next `>`. A `<zin` with no `>` after it is
//! ignored and left in the output.

use std::collections::BTreeMap;
use std::ops::Range;

/// Literal every tag starts with. Passes use it as their fast-path marker.
pub const TAG_OPEN: &str = "<zin";

/// Attribute map of a tag, keyed by lowercased attribute name.
pub type Attributes = BTreeMap<String, String>;

// ============================================================================
// Tags
// ============================================================================

/// One `<zin...>` tag occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag<'a> {
    /// Name after `<zin-`, empty for `<zin>`.
    pub name: &'a str,
    pub attrs: Attributes,
    /// Byte range of the whole tag in the scanned text.
    pub span: Range<usize>,
    /// Raw tag text, `<` through `>`.
    pub text: &'a str,
    pub self_closing: bool,
    pub malformed: bool,
}

impl Tag<'_> {
    /// Attribute value by (case-insensitive) name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Attribute value, treating an empty value as absent.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.attr(name).filter(|v| !v.is_empty())
    }
}

/// Iterator over the tags of a document, in order of appearance.
pub struct Tags<'a> {
    src: &'a str,
    pos: usize,
}

/// Scan `src` for tags from the beginning.
pub fn tags(src: &str) -> Tags<'_> {
    tags_from(src, 0)
}

/// Scan `src` for tags starting at byte offset `pos`.
pub fn tags_from(src: &str, pos: usize) -> Tags<'_> {
    Tags { src, pos }
}

impl<'a> Iterator for Tags<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.src.len() {
            let start = self.pos + self.src[self.pos..].find(TAG_OPEN)?;
            let after = start + TAG_OPEN.len();
            match parse_tag(self.src, start, after) {
                Some(tag) => {
                    self.pos = tag.span.end;
                    return Some(tag);
                }
                None => self.pos = after,
            }
        }
        None
    }
}

#[inline]
const fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[inline]
const fn is_name(b: u8) -> bool {
    is_word(b) || b == b'-'
}

#[inline]
const fn is_attr_name(b: u8) -> bool {
    is_name(b) || b == b':'
}

/// Parse the tag whose `<zin` starts at `start`; `after` points just past it.
fn parse_tag(src: &str, start: usize, after: usize) -> Option<Tag<'_>> {
    let bytes = src.as_bytes();

    // `<zinc>` is not ours
    if bytes.get(after).is_some_and(|&b| is_word(b)) {
        return None;
    }

    let (name, attrs_start) = if bytes.get(after) == Some(&b'-') {
        let name_start = after + 1;
        let name_end = name_start
            + bytes[name_start..]
                .iter()
                .take_while(|&&b| is_name(b))
                .count();
        (&src[name_start..name_end], name_end)
    } else {
        ("", after)
    };

    let (attrs, end, self_closing, malformed) = match parse_attrs(bytes, src, attrs_start) {
        Parsed::Done {
            attrs,
            end,
            self_closing,
        } => (attrs, end, self_closing, false),
        Parsed::Malformed => {
            let close = attrs_start + src[attrs_start..].find('>')?;
            (Attributes::new(), close + 1, false, true)
        }
        Parsed::Unterminated => return None,
    };

    Some(Tag {
        name,
        attrs,
        span: start..end,
        text: &src[start..end],
        self_closing,
        malformed,
    })
}

enum Parsed {
    Done {
        attrs: Attributes,
        end: usize,
        self_closing: bool,
    },
    Malformed,
    Unterminated,
}

fn parse_attrs(bytes: &[u8], src: &str, mut i: usize) -> Parsed {
    let len = bytes.len();
    let mut attrs = Attributes::new();

    // The name must be followed by whitespace or the end of the tag.
    if i < len && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' && bytes[i] != b'/' {
        return Parsed::Malformed;
    }

    loop {
        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= len {
            return Parsed::Unterminated;
        }

        match bytes[i] {
            b'>' => {
                return Parsed::Done {
                    attrs,
                    end: i + 1,
                    self_closing: false,
                };
            }
            b'/' if bytes.get(i + 1) == Some(&b'>') => {
                return Parsed::Done {
                    attrs,
                    end: i + 2,
                    self_closing: true,
                };
            }
            b if is_attr_name(b) => {
                let key_start = i;
                while i < len && is_attr_name(bytes[i]) {
                    i += 1;
                }
                let key = src[key_start..i].to_ascii_lowercase();

                let mut j = i;
                while j < len && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                if j >= len || bytes[j] != b'=' {
                    attrs.entry(key).or_default();
                    continue;
                }
                i = j + 1;
                while i < len && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                if i >= len {
                    return Parsed::Unterminated;
                }

                let value = match bytes[i] {
                    quote @ (b'"' | b'\'') => {
                        let value_start = i + 1;
                        let Some(offset) = bytes[value_start..].iter().position(|&b| b == quote)
                        else {
                            return Parsed::Malformed;
                        };
                        i = value_start + offset + 1;
                        &src[value_start..value_start + offset]
                    }
                    b'>' => return Parsed::Malformed,
                    _ => {
                        let value_start = i;
                        while i < len
                            && !bytes[i].is_ascii_whitespace()
                            && bytes[i] != b'>'
                            && !(bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'>'))
                        {
                            i += 1;
                        }
                        &src[value_start..i]
                    }
                };
                // first occurrence of a repeated attribute wins
                attrs.entry(key).or_insert_with(|| value.to_owned());
            }
            _ => return Parsed::Malformed,
        }
    }
}

// ============================================================================
// Rewriting
// ============================================================================

/// Replace every tag accepted by `pred` with the output of `f`.
pub fn replace_tags_where<P, F>(src: &str, mut pred: P, mut f: F) -> String
where
    P: FnMut(&Tag<'_>) -> bool,
    F: FnMut(&Tag<'_>) -> String,
{
    let mut out = String::with_capacity(src.len());
    let mut last = 0;
    for tag in tags(src) {
        if !pred(&tag) {
            continue;
        }
        out.push_str(&src[last..tag.span.start]);
        out.push_str(&f(&tag));
        last = tag.span.end;
    }
    out.push_str(&src[last..]);
    out
}

/// Replace every well-formed tag called `name`.
///
/// Malformed tags of that name are left for the unsupported-tag sweep.
pub fn replace_tags<F>(src: &str, name: &str, f: F) -> String
where
    F: FnMut(&Tag<'_>) -> String,
{
    replace_tags_where(src, |tag| tag.name == name && !tag.malformed, f)
}

/// A paired `<zin-NAME ...>inner</zin-NAME>` region.
#[derive(Debug)]
pub struct Block<'a> {
    pub open: Tag<'a>,
    pub inner: &'a str,
    pub span: Range<usize>,
}

/// Replace every block called `name`.
///
/// The opening tag pairs with the first closing tag after it, so blocks of
/// the same name do not nest. An opening tag without a closing tag is left
/// untouched.
pub fn replace_blocks<F>(src: &str, name: &str, mut f: F) -> String
where
    F: FnMut(&Block<'_>) -> String,
{
    let closing = format!("</zin-{name}>");
    let mut out = String::with_capacity(src.len());
    let mut last = 0;
    let mut pos = 0;

    while let Some(open) = tags_from(src, pos)
        .find(|tag| tag.name == name && !tag.malformed && !tag.self_closing)
    {
        let inner_start = open.span.end;
        let Some(offset) = src[inner_start..].find(&closing) else {
            pos = open.span.end;
            continue;
        };
        let inner_end = inner_start + offset;
        let end = inner_end + closing.len();

        let block = Block {
            inner: &src[inner_start..inner_end],
            span: open.span.start..end,
            open,
        };
        out.push_str(&src[last..block.span.start]);
        out.push_str(&f(&block));
        last = end;
        pos = end;
    }

    out.push_str(&src[last..]);
    out
}

// ============================================================================
// Placeholders
// ============================================================================

/// One `{{ expr }}` occurrence. The expression holds no braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder<'a> {
    /// Expression with surrounding whitespace trimmed.
    pub expr: &'a str,
    pub span: Range<usize>,
}

impl<'a> Placeholder<'a> {
    /// Split `key || default` into the key and its optional default.
    ///
    /// Double quotes are removed from the default.
    pub fn key_and_default(&self) -> (&'a str, Option<String>) {
        match self.expr.split_once("||") {
            Some((key, default)) => (key.trim(), Some(default.trim().replace('"', ""))),
            None => (self.expr, None),
        }
    }
}

/// Iterator over placeholders in order of appearance.
pub struct Placeholders<'a> {
    src: &'a str,
    pos: usize,
}

pub fn placeholders(src: &str) -> Placeholders<'_> {
    Placeholders { src, pos: 0 }
}

impl<'a> Iterator for Placeholders<'a> {
    type Item = Placeholder<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.src.as_bytes();
        while self.pos < self.src.len() {
            let start = self.pos + self.src[self.pos..].find("{{")?;
            let inner_start = start + 2;
            let inner_len = bytes[inner_start..]
                .iter()
                .take_while(|&&b| b != b'{' && b != b'}')
                .count();
            let inner_end = inner_start + inner_len;

            if self.src[inner_end..].starts_with("}}") {
                let expr = self.src[inner_start..inner_end].trim();
                if !expr.is_empty() {
                    self.pos = inner_end + 2;
                    return Some(Placeholder {
                        expr,
                        span: start..inner_end + 2,
                    });
                }
            }
            self.pos = start + 1;
        }
        None
    }
}

/// Rebuild `src` in one left-to-right pass, substituting each placeholder for
/// which `f` returns `Some`. Substituted text is never rescanned.
pub fn replace_placeholders<F>(src: &str, mut f: F) -> String
where
    F: FnMut(&Placeholder<'_>) -> Option<String>,
{
    let mut out = String::with_capacity(src.len());
    let mut last = 0;
    for placeholder in placeholders(src) {
        if let Some(value) = f(&placeholder) {
            out.push_str(&src[last..placeholder.span.start]);
            out.push_str(&value);
            last = placeholder.span.end;
        }
    }
    out.push_str(&src[last..]);
    out
}
