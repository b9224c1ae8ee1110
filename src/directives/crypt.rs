//! `<zin-crypt action="hash|encrypt|enc|decrypt|dec" ... />`
//!
//! `data`, `salt` and `key` go through placeholder substitution before use, so
//! secrets can come from `{{ process.env.NAME }}`.

use super::{rewrite_tags, vars};
use crate::engine::scan::Tag;
use crate::engine::{Directive, RenderContext};
use crate::utils::crypto::{self, Encoding, HashAlgorithm};

pub struct Crypt;

impl Directive for Crypt {
    fn name(&self) -> &'static str {
        "crypt"
    }

    fn marker(&self) -> &'static str {
        "<zin-crypt"
    }

    fn apply(&self, document: String, cx: &mut RenderContext<'_>) -> String {
        rewrite_tags(&document, "crypt", cx, |tag, cx| {
            let Some(action) = tag.attr("action") else {
                return cx.tag_error(tag.text, "Missing required attribute: 'action' in zin-crypt tag.");
            };

            let result = match action.to_ascii_uppercase().as_str() {
                "HASH" => compose_hash(tag, cx)
                    .map_err(|err| format!("Unable to compose hash: {err}")),
                verb @ ("ENCRYPT" | "ENC" | "DECRYPT" | "DEC") => {
                    transform(tag, cx, verb.starts_with("ENC")).map_err(|err| {
                        format!(
                            "Unable to '{}' given data. Error: {err}",
                            action.to_ascii_lowercase()
                        )
                    })
                }
                _ => Err(format!(
                    "Given action for zin-crypt '{action}' is not supported. Use one of: encrypt, decrypt, hash."
                )),
            };

            result.unwrap_or_else(|reason| cx.tag_error(tag.text, reason))
        })
    }
}

fn compose_hash(tag: &Tag<'_>, cx: &RenderContext<'_>) -> Result<String, String> {
    let algorithm = tag.non_empty("algorithm").ok_or(
        "missing required attribute 'algorithm'. Use one of: md5, sha1, sha256, sha512, blake3",
    )?;
    let data = tag
        .non_empty("data")
        .ok_or("missing or empty 'data' attribute. Provide the input string to be hashed")?;
    let encoding = match tag.non_empty("format") {
        Some(format) => format.parse::<Encoding>().map_err(|err| err.to_string())?,
        None => Encoding::Hex,
    };
    let algorithm = algorithm
        .parse::<HashAlgorithm>()
        .map_err(|err| err.to_string())?;

    let salt = vars::substitute(tag.attr("salt").unwrap_or_default(), cx.request);
    let data = vars::substitute(data, cx.request);
    Ok(crypto::hash(&(data + &salt), algorithm, encoding))
}

fn transform(tag: &Tag<'_>, cx: &RenderContext<'_>, encrypt: bool) -> Result<String, String> {
    let data = tag
        .non_empty("data")
        .ok_or("missing or empty 'data' attribute. It should be a non-empty string")?;
    let key = tag.non_empty("key").ok_or(
        "missing or empty 'key' attribute. It should be a non-empty string, ideally a strong random value",
    )?;

    let data = vars::substitute(data, cx.request);
    let key = vars::substitute(key, cx.request);
    let result = if encrypt {
        crypto::encrypt(&data, &key)
    } else {
        crypto::decrypt(&data, &key)
    };
    result.map_err(|err| err.to_string())
}
