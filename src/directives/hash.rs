//! `<zin-hash algo="sha256" value="..." [salt="..."] [output="hex|base64"] />`

use super::rewrite_tags;
use crate::engine::{Directive, RenderContext};
use crate::utils::crypto::{self, Encoding, HashAlgorithm};

pub struct Hash;

impl Directive for Hash {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn marker(&self) -> &'static str {
        "<zin-hash"
    }

    fn apply(&self, document: String, cx: &mut RenderContext<'_>) -> String {
        rewrite_tags(&document, "hash", cx, |tag, cx| {
            let (Some(algo), Some(value)) = (tag.non_empty("algo"), tag.non_empty("value")) else {
                return cx.tag_error(tag.text, "Missing 'algo' or 'value' attribute.");
            };
            let algorithm = match algo.parse::<HashAlgorithm>() {
                Ok(algorithm) => algorithm,
                Err(err) => return cx.tag_error(tag.text, err.to_string()),
            };
            // Unknown output formats fall back to hex.
            let encoding = tag
                .attr("output")
                .and_then(|o| o.parse::<Encoding>().ok())
                .unwrap_or_default();

            let salted = format!("{value}{}", tag.attr("salt").unwrap_or_default());
            crypto::hash(&salted, algorithm, encoding)
        })
    }
}
