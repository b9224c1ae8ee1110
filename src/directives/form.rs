//! `<zin-form action="https://..." [name] [callback] [captcha="google"]>…</zin-form>`
//!
//! The block becomes a plain `<form>` posting to `/zin-form`. Where the data
//! goes, who may submit it and which validators apply are sealed into an
//! encrypted session token carried by the form itself; the submit controller
//! in [`crate::submit`] opens it again.

use super::random;
use super::vars;
use crate::engine::resolve::resolve;
use crate::engine::scan::{self, Block};
use crate::engine::{Directive, RenderContext};
use crate::utils::crypto;
use html_escape::encode_double_quoted_attribute as attr;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Endpoint the rewritten form posts to.
pub const SUBMIT_PATH: &str = "/zin-form";

/// Separator between the fields of a session token.
pub const SESSION_SEPARATOR: &str = "::";

/// Captcha marker for forms without a captcha.
pub const NO_CAPTCHA: &str = "NONE";
pub const GOOGLE_CAPTCHA: &str = "GOOGLE";

const SUBMIT_SCRIPT: &str = include_str!("../embed/form.js");

static RE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(input|textarea|select)[^>]+>").unwrap());
static RE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sname\s*=\s*"([^"]+)""#).unwrap());
static RE_VALIDATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sdata-validator\s*=\s*"([^"]+)""#).unwrap());

pub struct Form;

impl Directive for Form {
    fn name(&self) -> &'static str {
        "form"
    }

    fn marker(&self) -> &'static str {
        "<zin-form"
    }

    fn apply(&self, document: String, cx: &mut RenderContext<'_>) -> String {
        let mut script_added = false;
        scan::replace_blocks(&document, "form", |block| match rewrite(block, cx) {
            Ok(form) if script_added => form,
            Ok(form) => {
                script_added = true;
                format!("{form}<script>{SUBMIT_SCRIPT}</script>")
            }
            Err(reason) => cx.inline_error(
                &format!("Failed To Load: {}", block.open.text),
                &reason,
            ),
        })
    }
}

fn rewrite(block: &Block<'_>, cx: &RenderContext<'_>) -> Result<String, String> {
    let action = block
        .open
        .non_empty("action")
        .ok_or("You haven't specified the form-action. It must be a http endpoint.")?;
    let action = vars::substitute(action, cx.request);
    if !action.starts_with("http") {
        return Err(format!(
            "For action '{action}' is not valid, the form can only submit to an http(s) endpoint"
        ));
    }

    let id = random::generate("MIXED", 32);
    let mut attrs = vec![
        format!(r#"action="{SUBMIT_PATH}""#),
        r#"onsubmit="zinFormSubmitHandler(event)""#.to_owned(),
        format!(r#"id="{id}""#),
    ];
    if let Some(callback) = block.open.attr("callback") {
        attrs.push(format!(r#"data-callback="{}""#, attr(callback)));
    }
    let source = block
        .open
        .attr("name")
        .map_or_else(|| format!("form@{}", cx.request.host), str::to_owned);
    attrs.push(format!(r#"data-source="{}""#, attr(&source)));

    let mut suffix = String::new();
    let captcha = match block.open.attr("captcha") {
        None => NO_CAPTCHA,
        Some(provider) if provider.eq_ignore_ascii_case(GOOGLE_CAPTCHA) => {
            let site_key = recaptcha_site_key(cx).ok_or(
                "Google recaptcha credentials (GOOGLE_RECAPTCHA_KEY, GOOGLE_RECAPTCHA_SECRET) are not present in the .env file",
            )?;
            attrs.push(format!(r#"data-captcha="{}""#, attr(&site_key)));
            suffix = format!(
                r#"<script src="https://www.google.com/recaptcha/api.js?render={}"></script>"#,
                urlencoding::encode(&site_key)
            );
            GOOGLE_CAPTCHA
        }
        Some(_) => {
            return Err(
                "Unsupported captcha provider. Currently only Google reCAPTCHA v3 is supported."
                    .to_owned(),
            );
        }
    };

    let validators = serde_json::to_string(&collect_validators(block.inner))
        .map_err(|err| format!("Failed to serialize form input validators: {err}"))?;
    let session = [
        action.as_str(),
        id.as_str(),
        cx.request.client_ip.as_str(),
        captcha,
        validators.as_str(),
    ]
    .join(SESSION_SEPARATOR);
    let token = crypto::encrypt(&session, &id)
        .map_err(|err| format!("Failed to generate form submission token: {err}"))?;
    attrs.push(format!(r#"data-session="{token}""#));

    Ok(format!(
        "<form {}>{}</form>{suffix}",
        attrs.join(" "),
        block.inner
    ))
}

/// Site key when both reCAPTCHA credentials are configured.
fn recaptcha_site_key(cx: &RenderContext<'_>) -> Option<String> {
    let key = resolve(cx.request, "GOOGLE_RECAPTCHA_KEY", "", true);
    let secret = resolve(cx.request, "GOOGLE_RECAPTCHA_SECRET", "", true);
    (!key.is_empty() && !secret.is_empty()).then_some(key)
}

/// Field name to validator rule, for fields that carry both.
pub fn collect_validators(body: &str) -> BTreeMap<String, String> {
    RE_FIELD
        .find_iter(body)
        .filter_map(|field| {
            let field = field.as_str();
            let name = RE_NAME.captures(field)?;
            let rule = RE_VALIDATOR.captures(field)?;
            Some((name[1].to_owned(), rule[1].to_owned()))
        })
        .collect()
}
