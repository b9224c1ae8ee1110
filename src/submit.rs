//! `POST /zin-form`: submissions from forms rewritten by `<zin-form>`.
//!
//! The browser posts the form fields as JSON together with the form id, its
//! sealed session token and source name. The session is opened with the id,
//! bound to the submitting client, validated and then relayed to the form's
//! action URL.

use crate::directives::form::{GOOGLE_CAPTCHA, SESSION_SEPARATOR};
use crate::engine::context::SERVER_IDENTITY;
use crate::log;
use crate::utils::crypto::{self, CryptoError};
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::{LazyLock, OnceLock};
use std::time::Duration;
use thiserror::Error;

const RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";
const RELAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Payload fields consumed here and not forwarded.
const FORM_ID: &str = "zinFormId";
const FORM_SESSION: &str = "zinFormSession";
const FORM_SOURCE: &str = "zinFormSource";
const FORM_CAPTCHA: &str = "zinFormCaptcha";

static VALIDATORS: LazyLock<BTreeMap<&'static str, Regex>> = LazyLock::new(|| {
    BTreeMap::from([
        ("required", Regex::new(r".+").unwrap()),
        (
            "email",
            Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").unwrap(),
        ),
        ("mobile", Regex::new(r"^\+?[1-9]\d{9,14}$").unwrap()),
    ])
});

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Form content is empty.")]
    Empty,

    #[error("Unable to parse form data, invalid json format")]
    InvalidJson,

    #[error("Form submission invalid: data was tampered with or not from a valid ZinForm.")]
    NotAForm,

    #[error(transparent)]
    Session(#[from] CryptoError),

    #[error("Form session token is tampered or expired, try again")]
    Tampered,

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("ReCAPTCHA token missing or invalid, try again")]
    CaptchaMissing,

    #[error("failed ReCAPTCHA verification")]
    CaptchaFailed,

    #[error("{0}")]
    Relay(String),
}

impl SubmitError {
    pub const fn status(&self) -> u16 {
        match self {
            Self::Empty | Self::InvalidJson => 400,
            Self::NotAForm => 404,
            Self::Relay(_) => 502,
            _ => 401,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Contents of an opened session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub action: String,
    pub client_ip: String,
    pub captcha: String,
    /// Field name to `|`-separated rule names.
    pub validators: BTreeMap<String, String>,
}

impl Session {
    /// Decrypt `token` with the form `id` and split it into its fields.
    ///
    /// The id anchors the split, so actions and addresses may contain the
    /// separator themselves.
    pub fn open(token: &str, id: &str) -> Result<Self, SubmitError> {
        let plain = crypto::decrypt(token, id)?;
        let anchor = format!("{SESSION_SEPARATOR}{id}{SESSION_SEPARATOR}");
        let (action, rest) = plain.split_once(&anchor).ok_or(SubmitError::Tampered)?;

        let json_start = format!("{SESSION_SEPARATOR}{{");
        let split = rest.find(&json_start).ok_or(SubmitError::Tampered)?;
        let (head, validators) = (&rest[..split], &rest[split + SESSION_SEPARATOR.len()..]);
        let (client_ip, captcha) = head
            .rsplit_once(SESSION_SEPARATOR)
            .ok_or(SubmitError::Tampered)?;

        let validators = serde_json::from_str(validators)
            .map_err(|err| SubmitError::Validation(format!("invalid validator JSON: {err}")))?;
        Ok(Self {
            action: action.to_owned(),
            client_ip: client_ip.to_owned(),
            captcha: captcha.to_owned(),
            validators,
        })
    }
}

// ============================================================================
// Relay
// ============================================================================

/// Answer from the form's action endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relayed {
    pub status: u16,
    pub is_json: bool,
    pub body: String,
}

/// Outbound calls made while handling a submission.
pub trait Relay: Send + Sync {
    /// Ask the captcha provider whether `token` is valid.
    fn verify_captcha(&self, secret: &str, token: &str, client_ip: &str) -> Result<bool, String>;

    /// POST `payload` (JSON) to `url`.
    fn forward(&self, url: &str, headers: &[(&str, &str)], payload: String)
    -> Result<Relayed, String>;
}

/// [`Relay`] over blocking `reqwest`.
#[derive(Default)]
pub struct HttpRelay {
    client: OnceLock<Client>,
}

impl HttpRelay {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&Client, String> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .user_agent(SERVER_IDENTITY.replace("zin", "zin-http-client"))
            .timeout(RELAY_TIMEOUT)
            .build()
            .map_err(|err| err.to_string())?;
        Ok(self.client.get_or_init(|| client))
    }
}

impl Relay for HttpRelay {
    fn verify_captcha(&self, secret: &str, token: &str, client_ip: &str) -> Result<bool, String> {
        let response = self
            .client()?
            .post(RECAPTCHA_VERIFY_URL)
            .form(&[("secret", secret), ("response", token), ("remoteip", client_ip)])
            .send()
            .and_then(|r| r.text())
            .map_err(|err| err.to_string())?;
        let verdict: Value = serde_json::from_str(&response).map_err(|err| err.to_string())?;
        Ok(verdict.get("success").and_then(Value::as_bool) == Some(true))
    }

    fn forward(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        payload: String,
    ) -> Result<Relayed, String> {
        let mut request = self
            .client()?
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().map_err(|err| err.to_string())?;
        let status = response.status().as_u16();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        let body = response.text().map_err(|err| err.to_string())?;
        Ok(Relayed {
            status,
            is_json,
            body,
        })
    }
}

// ============================================================================
// Handling
// ============================================================================

/// Handle one submission; returns the status and JSON body to answer with.
pub fn handle_submission(
    body: &[u8],
    client_ip: &str,
    env: &HashMap<String, String>,
    relay: &dyn Relay,
) -> (u16, String) {
    match submit(body, client_ip, env, relay) {
        Ok(answer) => answer,
        Err(err) => {
            log!("form"; "rejected submission from {client_ip}: {err}");
            (err.status(), json!({ "error": err.to_string() }).to_string())
        }
    }
}

fn submit(
    body: &[u8],
    client_ip: &str,
    env: &HashMap<String, String>,
    relay: &dyn Relay,
) -> Result<(u16, String), SubmitError> {
    if body.is_empty() {
        return Err(SubmitError::Empty);
    }
    let mut fields: Map<String, Value> =
        serde_json::from_slice(body).map_err(|_| SubmitError::InvalidJson)?;

    let text = |name: &str| {
        fields
            .get(name)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    };
    let (Some(id), Some(token), Some(source)) = (text(FORM_ID), text(FORM_SESSION), text(FORM_SOURCE))
    else {
        return Err(SubmitError::NotAForm);
    };
    let captcha_token = text(FORM_CAPTCHA);

    let session = Session::open(&token, &id)?;
    if session.client_ip != client_ip {
        return Err(SubmitError::Tampered);
    }
    validate(&session.validators, &fields)?;

    let mut validator = session.captcha.clone();
    if session.captcha == GOOGLE_CAPTCHA
        && let Some(secret) = env.get("GOOGLE_RECAPTCHA_SECRET").filter(|s| !s.is_empty())
    {
        let token = captcha_token.ok_or(SubmitError::CaptchaMissing)?;
        let verified = relay
            .verify_captcha(secret, &token, client_ip)
            .map_err(SubmitError::Relay)?;
        if !verified {
            return Err(SubmitError::CaptchaFailed);
        }
        validator = "Google reCAPTCHA v3".to_owned();
    }

    for name in [FORM_ID, FORM_SESSION, FORM_SOURCE, FORM_CAPTCHA] {
        fields.remove(name);
    }
    let payload = Value::Object(fields).to_string();
    let headers = [
        ("X-ZIN-Form", source.as_str()),
        ("X-ZIN-Ref", id.as_str()),
        ("X-ZIN-Validator", validator.as_str()),
    ];
    let relayed = relay
        .forward(&session.action, &headers, payload)
        .map_err(SubmitError::Relay)?;
    log!("form"; "{source} -> {} answered {}", session.action, relayed.status);

    Ok(match relayed {
        Relayed { status: 200..=299, .. } => (
            200,
            json!({ "message": "Form submitted successfully" }).to_string(),
        ),
        Relayed {
            status,
            is_json: true,
            body,
        } => (status, body),
        Relayed { status, body, .. } => (status, json!({ "error": body }).to_string()),
    })
}

/// Check every field that has rules. Missing fields count as blank.
fn validate(rules: &BTreeMap<String, String>, fields: &Map<String, Value>) -> Result<(), SubmitError> {
    for (field, rule_list) in rules {
        let value = match fields.get(field) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_owned(),
            Some(other) => other.to_string(),
        };

        for rule in rule_list.split('|').map(str::trim) {
            let regex = VALIDATORS
                .get(rule)
                .ok_or_else(|| SubmitError::Validation(format!("validator not found: {rule}")))?;
            if regex.is_match(&value) {
                continue;
            }
            return Err(SubmitError::Validation(if rule == "required" && value.is_empty() {
                format!("input field '{field}' is required and cannot be blank")
            } else {
                format!("input field '{field}' is invalid for rule '{rule}'")
            }));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    const ID: &str = "AbCdEfGhIjKlMnOpQrStUvWxYz012345";

    #[derive(Default)]
    struct FakeRelay {
        captcha_ok: bool,
        answer: Option<Relayed>,
        forwarded: Mutex<Vec<(String, Vec<(String, String)>, String)>>,
    }

    impl Relay for FakeRelay {
        fn verify_captcha(&self, _: &str, token: &str, _: &str) -> Result<bool, String> {
            Ok(self.captcha_ok && token == "tok")
        }

        fn forward(
            &self,
            url: &str,
            headers: &[(&str, &str)],
            payload: String,
        ) -> Result<Relayed, String> {
            let headers = headers
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect();
            self.forwarded.lock().push((url.to_owned(), headers, payload));
            self.answer.clone().ok_or_else(|| "connection refused".to_owned())
        }
    }

    fn token(ip: &str, captcha: &str, validators: &str) -> String {
        let session = ["https://hooks.example.com/in", ID, ip, captcha, validators].join("::");
        crypto::encrypt(&session, ID).unwrap()
    }

    fn body(token: &str, extra: Value) -> Vec<u8> {
        let mut fields = json!({
            "zinFormId": ID,
            "zinFormSession": token,
            "zinFormSource": "contact",
        });
        if let (Some(fields), Value::Object(extra)) = (fields.as_object_mut(), extra) {
            fields.extend(extra);
        }
        fields.to_string().into_bytes()
    }

    fn ok_relay() -> FakeRelay {
        FakeRelay {
            answer: Some(Relayed {
                status: 201,
                is_json: false,
                body: String::new(),
            }),
            ..FakeRelay::default()
        }
    }

    #[test]
    fn test_session_open_handles_ipv6_addresses() {
        let token = token("::1", "NONE", r#"{"email":"required|email"}"#);
        let session = Session::open(&token, ID).unwrap();
        assert_eq!(session.action, "https://hooks.example.com/in");
        assert_eq!(session.client_ip, "::1");
        assert_eq!(session.captcha, "NONE");
        assert_eq!(session.validators["email"], "required|email");
    }

    #[test]
    fn test_valid_submission_is_forwarded() {
        let relay = ok_relay();
        let token = token("10.0.0.1", "NONE", r#"{"email":"required|email"}"#);
        let (status, answer) = handle_submission(
            &body(&token, json!({"email": "a@b.io", "note": "hi"})),
            "10.0.0.1",
            &HashMap::new(),
            &relay,
        );
        assert_eq!(status, 200);
        assert!(answer.contains("Form submitted successfully"));

        let forwarded = relay.forwarded.lock();
        let (url, headers, payload) = &forwarded[0];
        assert_eq!(url, "https://hooks.example.com/in");
        assert!(headers.contains(&("X-ZIN-Form".into(), "contact".into())));
        assert!(headers.contains(&("X-ZIN-Ref".into(), ID.into())));
        assert!(headers.contains(&("X-ZIN-Validator".into(), "NONE".into())));
        let payload: Value = serde_json::from_str(payload).unwrap();
        assert_eq!(payload, json!({"email": "a@b.io", "note": "hi"}));
    }

    #[test]
    fn test_rejections() {
        let relay = ok_relay();
        let env = HashMap::new();
        let token = token("10.0.0.1", "NONE", r#"{"email":"required|email","phone":"mobile"}"#);

        let (status, _) = handle_submission(b"", "10.0.0.1", &env, &relay);
        assert_eq!(status, 400);
        let (status, _) = handle_submission(b"{", "10.0.0.1", &env, &relay);
        assert_eq!(status, 400);
        let (status, _) = handle_submission(br#"{"a":1}"#, "10.0.0.1", &env, &relay);
        assert_eq!(status, 404);

        let good = json!({"email": "a@b.io", "phone": "+14155550100"});
        let (status, answer) = handle_submission(&body(&token, good.clone()), "10.9.9.9", &env, &relay);
        assert_eq!(status, 401);
        assert!(answer.contains("tampered"));

        let (status, answer) =
            handle_submission(&body(&token, json!({"phone": "12"})), "10.0.0.1", &env, &relay);
        assert_eq!(status, 401);
        assert!(answer.contains("'email' is required"));

        let (status, answer) = handle_submission(
            &body(&token, json!({"email": "a@b.io", "phone": "12"})),
            "10.0.0.1",
            &env,
            &relay,
        );
        assert_eq!(status, 401);
        assert!(answer.contains("invalid for rule 'mobile'"));

        assert!(relay.forwarded.lock().is_empty());
    }

    #[test]
    fn test_google_captcha_is_verified() {
        let relay = FakeRelay {
            captcha_ok: true,
            ..ok_relay()
        };
        let env = HashMap::from([("GOOGLE_RECAPTCHA_SECRET".to_owned(), "s".to_owned())]);
        let token = token("10.0.0.1", "GOOGLE", "{}");

        let (status, _) = handle_submission(&body(&token, json!({})), "10.0.0.1", &env, &relay);
        assert_eq!(status, 401);

        let (status, _) = handle_submission(
            &body(&token, json!({"zinFormCaptcha": "tok"})),
            "10.0.0.1",
            &env,
            &relay,
        );
        assert_eq!(status, 200);
        let forwarded = relay.forwarded.lock();
        assert!(
            forwarded[0]
                .1
                .contains(&("X-ZIN-Validator".into(), "Google reCAPTCHA v3".into()))
        );
        assert!(!forwarded[0].2.contains("zinFormCaptcha"));
    }

    #[test]
    fn test_endpoint_errors_are_passed_on() {
        let relay = FakeRelay {
            answer: Some(Relayed {
                status: 422,
                is_json: false,
                body: "bad input".into(),
            }),
            ..FakeRelay::default()
        };
        let token = token("10.0.0.1", "NONE", "{}");
        let (status, answer) =
            handle_submission(&body(&token, json!({})), "10.0.0.1", &HashMap::new(), &relay);
        assert_eq!(status, 422);
        assert_eq!(answer, r#"{"error":"bad input"}"#);

        let (status, _) = handle_submission(
            &body(&token, json!({})),
            "10.0.0.1",
            &HashMap::new(),
            &FakeRelay::default(),
        );
        assert_eq!(status, 502);
    }
}
