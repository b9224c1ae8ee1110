//! Data sources for `<zin-data>`.
//!
//! `file://` sources are read from the content root by the directive itself.
//! Everything else goes through [`RemoteFetcher`]:
//!
//! | Scheme            | Result                                               |
//! |-------------------|------------------------------------------------------|
//! | `http(s)://`      | JSON object, JSON array, CSV rows or raw text        |
//! | `sheets://`       | CSV rows from a Google spreadsheet `SELECT` query    |
//! | `mysql://`        | rows of a `SELECT` query, see [`super::sql`]         |

use super::sql::{self, MySqlQuery};
use crate::engine::services::Fetcher;
use crate::engine::value::{Imported, Map, Value};
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::io;
use std::sync::{LazyLock, OnceLock};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Google visualization endpoint; sheet id, sheet name and encoded query.
const SHEETS_ENDPOINT: &str = "https://docs.google.com/spreadsheets/d";

/// Used when a request carries no deadline.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

static RE_SHEET_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+from\s+([a-zA-Z0-9_-]+)\.([a-zA-Z0-9_-]+)").unwrap()
});

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("`{0}` data sources are not supported")]
    Unsupported(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("GET `{1}` answered with status {0}")]
    Status(u16, String),

    #[error("{0}")]
    Parse(String),

    #[error("mysql: {0}")]
    Database(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<csv::Error> for FetchError {
    fn from(err: csv::Error) -> Self {
        Self::Parse(format!("CSV parsing failed: {err}"))
    }
}

// ============================================================================
// Sources
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// Path relative to the content root.
    File(String),
    /// Full `http://` or `https://` URL.
    Http(String),
    Sheets(SheetQuery),
    MySql(MySqlQuery),
}

impl DataSource {
    pub fn parse(src: &str) -> Result<Self, FetchError> {
        let (scheme, rest) = src
            .split_once("://")
            .ok_or_else(|| FetchError::Unsupported(src.to_owned()))?;

        match scheme.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File(rest.to_owned())),
            "http" | "https" => Ok(Self::Http(src.to_owned())),
            "sheets" => SheetQuery::parse(rest).map(Self::Sheets),
            "mysql" => MySqlQuery::parse(rest).map(Self::MySql),
            other => Err(FetchError::Unsupported(other.to_owned())),
        }
    }
}

/// `SELECT .. FROM <sheetId>.<sheetName> ..` split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetQuery {
    pub sheet_id: String,
    pub sheet_name: String,
    /// Query with the `FROM` clause removed.
    pub query: String,
}

impl SheetQuery {
    pub fn parse(src: &str) -> Result<Self, FetchError> {
        let caps = RE_SHEET_FROM.captures(src).ok_or_else(|| {
            FetchError::Parse("invalid query format, expected FROM SheetId.SheetName".into())
        })?;
        let query = src.replacen(&caps[0], "", 1).trim().to_owned();
        if !query.to_ascii_uppercase().starts_with("SELECT") {
            return Err(FetchError::Parse(
                "only SELECT queries can fetch data from google sheets".into(),
            ));
        }

        Ok(Self {
            sheet_id: caps[1].to_owned(),
            sheet_name: caps[2].to_owned(),
            query,
        })
    }

    pub fn url(&self) -> String {
        format!(
            "{SHEETS_ENDPOINT}/{}/gviz/tq?tqx=out:csv&sheet={}&tq={}",
            self.sheet_id,
            urlencoding::encode(&self.sheet_name),
            urlencoding::encode(&self.query)
        )
    }
}

/// Parse CSV with a header row into a list of row objects.
///
/// Cells beyond the header width are dropped.
pub fn csv_rows(text: &str) -> Result<Vec<Value>, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(FetchError::Parse("CSV is empty or malformed".into()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Map = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| (header.to_owned(), Value::from(cell)))
            .collect();
        rows.push(Value::Object(row));
    }
    Ok(rows)
}

// ============================================================================
// Remote Fetcher
// ============================================================================

/// [`Fetcher`] backed by a blocking HTTP client.
#[derive(Debug, Default)]
pub struct RemoteFetcher {
    client: OnceLock<Client>,
}

impl RemoteFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&Client, FetchError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .user_agent(concat!("zin-http-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(self.client.get_or_init(|| client))
    }

    fn get(&self, url: &str, deadline: Option<Instant>) -> Result<(String, String), FetchError> {
        let timeout = remaining(deadline).ok_or_else(|| FetchError::Http("request deadline passed".into()))?;

        let response = self
            .client()?
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16(), url.to_owned()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let body = response
            .text()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok((content_type, body))
    }
}

impl Fetcher for RemoteFetcher {
    fn fetch(&self, source: &DataSource, deadline: Option<Instant>) -> Result<Imported, FetchError> {
        match source {
            DataSource::Http(url) => {
                let (content_type, body) = self.get(url, deadline)?;
                classify_body(&content_type, body)
            }
            DataSource::Sheets(query) => {
                let (_, body) = self.get(&query.url(), deadline)?;
                if body.to_ascii_lowercase().contains(r#""status":"error""#) {
                    return Err(FetchError::Parse(
                        "google spreadsheet returned an error while processing the query".into(),
                    ));
                }
                csv_rows(&body).map(Imported::List)
            }
            DataSource::MySql(query) => {
                let timeout = remaining(deadline)
                    .ok_or_else(|| FetchError::Database("request deadline passed".into()))?;
                sql::select(query, timeout).map(Imported::List)
            }
            DataSource::File(_) => Err(FetchError::Unsupported("file".into())),
        }
    }
}

/// Time left before `deadline`, `None` once it has passed.
fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    let timeout = match deadline {
        Some(deadline) => deadline.saturating_duration_since(Instant::now()),
        None => DEFAULT_TIMEOUT,
    };
    (!timeout.is_zero()).then_some(timeout)
}

/// Shape an HTTP body according to its content type.
pub fn classify_body(content_type: &str, body: String) -> Result<Imported, FetchError> {
    if content_type.starts_with("application/json") {
        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| FetchError::Parse(format!("invalid JSON response: {e}")))?;
        return Imported::from_json(json)
            .ok_or_else(|| FetchError::Parse("JSON response is neither an object nor an array".into()));
    }
    if content_type.starts_with("text/csv") {
        return csv_rows(&body).map(Imported::List);
    }
    Ok(Imported::Text(body))
}
