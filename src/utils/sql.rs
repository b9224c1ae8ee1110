//! `mysql://SELECT ...` data sources.
//!
//! Connection settings come from the site's `.env`:
//! `MYSQL_HOST`, `MYSQL_PORT`, `MYSQL_USER`, `MYSQL_PASS` and `MYSQL_BASE`.
//! Only single read-only `SELECT` statements are run. Each import opens its
//! own connection whose connect, read and write timeouts are the time left
//! before the request deadline.

use super::fetch::FetchError;
use crate::engine::value::{Map, Value};
use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder, Row};
use regex::Regex;
use serde_json::Number;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

/// Statement keywords refused anywhere in a query.
static RE_WRITE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(insert|update|delete|drop|alter|create|exec|truncate|replace|grant)\b|\bxp_")
        .unwrap()
});

/// Statement separators and comments.
const FORBIDDEN_TOKENS: [&str; 4] = [";", "--", "/*", "*/"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlSettings {
    pub host: String,
    pub port: String,
    pub user: String,
    pub pass: String,
    pub database: String,
}

impl MySqlSettings {
    /// Settings from `.env` variables, `None` unless all five are present.
    pub fn from_env(env: &HashMap<String, String>) -> Option<Self> {
        let get = |key: &str| env.get(key).cloned();
        Some(Self {
            host: get("MYSQL_HOST")?,
            port: get("MYSQL_PORT")?,
            user: get("MYSQL_USER")?,
            pass: get("MYSQL_PASS")?,
            database: get("MYSQL_BASE")?,
        })
    }

    fn port(&self) -> Result<u16, FetchError> {
        self.port.trim().parse().map_err(|_| {
            FetchError::Database(format!("MYSQL_PORT `{}` is not a port number", self.port))
        })
    }
}

/// A checked `SELECT` statement plus the settings it runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlQuery {
    pub query: String,
    /// Filled in from the request's `.env` before fetching.
    pub settings: Option<MySqlSettings>,
}

impl MySqlQuery {
    pub fn parse(src: &str) -> Result<Self, FetchError> {
        let query = src.trim();
        let is_select = query
            .get(..6)
            .is_some_and(|head| head.eq_ignore_ascii_case("SELECT"));
        if !is_select {
            return Err(FetchError::Database("only SELECT queries are allowed".into()));
        }
        if FORBIDDEN_TOKENS.iter().any(|token| query.contains(token))
            || RE_WRITE_KEYWORD.is_match(query)
        {
            return Err(FetchError::Database(
                "dangerous SQL keywords detected, execution revoked".into(),
            ));
        }

        Ok(Self {
            query: query.to_owned(),
            settings: None,
        })
    }

    pub fn with_env(mut self, env: &HashMap<String, String>) -> Self {
        self.settings = MySqlSettings::from_env(env);
        self
    }
}

/// Run the query and return one object per row.
pub fn select(query: &MySqlQuery, timeout: Duration) -> Result<Vec<Value>, FetchError> {
    let settings = query.settings.as_ref().ok_or_else(|| {
        FetchError::Database(
            "connection settings missing, check MYSQL_HOST, MYSQL_PORT, MYSQL_USER, MYSQL_PASS and MYSQL_BASE in .env".into(),
        )
    })?;

    let opts = OptsBuilder::new()
        .ip_or_hostname(Some(settings.host.as_str()))
        .tcp_port(settings.port()?)
        .user(Some(settings.user.as_str()))
        .pass(Some(settings.pass.as_str()))
        .db_name(Some(settings.database.as_str()))
        .tcp_connect_timeout(Some(timeout))
        .read_timeout(Some(timeout))
        .write_timeout(Some(timeout));

    let mut conn = Conn::new(opts)
        .map_err(|e| FetchError::Database(format!("failed to connect: {e}")))?;
    let rows: Vec<Row> = conn
        .query(query.query.as_str())
        .map_err(|e| FetchError::Database(format!("failed to execute query: {e}")))?;

    Ok(rows.iter().map(row_object).collect())
}

fn row_object(row: &Row) -> Value {
    let object: Map = row
        .columns_ref()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = row.as_ref(i).map_or(Value::Null, cell);
            (column.name_str().into_owned(), value)
        })
        .collect();
    Value::Object(object)
}

/// Text-protocol cells arrive as bytes; binary ones keep their numeric type.
fn cell(value: &mysql::Value) -> Value {
    match value {
        mysql::Value::NULL => Value::Null,
        mysql::Value::Bytes(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        mysql::Value::Int(n) => Value::Number(Number::from(*n)),
        mysql::Value::UInt(n) => Value::Number(Number::from(*n)),
        mysql::Value::Float(n) => float(f64::from(*n)),
        mysql::Value::Double(n) => float(*n),
        mysql::Value::Date(year, month, day, hour, minute, second, micros) => {
            let mut text = format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}");
            if *micros > 0 {
                text.push_str(&format!(".{micros:06}"));
            }
            Value::String(text)
        }
        mysql::Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if *negative { "-" } else { "" };
            let hours = u32::from(*hours) + days * 24;
            let mut text = format!("{sign}{hours:02}:{minutes:02}:{seconds:02}");
            if *micros > 0 {
                text.push_str(&format!(".{micros:06}"));
            }
            Value::String(text)
        }
    }
}

fn float(n: f64) -> Value {
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}
