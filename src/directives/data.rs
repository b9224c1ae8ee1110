//! `<zin-data src="scheme://..." as="name" />` imports data into a variable.
//!
//! `file://` reads `.json` or `.csv` from the content root. Other schemes
//! have their placeholders substituted and go through the request's
//! [`Fetcher`](crate::engine::services::Fetcher); `mysql://` sources also
//! pick up their connection settings from `.env`. The tag is removed on
//! success; a name that is already bound keeps its first value.

use super::{rewrite_tags, vars};
use crate::engine::value::Imported;
use crate::engine::{Directive, RenderContext};
use crate::utils::fetch::{DataSource, FetchError, csv_rows};
use std::path::Path;

const EXAMPLE: &str = r#"<zin-data src="file://data/users.json" as="users" />"#;

pub struct Data;

impl Directive for Data {
    fn name(&self) -> &'static str {
        "data"
    }

    fn marker(&self) -> &'static str {
        "<zin-data"
    }

    fn apply(&self, document: String, cx: &mut RenderContext<'_>) -> String {
        rewrite_tags(&document, "data", cx, |tag, cx| {
            let (Some(src), Some(name)) = (tag.non_empty("src"), tag.non_empty("as")) else {
                return cx.tag_error(
                    tag.text,
                    format!("Missing 'src' or 'as' attribute. Example: {EXAMPLE}"),
                );
            };

            match import(src, cx) {
                Ok(imported) => {
                    cx.request.vars.bind(name, imported);
                    String::new()
                }
                Err(err) => cx.tag_error(tag.text, err.to_string()),
            }
        })
    }
}

fn import(src: &str, cx: &RenderContext<'_>) -> Result<Imported, FetchError> {
    let src = if src.starts_with("file://") {
        src.to_owned()
    } else {
        vars::substitute(src, cx.request)
    };

    match DataSource::parse(&src)? {
        DataSource::File(path) => import_file(&cx.request.root, &path, cx),
        DataSource::MySql(query) => {
            let source = DataSource::MySql(query.with_env(&cx.request.env));
            cx.services.fetcher.fetch(&source, cx.request.deadline)
        }
        remote => cx.services.fetcher.fetch(&remote, cx.request.deadline),
    }
}

fn import_file(root: &Path, path: &str, cx: &RenderContext<'_>) -> Result<Imported, FetchError> {
    let relative = path.trim_start_matches('/');
    if relative.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(FetchError::Parse(format!(
            "data source file '{path}' points outside of the content root"
        )));
    }

    let full = root.join(relative);
    let ext = full
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    if !matches!(ext.as_deref(), Some("json" | "csv")) {
        return Err(FetchError::Parse(format!(
            "only .json or .csv files are supported for data loading, got '{path}'"
        )));
    }

    let text = cx.services.fs.read_to_string(&full).map_err(|err| {
        FetchError::Parse(format!("data source file '{path}' could not be read: {err}"))
    })?;

    if ext.as_deref() == Some("csv") {
        return csv_rows(&text).map(Imported::List);
    }

    let json: serde_json::Value = serde_json::from_str(&text)
        .map_err(|err| FetchError::Parse(format!("invalid JSON in '{path}': {err}")))?;
    Imported::from_json(json).ok_or_else(|| {
        FetchError::Parse(format!("JSON in '{path}' must be an object or an array"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directives::testing::{StaticFetcher, apply, apply_with, services};
    use crate::engine::RequestContext;
    use crate::engine::resolve::resolve;
    use crate::engine::services::Fetcher;
    use parking_lot::Mutex;
    use std::fs;
    use std::sync::Arc;
    use std::time::Instant;
    use tempfile::TempDir;

    fn site() -> (TempDir, RequestContext) {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        fs::write(
            dir.path().join("data/user.json"),
            r#"{"name": "Ann", "age": 30}"#,
        )
        .unwrap();
        fs::write(dir.path().join("data/rows.csv"), "name\nA\nB\n").unwrap();
        fs::write(dir.path().join("data/scalar.json"), "42").unwrap();
        let request = RequestContext::new(dir.path(), "/");
        (dir, request)
    }

    #[test]
    fn test_json_file_binds_object() {
        let (_dir, mut request) = site();
        let out = apply(
            &Data,
            r#"x<zin-data src="file://data/user.json" as="user"/>y"#,
            &mut request,
        );
        assert_eq!(out, "xy");
        assert_eq!(resolve(&request, "user.age", "", false), "30");
    }

    #[test]
    fn test_csv_file_binds_rows() {
        let (_dir, mut request) = site();
        apply(&Data, r#"<zin-data src="file://data/rows.csv" as="rows"/>"#, &mut request);
        assert_eq!(resolve(&request, "rows[1].name", "", false), "B");
    }

    #[test]
    fn test_first_import_wins() {
        let (dir, mut request) = site();
        fs::write(dir.path().join("data/other.json"), r#"{"name": "Zed"}"#).unwrap();
        apply(
            &Data,
            r#"<zin-data src="file://data/user.json" as="u"/><zin-data src="file://data/other.json" as="u"/>"#,
            &mut request,
        );
        assert_eq!(resolve(&request, "u.name", "", false), "Ann");
    }

    #[test]
    fn test_bad_sources_are_inline_errors() {
        let (_dir, mut request) = site();
        let out = apply(
            &Data,
            concat!(
                r#"<zin-data src="file://data/scalar.json" as="a"/>"#,
                r#"<zin-data src="file://data/user.txt" as="b"/>"#,
                r#"<zin-data src="ftp://host/x" as="c"/>"#,
                r#"<zin-data src="file://../secret.json" as="d"/>"#,
                r#"<zin-data src="file://data/user.json"/>"#,
            ),
            &mut request,
        );
        assert!(out.contains("must be an object or an array"));
        assert!(out.contains("only .json or .csv"));
        assert!(out.contains("not supported"));
        assert!(out.contains("outside of the content root"));
        assert!(out.contains("Missing &#x27;src&#x27;") || out.contains("Missing 'src'"));
    }

    #[test]
    fn test_remote_source_is_substituted_and_fetched() {
        let (_dir, mut request) = site();
        request.query.insert("id".into(), "7".into());
        let mut services = services();
        services.fetcher = Arc::new(StaticFetcher(Imported::Text("remote".into())));
        let out = apply_with(
            &Data,
            r#"<zin-data src="https://api.example.com/{{ id }}" as="page"/>"#,
            &mut request,
            &services,
        );
        assert_eq!(out, "");
        assert_eq!(request.vars.raw("page"), Some("remote"));
    }

    #[test]
    fn test_mysql_without_env_settings_is_inline_error() {
        let (_dir, mut request) = site();
        let mut services = services();
        services.fetcher = Arc::new(crate::utils::fetch::RemoteFetcher::new());
        let out = apply_with(
            &Data,
            r#"<zin-data src="mysql://SELECT name FROM users" as="x"/>"#,
            &mut request,
            &services,
        );
        assert!(out.contains("connection settings missing"));
    }

    #[test]
    fn test_mysql_source_carries_env_settings() {
        struct Recorder(Mutex<Option<DataSource>>);

        impl Fetcher for Recorder {
            fn fetch(&self, source: &DataSource, _: Option<Instant>) -> Result<Imported, FetchError> {
                *self.0.lock() = Some(source.clone());
                Ok(Imported::List(Vec::new()))
            }
        }

        let (_dir, mut request) = site();
        for (key, value) in [
            ("MYSQL_HOST", "db"),
            ("MYSQL_PORT", "3306"),
            ("MYSQL_USER", "app"),
            ("MYSQL_PASS", "pw"),
            ("MYSQL_BASE", "shop"),
        ] {
            request.env.insert(key.into(), value.into());
        }
        request.query.insert("min".into(), "18".into());
        let recorder = Arc::new(Recorder(Mutex::new(None)));
        let mut services = services();
        services.fetcher = recorder.clone();

        apply_with(
            &Data,
            r#"<zin-data src="mysql://SELECT name FROM users WHERE age > {{ min }}" as="users"/>"#,
            &mut request,
            &services,
        );

        let Some(DataSource::MySql(query)) = recorder.0.lock().clone() else {
            panic!("mysql source was not fetched");
        };
        assert_eq!(query.query, "SELECT name FROM users WHERE age > 18");
        assert_eq!(query.settings.map(|s| s.database).as_deref(), Some("shop"));
        assert_eq!(request.vars.list("users").map(<[_]>::len), Some(0));
    }

    #[test]
    fn test_mysql_write_query_is_rejected() {
        let (_dir, mut request) = site();
        let out = apply(
            &Data,
            r#"<zin-data src="mysql://DELETE FROM users" as="x"/>"#,
            &mut request,
        );
        assert!(out.contains("only SELECT queries are allowed"));
    }
}
