//! Per-request state threaded through composition and every directive pass.

use super::value::{Imported, Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Value of the `Server` response header and the `server` identity of a page.
pub const SERVER_IDENTITY: &str = concat!("zin/", env!("CARGO_PKG_VERSION"));

/// Global error state. Once set, the remaining directive passes are skipped
/// and the shell renders an error page instead of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub title: String,
    pub code: String,
    pub reason: String,
}

impl ServerError {
    pub fn new(title: impl Into<String>, code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            code: code.into(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Imported Variables
// ============================================================================

/// Variables bound by data imports, one namespace per shape.
///
/// A name can be bound once per namespace; later imports under the same name
/// are ignored.
#[derive(Debug, Default)]
pub struct DataVars {
    raw: HashMap<String, String>,
    objects: HashMap<String, Map>,
    lists: HashMap<String, Vec<Value>>,
}

impl DataVars {
    /// Bind plain text. Returns `false` when the name was already taken.
    pub fn bind_raw(&mut self, name: &str, text: String) -> bool {
        bind_once(&mut self.raw, name, text)
    }

    pub fn bind_object(&mut self, name: &str, object: Map) -> bool {
        bind_once(&mut self.objects, name, object)
    }

    pub fn bind_list(&mut self, name: &str, list: Vec<Value>) -> bool {
        bind_once(&mut self.lists, name, list)
    }

    pub fn bind(&mut self, name: &str, imported: Imported) -> bool {
        match imported {
            Imported::Object(map) => self.bind_object(name, map),
            Imported::List(list) => self.bind_list(name, list),
            Imported::Text(text) => self.bind_raw(name, text),
        }
    }

    pub fn raw(&self, name: &str) -> Option<&str> {
        self.raw.get(name).map(String::as_str)
    }

    pub fn object(&self, name: &str) -> Option<&Map> {
        self.objects.get(name)
    }

    pub fn list(&self, name: &str) -> Option<&[Value]> {
        self.lists.get(name).map(Vec::as_slice)
    }
}

fn bind_once<T>(slot: &mut HashMap<String, T>, name: &str, value: T) -> bool {
    if slot.contains_key(name) {
        return false;
    }
    slot.insert(name.to_owned(), value);
    true
}

// ============================================================================
// Request Context
// ============================================================================

#[derive(Debug)]
pub struct RequestContext {
    /// Client address without the port.
    pub client_ip: String,
    pub method: String,
    pub host: String,
    /// Request path as received, e.g. `/blog/`.
    pub path: String,
    /// Content root directory.
    pub root: PathBuf,
    /// File the request path mapped to.
    pub content_source: PathBuf,
    /// Query parameters, first value per key.
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    /// Variables from the root `.env` file.
    pub env: HashMap<String, String>,
    /// Variables assigned by `<zin-set>`.
    pub local_vars: HashMap<String, String>,
    pub vars: DataVars,
    pub error: Option<ServerError>,
    pub deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(root: impl Into<PathBuf>, path: impl Into<String>) -> Self {
        Self {
            client_ip: String::new(),
            method: "GET".to_owned(),
            host: String::new(),
            path: path.into(),
            root: root.into(),
            content_source: PathBuf::new(),
            query: HashMap::new(),
            headers: HashMap::new(),
            env: HashMap::new(),
            local_vars: HashMap::new(),
            vars: DataVars::default(),
            error: None,
            deadline: None,
        }
    }

    /// Record a global error. The first recorded error is kept.
    pub fn fail(&mut self, error: ServerError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub const fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Time left before the deadline, `None` when the request is unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}
