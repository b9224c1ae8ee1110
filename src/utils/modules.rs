//! External modules.
//!
//! A tag `<zin-NAME ...>` that no directive handles is passed to the
//! executable `<root>/modules/zin-NAME` (or `zin-NAME.exe`). The full tag
//! text is written to its stdin and its stdout replaces the tag.
//!
//! The directory listing is cached per content root and rescanned only when
//! the directory's modification time changes.

use crate::engine::scan;
use crate::engine::services::ModuleRunner;
use crate::log;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;

/// Module directory, relative to the content root.
pub const MODULE_DIR: &str = "modules";

/// How often a running module is checked against the deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error(
        "unrecognized or malformed '{0}' tag detected. It may be due to a typo, missing attributes, or use of an unsupported tag"
    )]
    NotFound(String),

    #[error("module `{name}` could not be started: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("output of module `{name}` could not be read: {source}")]
    Output {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("module `{0}` exited with {1}: {2}")]
    Failed(String, String, String),

    #[error("module `{0}` did not finish before the request deadline")]
    TimedOut(String),
}

struct Listing {
    modified: SystemTime,
    modules: HashMap<String, PathBuf>,
}

/// [`ModuleRunner`] with a listing cache shared across requests.
#[derive(Default)]
pub struct ModuleCache {
    listings: RwLock<HashMap<PathBuf, Listing>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executable for the module called `name` (e.g. `zin-weather`).
    pub fn lookup(&self, root: &Path, name: &str) -> Option<PathBuf> {
        let dir = root.join(MODULE_DIR);
        let modified = fs::metadata(&dir).and_then(|m| m.modified()).ok()?;

        if let Some(listing) = self.listings.read().get(&dir)
            && listing.modified >= modified
        {
            return listing.modules.get(name).cloned();
        }

        let modules = scan_modules(&dir);
        let found = modules.get(name).cloned();
        self.listings
            .write()
            .insert(dir, Listing { modified, modules });
        found
    }
}

impl ModuleRunner for ModuleCache {
    fn run(&self, root: &Path, tag: &str, deadline: Option<Instant>) -> Result<String, ModuleError> {
        let name = module_name(tag).ok_or_else(|| ModuleError::NotFound(tag.to_owned()))?;
        let exe = self
            .lookup(root, &name)
            .ok_or_else(|| ModuleError::NotFound(tag.to_owned()))?;
        run_module(&name, &exe, root, tag, deadline)
    }
}

/// `zin-NAME` for a tag, `None` for a bare `<zin>`.
fn module_name(tag: &str) -> Option<String> {
    scan::tags(tag)
        .next()
        .filter(|t| !t.name.is_empty())
        .map(|t| format!("zin-{}", t.name))
}

fn scan_modules(dir: &Path) -> HashMap<String, PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return HashMap::new();
    };

    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|entry| {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let name = file_name.strip_suffix(".exe").unwrap_or(&file_name);
            name.starts_with("zin-")
                .then(|| (name.to_owned(), entry.path()))
        })
        .collect()
}

fn run_module(
    name: &str,
    exe: &Path,
    root: &Path,
    tag: &str,
    deadline: Option<Instant>,
) -> Result<String, ModuleError> {
    let spawn_error = |source| ModuleError::Spawn {
        name: name.to_owned(),
        source,
    };

    let mut child = Command::new(exe)
        .current_dir(root)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error)?;

    // Drain pipes on their own threads so a chatty module cannot block on a full pipe
    let stdout = read_pipe(child.stdout.take());
    let stderr = read_pipe(child.stderr.take());

    // Dropping stdin after the write signals EOF to the module
    if let Some(mut stdin) = child.stdin.take() {
        let tag = tag.as_bytes().to_vec();
        thread::spawn(move || stdin.write_all(&tag).ok());
    }

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(err) => {
                kill(&mut child);
                return Err(spawn_error(err));
            }
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            kill(&mut child);
            log!("module"; "{name} killed at request deadline");
            return Err(ModuleError::TimedOut(name.to_owned()));
        }
        thread::sleep(POLL_INTERVAL);
    };

    let output_error = |source| ModuleError::Output {
        name: name.to_owned(),
        source,
    };
    let stdout = join_pipe(stdout).map_err(output_error)?;
    let stderr = join_pipe(stderr).map_err(output_error)?;

    if !status.success() {
        log!("module"; "{name} exited with {status}");
        return Err(ModuleError::Failed(
            name.to_owned(),
            status.to_string(),
            stderr.trim().to_owned(),
        ));
    }
    Ok(stdout)
}

type PipeReader = thread::JoinHandle<io::Result<Vec<u8>>>;

fn read_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> PipeReader {
    thread::spawn(move || {
        let mut out = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut out)?;
        }
        Ok(out)
    })
}

/// Collected pipe output. Invalid UTF-8 is replaced rather than dropped.
fn join_pipe(reader: PipeReader) -> io::Result<String> {
    let bytes = reader
        .join()
        .map_err(|_| io::Error::other("pipe reader panicked"))??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_module_name() {
        assert_eq!(module_name(r#"<zin-weather city="x"/>"#).as_deref(), Some("zin-weather"));
        assert_eq!(module_name("<zin/>"), None);
    }

    #[test]
    fn test_missing_module_dir_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = ModuleCache::new()
            .run(dir.path(), "<zin-nothing/>", None)
            .unwrap_err();
        assert!(matches!(err, ModuleError::NotFound(_)));
    }

    #[test]
    fn test_scan_accepts_exe_suffix_and_prefix_only() {
        let dir = TempDir::new().unwrap();
        let modules = dir.path().join(MODULE_DIR);
        fs::create_dir(&modules).unwrap();
        fs::write(modules.join("zin-a"), "").unwrap();
        fs::write(modules.join("zin-b.exe"), "").unwrap();
        fs::write(modules.join("other"), "").unwrap();

        let found = scan_modules(&modules);
        assert_eq!(found.len(), 2);
        assert!(found.contains_key("zin-a"));
        assert!(found.contains_key("zin-b"));
    }

    #[cfg(unix)]
    fn script(root: &Path, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        let modules = root.join(MODULE_DIR);
        fs::create_dir_all(&modules).unwrap();
        let path = modules.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_module_receives_tag_on_stdin() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "zin-echo", "cat");
        let out = ModuleCache::new()
            .run(dir.path(), r#"<zin-echo msg="hi"/>"#, None)
            .unwrap();
        assert_eq!(out, r#"<zin-echo msg="hi"/>"#);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_output_is_kept() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "zin-bytes", r"printf 'hello \377 world'");
        let out = ModuleCache::new()
            .run(dir.path(), "<zin-bytes/>", None)
            .unwrap();
        assert_eq!(out, "hello \u{FFFD} world");
    }

    #[cfg(unix)]
    #[test]
    fn test_module_writing_before_reading_stdin_finishes() {
        let dir = TempDir::new().unwrap();
        script(
            dir.path(),
            "zin-loud",
            "head -c 200000 /dev/zero | tr '\\0' 'a'; cat >/dev/null",
        );
        let out = ModuleCache::new()
            .run(
                dir.path(),
                "<zin-loud/>",
                Some(Instant::now() + Duration::from_secs(10)),
            )
            .unwrap();
        assert_eq!(out.len(), 200_000);
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_module_reports_stderr() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "zin-bad", "echo broken >&2; exit 3");
        let err = ModuleCache::new()
            .run(dir.path(), "<zin-bad/>", None)
            .unwrap_err();
        match err {
            ModuleError::Failed(name, _, stderr) => {
                assert_eq!(name, "zin-bad");
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_module_killed_at_deadline() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "zin-slow", "sleep 5");
        let started = Instant::now();
        let err = ModuleCache::new()
            .run(
                dir.path(),
                "<zin-slow/>",
                Some(Instant::now() + Duration::from_millis(100)),
            )
            .unwrap_err();
        assert!(matches!(err, ModuleError::TimedOut(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
