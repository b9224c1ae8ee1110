//! External collaborators used by directive passes.
//!
//! Everything that touches the disk, the network or a child process goes
//! through one of these traits so tests can swap in fakes.

use crate::utils::fetch::{DataSource, FetchError, RemoteFetcher};
use crate::utils::modules::{ModuleCache, ModuleError};
use super::value::Imported;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Read access to the content root.
pub trait ContentFs: Send + Sync {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
    fn exists(&self, path: &Path) -> bool;
}

/// [`ContentFs`] backed by the local disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskFs;

impl ContentFs for DiskFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Data imports that leave the content root.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, source: &DataSource, deadline: Option<Instant>) -> Result<Imported, FetchError>;
}

/// Runs external module executables for unknown tags.
pub trait ModuleRunner: Send + Sync {
    /// Run the module handling `tag` and return its standard output.
    fn run(&self, root: &Path, tag: &str, deadline: Option<Instant>) -> Result<String, ModuleError>;
}

/// Bundle of collaborators shared by every request.
#[derive(Clone)]
pub struct Services {
    pub fs: Arc<dyn ContentFs>,
    pub fetcher: Arc<dyn Fetcher>,
    pub modules: Arc<dyn ModuleRunner>,
}

impl Services {
    /// Disk, network and process-backed collaborators.
    pub fn standard() -> Self {
        Self {
            fs: Arc::new(DiskFs),
            fetcher: Arc::new(RemoteFetcher::new()),
            modules: Arc::new(ModuleCache::new()),
        }
    }
}
