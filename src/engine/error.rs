use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort rendering of a page.
///
/// Directive failures never surface here; they become inline annotations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("content file `{}` could not be read", path.display())]
    ContentRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("template `{}` could not be read", path.display())]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    /// HTTP status the shell answers with.
    pub fn status(&self) -> u16 {
        match self {
            Self::ContentRead { source, .. } if source.kind() == io::ErrorKind::NotFound => 404,
            _ => 500,
        }
    }
}
