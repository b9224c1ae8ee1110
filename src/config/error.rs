//! Errors raised while loading `zin.toml`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{0}`")]
    Read(PathBuf, #[source] io::Error),

    #[error("zin.toml is not valid: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("content root `{0}` is not a directory")]
    RootNotDir(PathBuf),

    /// A setting that parsed but holds an unusable value.
    #[error("[{section}.{key}] {reason}")]
    Setting {
        section: &'static str,
        key: &'static str,
        reason: String,
    },
}

impl ConfigError {
    pub fn setting(section: &'static str, key: &'static str, reason: impl Into<String>) -> Self {
        Self::Setting {
            section,
            key,
            reason: reason.into(),
        }
    }
}
