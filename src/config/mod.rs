//! Server configuration management for `zin.toml`.
//!
//! # Sections
//!
//! | Section     | Purpose                                           |
//! |-------------|---------------------------------------------------|
//! | `[serve]`   | HTTP listener (interface, port, request deadline) |
//! | `[render]`  | Templates, include depth, inline errors, zone     |
//!
//! The file is optional and lives in the content root. Every field has a default.
//!
//! # Example
//!
//! ```toml
//! [serve]
//! port = 9001
//! timeout = 30
//!
//! [render]
//! show_errors = true
//! ```

pub mod defaults;
mod error;
mod handle;
mod render;
mod serve;

pub use error::ConfigError;
pub use handle::{cfg, init_config};
pub use render::RenderConfig;
pub use serve::ServeConfig;

use crate::cli::{Cli, Commands};
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Root configuration structure representing zin.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Absolute content root (set from the CLI, never from the file)
    #[serde(skip)]
    #[educe(Default = PathBuf::from("./"))]
    pub root: PathBuf,

    /// HTTP listener settings
    #[serde(default)]
    pub serve: ServeConfig,

    /// Composition and directive settings
    #[serde(default)]
    pub render: RenderConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Read(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Load the configuration for the given CLI invocation.
    ///
    /// A missing config file is not an error; defaults apply.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let config_path = root.join(&cli.config);

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };
        config.update_with_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let root = cli.root.clone().unwrap_or_else(|| PathBuf::from("./"));
        self.root = Self::normalize_path(&root);
        self.config_path = Self::normalize_path(&self.root.join(&cli.config));

        match &cli.command {
            Commands::Serve {
                interface,
                port,
                timeout,
                show_errors,
            } => {
                Self::update_option(&mut self.serve.interface, interface.as_ref());
                Self::update_option(&mut self.serve.port, port.as_ref());
                Self::update_option(&mut self.serve.timeout, timeout.as_ref());
                Self::update_option(&mut self.render.show_errors, show_errors.as_ref());
            }
            Commands::Render { show_errors, .. } => {
                Self::update_option(&mut self.render.show_errors, show_errors.as_ref());
            }
        }
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.root.is_dir() {
            bail!(ConfigError::RootNotDir(self.root.clone()));
        }

        if self.serve.timeout == 0 {
            bail!(ConfigError::setting("serve", "timeout", "must be greater than zero"));
        }

        if self.render.max_include_depth == 0 {
            bail!(ConfigError::setting("render", "max_include_depth", "must be at least 1"));
        }

        if self.render.template.is_empty() || self.render.template.contains('/') {
            bail!(ConfigError::setting("render", "template", "must be a plain file name"));
        }

        let zone = &self.render.time_zone;
        if !zone.eq_ignore_ascii_case("local") && zone.parse::<chrono_tz::Tz>().is_err() {
            bail!(ConfigError::setting(
                "render",
                "time_zone",
                format!("`{zone}` is not a known time zone")
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_load_without_config_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_str().unwrap();
        let cli = Cli::parse_from(["zin", "-r", root, "serve"]);

        let config = SiteConfig::load(&cli).unwrap();
        assert_eq!(config.serve.port, 9001);
        assert_eq!(config.root, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_cli_overrides_file_values() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("zin.toml"),
            "[serve]\nport = 3000\ntimeout = 10\n[render]\nshow_errors = false\n",
        )
        .unwrap();
        let root = dir.path().to_str().unwrap();
        let cli = Cli::parse_from(["zin", "-r", root, "serve", "-p", "4000", "--show-errors"]);

        let config = SiteConfig::load(&cli).unwrap();
        assert_eq!(config.serve.port, 4000);
        assert_eq!(config.serve.timeout, 10);
        assert!(config.render.show_errors);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("zin.toml"), "[serve]\ntimeout = 0\n").unwrap();
        let root = dir.path().to_str().unwrap();
        let cli = Cli::parse_from(["zin", "-r", root, "serve"]);

        assert!(SiteConfig::load(&cli).is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_zone() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("zin.toml"), "[render]\ntime_zone = \"Mars/Olympus\"\n")
            .unwrap();
        let root = dir.path().to_str().unwrap();
        let cli = Cli::parse_from(["zin", "-r", root, "render", "/"]);

        let err = SiteConfig::load(&cli).unwrap_err();
        assert!(err.to_string().contains("time zone"));
    }

    #[test]
    fn test_validate_rejects_missing_root() {
        let cli = Cli::parse_from(["zin", "-r", "/definitely/not/here", "serve"]);
        assert!(SiteConfig::load(&cli).is_err());
    }
}
