#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for osforge
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (`~/.config/osforge/config.toml`)
//! - Environment variables (`OSFORGE_*`)
//! - CLI flags (applied by the binary)

pub mod constants;
pub mod sections;

pub use sections::{BuildConfig, IsolationConfig, PathConfig, SourcesConfig};

use osforge_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub isolation: IsolationConfig,
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir
            .join(constants::CONFIG_DIR_NAME)
            .join(constants::CONFIG_FILE_NAME))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        // No resolvable config dir simply means no user config.
        let Ok(config_path) = Self::default_path() else {
            return Ok(Self::default());
        };

        if config_path.exists() {
            tracing::debug!(path = %config_path.display(), "loading configuration");
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // OSFORGE_STORE
        if let Ok(store) = std::env::var("OSFORGE_STORE") {
            if store.is_empty() {
                return Err(invalid("OSFORGE_STORE", store));
            }
            self.paths.store = Some(PathBuf::from(store));
        }

        // OSFORGE_LIBDIR
        if let Ok(libdir) = std::env::var("OSFORGE_LIBDIR") {
            if libdir.is_empty() {
                return Err(invalid("OSFORGE_LIBDIR", libdir));
            }
            self.paths.libdir = Some(PathBuf::from(libdir));
        }

        // OSFORGE_STAGE_TIMEOUT ("none" clears a configured limit)
        if let Ok(timeout) = std::env::var("OSFORGE_STAGE_TIMEOUT") {
            self.build.stage_timeout = if timeout == "none" {
                None
            } else {
                match timeout.parse::<u64>() {
                    Ok(seconds) if seconds > 0 => Some(seconds),
                    _ => return Err(invalid("OSFORGE_STAGE_TIMEOUT", timeout)),
                }
            };
        }

        // OSFORGE_PARALLEL_SOURCES
        if let Ok(parallel) = std::env::var("OSFORGE_PARALLEL_SOURCES") {
            self.sources.parallel_sources = parallel
                .parse()
                .map_err(|_| invalid("OSFORGE_PARALLEL_SOURCES", parallel))?;
        }

        Ok(())
    }

    /// Get the store path (with default)
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.paths
            .store
            .clone()
            .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_STORE))
    }

    /// Get the worker library directory (with default)
    #[must_use]
    pub fn libdir(&self) -> PathBuf {
        self.paths
            .libdir
            .clone()
            .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_LIBDIR))
    }

    #[must_use]
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.build.stage_timeout.map(Duration::from_secs)
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.isolation.shutdown_grace)
    }
}

fn invalid(field: &str, value: String) -> Error {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value,
    }
    .into()
}

/// Calculate concurrent source downloads based on CPU count
#[must_use]
pub fn calculate_parallel_sources(config_value: usize) -> usize {
    if config_value > 0 {
        config_value // User override
    } else {
        // Downloads are I/O bound; one per CPU, capped
        num_cpus::get().clamp(1, 8)
    }
}
