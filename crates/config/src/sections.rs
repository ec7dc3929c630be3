//! Configuration sections

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    /// Object store root
    pub store: Option<PathBuf>,
    /// Directory containing `stages/` and `sources/` worker executables
    pub libdir: Option<PathBuf>,
}

/// Build orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BuildConfig {
    /// Per-stage timeout in seconds; unset means no limit
    #[serde(default)]
    pub stage_timeout: Option<u64>,
}

/// Source download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Origins downloaded concurrently; 0 = auto-detect
    #[serde(default = "default_parallel_sources")]
    pub parallel_sources: usize,
    #[serde(default = "default_network_timeout")]
    pub network_timeout: u64, // seconds
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64, // seconds
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            parallel_sources: default_parallel_sources(),
            network_timeout: default_network_timeout(),
            retries: default_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

/// Worker isolation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationConfig {
    /// Command prefix used to launch every worker (e.g. `["bwrap", ...]`);
    /// empty runs workers as plain subprocesses.
    #[serde(default)]
    pub wrapper: Vec<String>,
    /// Seconds a worker gets to exit after its channel is closed before it
    /// is killed
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: u64,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            wrapper: Vec::new(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

// Default value functions for serde
fn default_parallel_sources() -> usize {
    0 // 0 = auto-detect
}

fn default_network_timeout() -> u64 {
    300 // 5 minutes
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1 // 1 second
}

fn default_shutdown_grace() -> u64 {
    5
}
