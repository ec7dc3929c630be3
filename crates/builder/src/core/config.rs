//! Build configuration

use std::path::PathBuf;
use std::time::Duration;

use osforge_config::{calculate_parallel_sources, Config};

/// Settings the orchestrator needs from the global configuration
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory holding `stages/<type>` and `sources/<name>` executables
    pub libdir: PathBuf,
    /// Per-stage limit; `None` waits forever
    pub stage_timeout: Option<Duration>,
    /// Source origins downloaded concurrently
    pub parallel_sources: usize,
}

impl BuildConfig {
    #[must_use]
    pub fn new(libdir: impl Into<PathBuf>) -> Self {
        Self {
            libdir: libdir.into(),
            stage_timeout: None,
            parallel_sources: 1,
        }
    }

    #[must_use]
    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_parallel_sources(mut self, parallel: usize) -> Self {
        self.parallel_sources = parallel.max(1);
        self
    }

    /// Executable serving stage type `name`
    #[must_use]
    pub fn stage_executable(&self, name: &str) -> PathBuf {
        self.libdir.join(osforge_config::constants::STAGES_SUBDIR).join(name)
    }
}

impl From<&Config> for BuildConfig {
    fn from(config: &Config) -> Self {
        Self {
            libdir: config.libdir(),
            stage_timeout: config.stage_timeout(),
            parallel_sources: calculate_parallel_sources(config.sources.parallel_sources),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_global_config() {
        let mut config = Config::default();
        config.paths.libdir = Some(PathBuf::from("/opt/osforge"));
        config.build.stage_timeout = Some(30);
        config.sources.parallel_sources = 3;

        let build = BuildConfig::from(&config);
        assert_eq!(
            build.stage_executable("org.osforge.noop"),
            PathBuf::from("/opt/osforge/stages/org.osforge.noop")
        );
        assert_eq!(build.stage_timeout, Some(Duration::from_secs(30)));
        assert_eq!(build.parallel_sources, 3);
    }
}
