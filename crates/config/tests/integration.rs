//! Integration tests for config

#[cfg(test)]
mod tests {
    use osforge_config::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    // Mutex to ensure env var tests don't run concurrently
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_VARS: [&str; 4] = [
        "OSFORGE_STORE",
        "OSFORGE_LIBDIR",
        "OSFORGE_STAGE_TIMEOUT",
        "OSFORGE_PARALLEL_SOURCES",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[paths]
store = "/var/cache/osforge"
libdir = "/opt/osforge/lib"

[build]
stage_timeout = 600

[sources]
parallel_sources = 2
retries = 5

[isolation]
wrapper = ["bwrap", "--unshare-net"]
        "#
        )
        .unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.store_path(), PathBuf::from("/var/cache/osforge"));
        assert_eq!(config.libdir(), PathBuf::from("/opt/osforge/lib"));
        assert_eq!(config.stage_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.sources.parallel_sources, 2);
        assert_eq!(config.sources.retries, 5);
        assert_eq!(config.sources.network_timeout, 300);
        assert_eq!(config.isolation.wrapper, ["bwrap", "--unshare-net"]);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let err = Config::load_from_file(std::path::Path::new("/nonexistent/osforge.toml"))
            .await
            .unwrap_err();
        assert_eq!(
            osforge_errors::UserFacingError::user_code(&err),
            Some("config.not_found")
        );
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.store_path(), PathBuf::from(".osforge"));
        assert_eq!(config.libdir(), PathBuf::from("/usr/lib/osforge"));
        assert_eq!(config.stage_timeout(), None);
        assert!(config.isolation.wrapper.is_empty());
        assert!(calculate_parallel_sources(0) >= 1);
        assert_eq!(calculate_parallel_sources(3), 3);
    }

    #[test]
    fn test_merge_env() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var("OSFORGE_STORE", "/tmp/store");
        std::env::set_var("OSFORGE_LIBDIR", "/tmp/lib");
        std::env::set_var("OSFORGE_STAGE_TIMEOUT", "30");

        let mut config = Config::default();
        config.merge_env().unwrap();

        assert_eq!(config.store_path(), PathBuf::from("/tmp/store"));
        assert_eq!(config.libdir(), PathBuf::from("/tmp/lib"));
        assert_eq!(config.stage_timeout(), Some(Duration::from_secs(30)));

        std::env::set_var("OSFORGE_STAGE_TIMEOUT", "none");
        config.merge_env().unwrap();
        assert_eq!(config.stage_timeout(), None);

        clear_env();
    }

    #[test]
    fn test_invalid_env_value() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var("OSFORGE_STAGE_TIMEOUT", "soon");

        let mut config = Config::default();
        let result = config.merge_env();
        assert!(result.is_err());

        std::env::set_var("OSFORGE_STAGE_TIMEOUT", "0");
        assert!(config.merge_env().is_err());

        clear_env();
    }
}
