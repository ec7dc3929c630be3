//! Integration tests for the osforge CLI

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::process::{Command, Output};

    use tempfile::TempDir;

    const MANIFEST: &str = r#"{
        "version": "1",
        "pipelines": [
            {"name": "tree", "stages": [{"type": "org.osforge.mkdir", "options": {"paths": ["etc"]}}]},
            {"name": "image", "build": "tree", "stages": [{"type": "org.osforge.noop"}]}
        ]
    }"#;

    /// Run osforge with a private config home and store
    fn osforge(home: &Path, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_osforge"))
            .args(args)
            .env("XDG_CONFIG_HOME", home.join("config"))
            .env("HOME", home)
            .env("OSFORGE_STORE", home.join("store"))
            .env("OSFORGE_LIBDIR", home.join("lib"))
            .env_remove("OSFORGE_STAGE_TIMEOUT")
            .env_remove("OSFORGE_PARALLEL_SOURCES")
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to execute osforge")
    }

    fn write_manifest(home: &TempDir, text: &str) -> String {
        let path = home.path().join("manifest.json");
        std::fs::write(&path, text).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_cli_version() {
        let home = TempDir::new().unwrap();
        let output = osforge(home.path(), &["--version"]);
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("osforge"));
    }

    #[test]
    fn test_cli_help() {
        let home = TempDir::new().unwrap();
        let output = osforge(home.path(), &["--help"]);
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("--checkpoint"));
        assert!(stdout.contains("--output-directory"));
    }

    #[test]
    fn test_invalid_manifest_exits_2() {
        let home = TempDir::new().unwrap();
        let manifest = write_manifest(&home, "{\"version\": \"1\", \"pipelines\": [");
        let output = osforge(home.path(), &[&manifest]);
        assert_eq!(output.status.code(), Some(2));
        assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid manifest"));

        let output = osforge(home.path(), &["/nonexistent/manifest.json"]);
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_inspect_prints_ids() {
        let home = TempDir::new().unwrap();
        let manifest = write_manifest(&home, MANIFEST);
        let output = osforge(home.path(), &[&manifest, "--inspect", "--json"]);
        assert!(output.status.success());

        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let pipelines = value["pipelines"].as_array().unwrap();
        assert_eq!(pipelines[0]["name"], "tree");
        assert_eq!(pipelines[1]["build"], "tree");
        assert_eq!(pipelines[1]["id"].as_str().unwrap().len(), 64);
        assert!(pipelines[0]["stages"][0]["id"].is_string());
    }

    #[test]
    fn test_export_requires_output_directory() {
        let home = TempDir::new().unwrap();
        let manifest = write_manifest(&home, MANIFEST);
        let output = osforge(home.path(), &[&manifest, "--export", "image"]);
        assert_eq!(output.status.code(), Some(1));
        assert!(String::from_utf8_lossy(&output.stderr).contains("--output-directory"));

        let output = osforge(home.path(), &[&manifest, "--export", "image", "--json"]);
        assert_eq!(output.status.code(), Some(1));
        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["error"]["code"], "cli.invalid_arguments");
    }

    #[test]
    fn test_inspect_rejects_unknown_export() {
        let home = TempDir::new().unwrap();
        let manifest = write_manifest(&home, MANIFEST);
        let output = osforge(home.path(), &[&manifest, "--inspect", "--export", "ghost"]);
        assert_eq!(output.status.code(), Some(1));
        assert!(output.stdout.is_empty());
        assert!(String::from_utf8_lossy(&output.stderr).contains("ghost"));
    }

    #[test]
    fn test_missed_checkpoint_as_json() {
        let home = TempDir::new().unwrap();
        let manifest = write_manifest(&home, MANIFEST);
        let output = osforge(home.path(), &[&manifest, "--checkpoint", "missing", "--json"]);
        assert_eq!(output.status.code(), Some(1));

        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["error"]["code"], "resolve.missed_checkpoint");
        assert!(value["error"]["message"].as_str().unwrap().contains("missing"));
    }

    #[test]
    fn test_source_failure_as_json() {
        let home = TempDir::new().unwrap();
        let manifest = write_manifest(
            &home,
            r#"{
                "version": "1",
                "sources": {
                    "org.osforge.inline": {
                        "items": {
                            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824": {
                                "encoding": "base64",
                                "data": "aGVsbG8="
                            }
                        }
                    }
                },
                "pipelines": [
                    {"name": "tree", "stages": [{"type": "org.osforge.noop"}]}
                ]
            }"#,
        );
        let out = home.path().join("out");
        let output = osforge(
            home.path(),
            &[
                &manifest,
                "--export",
                "tree",
                "--output-directory",
                out.to_str().unwrap(),
                "--json",
            ],
        );
        // The private libdir is empty, so the source worker cannot start.
        assert_eq!(output.status.code(), Some(1));
        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(value["type"], "error");
        assert!(value["error"]["code"].is_string());
        assert!(value["error"]["message"]
            .as_str()
            .unwrap()
            .contains("org.osforge.inline"));
        assert!(!out.join("tree").exists());
    }

    #[test]
    fn test_missed_checkpoint_fails_before_building() {
        let home = TempDir::new().unwrap();
        let manifest = write_manifest(&home, MANIFEST);
        let output = osforge(home.path(), &[&manifest, "--checkpoint", "missing"]);
        assert_eq!(output.status.code(), Some(1));
        assert!(String::from_utf8_lossy(&output.stderr).contains("missing"));
        let objects = home.path().join("store/objects");
        assert!(objects.read_dir().map_or(true, |mut entries| entries.next().is_none()));
    }

    #[test]
    fn test_nothing_requested_is_success() {
        let home = TempDir::new().unwrap();
        let manifest = write_manifest(&home, MANIFEST);
        let output = osforge(home.path(), &[&manifest, "--json"]);
        assert!(output.status.success());

        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(value["type"], "result");
        assert_eq!(value["success"], true);
        assert_eq!(value["status"], "success");
    }
}
