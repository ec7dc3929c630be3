//! Command line interface definition

use clap::Parser;
use std::path::PathBuf;

/// osforge - build OS image trees from a pipeline manifest
#[derive(Parser, Debug)]
#[command(name = "osforge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build OS image trees from a pipeline manifest")]
#[command(long_about = None)]
pub struct Cli {
    /// Manifest description to build (`-` reads stdin)
    #[arg(value_name = "MANIFEST")]
    pub manifest: PathBuf,

    /// Object store directory
    #[arg(long, value_name = "DIR")]
    pub store: Option<PathBuf>,

    /// Directory holding the `stages/` and `sources/` worker executables
    #[arg(long, value_name = "DIR")]
    pub libdir: Option<PathBuf>,

    /// Pipeline (name or id) that must be committed to the store
    #[arg(long = "checkpoint", value_name = "ID")]
    pub checkpoints: Vec<String>,

    /// Pipeline (name or id) to build and copy out
    #[arg(long = "export", value_name = "ID")]
    pub exports: Vec<String>,

    /// Where exported trees are written, one directory per export
    #[arg(long, value_name = "DIR")]
    pub output_directory: Option<PathBuf>,

    /// Print the manifest with computed ids instead of building
    #[arg(long)]
    pub inspect: bool,

    /// Per-stage timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub stage_timeout: Option<u64>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Use alternate config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Whether the manifest comes from standard input
    pub fn manifest_from_stdin(&self) -> bool {
        self.manifest.as_os_str() == "-"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_repeated_exports_and_checkpoints() {
        let cli = Cli::parse_from([
            "osforge",
            "manifest.json",
            "--export",
            "image",
            "--export",
            "tree",
            "--checkpoint",
            "tree",
            "--output-directory",
            "out",
        ]);
        assert_eq!(cli.exports, ["image", "tree"]);
        assert_eq!(cli.checkpoints, ["tree"]);
        assert_eq!(cli.output_directory, Some(PathBuf::from("out")));
        assert!(!cli.manifest_from_stdin());
    }

    #[test]
    fn test_dash_reads_stdin() {
        let cli = Cli::parse_from(["osforge", "-", "--inspect"]);
        assert!(cli.manifest_from_stdin());
        assert!(cli.inspect);
    }
}
