#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! osforge - build OS image trees from a pipeline manifest
//!
//! Loads the manifest, resolves what has to run against the object store,
//! hosts one worker process per stage type and source origin, and copies
//! the requested exports out of the store.

mod cli;
mod error;
mod logging;
mod output;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;
use osforge_builder::{BuildConfig, BuildContext, Builder, CancellationToken};
use osforge_config::Config;
use osforge_errors::Error;
use osforge_events::{EventMessage, EventReceiver};
use osforge_host::{ProcessIsolation, ServiceManager};
use osforge_resolver::Resolver;
use osforge_store::ObjectStore;
use osforge_types::{describe, BuildResult, BuildStatus, Manifest, ManifestDescription};
use tokio::io::AsyncReadExt;
use tokio::select;
use tracing::{error, info, warn};

use crate::cli::Cli;
use crate::error::CliError;
use crate::logging::log_event_with_tracing;
use crate::output::OutputRenderer;

/// Exit status of an interrupted build
const EXIT_ABORTED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.json;

    init_tracing(json_mode, cli.debug);

    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("Application error: {}", e);
            OutputRenderer::new(json_mode).render_error(&e);
            process::exit(e.exit_code());
        }
    }
}

/// Main application logic; returns the process exit status
async fn run(cli: Cli) -> Result<i32, CliError> {
    info!("Starting osforge v{}", env!("CARGO_PKG_VERSION"));

    // defaults, then file, then environment, then flags
    let mut config = Config::load_or_default(cli.config.as_deref()).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli);

    let manifest = load_manifest(&cli).await?;
    let renderer = OutputRenderer::new(cli.json);

    // Unknown exports and checkpoints are reported even when only inspecting.
    Resolver::new().validate(&manifest, &cli.exports, &cli.checkpoints)?;

    if cli.inspect {
        renderer.render_description(&describe(&manifest, true))?;
        return Ok(0);
    }

    let output_directory = match (&cli.output_directory, cli.exports.is_empty()) {
        (None, false) => {
            return Err(CliError::InvalidArguments(
                "--export requires --output-directory".to_string(),
            ))
        }
        (directory, _) => directory.clone(),
    };

    let (event_sender, event_receiver) = osforge_events::channel();

    let store = ObjectStore::open(config.store_path())
        .await?
        .with_events(event_sender.clone());
    let manager = Arc::new(
        ServiceManager::new(Arc::new(ProcessIsolation::new(
            config.isolation.wrapper.clone(),
        )))
        .with_grace(config.shutdown_grace())
        .with_events(event_sender.clone()),
    );
    let builder = Builder::new(Arc::clone(&manager), BuildConfig::from(&config))
        .with_events(event_sender);

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(cancel_on_interrupt(cancel.clone()));

    let outcome = {
        let context = BuildContext::new(&manifest, &store)
            .with_exports(cli.exports.iter().cloned())
            .with_checkpoints(cli.checkpoints.iter().cloned())
            .with_cancel(cancel);
        run_with_events(builder.run(&context), event_receiver).await
    };
    interrupt.abort();
    manager.shutdown().await;

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            close_store(store).await;
            return Err(e.into());
        }
    };

    if result.success {
        if let Some(directory) = &output_directory {
            if let Err(e) = export_all(&manifest, &store, &cli.exports, directory).await {
                close_store(store).await;
                return Err(e.into());
            }
        }
    }

    renderer.render_result(&result)?;
    close_store(store).await;
    Ok(exit_code(&result))
}

/// Drive `build` while logging every event it emits
async fn run_with_events<F>(build: F, mut events: EventReceiver) -> Result<BuildResult, Error>
where
    F: std::future::Future<Output = Result<BuildResult, Error>>,
{
    let mut build = Box::pin(build);

    loop {
        select! {
            result = &mut build => {
                // Drain any remaining events
                while let Ok(event) = events.try_recv() {
                    handle_event(&event);
                }
                return result;
            }

            event = events.recv() => {
                if let Some(event) = event {
                    handle_event(&event);
                }
            }
        }
    }
}

fn handle_event(event: &EventMessage) {
    log_event_with_tracing(event);
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Interrupted, aborting build");
        cancel.cancel();
    }
}

/// Read and parse the manifest description
async fn load_manifest(cli: &Cli) -> Result<Manifest, CliError> {
    let text = if cli.manifest_from_stdin() {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .map_err(|e| CliError::Manifest(Error::from(e)))?;
        text
    } else {
        tokio::fs::read_to_string(&cli.manifest)
            .await
            .map_err(|e| CliError::Manifest(Error::io_with_path(&e, &cli.manifest)))?
    };

    let manifest = ManifestDescription::from_json(&text)?.load()?;
    Ok(manifest)
}

/// Copy each export to `<directory>/<pipeline name>`
async fn export_all(
    manifest: &Manifest,
    store: &ObjectStore,
    exports: &[String],
    directory: &Path,
) -> Result<(), Error> {
    for export in exports {
        let Some(pipeline) = manifest.get(export) else {
            continue;
        };
        let destination: PathBuf = directory.join(pipeline.name());
        store.export(&pipeline.id(), &destination).await?;
        info!(pipeline = %pipeline.name(), destination = %destination.display(), "exported");
    }
    Ok(())
}

async fn close_store(store: ObjectStore) {
    if let Err(e) = store.close().await {
        warn!(error = %e, "failed to clean up store scratch area");
    }
}

fn exit_code(result: &BuildResult) -> i32 {
    match result.status {
        BuildStatus::Success => 0,
        BuildStatus::Failure => 1,
        BuildStatus::Aborted => EXIT_ABORTED,
    }
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, cli: &Cli) {
    if let Some(store) = &cli.store {
        config.paths.store = Some(store.clone());
    }
    if let Some(libdir) = &cli.libdir {
        config.paths.libdir = Some(libdir.clone());
    }
    if let Some(seconds) = cli.stage_timeout {
        config.build.stage_timeout = Some(seconds);
    }
}

/// Initialize tracing/logging
fn init_tracing(json_mode: bool, debug_enabled: bool) {
    let default_filter = if debug_enabled {
        "debug"
    } else {
        "info"
    };
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter))
    };

    // stdout carries the result; logs always go to stderr
    if json_mode {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter())
            .init();
    }
}
