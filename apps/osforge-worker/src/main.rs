#![deny(clippy::pedantic, unsafe_code)]

//! osforge-worker - hosts one builtin stage or source per process
//!
//! The host starts this binary (usually through a `stages/<type>` or
//! `sources/<name>` link in the worker library) with the service key and
//! the inherited channel descriptor on the command line.

use std::process;
use std::sync::Arc;

use osforge_config::Config;
use osforge_errors::{Error, ProtocolError};
use osforge_host::{serve, Service, ServiceArgs};

const STAGE_PREFIX: &str = "stage/";
const SOURCE_PREFIX: &str = "source/";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "worker failed");
        eprintln!("osforge-worker: {e}");
        process::exit(1);
    }
}

async fn run() -> Result<(), Error> {
    let args = ServiceArgs::from_args(std::env::args_os())?;
    let key = args.service_id.clone();
    let service = lookup_service(&key).await?;
    let channel = args.into_channel()?;

    tracing::debug!(service = %key, "serving");
    serve(channel, &key, service.as_ref()).await
}

/// Map a service key onto a builtin implementation
async fn lookup_service(key: &str) -> Result<Arc<dyn Service>, Error> {
    let unknown = || -> Error {
        ProtocolError::SpawnFailed {
            service: key.to_string(),
            message: "no builtin service with this name".to_string(),
        }
        .into()
    };

    if let Some(stage) = key.strip_prefix(STAGE_PREFIX) {
        return osforge_builder::stages::builtin_service(stage).ok_or_else(unknown);
    }
    if let Some(source) = key.strip_prefix(SOURCE_PREFIX) {
        let mut config = Config::load().await?;
        config.merge_env()?;
        return osforge_sources::builtin_service(source, &config.sources)?.ok_or_else(unknown);
    }
    Err(unknown())
}

/// Logs go to stderr, which the host shares with its own
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}
