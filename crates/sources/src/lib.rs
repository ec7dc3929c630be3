#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Source downloads for osforge
//!
//! The [`SourceDownloader`] runs on the orchestrator side and hands each
//! origin's missing items to a worker keyed `source/<name>`. Workers
//! implement [`SourceWorker`] and are served with [`SourceService`]. Items
//! land in the store's source cache at `sources/<name>/<checksum>`.

mod curl;
mod downloader;
mod inline;
mod worker;

pub use curl::{CurlConfig, CurlSource, CURL_SOURCE};
pub use downloader::{source_key, SourceDownloader};
pub use inline::{InlineSource, INLINE_SOURCE};
pub use worker::{
    commit_item, item_path, partial_path, SourceItems, SourceService, SourceWorker,
    DOWNLOAD_METHOD,
};

use std::sync::Arc;

use osforge_config::SourcesConfig;
use osforge_errors::SourceError;
use osforge_host::Service;

/// Names of the sources built into the worker binary
pub const BUILTIN_SOURCES: &[&str] = &[INLINE_SOURCE, CURL_SOURCE];

/// Service for a builtin source, or `None` if `name` is not one.
///
/// # Errors
/// Fails if the source cannot be initialized (e.g. the HTTP client).
pub fn builtin_service(
    name: &str,
    config: &SourcesConfig,
) -> Result<Option<Arc<dyn Service>>, SourceError> {
    Ok(match name {
        INLINE_SOURCE => Some(Arc::new(SourceService::new(InlineSource))),
        CURL_SOURCE => Some(Arc::new(SourceService::new(CurlSource::new(
            CurlConfig::from(config),
        )?))),
        _ => None,
    })
}
