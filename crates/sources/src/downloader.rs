//! Orchestrator side: one worker per source origin, cache hits filtered first

use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use osforge_errors::{Error, SourceError, SourceErrorKind};
use osforge_events::{EventEmitter, EventSender, FailureContext, SourceEvent};
use osforge_host::{write_payload, ServiceManager};
use osforge_store::ObjectStore;
use osforge_types::{Manifest, SourceRequest};
use serde_json::{json, Value};

use crate::worker::{item_path, DOWNLOAD_METHOD};

/// Service key of the worker for source `name`
#[must_use]
pub fn source_key(name: &str) -> String {
    format!("source/{name}")
}

/// Materializes every source item of a manifest into the store's cache
pub struct SourceDownloader {
    manager: Arc<ServiceManager>,
    libdir: PathBuf,
    parallel: usize,
    events: Option<EventSender>,
}

impl EventEmitter for SourceDownloader {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl SourceDownloader {
    /// Workers are looked up as `<libdir>/sources/<name>`.
    #[must_use]
    pub fn new(manager: Arc<ServiceManager>, libdir: impl Into<PathBuf>) -> Self {
        Self {
            manager,
            libdir: libdir.into(),
            parallel: 1,
            events: None,
        }
    }

    /// Number of origins downloaded at the same time
    #[must_use]
    pub fn with_parallelism(mut self, parallel: usize) -> Self {
        self.parallel = parallel.max(1);
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    fn executable(&self, name: &str) -> PathBuf {
        self.libdir.join("sources").join(name)
    }

    /// Download every source of `manifest` into `store`'s cache.
    ///
    /// All origins are attempted; any failure is fatal and the first one is
    /// returned once every download has settled.
    ///
    /// # Errors
    /// `Error::Source` for worker-reported failures, or the protocol error
    /// that prevented a worker from answering.
    pub async fn download(&self, manifest: &Manifest, store: &ObjectStore) -> Result<(), Error> {
        let results: Vec<(String, Result<(), Error>)> =
            stream::iter(manifest.sources().values())
                .map(|request| async move {
                    let result = self.download_source(request, store).await;
                    (request.name.clone(), result)
                })
                .buffer_unordered(self.parallel)
                .collect()
                .await;

        let mut first = None;
        for (source, result) in results {
            if let Err(err) = result {
                tracing::error!(%source, error = %err, "source download failed");
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    async fn download_source(&self, request: &SourceRequest, store: &ObjectStore) -> Result<(), Error> {
        let cache = store.source_cache(&request.name);
        let missing = missing_items(request, &cache);
        if missing.is_empty() {
            self.emit_source(SourceEvent::CacheHit {
                source: request.name.clone(),
                items: request.items.len(),
            });
            return Ok(());
        }

        self.emit_source(SourceEvent::DownloadStarted {
            source: request.name.clone(),
            items: missing.len(),
        });
        let started = Instant::now();

        match self.fetch(request, &cache, &missing, store).await {
            Ok(()) => {
                self.emit_source(SourceEvent::DownloadCompleted {
                    source: request.name.clone(),
                    items: missing.len(),
                    duration: started.elapsed(),
                });
                Ok(())
            }
            Err(err) => {
                self.emit_source(SourceEvent::DownloadFailed {
                    source: request.name.clone(),
                    failure: FailureContext::from_error(&err),
                });
                Err(err)
            }
        }
    }

    async fn fetch(
        &self,
        request: &SourceRequest,
        cache: &Path,
        missing: &[String],
        store: &ObjectStore,
    ) -> Result<(), Error> {
        let client = self
            .manager
            .get_or_start(&source_key(&request.name), self.executable(&request.name))
            .await?;

        let items: Value = match request.items_json() {
            Value::Object(all) => Value::Object(
                all.into_iter()
                    .filter(|(checksum, _)| missing.contains(checksum))
                    .collect(),
            ),
            other => other,
        };
        let payload = write_payload(store.tempfile()?, &items)?;
        let args = json!({
            "options": request.options,
            "cache": cache,
        });

        let mut signalled: Option<SourceError> = None;
        let outcome = client
            .call_with_fds(DOWNLOAD_METHOD, args, &[payload.as_fd()], None, |signal, _fds| {
                let err = SourceError::from_structured(signal)?;
                signalled.get_or_insert(err);
                Ok(())
            })
            .await;

        match outcome {
            Ok(_) => {}
            // The signal carries the complete structured error; prefer it.
            Err(Error::Remote(envelope)) => {
                return Err(signalled
                    .or_else(|| SourceError::from_envelope(&envelope))
                    .map_or(Error::Remote(envelope), Error::from));
            }
            Err(err) => return Err(err),
        }

        let absent: Vec<&String> = missing
            .iter()
            .filter(|checksum| !cache.join(checksum.as_str()).is_file())
            .collect();
        if let Some(first) = absent.first() {
            return Err(SourceError::new(
                SourceErrorKind::Unknown,
                format!("worker finished without providing {first}"),
                &request.name,
            )
            .into());
        }
        Ok(())
    }
}

/// Checksums (in wire form) of the items not yet in `cache`
fn missing_items(request: &SourceRequest, cache: &Path) -> Vec<String> {
    request
        .items
        .keys()
        .filter(|checksum| !item_path(cache, checksum).is_file())
        .map(ToString::to_string)
        .collect()
}
