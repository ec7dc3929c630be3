//! Worker side of source downloads

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use osforge_errors::{Error, ProtocolError, SourceError, SourceErrorKind};
use osforge_hash::Checksum;
use osforge_host::{read_payload, FdSet, Reply, Service, SignalSink};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Method name used by the downloader
pub const DOWNLOAD_METHOD: &str = "download";

/// Items to fetch, keyed by the checksum each must match
pub type SourceItems = BTreeMap<Checksum, Value>;

/// A source origin able to fetch items into the shared cache.
///
/// Implementations place each item at `<cache>/<checksum>` and verify it
/// before it becomes visible there.
#[async_trait]
pub trait SourceWorker: Send + Sync {
    /// Origin name, e.g. `org.osforge.curl`
    fn name(&self) -> &str;

    /// # Errors
    /// Returns the first item failure, tagged with an origin-specific kind.
    async fn download(
        &self,
        items: &SourceItems,
        cache: &Path,
        options: &Map<String, Value>,
    ) -> Result<(), SourceError>;
}

#[derive(Deserialize)]
struct DownloadArgs {
    cache: PathBuf,
    #[serde(default)]
    options: Map<String, Value>,
}

/// Serves a [`SourceWorker`] over the host protocol.
///
/// Failures are sent twice: as a signal carrying the structured
/// [`SourceError`], then as the error reply ending the call.
pub struct SourceService<W> {
    worker: W,
}

impl<W: SourceWorker> SourceService<W> {
    #[must_use]
    pub fn new(worker: W) -> Self {
        Self { worker }
    }

    fn bad_input(&self, message: impl Into<String>) -> SourceError {
        SourceError::new(SourceErrorKind::Unknown, message, self.worker.name())
    }

    fn parse_items(&self, value: Value) -> Result<SourceItems, SourceError> {
        let Value::Object(map) = value else {
            return Err(self.bad_input("items must be an object"));
        };
        map.into_iter()
            .map(|(key, desc)| {
                Checksum::parse(&key)
                    .map(|checksum| (checksum, desc))
                    .map_err(|e| self.bad_input(e.to_string()))
            })
            .collect()
    }

    async fn run(&self, items: Value, args: &DownloadArgs) -> Result<(), SourceError> {
        let items = self.parse_items(items)?;
        tokio::fs::create_dir_all(&args.cache).await.map_err(|e| {
            SourceError::new(
                SourceErrorKind::CurlStorage,
                format!("{}: {e}", args.cache.display()),
                self.worker.name(),
            )
        })?;
        tracing::debug!(source = self.worker.name(), items = items.len(), "downloading");
        self.worker.download(&items, &args.cache, &args.options).await
    }
}

#[async_trait]
impl<W: SourceWorker> Service for SourceService<W> {
    async fn dispatch(
        &self,
        method: &str,
        args: Value,
        mut fds: FdSet,
        signals: &SignalSink<'_>,
    ) -> Result<Reply, Error> {
        if method != DOWNLOAD_METHOD {
            return Err(ProtocolError::UnknownMethod {
                method: method.to_string(),
            }
            .into());
        }

        let args: DownloadArgs = serde_json::from_value(args)?;
        let items = read_payload(fds.steal(0)?)?;

        match self.run(items, &args).await {
            Ok(()) => Ok(Reply::default()),
            Err(err) => {
                signals.emit(err.to_structured(), &[]).await?;
                Err(err.into())
            }
        }
    }
}

/// Path of `checksum` inside `cache`
#[must_use]
pub fn item_path(cache: &Path, checksum: &Checksum) -> PathBuf {
    cache.join(checksum.to_string())
}

/// Scratch path next to the final location, on the same filesystem
#[must_use]
pub fn partial_path(cache: &Path, checksum: &Checksum) -> PathBuf {
    cache.join(format!(".{}.{}.part", checksum.digest_hex(), Uuid::new_v4()))
}

/// Verify the file at `partial` against `checksum` and move it into the
/// cache. The partial file is removed on failure.
///
/// # Errors
/// `Checksum` kind on mismatch, `CurlStorage` on I/O errors.
pub async fn commit_item(
    source: &str,
    cache: &Path,
    checksum: &Checksum,
    partial: &Path,
) -> Result<(), SourceError> {
    let verified = checksum.verify_file(partial).await;
    let storage = |message: String| SourceError::new(SourceErrorKind::CurlStorage, message, source);

    match verified {
        Ok(true) => {}
        Ok(false) => {
            let _ = tokio::fs::remove_file(partial).await;
            return Err(SourceError::new(
                SourceErrorKind::Checksum,
                format!("checksum mismatch for {checksum}"),
                source,
            ));
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(partial).await;
            return Err(storage(e.to_string()));
        }
    }

    let dest = item_path(cache, checksum);
    tokio::fs::rename(partial, &dest)
        .await
        .map_err(|e| storage(format!("{}: {e}", dest.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use osforge_hash::ChecksumAlgorithm;

    #[tokio::test]
    async fn test_commit_item_checks_content() {
        let cache = tempfile::tempdir().unwrap();
        let good = Checksum::compute(ChecksumAlgorithm::Sha256, b"data");

        let partial = partial_path(cache.path(), &good);
        tokio::fs::write(&partial, b"data").await.unwrap();
        commit_item("test", cache.path(), &good, &partial).await.unwrap();
        assert!(item_path(cache.path(), &good).is_file());
        assert!(!partial.exists());

        let other = Checksum::compute(ChecksumAlgorithm::Sha256, b"other");
        let partial = partial_path(cache.path(), &other);
        tokio::fs::write(&partial, b"data").await.unwrap();
        let err = commit_item("test", cache.path(), &other, &partial)
            .await
            .unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::Checksum);
        assert_eq!(err.source, "test");
        assert!(!partial.exists());
        assert!(!item_path(cache.path(), &other).exists());
    }
}
