//! Per-build inputs

use osforge_store::ObjectStore;
use osforge_types::Manifest;
use tokio_util::sync::CancellationToken;

/// What to build and where
#[derive(Clone)]
pub struct BuildContext<'a> {
    pub manifest: &'a Manifest,
    pub store: &'a ObjectStore,
    /// Pipelines whose trees are wanted (names or id hex)
    pub exports: Vec<String>,
    /// Pipelines that must be committed even if nothing exported needs them
    pub checkpoints: Vec<String>,
    /// Cancelling aborts the build and tears down its workers
    pub cancel: CancellationToken,
}

impl<'a> BuildContext<'a> {
    #[must_use]
    pub fn new(manifest: &'a Manifest, store: &'a ObjectStore) -> Self {
        Self {
            manifest,
            store,
            exports: Vec::new(),
            checkpoints: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_exports<I, S>(mut self, exports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exports = exports.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_checkpoints<I, S>(mut self, checkpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checkpoints = checkpoints.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
