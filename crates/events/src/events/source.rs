use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::FailureContext;

/// Source download events, keyed by origin name (`org.osforge.curl`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceEvent {
    DownloadStarted {
        source: String,
        items: usize,
    },

    DownloadCompleted {
        source: String,
        items: usize,
        duration: Duration,
    },

    /// Every requested item was already in the cache
    CacheHit {
        source: String,
        items: usize,
    },

    DownloadFailed {
        source: String,
        failure: FailureContext,
    },
}
