use serde::{Deserialize, Serialize};

use crate::EventSource;
use osforge_errors::{ErrorEnvelope, UserFacingError};

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    /// Stable dotted error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Construct a new failure context.
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }

    /// Build failure context from an envelope reported by a worker.
    #[must_use]
    pub fn from_envelope(envelope: &ErrorEnvelope) -> Self {
        Self::new(
            Some(envelope.code.clone()),
            envelope.message.clone(),
            envelope.detail_str("hint"),
            false,
        )
    }
}

pub mod build;
pub mod host;
pub mod source;
pub mod store;

pub use build::*;
pub use host::*;
pub use source::*;
pub use store::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// Plan resolution and pipeline/stage execution
    Build(BuildEvent),

    /// Source downloads
    Source(SourceEvent),

    /// Object store commits and exports
    Store(StoreEvent),

    /// Worker process lifecycle
    Host(HostEvent),
}

impl AppEvent {
    /// Identify the source domain for this event (used for metadata/logging).
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::Build(_) => EventSource::BUILD,
            Self::Source(_) => EventSource::SOURCE,
            Self::Store(_) => EventSource::STORE,
            Self::Host(_) => EventSource::HOST,
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::Build(BuildEvent::StageFailed { .. })
            | Self::Source(SourceEvent::DownloadFailed { .. }) => Level::ERROR,

            Self::Build(BuildEvent::PipelineFinished { success: false, .. })
            | Self::Host(HostEvent::WorkerKilled { .. }) => Level::WARN,

            Self::Host(_)
            | Self::Source(SourceEvent::CacheHit { .. })
            | Self::Store(StoreEvent::StagingDiscarded { .. }) => Level::DEBUG,

            _ => Level::INFO,
        }
    }
}
