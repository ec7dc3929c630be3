#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the osforge build engine
//!
//! This crate provides fine-grained error types organized by subsystem.
//! Every error can be rendered into an [`ErrorEnvelope`], the uniform
//! structured form that crosses the worker/orchestrator process boundary
//! and is embedded in build results.

use std::borrow::Cow;

use thiserror::Error;

pub mod config;
pub mod manifest;
pub mod protocol;
pub mod resolve;
pub mod source;
pub mod stage;
pub mod storage;
pub mod structured;

// Re-export all error types at the root
pub use config::ConfigError;
pub use manifest::ManifestError;
pub use protocol::ProtocolError;
pub use resolve::ResolveError;
pub use source::{SourceError, SourceErrorKind};
pub use stage::StageError;
pub use storage::StoreError;
pub use structured::ErrorEnvelope;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("stage error: {0}")]
    Stage(#[from] StageError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An error raised inside a worker and reported through an error reply.
    #[error("remote error: {0}")]
    Remote(ErrorEnvelope),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation aborted")]
    Cancelled,

    #[error("I/O error: {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
        path: Option<std::path::PathBuf>,
    },
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an Io error with an associated path
    pub fn io_with_path(err: &std::io::Error, path: impl Into<std::path::PathBuf>) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: Some(path.into()),
        }
    }

    /// Whether this error represents an interruption rather than a failure
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Render this error into its structured, serializable form
    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope {
        match self {
            Self::Remote(envelope) => envelope.clone(),
            Self::Source(err) => err.envelope(),
            Self::Io { path: Some(path), .. } => ErrorEnvelope::from_error(self)
                .with_detail("path", path.display().to_string()),
            _ => ErrorEnvelope::from_error(self),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(ProtocolError::Malformed {
            message: format!("JSON error: {err}"),
        })
    }
}

impl From<ErrorEnvelope> for Error {
    fn from(envelope: ErrorEnvelope) -> Self {
        Self::Remote(envelope)
    }
}

/// Result type alias for osforge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Minimal interface for rendering user-facing error information without
/// requiring heavyweight envelopes.
pub trait UserFacingError {
    /// Short message suitable for CLI output.
    fn user_message(&self) -> Cow<'_, str>;

    /// Optional remediation hint.
    fn user_hint(&self) -> Option<&'static str> {
        None
    }

    /// Whether retrying the same operation is likely to succeed.
    fn is_retryable(&self) -> bool {
        false
    }

    /// Stable error code for structured reporting.
    fn user_code(&self) -> Option<&'static str> {
        None
    }
}

impl UserFacingError for Error {
    fn user_message(&self) -> Cow<'_, str> {
        match self {
            Error::Protocol(err) => err.user_message(),
            Error::Source(err) => err.user_message(),
            Error::Stage(err) => err.user_message(),
            Error::Remote(envelope) => Cow::Borrowed(envelope.message.as_str()),
            Error::Io { message, .. } => Cow::Owned(message.clone()),
            _ => Cow::Owned(self.to_string()),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Error::Protocol(err) => err.user_hint(),
            Error::Source(err) => err.user_hint(),
            Error::Stage(err) => err.user_hint(),
            Error::Store(err) => err.user_hint(),
            Error::Resolve(err) => err.user_hint(),
            Error::Config(err) => err.user_hint(),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Error::Protocol(err) => err.is_retryable(),
            Error::Source(err) => err.is_retryable(),
            Error::Store(err) => err.is_retryable(),
            Error::Io { .. } => true,
            _ => false,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Error::Protocol(err) => err.user_code(),
            Error::Source(err) => err.user_code(),
            Error::Stage(err) => err.user_code(),
            Error::Store(err) => err.user_code(),
            Error::Resolve(err) => err.user_code(),
            Error::Manifest(err) => err.user_code(),
            Error::Config(err) => err.user_code(),
            Error::Remote(_) => Some("error.remote"),
            Error::Internal(_) => Some("error.internal"),
            Error::Cancelled => Some("error.aborted"),
            Error::Io { .. } => Some("error.io"),
        }
    }
}
