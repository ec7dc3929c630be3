//! Host/worker protocol error types

use std::borrow::Cow;
use std::time::Duration;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("malformed message: {message}")]
    Malformed { message: String },

    #[error("unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("unexpected frame: expected {expected}, got {actual}")]
    UnexpectedFrame { expected: String, actual: String },

    #[error("channel to {service} closed unexpectedly")]
    ChannelClosed { service: String },

    #[error("call to {service} timed out after {limit:?}")]
    Timeout { service: String, limit: Duration },

    #[error("descriptor index {index} out of range ({available} attached)")]
    MissingDescriptor { index: usize, available: usize },

    #[error("failed to start service {service}: {message}")]
    SpawnFailed { service: String, message: String },

    #[error("service {service} is not running")]
    NotRunning { service: String },

    #[error("service {service} is already running")]
    AlreadyRunning { service: String },

    #[error("transport error: {message}")]
    Transport { message: String },
}

impl ProtocolError {
    /// Stable code carried in error replies for unknown methods
    pub const UNKNOWN_METHOD_CODE: &'static str = "protocol.unknown_method";
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

impl UserFacingError for ProtocolError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::SpawnFailed { .. } => {
                Some("Check that the worker executable exists in the library directory.")
            }
            Self::Timeout { .. } => Some("Increase the stage timeout or investigate the stage."),
            Self::UnknownMethod { .. } => {
                Some("The worker does not implement this method; check its service role.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Malformed { .. } => "protocol.malformed",
            Self::UnknownMethod { .. } => Self::UNKNOWN_METHOD_CODE,
            Self::UnexpectedFrame { .. } => "protocol.unexpected_frame",
            Self::ChannelClosed { .. } => "protocol.channel_closed",
            Self::Timeout { .. } => "protocol.timeout",
            Self::MissingDescriptor { .. } => "protocol.missing_descriptor",
            Self::SpawnFailed { .. } => "protocol.spawn_failed",
            Self::NotRunning { .. } => "protocol.not_running",
            Self::AlreadyRunning { .. } => "protocol.already_running",
            Self::Transport { .. } => "protocol.transport",
        };
        Some(code)
    }
}
