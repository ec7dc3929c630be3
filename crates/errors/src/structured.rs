//! Uniform structured error envelope

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::UserFacingError;

/// Structured error descriptor shared by every failure raised from a worker
/// or the orchestrator.
///
/// The envelope is what travels over the wire in error replies and signals,
/// and what gets embedded into stage results. `code` is a stable dotted
/// identifier (`source.checksum`, `stage.timeout`, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl ErrorEnvelope {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Build an envelope from any error carrying a stable code.
    #[must_use]
    pub fn from_error<E: UserFacingError + fmt::Display + ?Sized>(error: &E) -> Self {
        let mut envelope = Self::new(
            error.user_code().unwrap_or("error.unknown"),
            error.user_message().into_owned(),
        );
        if let Some(hint) = error.user_hint() {
            envelope = envelope.with_detail("hint", hint);
        }
        envelope
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Look up a string detail.
    #[must_use]
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }

    /// Subsystem prefix of the code (`source` for `source.checksum`).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.code.split('.').next().unwrap_or_default()
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorEnvelope {}
