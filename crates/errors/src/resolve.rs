//! Resolver error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ResolveError {
    #[error("unknown export: {}", .names.join(", "))]
    UnknownExports { names: Vec<String> },

    #[error("checkpoints not found in manifest: {}", .names.join(", "))]
    MissedCheckpoints { names: Vec<String> },
}

impl UserFacingError for ResolveError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        Some("Refer to pipelines by name or by the id printed with --inspect.")
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::UnknownExports { .. } => "resolve.unknown_export",
            Self::MissedCheckpoints { .. } => "resolve.missed_checkpoint",
        };
        Some(code)
    }
}
