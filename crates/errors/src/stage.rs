//! Stage execution error types

use std::borrow::Cow;
use std::time::Duration;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StageError {
    #[error("stage {stage} failed: {message}")]
    Failed { stage: String, message: String },

    #[error("stage {stage} timed out after {limit:?}")]
    Timeout { stage: String, limit: Duration },

    #[error("stage {stage} not run: dependency {dependency} failed")]
    DependencyFailed { stage: String, dependency: String },

    #[error("invalid options for stage {stage}: {message}")]
    InvalidOptions { stage: String, message: String },

    #[error("path {path} escapes the tree")]
    PathEscape { path: String },

    #[error("missing source item {checksum}")]
    MissingSourceItem { checksum: String },
}

impl UserFacingError for StageError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Timeout { .. } => Some("Increase the stage timeout, then retry the build."),
            Self::InvalidOptions { .. } | Self::PathEscape { .. } => {
                Some("Correct the stage options in the manifest.")
            }
            Self::MissingSourceItem { .. } => {
                Some("Declare the item under the manifest sources so it gets downloaded.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Failed { .. } => "stage.failed",
            Self::Timeout { .. } => "stage.timeout",
            Self::DependencyFailed { .. } => "stage.dependency_failed",
            Self::InvalidOptions { .. } => "stage.invalid_options",
            Self::PathEscape { .. } => "stage.path_escape",
            Self::MissingSourceItem { .. } => "stage.missing_source_item",
        };
        Some(code)
    }
}
