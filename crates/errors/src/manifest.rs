//! Manifest graph error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ManifestError {
    #[error("invalid manifest: {message}")]
    Invalid { message: String },

    #[error("unsupported manifest version: {version}")]
    UnsupportedVersion { version: String },

    #[error("duplicate pipeline name: {name}")]
    DuplicatePipeline { name: String },

    #[error("pipeline {pipeline} references unknown build pipeline {build}")]
    UnknownBuildPipeline { pipeline: String, build: String },

    #[error("build pipeline cycle detected at {pipeline}")]
    Cycle { pipeline: String },

    #[error("stage in pipeline {pipeline} references undeclared source item {checksum}")]
    UndeclaredSourceItem { pipeline: String, checksum: String },
}

impl UserFacingError for ManifestError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        Some("Fix the manifest description and retry.")
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Invalid { .. } => "manifest.invalid",
            Self::UnsupportedVersion { .. } => "manifest.unsupported_version",
            Self::DuplicatePipeline { .. } => "manifest.duplicate_pipeline",
            Self::UnknownBuildPipeline { .. } => "manifest.unknown_build_pipeline",
            Self::Cycle { .. } => "manifest.cycle",
            Self::UndeclaredSourceItem { .. } => "manifest.undeclared_source_item",
        };
        Some(code)
    }
}
