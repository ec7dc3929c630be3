//! Object store error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("object not found: {id}")]
    ObjectNotFound { id: String },

    #[error("a writer already holds the staging area for {id}")]
    WriterBusy { id: String },

    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("path not found: {path}")]
    PathNotFound { path: String },

    #[error("IO error: {message}")]
    IoError { message: String },

    #[error("corrupted data: {message}")]
    CorruptedData { message: String },

    #[error("copy failed: {message}")]
    CopyFailed { message: String },

    #[error("atomic rename failed: {message}")]
    AtomicRenameFailed { message: String },

    #[error("store is locked by another process: {path}")]
    LockFailed { path: String },
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            message: err.to_string(),
        }
    }
}

impl StoreError {
    /// Convert an `io::Error` into a `StoreError` with an associated path
    #[must_use]
    pub fn from_io_with_path(err: &std::io::Error, path: &std::path::Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.display().to_string(),
            },
            std::io::ErrorKind::NotFound => Self::PathNotFound {
                path: path.display().to_string(),
            },
            _ => Self::IoError {
                message: format!("{}: {}", path.display(), err),
            },
        }
    }
}

impl UserFacingError for StoreError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::PermissionDenied { .. } => {
                Some("Adjust store permissions or retry with elevated privileges.")
            }
            Self::LockFailed { .. } | Self::WriterBusy { .. } => {
                Some("Wait for other builds using this store to finish, then retry.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockFailed { .. } | Self::WriterBusy { .. } | Self::IoError { .. }
        )
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::ObjectNotFound { .. } => "store.object_not_found",
            Self::WriterBusy { .. } => "store.writer_busy",
            Self::PermissionDenied { .. } => "store.permission_denied",
            Self::PathNotFound { .. } => "store.path_not_found",
            Self::IoError { .. } => "store.io_error",
            Self::CorruptedData { .. } => "store.corrupted_data",
            Self::CopyFailed { .. } => "store.copy_failed",
            Self::AtomicRenameFailed { .. } => "store.atomic_rename_failed",
            Self::LockFailed { .. } => "store.lock_failed",
        };
        Some(code)
    }
}
