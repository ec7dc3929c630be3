//! Committed store entries

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use osforge_errors::{Error, StoreError};
use osforge_types::ObjectId;
use serde::{Deserialize, Serialize};

/// Name of the tree directory inside an object directory
pub const TREE_DIR: &str = "tree";

/// Name of the metadata file inside an object directory
pub const META_FILE: &str = "meta.json";

/// Metadata recorded next to every committed tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub id: ObjectId,
    /// Pipeline name at commit time; informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub committed_at: DateTime<Utc>,
}

impl ObjectMeta {
    #[must_use]
    pub fn new(id: ObjectId, name: Option<String>) -> Self {
        Self {
            id,
            name,
            committed_at: Utc::now(),
        }
    }

    /// # Errors
    /// Returns an error if the file cannot be written.
    pub async fn write(&self, object_dir: &Path) -> Result<(), Error> {
        let path = object_dir.join(META_FILE);
        let data = serde_json::to_vec_pretty(self).map_err(|e| StoreError::CorruptedData {
            message: e.to_string(),
        })?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| StoreError::from_io_with_path(&e, &path).into())
    }

    /// # Errors
    /// Returns an error if the file is missing or unreadable.
    pub async fn read(object_dir: &Path) -> Result<Self, Error> {
        let path = object_dir.join(META_FILE);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| StoreError::from_io_with_path(&e, &path))?;
        serde_json::from_slice(&data).map_err(|e| {
            StoreError::CorruptedData {
                message: format!("{}: {e}", path.display()),
            }
            .into()
        })
    }
}

/// Read-only handle to a committed tree
#[derive(Debug, Clone)]
pub struct StoredObject {
    id: ObjectId,
    path: PathBuf,
    meta: Option<ObjectMeta>,
}

impl StoredObject {
    pub(crate) fn new(id: ObjectId, object_dir: PathBuf, meta: Option<ObjectMeta>) -> Self {
        Self {
            id,
            path: object_dir,
            meta,
        }
    }

    #[must_use]
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Root of the committed filesystem tree
    #[must_use]
    pub fn tree(&self) -> PathBuf {
        self.path.join(TREE_DIR)
    }

    /// Metadata, if it was readable
    #[must_use]
    pub fn meta(&self) -> Option<&ObjectMeta> {
        self.meta.as_ref()
    }
}
