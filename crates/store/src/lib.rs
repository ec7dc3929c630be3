#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Content-addressed object store for osforge
//!
//! Committed filesystem trees live under `objects/<id>/tree` and are never
//! modified after commit. Builds write into a [`StagingArea`] inside the
//! scratch directory and become visible only through an atomic rename.
//!
//! ```text
//! <root>/
//!   .lock
//!   objects/<id>/tree/
//!   objects/<id>/meta.json
//!   sources/<source-name>/<checksum>
//!   tmp/
//! ```

pub mod fsops;
mod object;
mod staging;

pub use object::{ObjectMeta, StoredObject, META_FILE, TREE_DIR};
pub use staging::StagingArea;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashSet;
use nix::fcntl::{Flock, FlockArg};
use osforge_errors::{Error, StoreError};
use osforge_events::{EventEmitter, EventSender, StoreEvent};
use osforge_types::{ObjectId, ObjectLookup};
use tokio::fs;
use uuid::Uuid;

use crate::staging::Lease;

const OBJECTS_DIR: &str = "objects";
const TMP_DIR: &str = "tmp";
const SOURCES_DIR: &str = "sources";
const LOCK_FILE: &str = ".lock";

/// Outcome of [`ObjectStore::commit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The staged tree became the committed entry
    Committed,
    /// An entry already existed; the staged tree was dropped
    AlreadyPresent,
}

/// Handle to an opened store root.
///
/// Holds an exclusive lock on the root for its lifetime. The scratch area is
/// emptied on open and removed on [`ObjectStore::close`] or drop.
pub struct ObjectStore {
    root: PathBuf,
    leases: Arc<DashSet<ObjectId>>,
    events: Option<EventSender>,
    _lock: Flock<File>,
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("root", &self.root)
            .field("staging", &self.leases.len())
            .finish_non_exhaustive()
    }
}

impl EventEmitter for ObjectStore {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl ObjectStore {
    /// Open (creating if needed) the store at `root`.
    ///
    /// # Errors
    /// Fails if the layout cannot be created or another process holds the
    /// store lock.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        for dir in [OBJECTS_DIR, TMP_DIR, SOURCES_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path)
                .await
                .map_err(|e| StoreError::from_io_with_path(&e, &path))?;
        }

        let lock_path = root.join(LOCK_FILE);
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StoreError::from_io_with_path(&e, &lock_path))?;
        let lock = Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|_| {
            StoreError::LockFailed {
                path: lock_path.display().to_string(),
            }
        })?;

        // Leftovers from an interrupted run are never valid objects.
        fsops::clear_dir(&root.join(TMP_DIR)).await?;

        tracing::debug!(root = %root.display(), "opened object store");
        Ok(Self {
            root,
            leases: Arc::new(DashSet::new()),
            events: None,
            _lock: lock,
        })
    }

    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_dir(&self, id: &ObjectId) -> PathBuf {
        self.root.join(OBJECTS_DIR).join(id.to_hex())
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }

    /// Root of the shared source cache
    #[must_use]
    pub fn sources_dir(&self) -> PathBuf {
        self.root.join(SOURCES_DIR)
    }

    /// Cache directory for one source origin
    #[must_use]
    pub fn source_cache(&self, source: &str) -> PathBuf {
        self.sources_dir().join(source)
    }

    /// Whether a tree is committed for `id`
    pub async fn contains(&self, id: &ObjectId) -> bool {
        fs::metadata(self.object_dir(id).join(TREE_DIR))
            .await
            .is_ok_and(|m| m.is_dir())
    }

    /// Look up a committed tree.
    pub async fn get(&self, id: &ObjectId) -> Option<StoredObject> {
        if !self.contains(id).await {
            return None;
        }
        let dir = self.object_dir(id);
        let meta = ObjectMeta::read(&dir).await.ok();
        Some(StoredObject::new(*id, dir, meta))
    }

    /// Begin writing the tree for `target`, optionally seeded with a copy of
    /// the committed tree `base`.
    ///
    /// # Errors
    /// - `StoreError::WriterBusy` if another staging area for `target` is live
    /// - `StoreError::ObjectNotFound` if `base` is not committed
    /// - copy and I/O failures
    pub async fn stage(
        &self,
        target: &ObjectId,
        base: Option<&ObjectId>,
    ) -> Result<StagingArea, Error> {
        let lease = Lease::acquire(&self.leases, *target).ok_or_else(|| StoreError::WriterBusy {
            id: target.to_hex(),
        })?;

        let root = self.tmp_dir().join(format!("stage-{}", Uuid::new_v4()));
        let staging = StagingArea::new(*target, root, lease, self.events.clone());
        let tree = staging.tree();

        match base {
            Some(base) => {
                let source = self.get(base).await.ok_or_else(|| StoreError::ObjectNotFound {
                    id: base.to_hex(),
                })?;
                fsops::copy_tree(&source.tree(), &tree).await?;
            }
            None => {
                fs::create_dir_all(&tree)
                    .await
                    .map_err(|e| StoreError::from_io_with_path(&e, &tree))?;
            }
        }

        tracing::debug!(id = %target, base = ?base.map(ObjectId::to_hex), "staging area ready");
        Ok(staging)
    }

    /// Atomically promote `staging` to the committed entry for its id.
    ///
    /// # Errors
    /// Returns `StoreError::AtomicRenameFailed` if the move fails for any
    /// reason other than the entry already existing.
    pub async fn commit(
        &self,
        mut staging: StagingArea,
        name: Option<&str>,
    ) -> Result<CommitOutcome, Error> {
        let id = *staging.id();
        let dest = self.object_dir(&id);

        if self.contains(&id).await {
            staging.discard().await;
            self.emit_store(StoreEvent::AlreadyPresent { id: id.to_hex() });
            return Ok(CommitOutcome::AlreadyPresent);
        }

        ObjectMeta::new(id, name.map(str::to_string))
            .write(staging.root())
            .await?;

        match fs::rename(staging.root(), &dest).await {
            Ok(()) => {
                staging.mark_committed();
                tracing::debug!(id = %id, name = ?name, "committed object");
                self.emit_store(StoreEvent::Committed {
                    id: id.to_hex(),
                    name: name.map(str::to_string),
                });
                Ok(CommitOutcome::Committed)
            }
            // Lost a race against an identical commit.
            Err(_) if self.is_committed(&id) => {
                staging.discard().await;
                self.emit_store(StoreEvent::AlreadyPresent { id: id.to_hex() });
                Ok(CommitOutcome::AlreadyPresent)
            }
            Err(e) => Err(StoreError::AtomicRenameFailed {
                message: format!("{} -> {}: {e}", staging.root().display(), dest.display()),
            }
            .into()),
        }
    }

    /// Copy the committed tree for `id` into `destination`.
    ///
    /// # Errors
    /// `StoreError::ObjectNotFound` if `id` is not committed; copy failures.
    pub async fn export(&self, id: &ObjectId, destination: &Path) -> Result<(), Error> {
        let object = self.get(id).await.ok_or_else(|| StoreError::ObjectNotFound {
            id: id.to_hex(),
        })?;
        fsops::copy_tree(&object.tree(), destination).await?;
        self.emit_store(StoreEvent::Exported {
            id: id.to_hex(),
            destination: destination.to_path_buf(),
        });
        Ok(())
    }

    /// Ids of all committed trees, sorted
    ///
    /// # Errors
    /// Returns an error if the objects directory cannot be read.
    pub async fn list(&self) -> Result<Vec<ObjectId>, Error> {
        let dir = self.root.join(OBJECTS_DIR);
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::from_io_with_path(&e, &dir))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::from_io_with_path(&e, &dir))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Ok(id) = ObjectId::from_hex(&name) {
                if self.contains(&id).await {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Anonymous scratch file inside the store, removed when closed
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn tempfile(&self) -> Result<File, Error> {
        let dir = self.tmp_dir();
        tempfile::tempfile_in(&dir).map_err(|e| StoreError::from_io_with_path(&e, &dir).into())
    }

    /// Release the store, removing the scratch area.
    ///
    /// # Errors
    /// Returns an error if the scratch area cannot be removed.
    pub async fn close(self) -> Result<(), Error> {
        fsops::clear_dir(&self.tmp_dir()).await?;
        tracing::debug!(root = %self.root.display(), "closed object store");
        Ok(())
    }
}

impl ObjectLookup for ObjectStore {
    fn is_committed(&self, id: &ObjectId) -> bool {
        self.object_dir(id).join(TREE_DIR).is_dir()
    }
}

impl Drop for ObjectStore {
    fn drop(&mut self) {
        let tmp = self.tmp_dir();
        if let Ok(entries) = std::fs::read_dir(&tmp) {
            for entry in entries.flatten() {
                let _ = std::fs::remove_dir_all(entry.path())
                    .or_else(|_| std::fs::remove_file(entry.path()));
            }
        }
    }
}
