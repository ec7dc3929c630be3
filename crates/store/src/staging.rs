//! Writable scratch trees awaiting commit

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashSet;
use osforge_events::{EventEmitter, EventSender, StoreEvent};
use osforge_types::ObjectId;

use crate::object::TREE_DIR;

/// Exclusive right to write the tree for one id
#[derive(Debug)]
pub(crate) struct Lease {
    leases: Arc<DashSet<ObjectId>>,
    id: ObjectId,
}

impl Lease {
    /// `None` if another writer already holds `id`.
    pub(crate) fn acquire(leases: &Arc<DashSet<ObjectId>>, id: ObjectId) -> Option<Self> {
        leases.insert(id).then(|| Self {
            leases: Arc::clone(leases),
            id,
        })
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.leases.remove(&self.id);
    }
}

/// A tree under construction for a target id.
///
/// Lives in the store's scratch area until [`crate::ObjectStore::commit`]
/// moves it into place. Dropping it uncommitted deletes the scratch data.
#[derive(Debug)]
pub struct StagingArea {
    id: ObjectId,
    root: PathBuf,
    events: Option<EventSender>,
    _lease: Lease,
    committed: bool,
}

impl EventEmitter for StagingArea {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl StagingArea {
    pub(crate) fn new(
        id: ObjectId,
        root: PathBuf,
        lease: Lease,
        events: Option<EventSender>,
    ) -> Self {
        Self {
            id,
            root,
            events,
            _lease: lease,
            committed: false,
        }
    }

    /// Id the tree will be committed under
    #[must_use]
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Writable filesystem tree
    #[must_use]
    pub fn tree(&self) -> PathBuf {
        self.root.join(TREE_DIR)
    }

    /// Scratch directory holding the tree and its metadata
    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn mark_committed(&mut self) {
        self.committed = true;
    }

    /// Throw away the staged data.
    pub async fn discard(mut self) {
        let _ = crate::fsops::remove_tree(&self.root).await;
        self.committed = true;
        self.emit_store(StoreEvent::StagingDiscarded {
            id: self.id.to_hex(),
        });
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.root.display(), error = %e, "failed to discard staging area");
            }
        }
        self.emit_store(StoreEvent::StagingDiscarded {
            id: self.id.to_hex(),
        });
    }
}
