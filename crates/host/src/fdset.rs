//! Descriptors received alongside a frame

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use osforge_errors::ProtocolError;

/// Ordered descriptors attached to a frame.
///
/// Callers take ownership of the ones they need with [`FdSet::steal`];
/// everything left behind is closed when the set is dropped.
#[derive(Debug, Default)]
pub struct FdSet {
    fds: Vec<Option<OwnedFd>>,
}

impl FdSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Take ownership of the descriptor at `index`.
    ///
    /// # Errors
    /// Fails if there is no descriptor at `index` or it was already taken.
    pub fn steal(&mut self, index: usize) -> Result<OwnedFd, ProtocolError> {
        let available = self.fds.len();
        self.fds
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(ProtocolError::MissingDescriptor { index, available })
    }

    /// Borrow the descriptor at `index` without taking it.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<BorrowedFd<'_>> {
        self.fds.get(index).and_then(Option::as_ref).map(AsFd::as_fd)
    }
}

impl From<Vec<OwnedFd>> for FdSet {
    fn from(fds: Vec<OwnedFd>) -> Self {
        Self {
            fds: fds.into_iter().map(Some).collect(),
        }
    }
}
