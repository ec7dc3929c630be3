//! Committed-object queries used when planning a build

use std::collections::{BTreeSet, HashSet};

use crate::pipeline::ObjectId;

/// Answers whether a tree is already committed for an id
pub trait ObjectLookup {
    fn is_committed(&self, id: &ObjectId) -> bool;
}

impl ObjectLookup for HashSet<ObjectId> {
    fn is_committed(&self, id: &ObjectId) -> bool {
        self.contains(id)
    }
}

impl ObjectLookup for BTreeSet<ObjectId> {
    fn is_committed(&self, id: &ObjectId) -> bool {
        self.contains(id)
    }
}

impl<T: ObjectLookup + ?Sized> ObjectLookup for &T {
    fn is_committed(&self, id: &ObjectId) -> bool {
        (**self).is_committed(id)
    }
}
