//! Ordered build plan produced by dependency resolution

use std::collections::{HashMap, HashSet};

use osforge_types::{Manifest, ObjectId};
use serde::Serialize;

/// Pipelines that must run, ancestors first
#[derive(Clone, Debug, Default, Serialize)]
pub struct BuildPlan {
    /// Topological order; every build pipeline precedes its dependents
    order: Vec<ObjectId>,
    /// Groups of pipelines with no dependency among each other
    batches: Vec<Vec<ObjectId>>,
    /// Requested targets already committed in the store
    skipped: Vec<ObjectId>,
    exports: Vec<ObjectId>,
    checkpoints: Vec<ObjectId>,
}

impl BuildPlan {
    /// Build a plan from the set of pipelines that need to run.
    ///
    /// `needed` is ordered following the manifest, which already lists
    /// build pipelines before their dependents.
    pub(crate) fn new(
        manifest: &Manifest,
        needed: &HashSet<ObjectId>,
        skipped: Vec<ObjectId>,
        exports: Vec<ObjectId>,
        checkpoints: Vec<ObjectId>,
    ) -> Self {
        // Identical pipelines share an id and run once.
        let mut seen = HashSet::new();
        let order: Vec<ObjectId> = manifest
            .pipelines()
            .iter()
            .map(osforge_types::Pipeline::id)
            .filter(|id| needed.contains(id) && seen.insert(*id))
            .collect();

        // Depth of each pipeline counted only through pipelines in the plan
        let mut depth: HashMap<ObjectId, usize> = HashMap::new();
        let mut batches: Vec<Vec<ObjectId>> = Vec::new();
        for id in &order {
            let level = manifest
                .get_by_id(id)
                .and_then(osforge_types::Pipeline::build)
                .and_then(|build| depth.get(&build))
                .map_or(0, |parent| parent + 1);
            depth.insert(*id, level);
            if batches.len() <= level {
                batches.resize_with(level + 1, Vec::new);
            }
            batches[level].push(*id);
        }

        Self {
            order,
            batches,
            skipped,
            exports,
            checkpoints,
        }
    }

    /// Pipelines to run, ancestors strictly first
    #[must_use]
    pub fn pipelines(&self) -> &[ObjectId] {
        &self.order
    }

    /// Execution batches (pipelines within a batch are independent)
    #[must_use]
    pub fn batches(&self) -> &[Vec<ObjectId>] {
        &self.batches
    }

    /// Requested pipelines that needed no work
    #[must_use]
    pub fn skipped(&self) -> &[ObjectId] {
        &self.skipped
    }

    #[must_use]
    pub fn exports(&self) -> &[ObjectId] {
        &self.exports
    }

    #[must_use]
    pub fn checkpoints(&self) -> &[ObjectId] {
        &self.checkpoints
    }

    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.order.contains(id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }
}
