//! The pipeline graph of a build

use std::collections::{BTreeMap, HashMap};

use osforge_errors::{Error, ManifestError};
use osforge_hash::Checksum;

use crate::pipeline::{ObjectId, Pipeline, StageSpec};
use crate::source::SourceRequest;

/// A set of named pipelines plus the source requests they depend on.
///
/// Pipelines can only reference a build pipeline that was added before
/// them, so the build relation is a DAG by construction and insertion
/// order is always a valid build order.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pipelines: Vec<Pipeline>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<ObjectId, usize>,
    sources: BTreeMap<String, SourceRequest>,
}

impl Manifest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pipeline built on top of the pipeline named `build`.
    ///
    /// # Errors
    /// Returns an error if the name is taken or `build` does not name a
    /// pipeline already in the manifest.
    pub fn add_pipeline(
        &mut self,
        name: &str,
        build: Option<&str>,
        stages: Vec<StageSpec>,
    ) -> Result<&Pipeline, Error> {
        if self.by_name.contains_key(name) {
            return Err(ManifestError::DuplicatePipeline {
                name: name.to_string(),
            }
            .into());
        }

        let build_id = match build {
            Some(build) => Some(
                self.get(build)
                    .map(Pipeline::id)
                    .ok_or_else(|| ManifestError::UnknownBuildPipeline {
                        pipeline: name.to_string(),
                        build: build.to_string(),
                    })?,
            ),
            None => None,
        };

        let pipeline = Pipeline::new(name, build_id, stages);
        let index = self.pipelines.len();
        self.by_name.insert(name.to_string(), index);
        // Identical pipelines share a tree; the first one owns the id.
        self.by_id.entry(pipeline.id()).or_insert(index);
        self.pipelines.push(pipeline);
        Ok(&self.pipelines[index])
    }

    /// Register the items requested from a source origin, merging with any
    /// earlier request for the same origin.
    pub fn add_source(&mut self, request: SourceRequest) {
        match self.sources.get_mut(&request.name) {
            Some(existing) => {
                existing.items.extend(request.items);
                existing.options.extend(request.options);
            }
            None => {
                self.sources.insert(request.name.clone(), request);
            }
        }
    }

    /// Look up a pipeline by name or by id hex.
    #[must_use]
    pub fn get(&self, name_or_id: &str) -> Option<&Pipeline> {
        if let Some(&index) = self.by_name.get(name_or_id) {
            return Some(&self.pipelines[index]);
        }
        ObjectId::from_hex(name_or_id)
            .ok()
            .and_then(|id| self.get_by_id(&id))
    }

    #[must_use]
    pub fn get_by_id(&self, id: &ObjectId) -> Option<&Pipeline> {
        self.by_id.get(id).map(|&index| &self.pipelines[index])
    }

    #[must_use]
    pub fn contains(&self, name_or_id: &str) -> bool {
        self.get(name_or_id).is_some()
    }

    /// Pipelines in insertion (and therefore build) order.
    #[must_use]
    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    #[must_use]
    pub fn sources(&self) -> &BTreeMap<String, SourceRequest> {
        &self.sources
    }

    /// The build-pipeline chain below `pipeline`, root first, excluding
    /// `pipeline` itself.
    #[must_use]
    pub fn ancestors(&self, pipeline: &Pipeline) -> Vec<&Pipeline> {
        let mut chain = Vec::new();
        let mut current = pipeline.build();
        while let Some(id) = current {
            match self.get_by_id(&id) {
                Some(parent) => {
                    chain.push(parent);
                    current = parent.build();
                }
                None => break,
            }
        }
        chain.reverse();
        chain
    }

    /// Find the origin that declares `checksum`.
    #[must_use]
    pub fn source_for(&self, checksum: &Checksum) -> Option<&SourceRequest> {
        self.sources.values().find(|s| s.contains(checksum))
    }

    /// Check that every stage source reference is declared by some origin.
    ///
    /// # Errors
    /// Returns the first undeclared reference found.
    pub fn validate_sources(&self) -> Result<(), Error> {
        for pipeline in &self.pipelines {
            for checksum in pipeline.source_refs() {
                if self.source_for(checksum).is_none() {
                    return Err(ManifestError::UndeclaredSourceItem {
                        pipeline: pipeline.name().to_string(),
                        checksum: checksum.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}
