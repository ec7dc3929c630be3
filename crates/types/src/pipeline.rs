//! Pipelines, stages and their content identities

use osforge_hash::{Checksum, Hash};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Content identity of a pipeline or stage; also the object store key.
pub type ObjectId = Hash;

/// A stage as written in a manifest, before it is placed in a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default)]
    pub sources: Vec<Checksum>,
}

impl StageSpec {
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            options: Map::new(),
            sources: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_source(mut self, checksum: Checksum) -> Self {
        self.sources.push(checksum);
        self
    }

    fn content(&self) -> Value {
        json!({
            "type": self.type_name,
            "options": self.options,
            "sources": self.sources,
        })
    }
}

/// A stage bound to its position in a pipeline.
///
/// The stage id covers the build pipeline, the id of the preceding stage and
/// the stage's own content, so it names the tree produced after this stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    id: ObjectId,
    spec: StageSpec,
}

impl Stage {
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.spec.type_name
    }

    #[must_use]
    pub fn options(&self) -> &Map<String, Value> {
        &self.spec.options
    }

    #[must_use]
    pub fn sources(&self) -> &[Checksum] {
        &self.spec.sources
    }

    #[must_use]
    pub fn spec(&self) -> &StageSpec {
        &self.spec
    }
}

/// An immutable, content-addressed sequence of stages.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    id: ObjectId,
    name: String,
    build: Option<ObjectId>,
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Build a pipeline and compute its identity.
    ///
    /// `build` is the id of the pipeline whose tree this one starts from.
    /// The name is a label only and never affects the identity.
    #[must_use]
    pub fn new(name: impl Into<String>, build: Option<ObjectId>, specs: Vec<StageSpec>) -> Self {
        let build_ref = build.map(|id| id.to_hex());

        let mut base: Option<String> = None;
        let mut stages = Vec::with_capacity(specs.len());
        for spec in specs {
            let id = Hash::from_json(&json!({
                "build": build_ref,
                "base": base,
                "stage": spec.content(),
            }));
            base = Some(id.to_hex());
            stages.push(Stage { id, spec });
        }

        let id = Hash::from_json(&json!({
            "build": build_ref,
            "stages": stages.iter().map(|s| s.spec.content()).collect::<Vec<_>>(),
        }));

        Self {
            id,
            name: name.into(),
            build,
            stages,
        }
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn build(&self) -> Option<ObjectId> {
        self.build
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Every source item referenced by any stage of this pipeline
    pub fn source_refs(&self) -> impl Iterator<Item = &Checksum> {
        self.stages.iter().flat_map(|s| s.sources().iter())
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
