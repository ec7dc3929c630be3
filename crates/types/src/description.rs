//! Manifest description format (version "1")
//!
//! ```json
//! {
//!   "version": "1",
//!   "pipelines": [{"name": "tree", "build": null, "stages": [...]}],
//!   "sources": {"org.osforge.curl": {"items": {...}, "options": {...}}}
//! }
//! ```
//!
//! Pipelines may be listed in any order; they are added to the graph in
//! dependency order.

use std::collections::{BTreeMap, HashMap, HashSet};

use osforge_errors::{Error, ManifestError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::manifest::Manifest;
use crate::pipeline::StageSpec;
use crate::source::SourceRequest;

/// The only description version understood
pub const DESCRIPTION_VERSION: &str = "1";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestDescription {
    pub version: String,
    #[serde(default)]
    pub pipelines: Vec<PipelineDescription>,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceRequest>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDescription {
    pub name: String,
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub stages: Vec<StageSpec>,
}

impl ManifestDescription {
    /// Parse a description from JSON text
    ///
    /// # Errors
    /// Returns `ManifestError::Invalid` for malformed JSON or a shape that
    /// does not match the format.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| {
            ManifestError::Invalid {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Build the pipeline graph.
    ///
    /// # Errors
    /// Fails on an unsupported version, duplicate names, unknown or cyclic
    /// build references, and stage sources no origin declares.
    pub fn load(self) -> Result<Manifest, Error> {
        if self.version != DESCRIPTION_VERSION {
            return Err(ManifestError::UnsupportedVersion {
                version: self.version,
            }
            .into());
        }

        let mut manifest = Manifest::new();
        for (name, mut request) in self.sources {
            request.name = name;
            manifest.add_source(request);
        }

        for description in order_by_build(self.pipelines)? {
            manifest.add_pipeline(
                &description.name,
                description.build.as_deref(),
                description.stages,
            )?;
        }

        manifest.validate_sources()?;
        Ok(manifest)
    }
}

/// Sort pipelines so that each one follows its build pipeline, keeping the
/// declared order otherwise.
fn order_by_build(pipelines: Vec<PipelineDescription>) -> Result<Vec<PipelineDescription>, Error> {
    let mut seen = HashSet::new();
    for p in &pipelines {
        if !seen.insert(p.name.as_str()) {
            return Err(ManifestError::DuplicatePipeline {
                name: p.name.clone(),
            }
            .into());
        }
    }

    let index: HashMap<String, usize> = pipelines
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name.clone(), i))
        .collect();

    for p in &pipelines {
        if let Some(build) = &p.build {
            if !index.contains_key(build) {
                return Err(ManifestError::UnknownBuildPipeline {
                    pipeline: p.name.clone(),
                    build: build.clone(),
                }
                .into());
            }
        }
    }

    // Each pipeline has at most one parent, so following the chain either
    // reaches a root or revisits a node.
    let mut order: Vec<usize> = Vec::with_capacity(pipelines.len());
    let mut placed = vec![false; pipelines.len()];
    for start in 0..pipelines.len() {
        let mut chain = Vec::new();
        let mut on_chain = HashSet::new();
        let mut current = Some(start);
        while let Some(i) = current {
            if placed[i] {
                break;
            }
            if !on_chain.insert(i) {
                return Err(ManifestError::Cycle {
                    pipeline: pipelines[i].name.clone(),
                }
                .into());
            }
            chain.push(i);
            current = pipelines[i].build.as_ref().map(|b| index[b]);
        }
        for &i in chain.iter().rev() {
            placed[i] = true;
            order.push(i);
        }
    }

    let mut slots: Vec<Option<PipelineDescription>> = pipelines.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// Render a manifest back into its description, optionally annotated with
/// the computed pipeline and stage ids.
#[must_use]
pub fn describe(manifest: &Manifest, with_id: bool) -> Value {
    let pipelines: Vec<Value> = manifest
        .pipelines()
        .iter()
        .map(|pipeline| {
            let build = pipeline
                .build()
                .and_then(|id| manifest.get_by_id(&id))
                .map(|p| p.name().to_string());

            let stages: Vec<Value> = pipeline
                .stages()
                .iter()
                .map(|stage| {
                    let mut value = json!({
                        "type": stage.type_name(),
                        "options": stage.options(),
                        "sources": stage.sources(),
                    });
                    if with_id {
                        value["id"] = json!(stage.id());
                    }
                    value
                })
                .collect();

            let mut value = json!({
                "name": pipeline.name(),
                "build": build,
                "stages": stages,
            });
            if with_id {
                value["id"] = json!(pipeline.id());
            }
            value
        })
        .collect();

    let sources: serde_json::Map<String, Value> = manifest
        .sources()
        .iter()
        .map(|(name, request)| {
            (
                name.clone(),
                json!({"items": request.items_json(), "options": request.options}),
            )
        })
        .collect();

    json!({
        "version": DESCRIPTION_VERSION,
        "pipelines": pipelines,
        "sources": sources,
    })
}
