#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the osforge build engine
//!
//! This crate provides the pipeline graph (stages, pipelines, manifests),
//! source requests, the manifest description format and the result
//! structures produced by a build.

pub mod description;
pub mod lookup;
pub mod manifest;
pub mod pipeline;
pub mod result;
pub mod source;

// Re-export commonly used types
pub use description::{describe, ManifestDescription, PipelineDescription};
pub use lookup::ObjectLookup;
pub use manifest::Manifest;
pub use osforge_hash::{Checksum, ChecksumAlgorithm};
pub use pipeline::{ObjectId, Pipeline, Stage, StageSpec};
pub use result::{BuildResult, BuildStatus, PipelineResult, PipelineStatus, StageResult};
pub use source::SourceRequest;
