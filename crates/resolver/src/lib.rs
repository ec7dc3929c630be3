#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Dependency resolution for osforge
//!
//! Given a pipeline graph, the requested exports and checkpoints, and the
//! objects already committed to the store, this crate computes which
//! pipelines must run and in which order.

mod plan;
mod resolver;

pub use osforge_types::ObjectLookup;
pub use plan::BuildPlan;
pub use resolver::Resolver;
