#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Build orchestration for osforge
//!
//! The [`Builder`] resolves which pipelines must run, downloads their
//! sources, then dispatches every stage to a worker keyed `stage/<type>`
//! and commits each finished tree to the object store. Stage types are
//! implemented as [`StageWorker`]s; the builtin ones live in [`stages`].

mod core;
mod stage;
pub mod stages;

pub use crate::core::builder::{stage_key, Builder};
pub use crate::core::config::BuildConfig;
pub use crate::core::context::BuildContext;
pub use stage::{
    resolve_in_tree, StageFailure, StageMeta, StageOutput, StageRequest, StageService,
    StageWorker, RUN_METHOD,
};
pub use tokio_util::sync::CancellationToken;
