use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::FailureContext;

/// Build orchestration events
///
/// Pipelines are identified by both their manifest name and their content
/// id (hex); stages by their type and stage id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BuildEvent {
    /// The resolver produced a plan
    PlanResolved {
        pipelines: Vec<String>,
        skipped: Vec<String>,
    },

    PipelineStarted {
        pipeline: String,
        id: String,
        stages: usize,
    },

    StageStarted {
        pipeline: String,
        stage_id: String,
        stage_type: String,
    },

    StageFinished {
        pipeline: String,
        stage_id: String,
        stage_type: String,
        duration: Duration,
    },

    StageFailed {
        pipeline: String,
        stage_id: String,
        stage_type: String,
        failure: FailureContext,
    },

    PipelineFinished {
        pipeline: String,
        id: String,
        status: String,
        success: bool,
    },

    /// The pipeline tree is now in the object store
    PipelineCommitted {
        pipeline: String,
        id: String,
    },

    /// A pipeline was skipped because its build pipeline did not succeed
    PipelineNotBuilt {
        pipeline: String,
        dependency: String,
    },

    Completed {
        status: String,
        duration: Duration,
    },
}
