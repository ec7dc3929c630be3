//! Build result structures

use std::collections::BTreeMap;

use osforge_errors::ErrorEnvelope;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::ObjectId;

/// Outcome of one stage call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub id: ObjectId,
    #[serde(rename = "type")]
    pub type_name: String,
    pub output: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl StageResult {
    #[must_use]
    pub fn succeeded(
        id: ObjectId,
        type_name: impl Into<String>,
        output: impl Into<String>,
        metadata: Option<Value>,
    ) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            output: output.into(),
            success: true,
            error: None,
            metadata,
        }
    }

    #[must_use]
    pub fn failed(
        id: ObjectId,
        type_name: impl Into<String>,
        output: impl Into<String>,
        error: ErrorEnvelope,
    ) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            output: output.into(),
            success: false,
            error: Some(error),
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// All stages ran and the tree was committed
    Built,
    /// A stage failed or the commit did not happen
    Failed,
    /// Never started because its build pipeline did not succeed
    NotBuilt,
    /// Interrupted
    Aborted,
}

impl PipelineStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::Failed => "failed",
            Self::NotBuilt => "not_built",
            Self::Aborted => "aborted",
        }
    }
}

/// Per-pipeline record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub id: ObjectId,
    pub name: String,
    pub status: PipelineStatus,
    pub success: bool,
    pub stages: Vec<StageResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

impl PipelineResult {
    #[must_use]
    pub fn new(id: ObjectId, name: impl Into<String>, status: PipelineStatus) -> Self {
        Self {
            id,
            name: name.into(),
            status,
            success: status == PipelineStatus::Built,
            stages: Vec::new(),
            error: None,
        }
    }

    /// Set the final status, keeping `success` consistent with the stages.
    pub fn finish(&mut self, status: PipelineStatus) {
        self.status = status;
        self.success = status == PipelineStatus::Built && self.stages.iter().all(|s| s.success);
    }

    #[must_use]
    pub fn with_error(mut self, error: ErrorEnvelope) -> Self {
        self.error = Some(error);
        self
    }

    /// The stage that failed this pipeline, if any
    #[must_use]
    pub fn failed_stage(&self) -> Option<&StageResult> {
        self.stages.iter().find(|s| !s.success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Success,
    Failure,
    Aborted,
}

impl BuildStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Aborted => "aborted",
        }
    }
}

/// Aggregated result of a build, keyed by pipeline id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildResult {
    pub status: BuildStatus,
    pub success: bool,
    pub pipelines: BTreeMap<ObjectId, PipelineResult>,
    /// Pipelines, in execution order
    #[serde(default)]
    pub order: Vec<ObjectId>,
}

impl BuildResult {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: BuildStatus::Success,
            success: true,
            pipelines: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    /// Record a pipeline result; a pipeline that did not succeed fails the build.
    pub fn push(&mut self, result: PipelineResult) {
        match result.status {
            PipelineStatus::Aborted => self.set_status(BuildStatus::Aborted),
            _ if !result.success && self.status == BuildStatus::Success => {
                self.set_status(BuildStatus::Failure);
            }
            _ => {}
        }
        self.order.push(result.id);
        self.pipelines.insert(result.id, result);
    }

    pub fn set_status(&mut self, status: BuildStatus) {
        self.status = status;
        self.success = status == BuildStatus::Success;
    }

    #[must_use]
    pub fn get(&self, id: &ObjectId) -> Option<&PipelineResult> {
        self.pipelines.get(id)
    }

    /// Results in execution order
    pub fn in_order(&self) -> impl Iterator<Item = &PipelineResult> {
        self.order.iter().filter_map(|id| self.pipelines.get(id))
    }

    /// First failed stage across the build, in execution order
    #[must_use]
    pub fn first_failure(&self) -> Option<(&PipelineResult, &StageResult)> {
        self.in_order()
            .find_map(|p| p.failed_stage().map(|stage| (p, stage)))
    }
}

impl Default for BuildResult {
    fn default() -> Self {
        Self::new()
    }
}
