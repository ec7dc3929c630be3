use async_trait::async_trait;
use serde_json::{json, Value};

use super::NOOP_STAGE;
use crate::stage::{StageFailure, StageOutput, StageRequest, StageWorker};

/// Leaves the tree alone and echoes its options
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStage;

#[async_trait]
impl StageWorker for NoopStage {
    fn name(&self) -> &str {
        NOOP_STAGE
    }

    async fn run(&self, request: &StageRequest) -> Result<StageOutput, StageFailure> {
        let options = Value::Object(request.options.clone());
        Ok(StageOutput::new(options.to_string()).with_metadata(json!({ "options": options })))
    }
}
