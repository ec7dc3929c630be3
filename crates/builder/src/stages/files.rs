//! Directory and file creation stages

use std::collections::BTreeMap;
use std::fmt::Write as _;

use async_trait::async_trait;
use osforge_errors::StageError;
use serde::Deserialize;

use super::{MKDIR_STAGE, WRITE_STAGE};
use crate::stage::{StageFailure, StageOutput, StageRequest, StageWorker};

fn io_failure(stage: &str, path: &str, err: &std::io::Error, output: &str) -> StageFailure {
    StageFailure::new(
        StageError::Failed {
            stage: stage.to_string(),
            message: format!("{path}: {err}"),
        },
        output,
    )
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MkdirOptions {
    paths: Vec<String>,
}

/// Creates directories (with parents) inside the tree
#[derive(Debug, Clone, Copy, Default)]
pub struct MkdirStage;

#[async_trait]
impl StageWorker for MkdirStage {
    fn name(&self) -> &str {
        MKDIR_STAGE
    }

    async fn run(&self, request: &StageRequest) -> Result<StageOutput, StageFailure> {
        let options: MkdirOptions = request.options_as()?;
        // Reject every bad path before creating anything.
        let targets = options
            .paths
            .iter()
            .map(|path| Ok((path, request.resolve(path)?)))
            .collect::<Result<Vec<_>, StageError>>()?;

        let mut output = String::new();
        for (path, target) in targets {
            tokio::fs::create_dir_all(&target)
                .await
                .map_err(|e| io_failure(MKDIR_STAGE, path, &e, &output))?;
            let _ = writeln!(output, "created {path}");
        }
        Ok(StageOutput::new(output))
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WriteOptions {
    files: BTreeMap<String, String>,
}

/// Writes text files, creating parent directories as needed
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteStage;

#[async_trait]
impl StageWorker for WriteStage {
    fn name(&self) -> &str {
        WRITE_STAGE
    }

    async fn run(&self, request: &StageRequest) -> Result<StageOutput, StageFailure> {
        let options: WriteOptions = request.options_as()?;
        let targets = options
            .files
            .iter()
            .map(|(path, contents)| Ok((path, request.resolve(path)?, contents)))
            .collect::<Result<Vec<_>, StageError>>()?;

        let mut output = String::new();
        for (path, target, contents) in targets {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_failure(WRITE_STAGE, path, &e, &output))?;
            }
            tokio::fs::write(&target, contents)
                .await
                .map_err(|e| io_failure(WRITE_STAGE, path, &e, &output))?;
            let _ = writeln!(output, "wrote {path} ({} bytes)", contents.len());
        }
        Ok(StageOutput::new(output))
    }
}
