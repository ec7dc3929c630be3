use std::collections::BTreeMap;
use std::fmt::Write as _;

use async_trait::async_trait;
use osforge_errors::StageError;
use serde::Deserialize;

use super::COPY_STAGE;
use crate::stage::{StageFailure, StageOutput, StageRequest, StageWorker};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CopyOptions {
    /// checksum -> destination inside the tree
    items: BTreeMap<String, String>,
}

/// Copies downloaded source items into the tree
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyStage;

#[async_trait]
impl StageWorker for CopyStage {
    fn name(&self) -> &str {
        COPY_STAGE
    }

    async fn run(&self, request: &StageRequest) -> Result<StageOutput, StageFailure> {
        let options: CopyOptions = request.options_as()?;
        let copies = options
            .items
            .iter()
            .map(|(checksum, dest)| Ok((dest, request.item(checksum)?, request.resolve(dest)?)))
            .collect::<Result<Vec<_>, StageError>>()?;

        let mut output = String::new();
        for (dest, item, target) in copies {
            let copied = async {
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::copy(item, &target).await
            }
            .await;
            match copied {
                Ok(bytes) => {
                    let _ = writeln!(output, "copied {dest} ({bytes} bytes)");
                }
                Err(e) => {
                    return Err(StageFailure::new(
                        StageError::Failed {
                            stage: COPY_STAGE.to_string(),
                            message: format!("{dest}: {e}"),
                        },
                        output,
                    ))
                }
            }
        }
        Ok(StageOutput::new(output))
    }
}
