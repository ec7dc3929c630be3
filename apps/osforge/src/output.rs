//! Output rendering and formatting

use std::fmt::Write as _;
use std::io;

use osforge_errors::ErrorEnvelope;
use osforge_types::{BuildResult, PipelineStatus};
use serde_json::{json, Value};

use crate::error::CliError;

/// Output renderer for CLI results
#[derive(Clone, Copy, Debug)]
pub struct OutputRenderer {
    /// Use JSON output format
    json_output: bool,
}

impl OutputRenderer {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }

    /// Render the outcome of a build
    pub fn render_result(self, result: &BuildResult) -> io::Result<()> {
        if self.json_output {
            let value = result_json(result).map_err(io::Error::other)?;
            println!("{value}");
        } else {
            print!("{}", summary(result));
        }
        Ok(())
    }

    /// Render an error that ended the run before a result existed
    pub fn render_error(self, error: &CliError) {
        if self.json_output {
            println!("{}", error_json(&error.envelope()));
        } else {
            eprintln!("Error: {error}");
        }
    }

    /// Render a manifest description
    pub fn render_description(self, description: &Value) -> io::Result<()> {
        if self.json_output {
            println!("{description}");
        } else {
            let text = serde_json::to_string_pretty(description).map_err(io::Error::other)?;
            println!("{text}");
        }
        Ok(())
    }
}

/// The machine readable result: every pipeline keyed by id, plus the order
/// they ran in.
pub fn result_json(result: &BuildResult) -> serde_json::Result<Value> {
    let mut value = serde_json::to_value(result)?;
    if let Value::Object(map) = &mut value {
        map.insert("type".to_string(), json!("result"));
    }
    Ok(value)
}

/// The machine readable form of a fatal error
pub fn error_json(envelope: &ErrorEnvelope) -> Value {
    json!({
        "type": "error",
        "error": envelope,
    })
}

/// One line per pipeline, followed by the output of the first failed stage
pub fn summary(result: &BuildResult) -> String {
    let mut text = String::new();
    for pipeline in result.in_order() {
        let marker = match pipeline.status {
            PipelineStatus::Built => "[OK]",
            PipelineStatus::Failed => "[FAILED]",
            PipelineStatus::NotBuilt => "[SKIPPED]",
            PipelineStatus::Aborted => "[ABORTED]",
        };
        let _ = writeln!(
            text,
            "{marker} {} {} ({} stages)",
            pipeline.name,
            pipeline.id,
            pipeline.stages.len()
        );
    }

    if let Some((pipeline, stage)) = result.first_failure() {
        let _ = writeln!(text, "\nStage {} in {} failed", stage.type_name, pipeline.name);
        if let Some(error) = &stage.error {
            let _ = writeln!(text, "  {error}");
        }
        if !stage.output.is_empty() {
            let _ = writeln!(text, "Output:");
            for line in stage.output.lines() {
                let _ = writeln!(text, "  {line}");
            }
        }
    } else if let Some(error) = result.in_order().find_map(|p| p.error.as_ref()) {
        let _ = writeln!(text, "\n{error}");
    }

    let _ = writeln!(text, "Build {}", result.status.as_str());
    text
}
