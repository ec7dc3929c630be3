//! Stage types built into the worker binary

mod copy;
mod files;
mod noop;

pub use copy::CopyStage;
pub use files::{MkdirStage, WriteStage};
pub use noop::NoopStage;

use std::sync::Arc;

use osforge_host::Service;

use crate::stage::StageService;

pub const NOOP_STAGE: &str = "org.osforge.noop";
pub const MKDIR_STAGE: &str = "org.osforge.mkdir";
pub const WRITE_STAGE: &str = "org.osforge.write";
pub const COPY_STAGE: &str = "org.osforge.copy";

pub const BUILTIN_STAGES: &[&str] = &[NOOP_STAGE, MKDIR_STAGE, WRITE_STAGE, COPY_STAGE];

/// Service for a builtin stage type, or `None` if `name` is not one
#[must_use]
pub fn builtin_service(name: &str) -> Option<Arc<dyn Service>> {
    let service: Arc<dyn Service> = match name {
        NOOP_STAGE => Arc::new(StageService::new(NoopStage)),
        MKDIR_STAGE => Arc::new(StageService::new(MkdirStage)),
        WRITE_STAGE => Arc::new(StageService::new(WriteStage)),
        COPY_STAGE => Arc::new(StageService::new(CopyStage)),
        _ => return None,
    };
    Some(service)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;
    use std::path::Path;

    use serde_json::Value;

    use crate::stage::{StageMeta, StageRequest};

    pub fn request(tree: &Path, type_name: &str, options: Value) -> StageRequest {
        let Value::Object(options) = options else {
            panic!("options must be an object");
        };
        StageRequest {
            tree: tree.to_path_buf(),
            meta: StageMeta {
                id: "0".repeat(64),
                type_name: type_name.to_string(),
            },
            sources: tree.join("../sources"),
            options,
            items: BTreeMap::new(),
        }
    }
}
