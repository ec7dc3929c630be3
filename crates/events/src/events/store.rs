use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreEvent {
    Committed {
        id: String,
        name: Option<String>,
    },

    /// Commit found the id already present; staged data was dropped
    AlreadyPresent {
        id: String,
    },

    StagingDiscarded {
        id: String,
    },

    Exported {
        id: String,
        destination: PathBuf,
    },
}
