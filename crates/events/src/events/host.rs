use serde::{Deserialize, Serialize};

/// Worker process lifecycle events, keyed by service key (`stage/<type>`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostEvent {
    WorkerStarted {
        service: String,
        pid: Option<u32>,
    },

    /// Worker exited after its channel was closed
    WorkerStopped {
        service: String,
    },

    /// Worker terminated by force (timeout, shutdown grace expired)
    WorkerKilled {
        service: String,
        reason: String,
    },

    SignalReceived {
        service: String,
        method: String,
    },
}
