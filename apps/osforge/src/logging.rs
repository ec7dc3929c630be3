//! Structured logging integration for events
//!
//! Every [`EventMessage`] drained from the build is turned into one tracing
//! record with the event's fields attached, so `--json` output can be
//! consumed by log tooling as-is.

use osforge_events::{AppEvent, BuildEvent, EventMessage, HostEvent, SourceEvent, StoreEvent};
use tracing::{debug, error, info, warn};

/// Log an `AppEvent` using the tracing infrastructure with structured fields
#[allow(clippy::too_many_lines)]
pub fn log_event_with_tracing(message: &EventMessage) {
    let meta = &message.meta;
    let source = meta.source.as_str();

    match &message.event {
        AppEvent::Build(build) => match build {
            BuildEvent::PlanResolved { pipelines, skipped } => {
                info!(
                    source,
                    event_id = %meta.event_id,
                    pipelines = ?pipelines,
                    skipped = ?skipped,
                    "Build plan resolved"
                );
            }
            BuildEvent::PipelineStarted {
                pipeline,
                id,
                stages,
            } => {
                info!(
                    source,
                    event_id = %meta.event_id,
                    pipeline = %pipeline,
                    id = %id,
                    stages,
                    "Pipeline started"
                );
            }
            BuildEvent::StageStarted {
                pipeline,
                stage_id,
                stage_type,
            } => {
                info!(
                    source,
                    event_id = %meta.event_id,
                    pipeline = %pipeline,
                    stage_id = %stage_id,
                    stage_type = %stage_type,
                    "Stage started"
                );
            }
            BuildEvent::StageFinished {
                pipeline,
                stage_id,
                stage_type,
                duration,
            } => {
                info!(
                    source,
                    event_id = %meta.event_id,
                    pipeline = %pipeline,
                    stage_id = %stage_id,
                    stage_type = %stage_type,
                    duration = ?duration,
                    "Stage finished"
                );
            }
            BuildEvent::StageFailed {
                pipeline,
                stage_id,
                stage_type,
                failure,
            } => {
                error!(
                    source,
                    event_id = %meta.event_id,
                    pipeline = %pipeline,
                    stage_id = %stage_id,
                    stage_type = %stage_type,
                    code = ?failure.code,
                    message = %failure.message,
                    hint = ?failure.hint,
                    "Stage failed"
                );
            }
            BuildEvent::PipelineFinished {
                pipeline,
                id,
                status,
                success,
            } => {
                if *success {
                    info!(source, event_id = %meta.event_id, pipeline = %pipeline, id = %id, status = %status, "Pipeline finished");
                } else {
                    warn!(source, event_id = %meta.event_id, pipeline = %pipeline, id = %id, status = %status, "Pipeline finished");
                }
            }
            BuildEvent::PipelineCommitted { pipeline, id } => {
                info!(source, event_id = %meta.event_id, pipeline = %pipeline, id = %id, "Pipeline committed");
            }
            BuildEvent::PipelineNotBuilt {
                pipeline,
                dependency,
            } => {
                warn!(
                    source,
                    event_id = %meta.event_id,
                    pipeline = %pipeline,
                    dependency = %dependency,
                    "Pipeline not built"
                );
            }
            BuildEvent::Completed { status, duration } => {
                info!(
                    source,
                    event_id = %meta.event_id,
                    status = %status,
                    duration = ?duration,
                    "Build completed"
                );
            }
        },

        AppEvent::Source(source_event) => match source_event {
            SourceEvent::DownloadStarted {
                source: name,
                items,
            } => {
                info!(source, event_id = %meta.event_id, origin = %name, items, "Download started");
            }
            SourceEvent::DownloadCompleted {
                source: name,
                items,
                duration,
            } => {
                info!(
                    source,
                    event_id = %meta.event_id,
                    origin = %name,
                    items,
                    duration = ?duration,
                    "Download completed"
                );
            }
            SourceEvent::CacheHit {
                source: name,
                items,
            } => {
                debug!(source, event_id = %meta.event_id, origin = %name, items, "Source cache hit");
            }
            SourceEvent::DownloadFailed {
                source: name,
                failure,
            } => {
                error!(
                    source,
                    event_id = %meta.event_id,
                    origin = %name,
                    retryable = failure.retryable,
                    code = ?failure.code,
                    message = %failure.message,
                    hint = ?failure.hint,
                    "Download failed"
                );
            }
        },

        AppEvent::Store(store) => match store {
            StoreEvent::Committed { id, name } => {
                debug!(source, event_id = %meta.event_id, id = %id, name = ?name, "Object committed");
            }
            StoreEvent::AlreadyPresent { id } => {
                debug!(source, event_id = %meta.event_id, id = %id, "Object already present");
            }
            StoreEvent::StagingDiscarded { id } => {
                debug!(source, event_id = %meta.event_id, id = %id, "Staging discarded");
            }
            StoreEvent::Exported { id, destination } => {
                info!(
                    source,
                    event_id = %meta.event_id,
                    id = %id,
                    destination = %destination.display(),
                    "Object exported"
                );
            }
        },

        AppEvent::Host(host) => match host {
            HostEvent::WorkerStarted { service, pid } => {
                debug!(source, event_id = %meta.event_id, service = %service, pid = ?pid, "Worker started");
            }
            HostEvent::WorkerStopped { service } => {
                debug!(source, event_id = %meta.event_id, service = %service, "Worker stopped");
            }
            HostEvent::WorkerKilled { service, reason } => {
                warn!(source, event_id = %meta.event_id, service = %service, reason = %reason, "Worker killed");
            }
            HostEvent::SignalReceived { service, method } => {
                debug!(source, event_id = %meta.event_id, service = %service, method = %method, "Signal received");
            }
        },
    }
}
