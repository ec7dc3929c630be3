//! Plan execution: stages dispatched to workers, trees committed per pipeline

use std::collections::{BTreeMap, HashSet};
use std::os::fd::AsFd;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use osforge_errors::{Error, ErrorEnvelope, ProtocolError, StageError};
use osforge_events::{BuildEvent, EventEmitter, EventSender, FailureContext};
use osforge_host::{write_payload, ServiceManager};
use osforge_resolver::{BuildPlan, Resolver};
use osforge_sources::{item_path, SourceDownloader};
use osforge_store::{ObjectStore, StagingArea};
use osforge_types::{
    BuildResult, BuildStatus, Manifest, ObjectId, Pipeline, PipelineResult, PipelineStatus, Stage,
    StageResult,
};
use tokio_util::sync::CancellationToken;

use super::config::BuildConfig;
use super::context::BuildContext;
use crate::stage::{RunArgs, StageMeta, StageOutput, StagePayload, RUN_METHOD};

/// Service key of the worker for stage type `name`
#[must_use]
pub fn stage_key(name: &str) -> String {
    format!("stage/{name}")
}

/// Runs build plans against an object store
pub struct Builder {
    manager: Arc<ServiceManager>,
    config: BuildConfig,
    events: Option<EventSender>,
}

impl EventEmitter for Builder {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl Builder {
    #[must_use]
    pub fn new(manager: Arc<ServiceManager>, config: BuildConfig) -> Self {
        Self {
            manager,
            config,
            events: None,
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Resolve the plan, download sources, then build.
    ///
    /// Stage failures are reported in the returned result, not as errors.
    ///
    /// # Errors
    /// - resolver errors, before any worker is started
    /// - source download failures
    pub async fn run(&self, context: &BuildContext<'_>) -> Result<BuildResult, Error> {
        let started = Instant::now();
        let plan = Resolver::new().depsolve(
            context.manifest,
            context.store,
            &context.exports,
            &context.checkpoints,
        )?;
        self.emit_build(BuildEvent::PlanResolved {
            pipelines: plan.pipelines().iter().map(ObjectId::to_hex).collect(),
            skipped: plan.skipped().iter().map(ObjectId::to_hex).collect(),
        });

        let result = if plan.is_empty() {
            BuildResult::new()
        } else if self.download_sources(context).await? {
            self.build(context.manifest, &plan, context.store, &context.cancel)
                .await
        } else {
            let mut aborted = BuildResult::new();
            aborted.set_status(BuildStatus::Aborted);
            aborted
        };

        self.emit_build(BuildEvent::Completed {
            status: result.status.as_str().to_string(),
            duration: started.elapsed(),
        });
        Ok(result)
    }

    /// Returns `false` if the build was cancelled meanwhile.
    async fn download_sources(&self, context: &BuildContext<'_>) -> Result<bool, Error> {
        let mut downloader = SourceDownloader::new(Arc::clone(&self.manager), &self.config.libdir)
            .with_parallelism(self.config.parallel_sources);
        if let Some(events) = &self.events {
            downloader = downloader.with_events(events.clone());
        }

        tokio::select! {
            () = context.cancel.cancelled() => {
                self.manager.shutdown().await;
                Ok(false)
            }
            result = downloader.download(context.manifest, context.store) => result.map(|()| true),
        }
    }

    /// Execute every pipeline of `plan` in order.
    ///
    /// A pipeline whose build pipeline was planned but did not get built is
    /// recorded as not built without dispatching any of its stages. On
    /// cancellation the running pipeline and everything after it are
    /// recorded as aborted and all workers are stopped.
    pub async fn build(
        &self,
        manifest: &Manifest,
        plan: &BuildPlan,
        store: &ObjectStore,
        cancel: &CancellationToken,
    ) -> BuildResult {
        let planned: HashSet<ObjectId> = plan.pipelines().iter().copied().collect();
        let mut built: HashSet<ObjectId> = HashSet::new();
        let mut result = BuildResult::new();

        for id in plan.pipelines() {
            let Some(pipeline) = manifest.get_by_id(id) else {
                continue;
            };

            if cancel.is_cancelled() {
                result.push(PipelineResult::new(*id, pipeline.name(), PipelineStatus::Aborted));
                continue;
            }

            if let Some(dependency) = pipeline
                .build()
                .filter(|build| planned.contains(build) && !built.contains(build))
            {
                result.push(self.not_built(manifest, pipeline, &dependency));
                continue;
            }

            let record = self.build_pipeline(manifest, pipeline, store, cancel).await;
            if record.status == PipelineStatus::Built {
                built.insert(*id);
            }
            result.push(record);
        }

        if result.status == BuildStatus::Aborted {
            self.manager.shutdown().await;
        }
        result
    }

    fn not_built(&self, manifest: &Manifest, pipeline: &Pipeline, dependency: &ObjectId) -> PipelineResult {
        let dependency = manifest
            .get_by_id(dependency)
            .map_or_else(|| dependency.to_hex(), |p| p.name().to_string());
        self.emit_build(BuildEvent::PipelineNotBuilt {
            pipeline: pipeline.name().to_string(),
            dependency: dependency.clone(),
        });
        let error = Error::from(StageError::DependencyFailed {
            stage: pipeline.name().to_string(),
            dependency,
        });
        PipelineResult::new(pipeline.id(), pipeline.name(), PipelineStatus::NotBuilt)
            .with_error(error.envelope())
    }

    async fn build_pipeline(
        &self,
        manifest: &Manifest,
        pipeline: &Pipeline,
        store: &ObjectStore,
        cancel: &CancellationToken,
    ) -> PipelineResult {
        let id = pipeline.id();
        let name = pipeline.name();
        self.emit_build(BuildEvent::PipelineStarted {
            pipeline: name.to_string(),
            id: id.to_hex(),
            stages: pipeline.stages().len(),
        });
        tracing::info!(pipeline = name, id = %id, "building pipeline");

        let mut record = PipelineResult::new(id, name, PipelineStatus::Failed);
        let status = match store.stage(&id, pipeline.build().as_ref()).await {
            Ok(staging) => {
                self.run_stages(manifest, pipeline, store, staging, cancel, &mut record)
                    .await
            }
            Err(err) => {
                record.error = Some(err.envelope());
                PipelineStatus::Failed
            }
        };
        record.finish(status);

        self.emit_build(BuildEvent::PipelineFinished {
            pipeline: name.to_string(),
            id: id.to_hex(),
            status: status.as_str().to_string(),
            success: record.success,
        });
        record
    }

    async fn run_stages(
        &self,
        manifest: &Manifest,
        pipeline: &Pipeline,
        store: &ObjectStore,
        staging: StagingArea,
        cancel: &CancellationToken,
        record: &mut PipelineResult,
    ) -> PipelineStatus {
        for stage in pipeline.stages() {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = self.run_stage(manifest, pipeline, stage, &staging, store) => Some(result),
            };

            match outcome {
                None => {
                    staging.discard().await;
                    return PipelineStatus::Aborted;
                }
                Some(result) if !result.success => {
                    record.stages.push(result);
                    staging.discard().await;
                    return PipelineStatus::Failed;
                }
                Some(result) => record.stages.push(result),
            }
        }

        match store.commit(staging, Some(pipeline.name())).await {
            Ok(_) => {
                self.emit_build(BuildEvent::PipelineCommitted {
                    pipeline: pipeline.name().to_string(),
                    id: pipeline.id().to_hex(),
                });
                PipelineStatus::Built
            }
            Err(err) => {
                tracing::error!(pipeline = pipeline.name(), error = %err, "commit failed");
                record.error = Some(err.envelope());
                PipelineStatus::Failed
            }
        }
    }

    async fn run_stage(
        &self,
        manifest: &Manifest,
        pipeline: &Pipeline,
        stage: &Stage,
        staging: &StagingArea,
        store: &ObjectStore,
    ) -> StageResult {
        let type_name = stage.type_name();
        self.emit_build(BuildEvent::StageStarted {
            pipeline: pipeline.name().to_string(),
            stage_id: stage.id().to_hex(),
            stage_type: type_name.to_string(),
        });
        let started = Instant::now();

        match self.call_stage(manifest, stage, staging, store).await {
            Ok(output) => {
                self.emit_build(BuildEvent::StageFinished {
                    pipeline: pipeline.name().to_string(),
                    stage_id: stage.id().to_hex(),
                    stage_type: type_name.to_string(),
                    duration: started.elapsed(),
                });
                StageResult::succeeded(stage.id(), type_name, output.output, output.metadata)
            }
            Err(err) => {
                let (envelope, output) = stage_failure(type_name, err);
                tracing::warn!(stage = type_name, code = %envelope.code, "stage failed");
                self.emit_build(BuildEvent::StageFailed {
                    pipeline: pipeline.name().to_string(),
                    stage_id: stage.id().to_hex(),
                    stage_type: type_name.to_string(),
                    failure: FailureContext::from_envelope(&envelope),
                });
                StageResult::failed(stage.id(), type_name, output, envelope)
            }
        }
    }

    async fn call_stage(
        &self,
        manifest: &Manifest,
        stage: &Stage,
        staging: &StagingArea,
        store: &ObjectStore,
    ) -> Result<StageOutput, Error> {
        let type_name = stage.type_name();
        let payload = StagePayload {
            options: stage.options().clone(),
            items: stage_items(manifest, stage, store)?,
        };
        let payload = write_payload(store.tempfile()?, &serde_json::to_value(&payload)?)?;
        let args = serde_json::to_value(RunArgs {
            tree: staging.tree(),
            meta: StageMeta {
                id: stage.id().to_hex(),
                type_name: type_name.to_string(),
            },
            sources: store.sources_dir(),
        })?;

        let client = self
            .manager
            .get_or_start(&stage_key(type_name), self.config.stage_executable(type_name))
            .await?;
        let (value, _fds) = client
            .call_with_fds(
                RUN_METHOD,
                args,
                &[payload.as_fd()],
                self.config.stage_timeout,
                |_, _| Ok(()),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Cache paths of the source items `stage` references
fn stage_items(
    manifest: &Manifest,
    stage: &Stage,
    store: &ObjectStore,
) -> Result<BTreeMap<String, PathBuf>, Error> {
    stage
        .sources()
        .iter()
        .map(|checksum| {
            let missing = || StageError::MissingSourceItem {
                checksum: checksum.to_string(),
            };
            let source = manifest.source_for(checksum).ok_or_else(missing)?;
            let path = item_path(&store.source_cache(&source.name), checksum);
            if !path.is_file() {
                return Err(missing().into());
            }
            Ok((checksum.to_string(), path))
        })
        .collect()
}

/// Envelope and captured output for a failed stage call
fn stage_failure(type_name: &str, err: Error) -> (ErrorEnvelope, String) {
    match err {
        Error::Remote(envelope) => {
            let output = envelope.detail_str("output").unwrap_or_default().to_string();
            (envelope, output)
        }
        Error::Protocol(ProtocolError::Timeout { limit, .. }) => {
            let error = Error::from(StageError::Timeout {
                stage: type_name.to_string(),
                limit,
            });
            (error.envelope(), String::new())
        }
        other => (other.envelope(), String::new()),
    }
}
