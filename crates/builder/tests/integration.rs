//! Integration tests for builder crate

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use osforge_builder::stages::{self, MKDIR_STAGE, NOOP_STAGE, WRITE_STAGE};
    use osforge_builder::*;
    use osforge_errors::{Error, ResolveError, StageError};
    use osforge_hash::{Checksum, ChecksumAlgorithm};
    use osforge_host::{LocalIsolation, ServiceManager};
    use osforge_sources::{source_key, InlineSource, SourceService, INLINE_SOURCE};
    use osforge_store::ObjectStore;
    use osforge_types::{BuildStatus, Manifest, PipelineStatus, SourceRequest, StageSpec};
    use serde_json::json;
    use tempfile::tempdir;

    const FAIL_STAGE: &str = "org.test.fail";
    const SLEEP_STAGE: &str = "org.test.sleep";
    const COUNT_STAGE: &str = "org.test.count";

    /// Writes a file, then fails
    struct FailingStage;

    #[async_trait]
    impl StageWorker for FailingStage {
        fn name(&self) -> &str {
            FAIL_STAGE
        }

        async fn run(&self, request: &StageRequest) -> Result<StageOutput, StageFailure> {
            tokio::fs::write(request.tree.join("partial"), "half")
                .await
                .unwrap();
            Err(StageFailure::new(
                StageError::Failed {
                    stage: FAIL_STAGE.into(),
                    message: "simulated failure".into(),
                },
                "wrote partial\n",
            ))
        }
    }

    struct SleepingStage;

    #[async_trait]
    impl StageWorker for SleepingStage {
        fn name(&self) -> &str {
            SLEEP_STAGE
        }

        async fn run(&self, _request: &StageRequest) -> Result<StageOutput, StageFailure> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(StageOutput::default())
        }
    }

    /// Counts how often it was dispatched
    struct CountingStage(Arc<AtomicUsize>);

    #[async_trait]
    impl StageWorker for CountingStage {
        fn name(&self) -> &str {
            COUNT_STAGE
        }

        async fn run(&self, _request: &StageRequest) -> Result<StageOutput, StageFailure> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(StageOutput::new("counted"))
        }
    }

    struct Harness {
        manager: Arc<ServiceManager>,
        builder: Builder,
        counter: Arc<AtomicUsize>,
    }

    fn harness(timeout: Option<Duration>) -> Harness {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut isolation = LocalIsolation::new()
            .with_service(
                stage_key(FAIL_STAGE),
                Arc::new(StageService::new(FailingStage)),
            )
            .with_service(
                stage_key(SLEEP_STAGE),
                Arc::new(StageService::new(SleepingStage)),
            )
            .with_service(
                stage_key(COUNT_STAGE),
                Arc::new(StageService::new(CountingStage(Arc::clone(&counter)))),
            )
            .with_service(
                source_key(INLINE_SOURCE),
                Arc::new(SourceService::new(InlineSource)),
            );
        for name in stages::BUILTIN_STAGES {
            isolation.register(stage_key(name), stages::builtin_service(name).unwrap());
        }

        let manager = Arc::new(
            ServiceManager::new(Arc::new(isolation)).with_grace(Duration::from_millis(100)),
        );
        let config = BuildConfig::new("/nonexistent").with_stage_timeout(timeout);
        Harness {
            builder: Builder::new(Arc::clone(&manager), config),
            manager,
            counter,
        }
    }

    fn id(manifest: &Manifest, name: &str) -> osforge_types::ObjectId {
        manifest.get(name).unwrap().id()
    }

    /// "tree" builds a directory, "image" writes into it
    fn tree_and_image() -> Manifest {
        let mut manifest = Manifest::new();
        manifest
            .add_pipeline(
                "tree",
                None,
                vec![StageSpec::new(MKDIR_STAGE).with_option("paths", json!(["etc"]))],
            )
            .unwrap();
        manifest
            .add_pipeline(
                "image",
                Some("tree"),
                vec![StageSpec::new(WRITE_STAGE)
                    .with_option("files", json!({"etc/hostname": "forge\n"}))],
            )
            .unwrap();
        manifest
    }

    async fn open(path: &Path) -> ObjectStore {
        ObjectStore::open(path).await.unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_reuses_committed_pipeline() {
        let temp = tempdir().unwrap();
        let store = open(temp.path()).await;
        let manifest = tree_and_image();
        let h = harness(None);

        let context = BuildContext::new(&manifest, &store).with_exports(["image"]);
        let result = h.builder.run(&context).await.unwrap();
        assert_eq!(result.status, BuildStatus::Success);
        assert_eq!(result.order, [id(&manifest, "tree"), id(&manifest, "image")]);
        assert!(store.contains(&id(&manifest, "tree")).await);

        let image = store.get(&id(&manifest, "image")).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(image.tree().join("etc/hostname")).unwrap(),
            "forge\n"
        );

        // Only "image" runs once "tree" is in the store.
        let object = store.get(&id(&manifest, "image")).await.unwrap();
        std::fs::remove_dir_all(object.tree().parent().unwrap()).unwrap();
        let result = h.builder.run(&context).await.unwrap();
        assert!(result.success);
        assert_eq!(result.order, [id(&manifest, "image")]);
        assert_eq!(result.in_order().next().unwrap().stages.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_stage_commits_nothing_and_blocks_dependents() {
        let temp = tempdir().unwrap();
        let store = open(temp.path()).await;
        let h = harness(None);

        let mut manifest = Manifest::new();
        manifest
            .add_pipeline("base", None, vec![StageSpec::new(FAIL_STAGE)])
            .unwrap();
        manifest
            .add_pipeline("derived", Some("base"), vec![StageSpec::new(COUNT_STAGE)])
            .unwrap();

        let context = BuildContext::new(&manifest, &store).with_exports(["derived"]);
        let result = h.builder.run(&context).await.unwrap();
        assert_eq!(result.status, BuildStatus::Failure);

        let base = result.get(&id(&manifest, "base")).unwrap();
        assert_eq!(base.status, PipelineStatus::Failed);
        let stage = base.failed_stage().unwrap();
        assert_eq!(stage.output, "wrote partial\n");
        assert_eq!(stage.error.as_ref().unwrap().code, "stage.failed");
        assert!(store.get(&id(&manifest, "base")).await.is_none());

        let derived = result.get(&id(&manifest, "derived")).unwrap();
        assert_eq!(derived.status, PipelineStatus::NotBuilt);
        assert!(derived.stages.is_empty());
        assert_eq!(h.counter.load(Ordering::SeqCst), 0);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sibling_pipelines_survive_a_failure() {
        let temp = tempdir().unwrap();
        let store = open(temp.path()).await;
        let h = harness(None);

        let mut manifest = Manifest::new();
        manifest
            .add_pipeline("broken", None, vec![StageSpec::new(FAIL_STAGE)])
            .unwrap();
        manifest
            .add_pipeline("fine", None, vec![StageSpec::new(COUNT_STAGE)])
            .unwrap();

        let context = BuildContext::new(&manifest, &store).with_exports(["broken", "fine"]);
        let result = h.builder.run(&context).await.unwrap();
        assert!(!result.success);
        assert_eq!(
            result.get(&id(&manifest, "fine")).unwrap().status,
            PipelineStatus::Built
        );
        assert!(store.contains(&id(&manifest, "fine")).await);
    }

    #[tokio::test]
    async fn test_stage_timeout_kills_worker() {
        let temp = tempdir().unwrap();
        let store = open(temp.path()).await;
        let h = harness(Some(Duration::from_millis(300)));

        let mut manifest = Manifest::new();
        manifest
            .add_pipeline("slow", None, vec![StageSpec::new(SLEEP_STAGE)])
            .unwrap();

        let context = BuildContext::new(&manifest, &store).with_exports(["slow"]);
        let result = h.builder.run(&context).await.unwrap();
        let slow = result.get(&id(&manifest, "slow")).unwrap();
        assert_eq!(slow.status, PipelineStatus::Failed);
        let error = slow.failed_stage().unwrap().error.as_ref().unwrap();
        assert_eq!(error.code, "stage.timeout");
        assert!(error.message.contains("300ms"), "{}", error.message);
        assert!(h.manager.get(&stage_key(SLEEP_STAGE)).await.is_none());
        assert!(!store.contains(&id(&manifest, "slow")).await);
    }

    #[tokio::test]
    async fn test_missed_checkpoint_starts_no_worker() {
        let temp = tempdir().unwrap();
        let store = open(temp.path()).await;
        let manifest = tree_and_image();
        let h = harness(None);

        let context = BuildContext::new(&manifest, &store)
            .with_exports(["image"])
            .with_checkpoints(["ghost"]);
        let err = h.builder.run(&context).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Resolve(ResolveError::MissedCheckpoints { .. })
        ));
        assert!(h.manager.keys().await.is_empty());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_aborts_and_discards() {
        let temp = tempdir().unwrap();
        let store = open(temp.path()).await;
        let h = harness(None);

        let mut manifest = Manifest::new();
        manifest
            .add_pipeline("slow", None, vec![StageSpec::new(SLEEP_STAGE)])
            .unwrap();
        manifest
            .add_pipeline("after", Some("slow"), vec![StageSpec::new(NOOP_STAGE)])
            .unwrap();

        let cancel = CancellationToken::new();
        let context = BuildContext::new(&manifest, &store)
            .with_exports(["after"])
            .with_cancel(cancel.clone());
        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });

        let result = h.builder.run(&context).await.unwrap();
        trigger.await.unwrap();
        assert_eq!(result.status, BuildStatus::Aborted);
        assert!(result
            .in_order()
            .all(|p| p.status == PipelineStatus::Aborted));
        assert!(h.manager.keys().await.is_empty());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sources_reach_the_stage() {
        use base64::Engine as _;

        let temp = tempdir().unwrap();
        let store = open(temp.path()).await;
        let h = harness(None);

        let checksum = Checksum::compute(ChecksumAlgorithm::Sha256, b"#!/bin/sh\n");
        let mut copies = serde_json::Map::new();
        copies.insert(checksum.to_string(), json!("usr/bin/tool"));
        let mut manifest = Manifest::new();
        manifest.add_source(SourceRequest::new(INLINE_SOURCE).with_item(
            checksum.clone(),
            json!({
                "encoding": "base64",
                "data": base64::engine::general_purpose::STANDARD.encode(b"#!/bin/sh\n"),
            }),
        ));
        manifest
            .add_pipeline(
                "tools",
                None,
                vec![StageSpec::new(stages::COPY_STAGE)
                    .with_option("items", copies)
                    .with_source(checksum.clone())],
            )
            .unwrap();

        let context = BuildContext::new(&manifest, &store).with_exports(["tools"]);
        let result = h.builder.run(&context).await.unwrap();
        assert!(result.success, "{result:?}");

        let tools = store.get(&id(&manifest, "tools")).await.unwrap();
        assert_eq!(
            std::fs::read(tools.tree().join("usr/bin/tool")).unwrap(),
            b"#!/bin/sh\n"
        );
    }

    #[tokio::test]
    async fn test_noop_output_and_events() {
        let temp = tempdir().unwrap();
        let store = open(temp.path()).await;
        let (tx, mut rx) = osforge_events::channel();
        let h = harness(None);
        let builder = h.builder.with_events(tx);

        let mut manifest = Manifest::new();
        manifest
            .add_pipeline(
                "noop",
                None,
                vec![StageSpec::new(NOOP_STAGE).with_option("tag", json!("x"))],
            )
            .unwrap();

        let context = BuildContext::new(&manifest, &store).with_exports(["noop"]);
        let result = builder.run(&context).await.unwrap();
        let stage = &result.get(&id(&manifest, "noop")).unwrap().stages[0];
        assert_eq!(stage.output, r#"{"tag":"x"}"#);
        assert_eq!(stage.type_name, NOOP_STAGE);

        drop(builder);
        let mut committed = false;
        while let Ok(message) = rx.try_recv() {
            if let osforge_events::AppEvent::Build(osforge_events::BuildEvent::PipelineCommitted {
                pipeline,
                ..
            }) = message.event
            {
                committed = pipeline == "noop";
            }
        }
        assert!(committed);
    }
}
