//! Integration tests for events

#[cfg(test)]
mod tests {
    use osforge_events::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_event_sender_emit() {
        let (tx, mut rx) = channel();

        tx.emit_source(SourceEvent::CacheHit {
            source: "org.osforge.inline".into(),
            items: 2,
        });
        tx.emit_store(StoreEvent::Committed {
            id: "abc".into(),
            name: Some("tree".into()),
        });

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first.event,
            AppEvent::Source(SourceEvent::CacheHit { items: 2, .. })
        ));
        assert_eq!(first.meta.level, EventLevel::Debug);

        let second = rx.recv().await.unwrap();
        assert!(matches!(second.event, AppEvent::Store(StoreEvent::Committed { .. })));
        assert_eq!(second.meta.source, EventSource::STORE);
        assert_ne!(first.meta.event_id, second.meta.event_id);
    }

    #[tokio::test]
    async fn test_dropped_receiver() {
        let (tx, rx) = channel();
        drop(rx);

        // Should not panic when receiver is dropped
        tx.emit_store(StoreEvent::StagingDiscarded { id: "ignored".into() });
    }

    #[tokio::test]
    async fn test_domain_sources_and_levels() {
        let (tx, mut rx) = channel();
        tx.emit_build(BuildEvent::StageFinished {
            pipeline: "tree".into(),
            stage_id: "abc".into(),
            stage_type: "org.osforge.noop".into(),
            duration: Duration::from_millis(5),
        });
        tx.emit_host(HostEvent::WorkerKilled {
            service: "stage/org.osforge.noop".into(),
            reason: "timeout".into(),
        });

        let build = rx.recv().await.unwrap();
        assert_eq!(build.meta.source, EventSource::BUILD);
        assert_eq!(build.meta.level, EventLevel::Info);

        let host = rx.recv().await.unwrap();
        assert_eq!(host.meta.source, EventSource::HOST);
        assert_eq!(host.meta.level, EventLevel::Warn);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = AppEvent::Store(StoreEvent::StagingDiscarded { id: "abc".into() });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["domain"], "store");
        assert_eq!(json["event"]["type"], "StagingDiscarded");
    }

    #[test]
    fn test_no_sender_is_silent() {
        let none: Option<EventSender> = None;
        none.emit_host(HostEvent::WorkerStopped {
            service: "nobody listens".into(),
        });
    }
}
