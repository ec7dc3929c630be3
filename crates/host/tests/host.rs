//! Host/worker round trips using in-process workers

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek, Write};
    use std::os::fd::{AsFd, OwnedFd};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use osforge_errors::{Error, ProtocolError};
    use osforge_host::*;
    use serde_json::{json, Value};

    struct TestService;

    fn read_fd(fd: OwnedFd) -> String {
        let mut file = std::fs::File::from(fd);
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        text
    }

    fn copy_to_new_file(text: &str) -> OwnedFd {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file.rewind().unwrap();
        OwnedFd::from(file)
    }

    #[async_trait]
    impl Service for TestService {
        async fn dispatch(
            &self,
            method: &str,
            args: Value,
            mut fds: FdSet,
            signals: &SignalSink<'_>,
        ) -> Result<Reply, Error> {
            match method {
                "echo" => Ok(Reply::new(args)),
                "echo-fd" => {
                    let text = read_fd(fds.steal(0)?);
                    Ok(Reply::new(args).with_fd(copy_to_new_file(&text)))
                }
                "exception" => Err(Error::internal("Remote Exception")),
                "steal-missing" => {
                    fds.steal(1)?;
                    Ok(Reply::default())
                }
                "signal-me-3-times" => {
                    for i in 0..3 {
                        signals.emit(json!(i), &[]).await?;
                    }
                    Ok(Reply::default())
                }
                "signal-me-on-fd" => {
                    let copy = copy_to_new_file(&read_fd(fds.steal(0)?));
                    signals
                        .emit(json!("that should do it"), &[copy.as_fd()])
                        .await?;
                    Ok(Reply::default())
                }
                "signal-error" => {
                    signals.emit_error(&Error::internal("soft failure")).await?;
                    Ok(Reply::new(json!("done")))
                }
                "sleep" => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(Reply::default())
                }
                _ => Err(ProtocolError::UnknownMethod {
                    method: method.to_string(),
                }
                .into()),
            }
        }
    }

    fn manager() -> ServiceManager {
        let isolation = LocalIsolation::new().with_service("test/", Arc::new(TestService));
        ServiceManager::new(Arc::new(isolation)).with_grace(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_basic() {
        let mgr = manager();
        for i in 0..3 {
            let key = format!("test/{i}");
            let client = mgr.start(&key, "unused").await.unwrap();

            let args = json!(["an", "argument"]);
            assert_eq!(client.call("echo", args.clone()).await.unwrap(), args);
            assert_eq!(
                client.call(IDENTIFY_METHOD, Value::Null).await.unwrap(),
                json!(key)
            );

            let err = mgr.start(&key, "unused").await.unwrap_err();
            assert!(matches!(
                err,
                Error::Protocol(ProtocolError::AlreadyRunning { ref service }) if *service == key
            ));
        }

        assert_eq!(mgr.keys().await, ["test/0", "test/1", "test/2"]);
        for i in 0..3 {
            mgr.stop(&format!("test/{i}")).await.unwrap();
        }
        assert!(mgr.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_pass_fd() {
        let mgr = manager();
        let client = mgr.start("test/fd", "unused").await.unwrap();
        let data = "osforge\n";
        let file = copy_to_new_file(data);

        let args = json!(["an", "argument"]);
        let (result, mut fds) = client
            .call_with_fds("echo-fd", args.clone(), &[file.as_fd()], None, |_, _| Ok(()))
            .await
            .unwrap();
        assert_eq!(result, args);
        assert_eq!(read_fd(fds.steal(0).unwrap()), data);
    }

    #[tokio::test]
    async fn test_missing_descriptor_is_remote_error() {
        let mgr = manager();
        let client = mgr.start("test/missing", "unused").await.unwrap();
        let err = client.call("steal-missing", Value::Null).await.unwrap_err();
        let Error::Remote(envelope) = err else {
            panic!("expected remote error, got {err:?}");
        };
        assert_eq!(envelope.code, "protocol.missing_descriptor");

        // The worker stays usable after a failed call.
        assert_eq!(client.call("echo", json!(1)).await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_exception() {
        let mgr = manager();
        let client = mgr.start("test/exception", "unused").await.unwrap();
        let err = client.call("exception", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::Remote(ref e) if e.message.contains("Remote Exception")));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let mgr = manager();
        let client = mgr.start("test/unknown", "unused").await.unwrap();
        let err = client.call("no-such-method", Value::Null).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::UnknownMethod { ref method }) if method == "no-such-method"
        ));
    }

    #[tokio::test]
    async fn test_signals_arrive_in_order() {
        let mgr = manager();
        let client = mgr.start("test/signals", "unused").await.unwrap();
        let mut seen = Vec::new();
        client
            .call_with_fds("signal-me-3-times", Value::Null, &[], None, |payload, _| {
                seen.push(payload);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(seen, [json!(0), json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_signal_with_descriptor() {
        let mgr = manager();
        let client = mgr.start("test/signal-fd", "unused").await.unwrap();
        let data = "osforge\n";
        let file = copy_to_new_file(data);

        let mut received = None;
        client
            .call_with_fds(
                "signal-me-on-fd",
                Value::Null,
                &[file.as_fd()],
                None,
                |payload, mut fds| {
                    assert_eq!(payload, json!("that should do it"));
                    received = Some(read_fd(fds.steal(0)?));
                    Ok(())
                },
            )
            .await
            .unwrap();
        assert_eq!(received.as_deref(), Some(data));
    }

    #[tokio::test]
    async fn test_signal_handler_error_is_returned_after_drain() {
        let mgr = manager();
        let client = mgr.start("test/handler", "unused").await.unwrap();
        let err = client
            .call_with_fds("signal-error", Value::Null, &[], None, |payload, _| {
                let envelope = serde_json::from_value(payload["error"].clone())?;
                Err(Error::Remote(envelope))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote(ref e) if e.message.contains("soft failure")));

        // The terminal reply was consumed, so the next call lines up.
        assert_eq!(client.call("echo", json!("next")).await.unwrap(), json!("next"));
    }

    #[tokio::test]
    async fn test_timeout_kills_worker() {
        let mgr = manager();
        let client = mgr.start("test/slow", "unused").await.unwrap();
        let err = client
            .call_with_fds(
                "sleep",
                Value::Null,
                &[],
                Some(Duration::from_millis(50)),
                |_, _| Ok(()),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            Error::Protocol(ProtocolError::Timeout { limit, .. }) if *limit == Duration::from_millis(50)
        ));
        assert!(err.to_string().contains("50ms"));
        assert!(!client.is_alive());
        assert!(mgr.get("test/slow").await.is_none());

        let fresh = mgr.get_or_start("test/slow", "unused").await.unwrap();
        assert!(fresh.is_alive());
        assert_eq!(fresh.call("echo", json!(2)).await.unwrap(), json!(2));
    }

    #[tokio::test]
    async fn test_get_or_start_reuses_live_worker() {
        let mgr = manager();
        let first = mgr.get_or_start("test/reuse", "unused").await.unwrap();
        let second = mgr.get_or_start("test/reuse", "unused").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_stopped_client_refuses_calls() {
        let mgr = manager();
        let client = mgr.start("test/stopped", "unused").await.unwrap();
        mgr.stop("test/stopped").await.unwrap();
        let err = client.call("echo", json!(1)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::NotRunning { .. })
        ));
        assert!(mgr.stop("test/stopped").await.is_err());
    }

    #[tokio::test]
    async fn test_unregistered_service_fails_to_spawn() {
        let mgr = manager();
        let err = mgr.start("other/x", "unused").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::SpawnFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_worker_events_reported() {
        let (tx, mut rx) = osforge_events::channel();
        let isolation = LocalIsolation::new().with_service("test/", Arc::new(TestService));
        let mgr = ServiceManager::new(Arc::new(isolation)).with_events(tx);

        mgr.start("test/events", "unused").await.unwrap();
        mgr.shutdown().await;

        let started = rx.recv().await.unwrap();
        assert!(matches!(
            started.event,
            osforge_events::AppEvent::Host(osforge_events::HostEvent::WorkerStarted { .. })
        ));
        let stopped = rx.recv().await.unwrap();
        assert!(matches!(
            stopped.event,
            osforge_events::AppEvent::Host(osforge_events::HostEvent::WorkerStopped { .. })
        ));
    }
}
