//! Integration tests for sources crate

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use httpmock::prelude::*;
    use osforge_errors::{Error, SourceErrorKind};
    use osforge_events::{AppEvent, SourceEvent};
    use osforge_hash::{Checksum, ChecksumAlgorithm};
    use osforge_host::{LocalIsolation, ServiceManager};
    use osforge_sources::*;
    use osforge_store::ObjectStore;
    use osforge_types::{Manifest, SourceRequest};
    use serde_json::{json, Map};
    use tempfile::tempdir;

    fn sha256(data: &[u8]) -> Checksum {
        Checksum::compute(ChecksumAlgorithm::Sha256, data)
    }

    fn inline_item(data: &str) -> serde_json::Value {
        use base64::Engine as _;
        json!({
            "encoding": "base64",
            "data": base64::engine::general_purpose::STANDARD.encode(data),
        })
    }

    fn downloader(isolation: LocalIsolation) -> SourceDownloader {
        let manager = Arc::new(ServiceManager::new(Arc::new(isolation)));
        SourceDownloader::new(manager, "/nonexistent")
    }

    fn inline_isolation() -> LocalIsolation {
        LocalIsolation::new().with_service(
            source_key(INLINE_SOURCE),
            Arc::new(SourceService::new(InlineSource)),
        )
    }

    #[tokio::test]
    async fn test_inline_download_fills_cache() {
        let temp = tempdir().unwrap();
        let store = ObjectStore::open(temp.path()).await.unwrap();

        let mut manifest = Manifest::new();
        manifest.add_source(
            SourceRequest::new(INLINE_SOURCE)
                .with_item(sha256(b"alpha"), inline_item("alpha"))
                .with_item(sha256(b"beta"), inline_item("beta")),
        );

        downloader(inline_isolation())
            .download(&manifest, &store)
            .await
            .unwrap();

        let cache = store.source_cache(INLINE_SOURCE);
        assert_eq!(
            std::fs::read(item_path(&cache, &sha256(b"alpha"))).unwrap(),
            b"alpha"
        );
        assert_eq!(
            std::fs::read(item_path(&cache, &sha256(b"beta"))).unwrap(),
            b"beta"
        );
    }

    #[tokio::test]
    async fn test_cached_items_spawn_no_worker() {
        let temp = tempdir().unwrap();
        let store = ObjectStore::open(temp.path()).await.unwrap();
        let checksum = sha256(b"cached");

        let cache = store.source_cache(INLINE_SOURCE);
        std::fs::create_dir_all(&cache).unwrap();
        std::fs::write(item_path(&cache, &checksum), b"cached").unwrap();

        let mut manifest = Manifest::new();
        manifest.add_source(SourceRequest::new(INLINE_SOURCE).with_item(checksum, inline_item("cached")));

        // No services registered: any spawn attempt would fail.
        let (tx, mut rx) = osforge_events::channel();
        downloader(LocalIsolation::new())
            .with_events(tx)
            .download(&manifest, &store)
            .await
            .unwrap();

        let message = rx.recv().await.unwrap();
        assert!(matches!(
            message.event,
            AppEvent::Source(SourceEvent::CacheHit { items: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_checksum_failure_names_the_source() {
        let temp = tempdir().unwrap();
        let store = ObjectStore::open(temp.path()).await.unwrap();
        let checksum = sha256(b"expected");

        let mut manifest = Manifest::new();
        manifest.add_source(
            SourceRequest::new(INLINE_SOURCE).with_item(checksum.clone(), inline_item("tampered")),
        );

        let err = downloader(inline_isolation())
            .download(&manifest, &store)
            .await
            .unwrap_err();
        let Error::Source(err) = err else {
            panic!("expected a source error, got {err:?}");
        };
        assert_eq!(err.kind, SourceErrorKind::Checksum);
        assert_eq!(err.source, INLINE_SOURCE);
        assert!(!item_path(&store.source_cache(INLINE_SOURCE), &checksum).exists());
    }

    #[tokio::test]
    async fn test_unknown_source_fails_to_spawn() {
        let temp = tempdir().unwrap();
        let store = ObjectStore::open(temp.path()).await.unwrap();

        let mut manifest = Manifest::new();
        manifest.add_source(
            SourceRequest::new("org.example.missing").with_item(sha256(b"x"), json!({})),
        );

        let err = downloader(inline_isolation())
            .download(&manifest, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_curl_fetches_and_verifies() {
        let server = MockServer::start_async().await;
        let good = server
            .mock_async(|when, then| {
                when.method(GET).path("/good.txt");
                then.status(200).body("payload");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/secret");
                then.status(403);
            })
            .await;

        let cache = tempdir().unwrap();
        let curl = CurlSource::new(CurlConfig::default()).unwrap();
        let checksum = sha256(b"payload");

        let items: SourceItems = [(checksum.clone(), json!({"url": server.url("/good.txt")}))]
            .into_iter()
            .collect();
        curl.download(&items, cache.path(), &Map::new()).await.unwrap();
        good.assert_async().await;
        assert_eq!(
            std::fs::read(item_path(cache.path(), &checksum)).unwrap(),
            b"payload"
        );

        // Present items are not fetched again.
        curl.download(&items, cache.path(), &Map::new()).await.unwrap();
        good.assert_hits_async(1).await;

        let items: SourceItems = [(sha256(b"secret"), json!(server.url("/secret")))]
            .into_iter()
            .collect();
        let err = curl
            .download(&items, cache.path(), &Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::CurlCredentials);
    }

    #[tokio::test]
    async fn test_curl_mismatch_leaves_no_item() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/file");
                then.status(200).body("unexpected");
            })
            .await;

        let cache = tempdir().unwrap();
        let curl = CurlSource::new(CurlConfig::default()).unwrap();
        let checksum = sha256(b"expected");
        let items: SourceItems = [(checksum.clone(), json!(server.url("/file")))]
            .into_iter()
            .collect();

        let err = curl
            .download(&items, cache.path(), &Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::Checksum);
        assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_builtin_services() {
        let config = osforge_config::SourcesConfig::default();
        for name in BUILTIN_SOURCES {
            assert!(builtin_service(name, &config).unwrap().is_some());
        }
        assert!(builtin_service("org.example.none", &config)
            .unwrap()
            .is_none());
    }
}
