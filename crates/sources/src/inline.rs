//! Items embedded directly in the manifest

use std::path::Path;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use osforge_errors::{SourceError, SourceErrorKind};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::worker::{commit_item, item_path, partial_path, SourceItems, SourceWorker};

pub const INLINE_SOURCE: &str = "org.osforge.inline";

#[derive(Deserialize)]
struct InlineItem {
    #[serde(default = "default_encoding")]
    encoding: String,
    data: String,
}

fn default_encoding() -> String {
    "base64".to_string()
}

/// Decodes `{"encoding": "base64", "data": ...}` descriptions
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineSource;

impl InlineSource {
    fn decode(desc: &Value) -> Result<Vec<u8>, SourceError> {
        let bad = |message: String| SourceError::new(SourceErrorKind::Unknown, message, INLINE_SOURCE);
        let item: InlineItem =
            serde_json::from_value(desc.clone()).map_err(|e| bad(format!("invalid item: {e}")))?;
        if item.encoding != "base64" {
            return Err(bad(format!("unsupported encoding '{}'", item.encoding)));
        }
        STANDARD
            .decode(item.data.as_bytes())
            .map_err(|e| bad(format!("invalid base64: {e}")))
    }
}

#[async_trait]
impl SourceWorker for InlineSource {
    fn name(&self) -> &str {
        INLINE_SOURCE
    }

    async fn download(
        &self,
        items: &SourceItems,
        cache: &Path,
        _options: &Map<String, Value>,
    ) -> Result<(), SourceError> {
        for (checksum, desc) in items {
            if item_path(cache, checksum).is_file() {
                continue;
            }
            let data = Self::decode(desc)?;
            if !checksum.verify_bytes(&data) {
                return Err(SourceError::new(
                    SourceErrorKind::Checksum,
                    format!("checksum mismatch for {checksum}"),
                    INLINE_SOURCE,
                ));
            }
            let partial = partial_path(cache, checksum);
            tokio::fs::write(&partial, &data).await.map_err(|e| {
                SourceError::new(SourceErrorKind::CurlStorage, e.to_string(), INLINE_SOURCE)
            })?;
            commit_item(INLINE_SOURCE, cache, checksum, &partial).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osforge_hash::{Checksum, ChecksumAlgorithm};
    use serde_json::json;

    #[tokio::test]
    async fn test_inline_items_land_in_cache() {
        let cache = tempfile::tempdir().unwrap();
        let checksum = Checksum::compute(ChecksumAlgorithm::Sha256, b"hello");
        let items: SourceItems = [(checksum.clone(), json!({"encoding": "base64", "data": "aGVsbG8="}))]
            .into_iter()
            .collect();

        InlineSource
            .download(&items, cache.path(), &Map::new())
            .await
            .unwrap();
        assert_eq!(
            std::fs::read(item_path(cache.path(), &checksum)).unwrap(),
            b"hello"
        );
    }

    #[tokio::test]
    async fn test_inline_rejects_bad_input() {
        let cache = tempfile::tempdir().unwrap();
        let checksum = Checksum::compute(ChecksumAlgorithm::Sha256, b"hello");

        let items: SourceItems = [(checksum.clone(), json!({"encoding": "hex", "data": "00"}))]
            .into_iter()
            .collect();
        let err = InlineSource
            .download(&items, cache.path(), &Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::Unknown);

        let items: SourceItems = [(checksum, json!({"data": "d29ybGQ="}))].into_iter().collect();
        let err = InlineSource
            .download(&items, cache.path(), &Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::Checksum);
    }
}
