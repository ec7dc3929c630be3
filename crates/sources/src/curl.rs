//! HTTP(S) downloads

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use osforge_config::SourcesConfig;
use osforge_errors::{SourceError, SourceErrorKind};
use osforge_hash::Checksum;
use reqwest::{Client, StatusCode, Url};
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;

use crate::worker::{commit_item, item_path, partial_path, SourceItems, SourceWorker};

pub const CURL_SOURCE: &str = "org.osforge.curl";

/// Network settings for [`CurlSource`]
#[derive(Debug, Clone)]
pub struct CurlConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
    pub user_agent: String,
}

impl Default for CurlConfig {
    fn default() -> Self {
        Self::from(&SourcesConfig::default())
    }
}

impl From<&SourcesConfig> for CurlConfig {
    fn from(config: &SourcesConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.network_timeout),
            connect_timeout: Duration::from_secs(30),
            retries: config.retries,
            retry_delay: Duration::from_secs(config.retry_delay),
            user_agent: format!("osforge/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

fn error(kind: SourceErrorKind, message: impl Into<String>) -> SourceError {
    SourceError::new(kind, message, CURL_SOURCE)
}

/// Fetches URLs with `reqwest`, verifying each body against its checksum
#[derive(Debug, Clone)]
pub struct CurlSource {
    client: Client,
    config: CurlConfig,
}

impl CurlSource {
    /// # Errors
    /// Returns `CurlInternalError` if the HTTP client cannot be built.
    pub fn new(config: CurlConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| error(SourceErrorKind::CurlInternalError, e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Item descriptions are a URL string or `{"url": ...}`
    fn parse_url(desc: &Value) -> Result<Url, SourceError> {
        let raw = match desc {
            Value::String(url) => url.as_str(),
            Value::Object(map) => map.get("url").and_then(Value::as_str).ok_or_else(|| {
                error(SourceErrorKind::CurlBadInput, "item description has no 'url'")
            })?,
            _ => {
                return Err(error(
                    SourceErrorKind::CurlBadInput,
                    "item description must be a URL or an object",
                ))
            }
        };
        let url = Url::parse(raw)
            .map_err(|e| error(SourceErrorKind::CurlBadInput, format!("{raw}: {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(error(
                SourceErrorKind::CurlBadInput,
                format!("unsupported scheme '{scheme}' in {raw}"),
            )),
        }
    }

    /// Fetch one item, retrying transient failures
    async fn fetch(&self, url: &Url, cache: &Path, checksum: &Checksum) -> Result<(), SourceError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url, cache, checksum).await {
                Ok(()) => return Ok(()),
                Err(err) if is_transient(&err) && attempt < self.config.retries => {
                    attempt += 1;
                    tracing::warn!(%url, attempt, error = %err.message, "retrying download");
                    tokio::time::sleep(self.config.retry_delay * attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(
        &self,
        url: &Url,
        cache: &Path,
        checksum: &Checksum,
    ) -> Result<(), SourceError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| error(SourceErrorKind::CurlNetworking, format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let kind = match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SourceErrorKind::CurlCredentials,
                _ => SourceErrorKind::CurlNetworking,
            };
            return Err(error(kind, format!("{url}: HTTP {status}")));
        }

        let partial = partial_path(cache, checksum);
        if let Err(err) = stream_to(response, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err);
        }
        commit_item(CURL_SOURCE, cache, checksum, &partial).await
    }
}

fn is_transient(err: &SourceError) -> bool {
    err.kind == SourceErrorKind::CurlNetworking
}

async fn stream_to(response: reqwest::Response, path: &Path) -> Result<(), SourceError> {
    let storage = |e: std::io::Error| error(SourceErrorKind::CurlStorage, format!("{}: {e}", path.display()));

    let mut file = tokio::fs::File::create(path).await.map_err(storage)?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| error(SourceErrorKind::CurlNetworking, e.to_string()))?;
        file.write_all(&chunk).await.map_err(storage)?;
    }
    file.flush().await.map_err(storage)?;
    file.sync_all().await.map_err(storage)
}

#[async_trait]
impl SourceWorker for CurlSource {
    fn name(&self) -> &str {
        CURL_SOURCE
    }

    async fn download(
        &self,
        items: &SourceItems,
        cache: &Path,
        _options: &Map<String, Value>,
    ) -> Result<(), SourceError> {
        // Validate everything before touching the network.
        let urls = items
            .iter()
            .map(|(checksum, desc)| Ok((checksum, Self::parse_url(desc)?)))
            .collect::<Result<Vec<_>, SourceError>>()?;

        for (checksum, url) in urls {
            if item_path(cache, checksum).is_file() {
                continue;
            }
            tracing::debug!(%url, %checksum, "fetching");
            self.fetch(&url, cache, checksum).await?;
        }
        Ok(())
    }
}
