use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_trace};
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use thread_core::{ChildItemData, Cursor, ItemId, Page, ThreadId, TopLevelItemData};
use url::Url;

use crate::decode::decode_body;
use crate::fetch::PageFetcher;
use crate::wire::PageDecoder;
use crate::{FailureKind, FetchError};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Extra attempts after the first one for retryable failures.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further one.
    pub retry_backoff: Duration,
    pub max_bytes: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Fetches thread pages over HTTP:
///
/// - `GET {base}/threads/{thread}/items[?cursor=..]`
/// - `GET {base}/threads/{thread}/items/{parent}/replies?cursor=..`
pub struct HttpPageFetcher {
    settings: FetchSettings,
    base: Url,
    thread: ThreadId,
    client: reqwest::Client,
    decoder: Arc<dyn PageDecoder>,
}

impl HttpPageFetcher {
    pub fn new(
        settings: FetchSettings,
        thread: ThreadId,
        decoder: Arc<dyn PageDecoder>,
    ) -> Result<Self, FetchError> {
        let base = Url::parse(&settings.base_url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(FetchError::new(
                FailureKind::InvalidUrl,
                format!("{} cannot be a base url", settings.base_url),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            settings,
            base,
            thread,
            client,
            decoder,
        })
    }

    pub fn thread(&self) -> &ThreadId {
        &self.thread
    }

    fn endpoint(&self, tail: &[&str], cursor: Option<&Cursor>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["threads", self.thread.as_str(), "items"])
                .extend(tail);
        }
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair("cursor", cursor.as_str());
        }
        url
    }

    async fn get_once(&self, url: &Url) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(self.too_large(Some(content_len)));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(self.too_large(Some(next_len)));
            }
            bytes.extend_from_slice(&chunk);
        }
        engine_trace!("GET {} -> {} bytes", url, bytes.len());

        decode_body(&bytes, content_type.as_deref()).map(|decoded| decoded.text)
    }

    async fn get(&self, url: Url) -> Result<String, FetchError> {
        let mut attempt: u32 = 0;
        let mut backoff = self.settings.retry_backoff;
        loop {
            attempt += 1;
            let err = match self.get_once(&url).await {
                Ok(body) => return Ok(body),
                Err(err) => err,
            };
            if !err.is_retryable() {
                return Err(err);
            }
            if attempt > self.settings.max_retries {
                if attempt == 1 {
                    return Err(err);
                }
                return Err(FetchError::new(
                    FailureKind::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(err.kind),
                    },
                    err.message,
                ));
            }
            engine_debug!(
                "GET {} failed ({}); retry {} of {} in {:?}",
                url,
                err,
                attempt,
                self.settings.max_retries,
                backoff
            );
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
        }
    }

    fn too_large(&self, actual: Option<u64>) -> FetchError {
        FetchError::new(
            FailureKind::TooLarge {
                max_bytes: self.settings.max_bytes,
                actual,
            },
            "response too large",
        )
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_top_level_page(
        &self,
        cursor: Option<&Cursor>,
    ) -> Result<Page<TopLevelItemData>, FetchError> {
        let body = self.get(self.endpoint(&[], cursor)).await?;
        self.decoder.decode_top_level(&body)
    }

    async fn fetch_child_page(
        &self,
        parent_id: &ItemId,
        cursor: &Cursor,
    ) -> Result<Page<ChildItemData>, FetchError> {
        let url = self.endpoint(&[parent_id.as_str(), "replies"], Some(cursor));
        let body = self.get(url).await?;
        self.decoder.decode_child(&body)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
