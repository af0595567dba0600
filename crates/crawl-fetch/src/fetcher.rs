//! One-URL fetch with robots/conditional-cache integration, retries, span
//! timing, 304 handling, and raw-snapshot persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use crawl_core::{MetricsRegistry, Snapshot};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::info_span;

use crate::backoff::{classify_reqwest_error, BackoffPolicy, RetryDisposition};
use crate::conditional::ConditionalFetchCache;
use crate::raw_store::RawStore;
use crate::rate_limit::{TokenBucket, TokenBucketConfig};
use crate::robots::RobotsCache;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub global_concurrency: usize,
    pub per_source_concurrency: usize,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
            global_concurrency: 16,
            per_source_concurrency: 4,
            backoff: BackoffPolicy {
                max_retries: 3,
                ..BackoffPolicy::default()
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Low-level client: concurrency limiting, a global rate ceiling, per-source
/// rate limiting, and the bounded retry loop. One instance is shared by an
/// entire run.
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    global_bucket: Option<Arc<TokenBucket>>,
    per_source_limit: usize,
    per_source: Mutex<HashMap<String, Arc<Semaphore>>>,
    per_source_buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
    backoff: BackoffPolicy,
}

pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
    pub headers: BTreeMap<String, String>,
}

/// Outcome of a single fetch: either the server confirmed the cached copy is
/// still fresh (with its own response headers, not the request's), or a full
/// body arrived.
pub enum FetchOutcome {
    NotModified { headers: BTreeMap<String, String> },
    Fetched(FetchedResponse),
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig, global_qps: Option<f64>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        let global_bucket = global_qps.map(|qps| Arc::new(TokenBucket::new(TokenBucketConfig::from_qps(qps))));

        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            global_bucket,
            per_source_limit: config.per_source_concurrency.max(1),
            per_source: Mutex::new(HashMap::new()),
            per_source_buckets: Mutex::new(HashMap::new()),
            backoff: config.backoff,
        })
    }

    async fn per_source_semaphore(&self, source_id: &str) -> Arc<Semaphore> {
        let mut map = self.per_source.lock().await;
        map.entry(source_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_source_limit)))
            .clone()
    }

    async fn per_source_bucket(&self, source_id: &str, qps: f64) -> Arc<TokenBucket> {
        let mut map = self.per_source_buckets.lock().await;
        map.entry(source_id.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::new(TokenBucketConfig::from_qps(qps))))
            .clone()
    }

    /// Fetch raw bytes with header merge, retries, and 304 pass-through.
    /// Returns `Ok(NotModified { headers })` on a 304 (the server's response
    /// headers, for cache refresh), `Ok(Fetched(..))` on 2xx, `Err` otherwise.
    pub async fn fetch(
        &self,
        source_id: &str,
        source_qps: f64,
        url: &str,
        extra_headers: &[(String, String)],
        metrics: &MetricsRegistry,
    ) -> Result<FetchOutcome, FetchError> {
        let _global = self.global_limit.acquire().await.expect("semaphore not closed");
        let per_source = self.per_source_semaphore(source_id).await;
        let _source = per_source.acquire().await.expect("semaphore not closed");

        if let Some(bucket) = &self.global_bucket {
            bucket.take().await;
        }
        self.per_source_bucket(source_id, source_qps).await.take().await;

        let span = info_span!("fetch", url, source_id);
        let _guard = span.enter();

        let mut header_map = HeaderMap::new();
        for (k, v) in extra_headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) {
                header_map.insert(name, value);
            }
        }

        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..self.backoff.max_retries + 1 {
            let resp_result = self
                .client
                .get(url)
                .headers(header_map.clone())
                .send()
                .await;

            match resp_result {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();
                    let headers = resp
                        .headers()
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                        .collect::<BTreeMap<_, _>>();

                    if status == StatusCode::NOT_MODIFIED {
                        return Ok(FetchOutcome::NotModified { headers });
                    }

                    if status.is_success() {
                        let body = resp.bytes().await?.to_vec();
                        return Ok(FetchOutcome::Fetched(FetchedResponse {
                            status,
                            final_url,
                            body,
                            headers,
                        }));
                    }

                    // Only transport errors are retried here; an HTTP status
                    // (including 5xx) surfaces immediately so the orchestrator
                    // can mark the job for its own retry via the queue.
                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    let disposition = classify_reqwest_error(&err);
                    if disposition == RetryDisposition::Retryable && attempt < self.backoff.max_retries {
                        metrics.incr("retries", 1);
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }

        Err(FetchError::Request(
            last_request_error.expect("retry loop should capture a request error"),
        ))
    }
}

/// High-level orchestrator-facing contract: robots check, conditional
/// headers, fetch, 304/raw-snapshot handling, metrics bumps.
pub struct Fetcher {
    http: HttpFetcher,
    robots: Arc<RobotsCache>,
    conditional: Arc<ConditionalFetchCache>,
    raw_store: RawStore,
}

impl Fetcher {
    pub fn new(
        http: HttpFetcher,
        robots: Arc<RobotsCache>,
        conditional: Arc<ConditionalFetchCache>,
        raw_store: RawStore,
    ) -> Self {
        Self {
            http,
            robots,
            conditional,
            raw_store,
        }
    }

    /// `fetch_document` per the component contract: robots → conditional
    /// headers → fetch → 304/error/2xx handling → snapshot persistence.
    pub async fn fetch_document(
        &self,
        source_id: &str,
        source_qps: f64,
        url: &str,
        metrics: &MetricsRegistry,
    ) -> Result<Option<Snapshot>, FetchError> {
        if !self.robots.allowed(url).await {
            metrics.incr("robots_disallow", 1);
            return Ok(None);
        }

        let conditional_headers = self.conditional.headers_for(url).await;
        let outcome = self
            .http
            .fetch(source_id, source_qps, url, &conditional_headers, metrics)
            .await?;

        let response = match outcome {
            FetchOutcome::NotModified { headers } => {
                metrics.incr("pages_fetched", 1);
                metrics.incr("http_3xx", 1);
                metrics.incr("unchanged_skips", 1);
                let etag = headers.get("etag").cloned();
                let last_modified = headers.get("last-modified").cloned();
                self.conditional.update(url, etag, last_modified).await;
                return Ok(None);
            }
            FetchOutcome::Fetched(response) => response,
        };

        metrics.incr("pages_fetched", 1);
        metrics.incr(&format!("http_{}xx", response.status.as_u16() / 100), 1);

        let etag = response.headers.get("etag").cloned();
        let last_modified = response.headers.get("last-modified").cloned();
        self.conditional.update(url, etag, last_modified).await;

        let fetched_at = Utc::now();
        let html = String::from_utf8_lossy(&response.body).to_string();
        let path = self
            .raw_store
            .store_snapshot(url, &html, &response.headers, fetched_at)
            .await
            .map_err(|err| FetchError::HttpStatus {
                status: 0,
                url: format!("{url} (snapshot write failed: {err})"),
            })?;

        Ok(Some(Snapshot {
            url: url.to_string(),
            html,
            headers: response.headers,
            fetched_at,
            path: Some(path),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_policy_covers_four_attempts() {
        let backoff = HttpClientConfig::default().backoff;
        assert_eq!(backoff.max_retries, 3);
    }
}
