//! HTTP access to third-party listing and detail pages.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, REFERER};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info_span, Instrument};

pub const DEFAULT_USER_AGENT: &str = "evcol-bot/0.1 (+event-collector)";

/// Waits between attempts, doubling from `first_delay` up to `ceiling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub first_delay: Duration,
    pub ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            first_delay: Duration::from_millis(500),
            ceiling: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// One item per permitted retry.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let ceiling = self.ceiling;
        std::iter::successors(Some(self.first_delay.min(ceiling)), move |prev| {
            Some(prev.saturating_mul(2).min(ceiling))
        })
        .take(self.retries as usize)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub global_concurrency: usize,
    pub per_source_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            global_concurrency: 8,
            per_source_concurrency: 2,
            retry: RetryPolicy::default(),
        }
    }
}

/// One GET against a third-party endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub referer: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            referer: None,
        }
    }

    pub fn with_referer(mut self, referer: Option<String>) -> Self {
        self.referer = referer;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("fetcher unavailable: {0}")]
    Unavailable(String),
}

impl FetchError {
    /// Timeouts, refused connections, 5xx and 429 may clear up on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request(err) => err.is_timeout() || err.is_connect(),
            FetchError::HttpStatus { status, .. } => {
                *status >= 500 || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            FetchError::Unavailable(_) => false,
        }
    }
}

/// Fetch primitive shared by listing adapters and the detail enricher.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, source_id: &str, request: &FetchRequest)
        -> Result<FetchedResponse, FetchError>;
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    per_source_limit: usize,
    per_source: Mutex<HashMap<String, Arc<Semaphore>>>,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("building reqwest client")?;

        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            per_source_limit: config.per_source_concurrency.max(1),
            per_source: Mutex::new(HashMap::new()),
            retry: config.retry,
        })
    }

    async fn per_source_semaphore(&self, source_id: &str) -> Arc<Semaphore> {
        let mut map = self.per_source.lock().await;
        map.entry(source_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_source_limit)))
            .clone()
    }

    async fn send_once(&self, request: &FetchRequest) -> Result<FetchedResponse, FetchError> {
        let mut builder = self.client.get(&request.url);
        if let Some(referer) = &request.referer {
            builder = builder.header(REFERER, referer);
        }
        let resp = builder.send().await?;
        let status = resp.status();
        let final_url = resp.url().to_string();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = resp.bytes().await?.to_vec();
        Ok(FetchedResponse {
            status,
            final_url,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(
        &self,
        source_id: &str,
        request: &FetchRequest,
    ) -> Result<FetchedResponse, FetchError> {
        let _global = self
            .global_limit
            .acquire()
            .await
            .map_err(|e| FetchError::Unavailable(e.to_string()))?;
        let per_source = self.per_source_semaphore(source_id).await;
        let _source = per_source
            .acquire()
            .await
            .map_err(|e| FetchError::Unavailable(e.to_string()))?;

        let span = info_span!("http_fetch", source_id, url = %request.url);
        async {
            let mut delays = self.retry.delays();
            let mut attempt = 1;
            loop {
                let err = match self.send_once(request).await {
                    Ok(response) => return Ok(response),
                    Err(err) => err,
                };
                let Some(delay) = delays.next().filter(|_| err.is_transient()) else {
                    return Err(err);
                };
                debug!(attempt, error = %err, ?delay, "retrying fetch");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delays_double_until_the_ceiling() {
        let policy = RetryPolicy {
            retries: 4,
            first_delay: Duration::from_millis(100),
            ceiling: Duration::from_millis(350),
        };
        let delays: Vec<u64> = policy.delays().map(|d| d.as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 350, 350]);

        let none = RetryPolicy {
            retries: 0,
            ..policy
        };
        assert_eq!(none.delays().count(), 0);
    }

    #[test]
    fn only_server_errors_and_throttling_are_transient() {
        let status = |status: u16| FetchError::HttpStatus {
            status,
            url: "https://festival.example.kr/list".to_string(),
        };
        assert!(status(502).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(404).is_transient());
        assert!(!FetchError::Unavailable("closed".to_string()).is_transient());
    }
}
