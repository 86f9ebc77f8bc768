use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::config::CrawlConfig;
use super::error::{CrawlError, FetchError, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    PostForm(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn post_form(url: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            method: Method::PostForm(fields),
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Single request/response exchange. Implementations never retry.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &CrawlConfig) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.workers * 2)
            .build()
            .map_err(|err| CrawlError::Client(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match &request.method {
            Method::Get => self.client.get(&request.url),
            Method::PostForm(fields) => {
                let mut serializer = url::form_urlencoded::Serializer::new(String::new());
                for (name, value) in fields {
                    serializer.append_pair(name, value);
                }
                self.client.post(&request.url).body(serializer.finish())
            }
        };
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

/// What to do with a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Success,
    Retry,
    Terminal,
}

/// 200 succeeds, 503 is transient, anything else is final.
pub fn classify_status(status: u16) -> Attempt {
    match status {
        200 => Attempt::Success,
        503 => Attempt::Retry,
        _ => Attempt::Terminal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2,
        }
    }
}

impl RetryPolicy {
    /// Wait after the zero-based `attempt`: `base ^ attempt` seconds.
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff_base.saturating_pow(attempt))
    }
}

/// Sends `request` until `classify` accepts the status, a terminal status or
/// transport error comes back, or the policy runs out of attempts. Transport
/// errors are never retried.
pub async fn send_with_retry<F>(
    transport: &dyn HttpTransport,
    policy: RetryPolicy,
    request: &HttpRequest,
    classify: F,
) -> Result<String, FetchError>
where
    F: Fn(u16) -> Attempt,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 0..max_attempts {
        let response = transport.send(request).await.map_err(|source| {
            warn!(
                url = %request.url,
                kind = source.kind.as_str(),
                error = %source,
                "request failed"
            );
            FetchError::Transport {
                url: request.url.clone(),
                source,
            }
        })?;

        match classify(response.status) {
            Attempt::Success => {
                debug!(url = %request.url, attempt = attempt + 1, "fetched");
                return Ok(response.body);
            }
            Attempt::Terminal => {
                warn!(url = %request.url, status = response.status, "request rejected");
                return Err(FetchError::Status {
                    url: request.url.clone(),
                    status: response.status,
                });
            }
            Attempt::Retry => {
                if attempt + 1 < max_attempts {
                    let delay = policy.delay(attempt);
                    warn!(
                        url = %request.url,
                        status = response.status,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "service unavailable, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    warn!(url = %request.url, attempts = max_attempts, "giving up after retries");
    Err(FetchError::RetriesExhausted {
        url: request.url.clone(),
        attempts: max_attempts,
    })
}

/// GET with the spoofed browser identity and the 503 retry policy.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    config: Arc<CrawlConfig>,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, config: Arc<CrawlConfig>) -> Self {
        Self { transport, config }
    }

    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let request = HttpRequest::get(url).header("User-Agent", self.config.user_agent.as_str());
        send_with_retry(
            self.transport.as_ref(),
            self.config.retry,
            &request,
            classify_status,
        )
        .await
    }
}
