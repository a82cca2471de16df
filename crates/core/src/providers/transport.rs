use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::errors::CoreError;

use super::traits::{ApiRequest, ApiResponse, HttpMethod, Transport};

/// reqwest-backed transport rooted at the backend base URL.
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, CoreError> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Delete => self.client.delete(&url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status, body })
    }
}

/// Backoff schedule shared by 429 and network-failure retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
        }
    }
}

/// Wraps a transport with exponential backoff.
///
/// - HTTP 429: wait, double the delay, retry; once retries run out the last
///   429 response is returned, not an error.
/// - Network failure: same schedule; once retries run out the error propagates.
/// - Anything else (success or other status) returns immediately.
pub struct RetryingTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetryingTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub async fn call(&self, request: &ApiRequest) -> Result<ApiResponse, CoreError> {
        let mut delay = self.policy.initial_delay;
        let mut retries = 0;

        loop {
            match self.inner.send(request).await {
                Ok(response) if response.is_rate_limited() && retries < self.policy.max_retries => {
                    tracing::warn!(
                        "Rate limited on {}, retrying in {}ms ({}/{})",
                        request.path,
                        delay.as_millis(),
                        retries + 1,
                        self.policy.max_retries
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && retries < self.policy.max_retries => {
                    tracing::warn!(
                        "Network error on {}: {}, retrying in {}ms ({}/{})",
                        request.path,
                        e,
                        delay.as_millis(),
                        retries + 1,
                        self.policy.max_retries
                    );
                }
                Err(e) => return Err(e),
            }

            tokio::time::sleep(delay).await;
            delay *= 2;
            retries += 1;
        }
    }
}

#[async_trait]
impl<T: Transport> Transport for RetryingTransport<T> {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, CoreError> {
        self.call(request).await
    }
}
