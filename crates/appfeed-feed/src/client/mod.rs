//! HTTP fetcher for the vendor feed.

mod detail;
mod request;

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;

use appfeed_core::FeedConfig;

use crate::error::FeedError;
use crate::retry::{is_retriable, retry_with_backoff};

pub use crate::retry::RetryPolicy;
pub use detail::fetch_detail;
pub use request::{RequestOptions, RetryableRequest};

/// A successful (HTTP 200) feed response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// Status line plus headers, populated when header echo is enabled.
    pub response_header: Option<String>,
    pub body: Bytes,
}

/// One network call with bounded retry. Implemented by [`FeedClient`] and by
/// test stubs that drive the paginator without a server.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// # Errors
    ///
    /// Returns [`FeedError::RetriesExhausted`] once every attempt failed, or
    /// a configuration error that was not worth retrying.
    async fn fetch(&self, url: &str, options: &RequestOptions) -> Result<FetchResponse, FeedError>;
}

/// HTTP client for the vendor's catalog feed.
///
/// Every status other than 200 is retried, up to `retry_limit + 1` attempts
/// in total, with capped exponential back-off between attempts.
pub struct FeedClient {
    client: Client,
    retry: RetryPolicy,
    echo_headers: bool,
}

impl FeedClient {
    /// # Errors
    ///
    /// Returns [`FeedError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        retry: RetryPolicy,
        echo_headers: bool,
    ) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            retry,
            echo_headers,
        })
    }

    /// Builds a client from feed settings and the run's retry limit.
    ///
    /// # Errors
    ///
    /// See [`FeedClient::new`].
    pub fn from_config(feed: &FeedConfig, retry_limit: u32) -> Result<Self, FeedError> {
        Self::new(
            feed.request_timeout_secs,
            &feed.user_agent,
            RetryPolicy {
                retry_limit,
                backoff_base_ms: feed.retry_backoff_base_ms,
                backoff_max_ms: feed.retry_backoff_max_ms,
            },
            feed.echo_headers,
        )
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn fetch_once(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<FetchResponse, FeedError> {
        let mut builder = self.client.request(options.effective_method(), url);
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = options.body.as_ref().filter(|b| !b.is_empty()) {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FeedError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        let response_header = self
            .echo_headers
            .then(|| render_header_block(response.version(), status, response.headers()));
        let body = response.bytes().await?;

        Ok(FetchResponse {
            status: status.as_u16(),
            response_header,
            body,
        })
    }
}

#[async_trait]
impl Fetch for FeedClient {
    async fn fetch(&self, url: &str, options: &RequestOptions) -> Result<FetchResponse, FeedError> {
        let result = retry_with_backoff(self.retry, || self.fetch_once(url, options)).await;
        match result {
            Ok(response) => Ok(response),
            Err(err) if is_retriable(&err) => {
                let attempts = self.retry.total_attempts();
                tracing::error!(
                    url,
                    attempts,
                    error = %err,
                    "unable to retrieve data from feed"
                );
                Err(FeedError::RetriesExhausted {
                    url: url.to_owned(),
                    attempts,
                    last_error: err.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }
}

/// Serializes the status line and headers the way they appeared on the wire.
fn render_header_block(
    version: reqwest::Version,
    status: reqwest::StatusCode,
    headers: &reqwest::header::HeaderMap,
) -> String {
    let mut block = format!("{version:?} {status}\r\n");
    for (name, value) in headers {
        let value = value.to_str().unwrap_or("<binary>");
        let _ = write!(block, "{name}: {value}\r\n");
    }
    block.push_str("\r\n");
    block
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;
