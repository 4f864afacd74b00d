//! HTTP client wrapper: Range reads, JSON requests, auth and retry.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::{CloudAuth, NoAuth};
use crate::error::{CloudError, Result};

/// Base delay of the exponential backoff (doubles per attempt).
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Doubling stops after this many attempts (32 s with the base above).
const BACKOFF_MAX_EXPONENT: u32 = 6;

/// Delay before retry number `attempt` (1-based).
fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(BACKOFF_MAX_EXPONENT);
    BACKOFF_BASE * 2u32.pow(exponent)
}

/// HTTP client shared by the STAC, COG and Process API clients.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    request_timeout: Duration,
    auth: Arc<dyn CloudAuth>,
}

impl HttpClient {
    /// Create an unauthenticated client.
    pub fn new(request_timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            max_retries,
            request_timeout,
            auth: Arc::new(NoAuth),
        })
    }

    /// Attach an authentication provider to every request.
    pub fn with_auth(mut self, auth: Arc<dyn CloudAuth>) -> Self {
        self.auth = auth;
        self
    }

    /// Fetch `[offset .. offset + length)` of a remote file.
    pub async fn fetch_range(&self, url: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let range_value = format!("bytes={}-{}", offset, offset + length - 1);
        let resp = self
            .send(Method::GET, url, |req| req.header("Range", range_value.as_str()))
            .await?;

        if resp.status() != StatusCode::PARTIAL_CONTENT {
            return Err(CloudError::RangeNotSupported {
                url: url.to_string(),
            });
        }

        Ok(resp.bytes().await?.to_vec())
    }

    /// Fetch several byte ranges with at most `concurrency` requests in
    /// flight. Results keep the order of `ranges`.
    pub async fn fetch_ranges(
        &self,
        url: &str,
        ranges: &[(u64, u64)],
        concurrency: usize,
    ) -> Result<Vec<Vec<u8>>> {
        stream::iter(ranges.iter().copied())
            .map(|(offset, length)| self.fetch_range(url, offset, length))
            .buffered(concurrency.max(1))
            .try_collect()
            .await
    }

    /// POST a JSON body and decode a JSON response.
    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .send(Method::POST, url, |req| req.json(body))
            .await?;
        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// GET a JSON document.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.send(Method::GET, url, |req| req).await?;
        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// POST a JSON body and return the raw response bytes.
    pub async fn post_json_for_bytes<B>(&self, url: &str, body: &B, accept: &str) -> Result<Vec<u8>>
    where
        B: Serialize + ?Sized,
    {
        let resp = self
            .send(Method::POST, url, |req| req.header("Accept", accept).json(body))
            .await?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// Send a request built by `build`, signing it and retrying transient
    /// failures with exponential backoff. Non-success statuses become
    /// [`CloudError::Status`].
    async fn send<F>(&self, method: Method, url: &str, build: F) -> Result<Response>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            match self.try_send(&method, url, &build).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = backoff_delay(attempt);
                    warn!(url, attempt, error = %e, "transient HTTP failure, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_send<F>(&self, method: &Method, url: &str, build: &F) -> Result<Response>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let mut auth_headers = Vec::new();
        self.auth
            .sign_request(url, method.as_str(), &mut auth_headers)
            .await?;

        let mut req = build(self.client.request(method.clone(), url));
        for (key, value) in &auth_headers {
            req = req.header(key.as_str(), value.as_str());
        }

        debug!(%method, url, "HTTP request");
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(CloudError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            body: body.chars().take(500).collect(),
        })
    }

    /// Getter for the timeout duration.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}
