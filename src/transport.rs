//! Transport abstraction shared by the plain and bypass clients.
//!
//! The dispatcher only talks to [`HttpFetcher`] trait objects, which keeps the
//! reqwest-backed clients swappable for stubs or caller-provided transports.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::headers::HeaderSet;

/// Contract implemented by every transport the dispatcher can drive.
///
/// Implementations are expected to keep their connection pool (and any
/// cookie state) across calls.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get(&self, url: &Url, options: &RequestOptions) -> FetchResult<FetchResponse>;
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub headers: HeaderSet,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Fill the timeout when the caller left it unset.
    pub fn or_timeout(mut self, timeout: Duration) -> Self {
        self.timeout.get_or_insert(timeout);
        self
    }
}

/// Read-only HTTP response returned to callers.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    status: u16,
    headers: HeaderMap,
    body: Bytes,
    url: Url,
}

impl FetchResponse {
    pub fn new(status: u16, headers: HeaderMap, body: impl Into<Bytes>, url: Url) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            url,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Final URL after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Body decoded as UTF-8, invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn bytes(&self) -> Bytes {
        self.body.clone()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Drain a reqwest response into an owned value.
    pub(crate) async fn from_reqwest(response: reqwest::Response) -> FetchResult<Self> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;
        Ok(Self::new(status, headers, body, url))
    }
}

/// Issue a GET through a reqwest client, applying per-request options.
pub(crate) async fn send_get(
    client: &reqwest::Client,
    url: &Url,
    options: &RequestOptions,
) -> FetchResult<FetchResponse> {
    let mut builder = client.get(url.clone());
    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }
    if !options.headers.is_empty() {
        builder = builder.headers(options.headers.to_header_map()?);
    }
    let response = builder.send().await.map_err(FetchError::from)?;
    FetchResponse::from_reqwest(response).await
}
