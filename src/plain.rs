//! Plain pooled client with status-based retry.

use std::time::Instant;

use async_trait::async_trait;
use tokio::time::sleep;
use url::Url;

use crate::config::FetchConfig;
use crate::error::{FetchError, FetchResult};
use crate::events::{EventDispatcher, FetchEvent, ResponseEvent, RetryEvent, Route};
use crate::headers::session_headers;
use crate::retry::RetryPolicy;
use crate::transport::{FetchResponse, HttpFetcher, RequestOptions, send_get};

/// Connection-pooling client performing no challenge handling.
pub struct PlainClient {
    client: reqwest::Client,
    retry: RetryPolicy,
    events: EventDispatcher,
}

impl PlainClient {
    pub fn new(config: &FetchConfig) -> FetchResult<Self> {
        Self::with_events(config, EventDispatcher::with_logging())
    }

    pub(crate) fn with_events(config: &FetchConfig, events: EventDispatcher) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .default_headers(session_headers().to_header_map()?)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            retry: config.retry.clone(),
            events,
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn schedule_retry(&self, url: &Url, attempt: u32, reason: String, delay: std::time::Duration) {
        self.events.dispatch(FetchEvent::Retry(RetryEvent {
            url: url.clone(),
            attempt,
            reason,
            scheduled_after: delay,
            timestamp: chrono::Utc::now(),
        }));
    }
}

#[async_trait]
impl HttpFetcher for PlainClient {
    async fn get(&self, url: &Url, options: &RequestOptions) -> FetchResult<FetchResponse> {
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let started = Instant::now();

            match send_get(&self.client, url, options).await {
                Ok(response) => {
                    self.events.dispatch(FetchEvent::Response(ResponseEvent {
                        url: response.url().clone(),
                        route: Route::Plain,
                        status: response.status(),
                        latency: started.elapsed(),
                        timestamp: chrono::Utc::now(),
                    }));

                    let status = response.status();
                    if !self.retry.is_retryable_status(status) {
                        return Ok(response);
                    }
                    if attempt >= max_attempts {
                        return Err(FetchError::RetriesExhausted {
                            url: url.to_string(),
                            status,
                            attempts: attempt,
                        });
                    }

                    let delay = self
                        .retry
                        .delay_for_status(status, response.headers(), attempt);
                    self.schedule_retry(url, attempt + 1, format!("status {status}"), delay);
                    sleep(delay).await;
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    self.schedule_retry(url, attempt + 1, err.to_string(), delay);
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
