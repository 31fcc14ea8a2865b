//! Browser-emulating client.
//!
//! Presents a browser profile (desktop Chrome on Windows by default), keeps a
//! cookie jar, and when it lands on a challenge interstitial waits the settle
//! delay before asking once more. It does not solve challenges: pages that
//! still block after the second request are returned as-is.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::HeaderMap;
use tokio::time::sleep;
use url::Url;

use crate::challenge::detect_interstitial;
use crate::config::FetchConfig;
use crate::error::FetchResult;
use crate::events::{EventDispatcher, FetchEvent, ResponseEvent, RetryEvent, Route};
use crate::headers::{HeaderSet, session_headers};
use crate::profile::{BrowserProfile, select_profile};
use crate::transport::{FetchResponse, HttpFetcher, RequestOptions, send_get};

/// Raw configured session for callers driving requests themselves, e.g.
/// handing a client to a third-party downloader.
#[derive(Debug, Clone)]
pub struct BypassSession {
    client: reqwest::Client,
    headers: HeaderMap,
    profile: BrowserProfile,
    challenge_delay: Duration,
}

impl BypassSession {
    pub fn new(config: &FetchConfig) -> FetchResult<Self> {
        let profile = select_profile(&config.browser)?;
        // Session headers win over the profile's, so every client sends the
        // same realistic header set.
        let headers = profile.headers.clone().merged(&session_headers()).to_header_map()?;

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(headers.clone())
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            headers,
            profile,
            challenge_delay: config.challenge_delay,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn into_client(self) -> reqwest::Client {
        self.client
    }

    /// Headers attached to every request of this session.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn profile(&self) -> &BrowserProfile {
        &self.profile
    }

    pub fn challenge_delay(&self) -> Duration {
        self.challenge_delay
    }
}

/// Build a standalone bypass session configured like the dispatcher's.
pub fn bypass_session(config: &FetchConfig) -> FetchResult<BypassSession> {
    BypassSession::new(config)
}

/// [`HttpFetcher`] over a [`BypassSession`].
pub struct BypassClient {
    session: BypassSession,
    events: EventDispatcher,
}

impl BypassClient {
    pub fn new(config: &FetchConfig) -> FetchResult<Self> {
        Self::with_events(config, EventDispatcher::with_logging())
    }

    pub(crate) fn with_events(config: &FetchConfig, events: EventDispatcher) -> FetchResult<Self> {
        Ok(Self {
            session: BypassSession::new(config)?,
            events,
        })
    }

    pub fn session(&self) -> &BypassSession {
        &self.session
    }

    pub fn profile_headers(&self) -> &HeaderSet {
        &self.session.profile.headers
    }

    async fn send(&self, url: &Url, options: &RequestOptions) -> FetchResult<FetchResponse> {
        let started = Instant::now();
        let response = send_get(&self.session.client, url, options).await?;
        self.events.dispatch(FetchEvent::Response(ResponseEvent {
            url: response.url().clone(),
            route: Route::Bypass,
            status: response.status(),
            latency: started.elapsed(),
            timestamp: chrono::Utc::now(),
        }));
        Ok(response)
    }
}

#[async_trait]
impl HttpFetcher for BypassClient {
    async fn get(&self, url: &Url, options: &RequestOptions) -> FetchResult<FetchResponse> {
        let first = self.send(url, options).await?;

        let body = first.text();
        let Some(kind) = detect_interstitial(first.status(), first.headers(), &body) else {
            return Ok(first);
        };

        let delay = self.session.challenge_delay;
        self.events.dispatch(FetchEvent::Retry(RetryEvent {
            url: url.clone(),
            attempt: 2,
            reason: format!("{kind:?} interstitial"),
            scheduled_after: delay,
            timestamp: chrono::Utc::now(),
        }));
        if delay > Duration::ZERO {
            sleep(delay).await;
        }

        self.send(url, options).await
    }
}
