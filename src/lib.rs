//! # cfetch
//!
//! HTTP fetching that tries a browser-emulating client first and falls back
//! to a plain retrying client when the first attempt is blocked.
//!
//! The browser-emulating ("bypass") client presents desktop Chrome on
//! Windows, keeps cookies, and waits out challenge interstitials once. It does
//! not solve challenges. When it fails, or returns a 403 page mentioning
//! Cloudflare, the request is replayed through the plain client, which retries
//! 429/500/502/503/504 responses with exponential backoff.
//!
//! ## Example
//!
//! ```no_run
//! use cfetch::{FallbackClient, FetchConfig, RequestOptions};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FallbackClient::new(FetchConfig::default())?;
//!     let options = RequestOptions::new().with_timeout(Duration::from_secs(10));
//!     let response = client.get("https://example.com", options).await?;
//!     println!("{} ({} bytes)", response.status(), response.len());
//!     client.close().await;
//!     Ok(())
//! }
//! ```

mod client;

pub mod bypass;
pub mod challenge;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod plain;
pub mod profile;
pub mod retry;
pub mod transport;

pub use crate::client::{FallbackClient, shared_client};

pub use crate::bypass::{BypassClient, BypassSession, bypass_session};

pub use crate::challenge::{
    CHALLENGE_VENDOR_MARKER,
    InterstitialKind,
    detect_interstitial,
    is_unresolved_challenge,
};

pub use crate::config::{FetchConfig, FetchConfigBuilder};

pub use crate::error::{FetchError, FetchResult};

pub use crate::events::{
    EventDispatcher,
    EventHandler,
    FallbackReason,
    FetchEvent,
    LoggingHandler,
    Route,
};

pub use crate::headers::{HeaderSet, realistic_headers, session_headers};

pub use crate::plain::PlainClient;

pub use crate::profile::{BrowserOptions, BrowserProfile, ProfileError, select_profile};

pub use crate::retry::RetryPolicy;

pub use crate::transport::{FetchResponse, HttpFetcher, RequestOptions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
