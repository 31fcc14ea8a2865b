use thiserror::Error;

use crate::profile::ProfileError;

/// Result alias used across the crate.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors surfaced to callers.
///
/// Failures on the bypass path never reach the caller; they are absorbed by
/// the plain-client fallback.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("header conversion failed: {0}")]
    InvalidHeader(String),
    #[error("{url} still returned {status} after {attempts} attempts")]
    RetriesExhausted {
        url: String,
        status: u16,
        attempts: u32,
    },
    #[error("client has been closed")]
    Closed,
    #[error("browser profile selection failed: {0}")]
    Profile(#[from] ProfileError),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl FetchError {
    /// Transport failures worth another attempt: connect errors and timeouts.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(err) => err.is_connect() || err.is_timeout(),
            _ => false,
        }
    }
}
