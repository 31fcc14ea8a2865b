//! Status-driven retry policy for the plain client.
//!
//! Mirrors the semantics of the classic urllib3 `Retry` adapter: a total
//! budget shared by connection failures and force-listed statuses, and an
//! exponential backoff where the first retry happens immediately.

use std::time::Duration;

use chrono::{DateTime, Utc};
use http::HeaderMap;
use http::header::RETRY_AFTER;
use serde::Deserialize;

/// Statuses retried by default.
pub const DEFAULT_STATUS_FORCELIST: [u16; 5] = [429, 500, 502, 503, 504];

const BACKOFF_MAX: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt.
    pub total: u32,
    pub backoff_factor: f64,
    pub status_forcelist: Vec<u16>,
    pub respect_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            total: 3,
            backoff_factor: 1.0,
            status_forcelist: DEFAULT_STATUS_FORCELIST.to_vec(),
            respect_retry_after: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            total: 0,
            ..Self::default()
        }
    }

    pub fn with_total(mut self, total: u32) -> Self {
        self.total = total;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor.max(0.0);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.total.saturating_add(1)
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.status_forcelist.contains(&status)
    }

    /// Delay before the next attempt, given how many consecutive attempts
    /// have already failed. Negative or NaN factors never wait.
    pub fn backoff(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures <= 1 {
            return Duration::ZERO;
        }
        let exponent = (consecutive_failures - 1).min(31) as i32;
        let secs = self.backoff_factor * 2f64.powi(exponent);
        if secs.is_nan() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(secs.clamp(0.0, BACKOFF_MAX.as_secs_f64()))
    }

    /// Wait requested by the server through `Retry-After`, when honoured for
    /// this status. Accepts delta-seconds and HTTP-dates; dates in the past
    /// mean no wait.
    pub fn retry_after(&self, status: u16, headers: &HeaderMap) -> Option<Duration> {
        if !self.respect_retry_after || !matches!(status, 413 | 429 | 503) {
            return None;
        }
        let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
        if let Ok(secs) = value.parse::<u64>() {
            return Some(Duration::from_secs(secs));
        }
        let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
        Some((at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    /// Delay to apply before retrying a response with `status`.
    pub fn delay_for_status(
        &self,
        status: u16,
        headers: &HeaderMap,
        consecutive_failures: u32,
    ) -> Duration {
        self.retry_after(status, headers)
            .unwrap_or_else(|| self.backoff(consecutive_failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn defaults_match_plain_client_budget() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.total, 3);
        assert_eq!(policy.max_attempts(), 4);
        for status in [429, 500, 502, 503, 504] {
            assert!(policy.is_retryable_status(status));
        }
        assert!(!policy.is_retryable_status(403));
        assert!(!policy.is_retryable_status(501));
    }

    #[test]
    fn backoff_grows_exponentially_after_first_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::ZERO);
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(40), BACKOFF_MAX);
    }

    #[test]
    fn retry_after_overrides_backoff() {
        let policy = RetryPolicy::default();
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(
            policy.delay_for_status(503, &headers, 3),
            Duration::from_secs(7)
        );
        assert_eq!(policy.delay_for_status(500, &headers, 3), Duration::from_secs(4));
    }

    #[test]
    fn retry_after_can_be_ignored() {
        let policy = RetryPolicy {
            respect_retry_after: false,
            ..RetryPolicy::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(policy.retry_after(429, &headers), None);
    }

    #[test]
    fn retry_after_accepts_http_dates() {
        let policy = RetryPolicy::default();
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(policy.retry_after(503, &headers), Some(Duration::ZERO));

        let later = (Utc::now() + chrono::Duration::seconds(60)).to_rfc2822();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(&later).unwrap());
        let wait = policy.retry_after(429, &headers).unwrap();
        assert!(wait > Duration::from_secs(50) && wait <= Duration::from_secs(60));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(policy.retry_after(429, &headers), None);
    }

    #[test]
    fn invalid_factors_never_wait() {
        for factor in [-1.0, f64::NAN, f64::NEG_INFINITY] {
            let policy = RetryPolicy {
                backoff_factor: factor,
                ..RetryPolicy::default()
            };
            assert_eq!(policy.backoff(3), Duration::ZERO);
        }
        let policy = RetryPolicy {
            backoff_factor: f64::INFINITY,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(3), BACKOFF_MAX);
    }

    #[test]
    fn zero_factor_never_waits() {
        let policy = RetryPolicy::default().with_backoff_factor(0.0);
        assert_eq!(policy.backoff(3), Duration::ZERO);
    }
}
