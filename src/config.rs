//! Client configuration.
//!
//! Provides:
//! - `FetchConfig` with the defaults the dispatcher ships with
//! - a fluent builder
//! - JSON loading (durations given in seconds)

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::FetchResult;
use crate::events::EventHandler;
use crate::profile::BrowserOptions;
use crate::retry::RetryPolicy;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CHALLENGE_DELAY: Duration = Duration::from_secs(10);

/// Settings fixed at client construction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub bypass_enabled: bool,
    #[serde(rename = "timeout_secs", deserialize_with = "duration_secs")]
    pub timeout: Duration,
    /// Wait before re-requesting after a challenge interstitial.
    #[serde(rename = "challenge_delay_secs", deserialize_with = "duration_secs")]
    pub challenge_delay: Duration,
    pub retry: RetryPolicy,
    pub browser: BrowserOptions,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            bypass_enabled: true,
            timeout: DEFAULT_TIMEOUT,
            challenge_delay: DEFAULT_CHALLENGE_DELAY,
            retry: RetryPolicy::default(),
            browser: BrowserOptions::chrome_windows(),
        }
    }
}

impl FetchConfig {
    pub fn with_bypass(bypass_enabled: bool) -> Self {
        Self {
            bypass_enabled,
            ..Self::default()
        }
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(raw: &str) -> FetchResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

fn duration_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

/// Fluent builder for [`crate::FallbackClient`].
#[derive(Default)]
pub struct FetchConfigBuilder {
    pub(crate) config: FetchConfig,
    pub(crate) handlers: Vec<Arc<dyn EventHandler>>,
}

impl FetchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: FetchConfig) -> Self {
        Self {
            config,
            handlers: Vec::new(),
        }
    }

    pub fn bypass_enabled(mut self, enabled: bool) -> Self {
        self.config.bypass_enabled = enabled;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn challenge_delay(mut self, delay: Duration) -> Self {
        self.config.challenge_delay = delay;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn browser(mut self, options: BrowserOptions) -> Self {
        self.config.browser = options;
        self
    }

    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn build(self) -> FetchResult<crate::FallbackClient> {
        crate::FallbackClient::from_builder(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = FetchConfig::default();
        assert!(config.bypass_enabled);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.challenge_delay, Duration::from_secs(10));
        assert_eq!(config.browser.browser.as_deref(), Some("chrome"));
        assert_eq!(config.browser.platform.as_deref(), Some("windows"));
    }

    #[test]
    fn json_overrides_only_given_fields() {
        let config = FetchConfig::from_json_str(
            r#"{"bypass_enabled": false, "timeout_secs": 2.5, "retry": {"total": 1}}"#,
        )
        .unwrap();
        assert!(!config.bypass_enabled);
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.challenge_delay, DEFAULT_CHALLENGE_DELAY);
        assert_eq!(config.retry.total, 1);
        assert_eq!(config.retry.status_forcelist, vec![429, 500, 502, 503, 504]);
    }

    #[test]
    fn negative_backoff_factor_is_harmless() {
        let config =
            FetchConfig::from_json_str(r#"{"retry": {"total": 3, "backoff_factor": -1.0}}"#)
                .unwrap();
        assert_eq!(config.retry.backoff(3), Duration::ZERO);
    }

    #[test]
    fn rejects_negative_durations() {
        assert!(FetchConfig::from_json_str(r#"{"timeout_secs": -1}"#).is_err());
    }
}
