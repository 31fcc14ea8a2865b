//! Fetch events.
//!
//! Hooks for logging and custom reactions around dispatcher activity.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use url::Url;

/// Which client issued a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Bypass,
    Plain,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Bypass => f.write_str("bypass"),
            Route::Plain => f.write_str("plain"),
        }
    }
}

/// Why the dispatcher abandoned the bypass client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    UnresolvedChallenge,
    BypassError(String),
}

#[derive(Debug, Clone)]
pub struct AttemptEvent {
    pub url: Url,
    pub route: Route,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub url: Url,
    pub route: Route,
    pub status: u16,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FallbackEvent {
    pub url: Url,
    pub reason: FallbackReason,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RetryEvent {
    pub url: Url,
    pub attempt: u32,
    pub reason: String,
    pub scheduled_after: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum FetchEvent {
    Attempt(AttemptEvent),
    Response(ResponseEvent),
    Fallback(FallbackEvent),
    Retry(RetryEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &FetchEvent);
}

/// Broadcasts events to registered handlers.
#[derive(Default, Clone)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Dispatcher with the [`LoggingHandler`] already registered.
    pub fn with_logging() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register_handler(Arc::new(LoggingHandler));
        dispatcher
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: FetchEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &FetchEvent) {
        match event {
            FetchEvent::Attempt(attempt) => {
                log::debug!("-> [{}] GET {}", attempt.route, attempt.url);
            }
            FetchEvent::Response(response) => {
                log::debug!(
                    "<- [{}] {} -> {} ({:.2}s)",
                    response.route,
                    response.url,
                    response.status,
                    response.latency.as_secs_f64()
                );
            }
            FetchEvent::Fallback(fallback) => match &fallback.reason {
                FallbackReason::UnresolvedChallenge => {
                    log::warn!(
                        "challenge bypass failed for {}, trying normal request",
                        fallback.url
                    );
                }
                FallbackReason::BypassError(error) => {
                    log::warn!(
                        "challenge bypass error for {}: {error}, falling back to normal request",
                        fallback.url
                    );
                }
            },
            FetchEvent::Retry(retry) => {
                log::info!(
                    "retry {} attempt {} after {:.2}s ({})",
                    retry.url,
                    retry.attempt,
                    retry.scheduled_after.as_secs_f64(),
                    retry.reason
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingHandler(std::sync::Mutex<usize>);

    impl EventHandler for CountingHandler {
        fn handle(&self, _event: &FetchEvent) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn dispatches_to_handlers() {
        let mut dispatcher = EventDispatcher::with_logging();
        let counter = Arc::new(CountingHandler(std::sync::Mutex::new(0)));
        dispatcher.register_handler(counter.clone());
        dispatcher.dispatch(FetchEvent::Fallback(FallbackEvent {
            url: Url::parse("https://example.com").unwrap(),
            reason: FallbackReason::UnresolvedChallenge,
            timestamp: Utc::now(),
        }));
        assert_eq!(*counter.0.lock().unwrap(), 1);
    }
}
