//! Bypass-then-fallback dispatcher.
//!
//! Every request goes through the browser-emulating client first. When that
//! client errors, or hands back a 403 challenge page, the request is replayed
//! once through the plain retrying client.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::sync::RwLock;
use url::Url;

use crate::bypass::BypassClient;
use crate::challenge::is_unresolved_challenge;
use crate::config::{FetchConfig, FetchConfigBuilder};
use crate::error::{FetchError, FetchResult};
use crate::events::{
	AttemptEvent, EventDispatcher, FallbackEvent, FallbackReason, FetchEvent, Route,
};
use crate::plain::PlainClient;
use crate::transport::{FetchResponse, HttpFetcher, RequestOptions};

/// Both transports owned by a dispatcher. `bypass` stays `None` when the
/// bypass path is disabled.
#[derive(Clone)]
struct Transports {
	plain: Arc<dyn HttpFetcher>,
	bypass: Option<Arc<dyn HttpFetcher>>,
}

impl Transports {
	fn build(config: &FetchConfig, events: &EventDispatcher) -> FetchResult<Self> {
		let plain: Arc<dyn HttpFetcher> =
			Arc::new(PlainClient::with_events(config, events.clone())?);
		let bypass: Option<Arc<dyn HttpFetcher>> = if config.bypass_enabled {
			Some(Arc::new(BypassClient::with_events(config, events.clone())?))
		} else {
			None
		};
		Ok(Self { plain, bypass })
	}
}

/// HTTP client that tries the bypass transport before the plain one.
pub struct FallbackClient {
	config: FetchConfig,
	events: EventDispatcher,
	transports: RwLock<Option<Transports>>,
	/// False for caller-provided transports, which cannot be rebuilt.
	rebuildable: bool,
}

impl FallbackClient {
	/// Construct a client with both transports built up front.
	pub fn new(config: FetchConfig) -> FetchResult<Self> {
		FetchConfigBuilder::from_config(config).build()
	}

	/// Obtain a builder to customise the client.
	pub fn builder() -> FetchConfigBuilder {
		FetchConfigBuilder::new()
	}

	pub(crate) fn from_builder(builder: FetchConfigBuilder) -> FetchResult<Self> {
		let FetchConfigBuilder { config, handlers } = builder;

		let mut events = EventDispatcher::with_logging();
		for handler in handlers {
			events.register_handler(handler);
		}

		let transports = Transports::build(&config, &events)?;

		Ok(Self {
			config,
			events,
			transports: RwLock::new(Some(transports)),
			rebuildable: true,
		})
	}

	/// Wire caller-provided transports. `bypass` is dropped when the config
	/// disables the bypass path. Once closed, such a client stays closed.
	pub fn with_fetchers(
		config: FetchConfig,
		plain: Arc<dyn HttpFetcher>,
		bypass: Option<Arc<dyn HttpFetcher>>,
	) -> Self {
		let bypass = bypass.filter(|_| config.bypass_enabled);
		Self {
			config,
			events: EventDispatcher::with_logging(),
			transports: RwLock::new(Some(Transports { plain, bypass })),
			rebuildable: false,
		}
	}

	pub fn config(&self) -> &FetchConfig {
		&self.config
	}

	pub fn bypass_enabled(&self) -> bool {
		self.config.bypass_enabled
	}

	/// Whether a bypass transport currently exists (false while closed).
	pub async fn has_bypass_client(&self) -> bool {
		self.transports
			.read()
			.await
			.as_ref()
			.is_some_and(|transports| transports.bypass.is_some())
	}

	pub async fn is_closed(&self) -> bool {
		self.transports.read().await.is_none()
	}

	/// Perform an HTTP GET request.
	pub async fn get(&self, url: &str, options: RequestOptions) -> FetchResult<FetchResponse> {
		let url = Url::parse(url)?;
		self.get_url(&url, options).await
	}

	/// Perform an HTTP GET request against an already parsed URL.
	pub async fn get_url(&self, url: &Url, options: RequestOptions) -> FetchResult<FetchResponse> {
		let options = options.or_timeout(self.config.timeout);
		let transports = self.transports().await?;

		match transports.bypass {
			Some(ref bypass) => {
				self.bypass_get(bypass.as_ref(), transports.plain.as_ref(), url, &options)
					.await
			}
			None => self.plain_get(transports.plain.as_ref(), url, &options).await,
		}
	}

	/// Current transports, rebuilt from the config after a `close()`.
	async fn transports(&self) -> FetchResult<Transports> {
		let current = self.transports.read().await.clone();
		if let Some(transports) = current {
			return Ok(transports);
		}

		let mut slot = self.transports.write().await;
		if let Some(ref transports) = *slot {
			return Ok(transports.clone());
		}
		if !self.rebuildable {
			return Err(FetchError::Closed);
		}

		let transports = Transports::build(&self.config, &self.events)?;
		*slot = Some(transports.clone());
		log::debug!("http clients rebuilt after close");
		Ok(transports)
	}

	async fn bypass_get(
		&self,
		bypass: &dyn HttpFetcher,
		plain: &dyn HttpFetcher,
		url: &Url,
		options: &RequestOptions,
	) -> FetchResult<FetchResponse> {
		self.dispatch_attempt(url, Route::Bypass);

		let reason = match bypass.get(url, options).await {
			Ok(response) if is_unresolved_challenge(response.status(), &response.text()) => {
				FallbackReason::UnresolvedChallenge
			}
			Ok(response) => return Ok(response),
			Err(err) => FallbackReason::BypassError(err.to_string()),
		};

		self.events.dispatch(FetchEvent::Fallback(FallbackEvent {
			url: url.clone(),
			reason,
			timestamp: chrono::Utc::now(),
		}));

		self.plain_get(plain, url, options).await
	}

	async fn plain_get(
		&self,
		plain: &dyn HttpFetcher,
		url: &Url,
		options: &RequestOptions,
	) -> FetchResult<FetchResponse> {
		self.dispatch_attempt(url, Route::Plain);
		plain.get(url, options).await
	}

	fn dispatch_attempt(&self, url: &Url, route: Route) {
		self.events.dispatch(FetchEvent::Attempt(AttemptEvent {
			url: url.clone(),
			route,
			timestamp: chrono::Utc::now(),
		}));
	}

	/// Release both transports. Safe to call more than once. The next request
	/// builds fresh transports from the config, except for clients wired with
	/// [`FallbackClient::with_fetchers`], which fail with [`FetchError::Closed`].
	/// Requests already in flight finish on their own handle.
	pub async fn close(&self) {
		if self.transports.write().await.take().is_some() {
			log::debug!("http clients released");
		}
	}
}

static SHARED_CLIENT: OnceCell<FallbackClient> = OnceCell::new();

/// Process-wide client. The first call decides whether bypass is enabled;
/// later calls return the same instance whatever flag they pass.
pub fn shared_client(bypass_enabled: bool) -> FetchResult<&'static FallbackClient> {
	SHARED_CLIENT.get_or_try_init(|| FallbackClient::new(FetchConfig::with_bypass(bypass_enabled)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex;

	use async_trait::async_trait;
	use http::HeaderMap;

	enum Scripted {
		Respond(u16, &'static str),
		Fail,
	}

	struct StubFetcher {
		script: Scripted,
		calls: Mutex<usize>,
	}

	impl StubFetcher {
		fn new(script: Scripted) -> Arc<Self> {
			Arc::new(Self {
				script,
				calls: Mutex::new(0),
			})
		}

		fn calls(&self) -> usize {
			*self.calls.lock().unwrap()
		}
	}

	#[async_trait]
	impl HttpFetcher for StubFetcher {
		async fn get(&self, url: &Url, _options: &RequestOptions) -> FetchResult<FetchResponse> {
			*self.calls.lock().unwrap() += 1;
			match self.script {
				Scripted::Respond(status, body) => Ok(FetchResponse::new(
					status,
					HeaderMap::new(),
					body.as_bytes().to_vec(),
					url.clone(),
				)),
				Scripted::Fail => Err(FetchError::InvalidHeader("scripted failure".into())),
			}
		}
	}

	fn dispatcher(
		bypass_enabled: bool,
		plain: Arc<StubFetcher>,
		bypass: Arc<StubFetcher>,
	) -> FallbackClient {
		FallbackClient::with_fetchers(
			FetchConfig::with_bypass(bypass_enabled),
			plain,
			Some(bypass as Arc<dyn HttpFetcher>),
		)
	}

	#[tokio::test]
	async fn unresolved_challenge_falls_back_to_plain() {
		let plain = StubFetcher::new(Scripted::Respond(200, "plain body"));
		let bypass = StubFetcher::new(Scripted::Respond(403, "Attention Required | Cloudflare"));
		let client = dispatcher(true, plain.clone(), bypass.clone());

		let response = client.get("https://example.com", RequestOptions::new()).await.unwrap();

		assert_eq!(response.status(), 200);
		assert_eq!(response.text(), "plain body");
		assert_eq!(bypass.calls(), 1);
		assert_eq!(plain.calls(), 1);
	}

	#[tokio::test]
	async fn bypass_error_falls_back_to_plain() {
		let plain = StubFetcher::new(Scripted::Respond(200, "plain body"));
		let bypass = StubFetcher::new(Scripted::Fail);
		let client = dispatcher(true, plain.clone(), bypass.clone());

		let response = client.get("https://example.com", RequestOptions::new()).await.unwrap();

		assert_eq!(response.text(), "plain body");
		assert_eq!(plain.calls(), 1);
	}

	#[tokio::test]
	async fn other_statuses_are_returned_verbatim() {
		for (status, body) in [(200, "ok"), (404, "cloudflare"), (503, "down"), (403, "forbidden")] {
			let plain = StubFetcher::new(Scripted::Respond(200, "plain body"));
			let bypass = StubFetcher::new(Scripted::Respond(status, body));
			let client = dispatcher(true, plain.clone(), bypass);

			let response = client.get("https://example.com", RequestOptions::new()).await.unwrap();

			assert_eq!(response.status(), status);
			assert_eq!(response.text(), body);
			assert_eq!(plain.calls(), 0);
		}
	}

	#[tokio::test]
	async fn plain_errors_propagate_after_fallback() {
		let plain = StubFetcher::new(Scripted::Fail);
		let bypass = StubFetcher::new(Scripted::Fail);
		let client = dispatcher(true, plain.clone(), bypass);

		let err = client.get("https://example.com", RequestOptions::new()).await.unwrap_err();

		assert!(matches!(err, FetchError::InvalidHeader(_)));
		assert_eq!(plain.calls(), 1);
	}

	#[tokio::test]
	async fn disabled_bypass_never_touches_bypass_transport() {
		let plain = StubFetcher::new(Scripted::Respond(200, "plain body"));
		let bypass = StubFetcher::new(Scripted::Respond(200, "bypass body"));
		let client = dispatcher(false, plain.clone(), bypass.clone());

		assert!(!client.has_bypass_client().await);
		let response = client.get("https://example.com", RequestOptions::new()).await.unwrap();

		assert_eq!(response.text(), "plain body");
		assert_eq!(bypass.calls(), 0);
	}

	#[tokio::test]
	async fn transports_are_reused_across_calls() {
		let plain = StubFetcher::new(Scripted::Respond(200, "plain body"));
		let bypass = StubFetcher::new(Scripted::Respond(200, "bypass body"));
		let client = dispatcher(true, plain, bypass.clone());

		for _ in 0..3 {
			client.get("https://example.com", RequestOptions::new()).await.unwrap();
		}
		assert_eq!(bypass.calls(), 3);
	}

	#[tokio::test]
	async fn close_is_idempotent() {
		let mut server = mockito::Server::new_async().await;
		let mock = server
			.mock("GET", "/")
			.with_status(200)
			.with_body("ok")
			.expect(2)
			.create_async()
			.await;

		let client = FallbackClient::new(FetchConfig::with_bypass(true)).unwrap();
		client.get(&server.url(), RequestOptions::new()).await.unwrap();

		client.close().await;
		client.close().await;
		assert!(client.is_closed().await);
		assert!(!client.has_bypass_client().await);

		let response = client.get(&server.url(), RequestOptions::new()).await.unwrap();
		assert_eq!(response.status(), 200);
		assert!(!client.is_closed().await);
		assert!(client.has_bypass_client().await);
		mock.assert_async().await;
	}

	#[tokio::test]
	async fn injected_transports_stay_closed() {
		let plain = StubFetcher::new(Scripted::Respond(200, "plain body"));
		let bypass = StubFetcher::new(Scripted::Respond(200, "bypass body"));
		let client = dispatcher(true, plain.clone(), bypass);

		client.close().await;
		client.close().await;

		let err = client.get("https://example.com", RequestOptions::new()).await.unwrap_err();
		assert!(matches!(err, FetchError::Closed));
		assert_eq!(plain.calls(), 0);
	}

	#[tokio::test]
	async fn rebuilt_plain_only_client_never_creates_bypass() {
		let mut server = mockito::Server::new_async().await;
		let mock = server
			.mock("GET", "/")
			.with_status(200)
			.expect(1)
			.create_async()
			.await;

		let client = FallbackClient::new(FetchConfig::with_bypass(false)).unwrap();
		client.close().await;

		let response = client.get(&server.url(), RequestOptions::new()).await.unwrap();
		assert_eq!(response.status(), 200);
		assert!(!client.has_bypass_client().await);
		mock.assert_async().await;
	}

	#[tokio::test]
	async fn invalid_url_is_rejected_before_any_request() {
		let plain = StubFetcher::new(Scripted::Respond(200, "plain body"));
		let bypass = StubFetcher::new(Scripted::Respond(200, "bypass body"));
		let client = dispatcher(true, plain.clone(), bypass.clone());

		let err = client.get("not a url", RequestOptions::new()).await.unwrap_err();

		assert!(matches!(err, FetchError::Url(_)));
		assert_eq!(plain.calls() + bypass.calls(), 0);
	}

	#[test]
	fn shared_client_honours_first_flag_only() {
		let first = shared_client(true).unwrap();
		let second = shared_client(false).unwrap();
		assert!(std::ptr::eq(first, second));
		assert!(second.bypass_enabled());
	}
}
