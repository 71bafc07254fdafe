//! Application-facing facade wiring the token provider, transport, and walker together.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{AssertionPolicy, Credential, DEFAULT_SKEW, DEFAULT_TOKEN_ENDPOINT, TokenProvider},
	error::ConfigError,
	http::HttpClient,
	pagination::{DEFAULT_MAX_PAGES, PaginationWalker, WalkSummary},
	request::{ApiRequest, ApiResponse},
	transport::{DEFAULT_BASE_URL, RetryPolicy, RetryableTransport},
};

/// Serializable client settings, suitable for embedding in an application's own configuration.
///
/// Every field is optional when deserializing; omitted values fall back to the defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
	/// API base URL; defaults to the Business Manager endpoint.
	pub base_url: Option<Url>,
	/// Token endpoint; defaults to the vendor's OAuth2 endpoint.
	pub token_endpoint: Option<Url>,
	/// Seconds before expiry at which cached tokens are refreshed.
	pub token_skew_secs: u64,
	/// Per-request timeout applied by the default HTTP client.
	pub request_timeout_secs: u64,
	/// Connect timeout applied by the default HTTP client.
	pub connect_timeout_secs: u64,
	/// Retry settings.
	pub retry: RetryConfig,
	/// Cap on pages fetched by one walk.
	pub max_pages: usize,
}
impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			base_url: None,
			token_endpoint: None,
			token_skew_secs: DEFAULT_SKEW.whole_seconds().unsigned_abs(),
			request_timeout_secs: 60,
			connect_timeout_secs: 10,
			retry: RetryConfig::default(),
			max_pages: DEFAULT_MAX_PAGES,
		}
	}
}

/// Serializable form of [`RetryPolicy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
	/// Retries after the first attempt.
	pub retry_count: u32,
	/// First backoff delay in milliseconds.
	pub min_wait_ms: u64,
	/// Backoff ceiling in milliseconds.
	pub max_wait_ms: u64,
	/// Ceiling for server `Retry-After` hints in milliseconds.
	pub max_retry_after_ms: u64,
	/// Whether failures without a response are retried.
	pub retry_network_errors: bool,
}
impl RetryConfig {
	/// Validates the settings and converts them into a [`RetryPolicy`].
	pub fn to_policy(&self) -> Result<RetryPolicy, ConfigError> {
		RetryPolicy::builder()
			.retry_count(self.retry_count)
			.min_wait(StdDuration::from_millis(self.min_wait_ms))
			.max_wait(StdDuration::from_millis(self.max_wait_ms))
			.max_retry_after(StdDuration::from_millis(self.max_retry_after_ms))
			.retry_network_errors(self.retry_network_errors)
			.build()
	}
}
impl Default for RetryConfig {
	fn default() -> Self {
		let policy = RetryPolicy::default();

		Self {
			retry_count: policy.retry_count(),
			min_wait_ms: duration_ms(policy.min_wait()),
			max_wait_ms: duration_ms(policy.max_wait()),
			max_retry_after_ms: duration_ms(policy.max_retry_after()),
			retry_network_errors: policy.retry_network_errors(),
		}
	}
}

/// Authenticated API client.
///
/// Cheap to clone; clones share the token cache and HTTP connection pool.
#[derive(Clone, Debug)]
pub struct Client {
	transport: Arc<RetryableTransport>,
	walker: PaginationWalker,
}
impl Client {
	/// Returns a builder for `credential`.
	pub fn builder(credential: Credential) -> ClientBuilder {
		ClientBuilder::new(credential)
	}

	/// Builds a client from `config` with the default HTTP transport.
	pub fn from_config(credential: Credential, config: ClientConfig) -> Result<Self> {
		Self::builder(credential).config(config).build()
	}

	/// Executes one request with retries.
	pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
		self.transport.execute(request).await
	}

	/// Executes one request and decodes the JSON body as `T`.
	pub async fn get_json<T>(&self, request: &ApiRequest) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.execute(request).await?.json()
	}

	/// Walks every page reachable from `request`; see [`PaginationWalker::walk`].
	pub async fn walk<F, E>(&self, request: &ApiRequest, consume: F) -> Result<WalkSummary, E>
	where
		F: FnMut(&[u8]) -> Result<(), E>,
		E: From<Error>,
	{
		self.walker.walk(request, consume).await
	}

	/// Collects the `data` arrays of every page; see [`PaginationWalker::collect`].
	pub async fn collect<T>(&self, request: &ApiRequest) -> Result<Vec<T>>
	where
		T: DeserializeOwned,
	{
		self.walker.collect(request).await
	}

	/// Token provider shared by every request.
	pub fn tokens(&self) -> &Arc<TokenProvider> {
		self.transport.tokens()
	}

	/// Underlying retrying transport.
	pub fn transport(&self) -> &Arc<RetryableTransport> {
		&self.transport
	}

	/// Underlying pagination walker.
	pub fn walker(&self) -> &PaginationWalker {
		&self.walker
	}
}

/// Builder for [`Client`].
pub struct ClientBuilder {
	credential: Credential,
	config: ClientConfig,
	retry_policy: Option<RetryPolicy>,
	assertion_policy: AssertionPolicy,
	http: Option<Arc<dyn HttpClient>>,
}
impl ClientBuilder {
	fn new(credential: Credential) -> Self {
		Self {
			credential,
			config: ClientConfig::default(),
			retry_policy: None,
			assertion_policy: AssertionPolicy::default(),
			http: None,
		}
	}

	/// Replaces every serializable setting with `config`.
	pub fn config(mut self, config: ClientConfig) -> Self {
		self.config = config;

		self
	}

	/// Overrides the API base URL.
	pub fn base_url(mut self, url: Url) -> Self {
		self.config.base_url = Some(url);

		self
	}

	/// Overrides the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.config.token_endpoint = Some(url);

		self
	}

	/// Overrides the token refresh margin. Negative values clamp to zero.
	pub fn skew(mut self, skew: Duration) -> Self {
		self.config.token_skew_secs = u64::try_from(skew.whole_seconds()).unwrap_or(0);

		self
	}

	/// Overrides the retry policy, taking precedence over [`ClientConfig::retry`].
	pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.retry_policy = Some(policy);

		self
	}

	/// Overrides the page cap.
	pub fn max_pages(mut self, max_pages: usize) -> Self {
		self.config.max_pages = max_pages;

		self
	}

	/// Overrides the assertion lifetime policy.
	pub fn assertion_policy(mut self, policy: AssertionPolicy) -> Self {
		self.assertion_policy = policy;

		self
	}

	/// Supplies the HTTP transport; the timeout settings are then ignored.
	pub fn http_client(self, client: impl HttpClient) -> Self {
		self.shared_http_client(Arc::new(client))
	}

	/// Supplies an HTTP transport shared with other components.
	pub fn shared_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
		self.http = Some(client);

		self
	}

	/// Validates the settings and builds the client.
	pub fn build(self) -> Result<Client> {
		let config = self.config;
		let retry_policy = match self.retry_policy {
			Some(policy) => policy,
			None => config.retry.to_policy()?,
		};
		let base_url = match config.base_url.clone() {
			Some(url) => url,
			None => parse_default(DEFAULT_BASE_URL, "API base")?,
		};
		let token_endpoint = match config.token_endpoint.clone() {
			Some(url) => url,
			None => parse_default(DEFAULT_TOKEN_ENDPOINT, "token")?,
		};
		let http = match self.http {
			Some(http) => http,
			None => default_http_client(&config)?,
		};
		let skew = Duration::seconds(i64::try_from(config.token_skew_secs).unwrap_or(i64::MAX));
		let tokens = TokenProvider::builder(self.credential)
			.token_endpoint(token_endpoint)
			.skew(skew)
			.assertion_policy(self.assertion_policy)
			.shared_http_client(http)
			.build()?;
		let transport = Arc::new(RetryableTransport::new(Arc::new(tokens), base_url, retry_policy)?);
		let walker = PaginationWalker::new(transport.clone()).with_max_pages(config.max_pages);

		Ok(Client { transport, walker })
	}
}
impl Debug for ClientBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientBuilder")
			.field("credential", &self.credential)
			.field("config", &self.config)
			.field("retry_policy", &self.retry_policy)
			.field("assertion_policy", &self.assertion_policy)
			.field("http", &self.http.is_some())
			.finish()
	}
}

fn parse_default(raw: &str, endpoint: &'static str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { endpoint, source })
}

fn duration_ms(duration: StdDuration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(feature = "reqwest")]
fn default_http_client(config: &ClientConfig) -> Result<Arc<dyn HttpClient>, ConfigError> {
	let client = crate::http::ReqwestHttpClient::builder()
		.timeout(StdDuration::from_secs(config.request_timeout_secs))
		.connect_timeout(StdDuration::from_secs(config.connect_timeout_secs))
		.build()?;

	Ok(Arc::new(client))
}

#[cfg(not(feature = "reqwest"))]
fn default_http_client(_: &ClientConfig) -> Result<Arc<dyn HttpClient>, ConfigError> {
	Err(ConfigError::MissingHttpClient)
}
