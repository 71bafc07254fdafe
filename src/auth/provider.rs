//! Bearer-token cache shared by every request issued through one client.
//!
//! [`TokenProvider`] is the only component with shared mutable state. The cached
//! [`AccessToken`] sits behind a `parking_lot` read/write lock that is never held across I/O,
//! while an async mutex serializes exchanges so at most one is in flight per provider. Callers that
//! lose the race re-check the cache after acquiring the guard and reuse the winner's token.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, AssertionPolicy, Credential, assertion},
	error::ConfigError,
	http::HttpClient,
	oauth::TokenExchange,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Default token endpoint.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://account.apple.com/auth/oauth2/token";
/// Default refresh margin before `expires_at`.
pub const DEFAULT_SKEW: Duration = Duration::minutes(5);
/// Largest accepted refresh margin.
pub const MAX_SKEW: Duration = Duration::days(1);

/// Exchanges client assertions for bearer tokens and caches the result.
pub struct TokenProvider {
	credential: Arc<Credential>,
	http: Arc<dyn HttpClient>,
	exchange: TokenExchange,
	assertion_policy: AssertionPolicy,
	skew: Duration,
	cache: RwLock<Option<AccessToken>>,
	exchange_guard: AsyncMutex<()>,
}
impl TokenProvider {
	/// Returns a builder for `credential`.
	pub fn builder(credential: Credential) -> TokenProviderBuilder {
		TokenProviderBuilder::new(credential)
	}

	/// Returns a token that stays valid for at least the configured skew.
	///
	/// A fresh cached token is returned without network access. Otherwise exactly one caller
	/// performs the exchange while concurrent callers wait and reuse its result. A failed exchange
	/// leaves the cache as it was.
	pub async fn token(&self) -> Result<AccessToken> {
		if let Some(token) = self.fresh_cached() {
			return Ok(token);
		}

		let _guard = self.exchange_guard.lock().await;

		if let Some(token) = self.fresh_cached() {
			return Ok(token);
		}

		self.exchange_and_store().await
	}

	/// Discards the cached token and performs a fresh exchange unconditionally.
	///
	/// On failure the cache stays empty, so the next [`token`](Self::token) call exchanges again.
	pub async fn force_refresh(&self) -> Result<AccessToken> {
		let _guard = self.exchange_guard.lock().await;

		self.cache.write().take();
		self.exchange_and_store().await
	}

	/// Snapshot of the cached token, fresh or not.
	pub fn cached(&self) -> Option<AccessToken> {
		self.cache.read().clone()
	}

	/// Drops the cached token without contacting the token endpoint.
	pub fn invalidate(&self) {
		self.cache.write().take();
	}

	/// Identity used to sign assertions.
	pub fn credential(&self) -> &Credential {
		&self.credential
	}

	/// Refresh margin applied before `expires_at`.
	pub fn skew(&self) -> Duration {
		self.skew
	}

	/// HTTP transport shared with the rest of the client.
	pub fn http_client(&self) -> &Arc<dyn HttpClient> {
		&self.http
	}

	fn fresh_cached(&self) -> Option<AccessToken> {
		let now = OffsetDateTime::now_utc();

		self.cache.read().as_ref().filter(|token| token.is_fresh_at(now, self.skew)).cloned()
	}

	async fn exchange_and_store(&self) -> Result<AccessToken> {
		let span = OpSpan::new(OpKind::TokenExchange, "exchange");

		obs::record_op_outcome(OpKind::TokenExchange, OpOutcome::Attempt);

		let result = span
			.instrument(async {
				let now = OffsetDateTime::now_utc();
				let signed = assertion::sign(&self.credential, self.assertion_policy, now)?;
				let token = self
					.exchange
					.exchange(self.http.as_ref(), self.credential.scope(), &signed, now)
					.await?;

				*self.cache.write() = Some(token.clone());

				Ok::<_, Error>(token)
			})
			.await;

		obs::record_op_outcome(OpKind::TokenExchange, OpOutcome::of(&result));

		result
	}
}
impl Debug for TokenProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenProvider")
			.field("credential", &self.credential)
			.field("exchange", &self.exchange)
			.field("assertion_policy", &self.assertion_policy)
			.field("skew", &self.skew)
			.field("cached", &self.cache.read().is_some())
			.finish_non_exhaustive()
	}
}

/// Builder for [`TokenProvider`].
pub struct TokenProviderBuilder {
	credential: Credential,
	token_endpoint: Option<Url>,
	skew: Duration,
	assertion_policy: AssertionPolicy,
	http: Option<Arc<dyn HttpClient>>,
}
impl TokenProviderBuilder {
	fn new(credential: Credential) -> Self {
		Self {
			credential,
			token_endpoint: None,
			skew: DEFAULT_SKEW,
			assertion_policy: AssertionPolicy::default(),
			http: None,
		}
	}

	/// Overrides the token endpoint (defaults to [`DEFAULT_TOKEN_ENDPOINT`]).
	pub fn token_endpoint(mut self, endpoint: Url) -> Self {
		self.token_endpoint = Some(endpoint);

		self
	}

	/// Overrides the refresh margin (defaults to five minutes). Negative values clamp to zero;
	/// values above [`MAX_SKEW`] fail in [`build`](Self::build).
	pub fn skew(mut self, skew: Duration) -> Self {
		self.skew = if skew.is_negative() { Duration::ZERO } else { skew };

		self
	}

	/// Overrides the assertion lifetime policy.
	pub fn assertion_policy(mut self, policy: AssertionPolicy) -> Self {
		self.assertion_policy = policy;

		self
	}

	/// Supplies the HTTP transport.
	pub fn http_client(self, client: impl HttpClient) -> Self {
		self.shared_http_client(Arc::new(client))
	}

	/// Supplies an HTTP transport shared with other components.
	pub fn shared_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
		self.http = Some(client);

		self
	}

	/// Validates the configuration and builds the provider.
	///
	/// Without an explicit transport a default [`ReqwestHttpClient`](crate::http::ReqwestHttpClient)
	/// is constructed when the `reqwest` feature is enabled.
	pub fn build(self) -> Result<TokenProvider> {
		if self.skew > MAX_SKEW {
			return Err(ConfigError::InvalidSkew { max_secs: MAX_SKEW.whole_seconds() }.into());
		}

		let token_endpoint = match self.token_endpoint {
			Some(endpoint) => endpoint,
			None => Url::parse(DEFAULT_TOKEN_ENDPOINT)
				.map_err(|source| ConfigError::InvalidUrl { endpoint: "token", source })?,
		};
		let exchange = TokenExchange::new(&token_endpoint, self.credential.client_id())?;
		let http = match self.http {
			Some(http) => http,
			None => default_http_client()?,
		};

		Ok(TokenProvider {
			credential: Arc::new(self.credential),
			http,
			exchange,
			assertion_policy: self.assertion_policy,
			skew: self.skew,
			cache: RwLock::new(None),
			exchange_guard: AsyncMutex::new(()),
		})
	}
}
impl Debug for TokenProviderBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenProviderBuilder")
			.field("credential", &self.credential)
			.field("token_endpoint", &self.token_endpoint)
			.field("skew", &self.skew)
			.field("assertion_policy", &self.assertion_policy)
			.field("http", &self.http.is_some())
			.finish()
	}
}

#[cfg(feature = "reqwest")]
pub(crate) fn default_http_client() -> Result<Arc<dyn HttpClient>, ConfigError> {
	Ok(Arc::new(crate::http::ReqwestHttpClient::builder().build()?))
}

#[cfg(not(feature = "reqwest"))]
pub(crate) fn default_http_client() -> Result<Arc<dyn HttpClient>, ConfigError> {
	Err(ConfigError::MissingHttpClient)
}
