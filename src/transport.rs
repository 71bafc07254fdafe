//! Executes one logical API call with bearer injection and the auth-aware retry policy.
//!
//! Every attempt asks the [`TokenProvider`] for a token, so a refresh performed by a concurrent
//! caller is picked up automatically. After a non-success response the transport either retries
//! or hands the response to [`classify`](crate::classify::classify):
//!
//! - `401` force-refreshes the token and retries immediately, once per call.
//! - `429` waits for `Retry-After` (capped at [`RetryPolicy::max_retry_after`]) when the server
//!   sent one, otherwise the backoff schedule.
//! - `5xx` except `501` waits for the backoff schedule.
//! - Failures without a response retry when the policy allows it.
//!
//! Every trigger draws from the same budget of [`RetryPolicy::max_attempts`] attempts.

pub mod policy;

pub use policy::*;

// self
use crate::{
	_prelude::*,
	auth::TokenProvider,
	classify,
	error::ConfigError,
	http::{self, HttpClient},
	obs::{self, OpKind, OpOutcome, OpSpan},
	request::{ApiRequest, ApiResponse},
};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api-business.apple.com/v1/";

/// Retrying transport bound to one API base URL.
#[derive(Clone)]
pub struct RetryableTransport {
	tokens: Arc<TokenProvider>,
	http: Arc<dyn HttpClient>,
	base_url: Url,
	policy: RetryPolicy,
}
impl RetryableTransport {
	/// Creates a transport that sends requests through the provider's HTTP client.
	pub fn new(
		tokens: Arc<TokenProvider>,
		base_url: Url,
		policy: RetryPolicy,
	) -> Result<Self, ConfigError> {
		let http = tokens.http_client().clone();

		Ok(Self { tokens, http, base_url: normalize_base(base_url)?, policy })
	}

	/// Base URL every request path is joined onto.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Active retry policy.
	pub fn policy(&self) -> &RetryPolicy {
		&self.policy
	}

	/// Token provider used for bearer injection.
	pub fn tokens(&self) -> &Arc<TokenProvider> {
		&self.tokens
	}

	/// Executes `request`, retrying transient failures.
	///
	/// Returns the first 2xx response, or the classified error of the last attempt. When the
	/// request carries a cancellation token that fires first, the call stops at its current await
	/// point and returns [`Error::Cancelled`].
	pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
		let span = OpSpan::new(OpKind::Request, "execute");

		obs::record_op_outcome(OpKind::Request, OpOutcome::Attempt);

		let result = match request.cancellation() {
			Some(cancellation) =>
				span.instrument(async {
					tokio::select! {
						biased;
						_ = cancellation.cancelled() => Err(Error::Cancelled),
						result = self.run(request) => result,
					}
				})
				.await,
			None => span.instrument(self.run(request)).await,
		};

		obs::record_op_outcome(OpKind::Request, OpOutcome::of(&result));

		result
	}

	async fn run(&self, request: &ApiRequest) -> Result<ApiResponse> {
		let max_attempts = self.policy.max_attempts();
		let mut refreshed = false;
		let mut attempt = 0;

		loop {
			attempt += 1;

			let retries_left = attempt < max_attempts;
			let token = self.tokens.token().await?;
			let wire = request.to_http(&self.base_url, &token.secret)?;
			let response = match self.http.execute(wire).await {
				Ok(response) => response,
				Err(_) if retries_left && self.policy.retry_network_errors() => {
					self.pause(RetryReason::Network, attempt, self.policy.backoff(attempt)).await;

					continue;
				},
				Err(e) => return Err(e.into()),
			};

			if response.status().is_success() {
				return Ok(response.into());
			}

			let status = response.status().as_u16();

			match RetryReason::for_status(status) {
				Some(RetryReason::Unauthorized) if retries_left && !refreshed => {
					refreshed = true;

					retry_observed(RetryReason::Unauthorized, attempt, StdDuration::ZERO);
					self.tokens.force_refresh().await?;

					continue;
				},
				Some(RetryReason::RateLimited) if retries_left => {
					let hint = http::parse_retry_after(response.headers())
						.and_then(|hint| StdDuration::try_from(hint).ok());
					let wait = self.policy.rate_limit_wait(hint, attempt);

					self.pause(RetryReason::RateLimited, attempt, wait).await;

					continue;
				},
				Some(reason @ RetryReason::ServerError(_)) if retries_left => {
					self.pause(reason, attempt, self.policy.backoff(attempt)).await;

					continue;
				},
				_ => {},
			}

			let response = ApiResponse::from(response);

			return Err(classify::classify(status, &response.headers, &response.body));
		}
	}

	async fn pause(&self, reason: RetryReason, attempt: u32, wait: StdDuration) {
		retry_observed(reason, attempt, wait);

		if !wait.is_zero() {
			tokio::time::sleep(wait).await;
		}
	}
}
impl Debug for RetryableTransport {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryableTransport")
			.field("tokens", &self.tokens)
			.field("base_url", &self.base_url.as_str())
			.field("policy", &self.policy)
			.finish_non_exhaustive()
	}
}

/// Ensures `url` can have relative paths joined onto it without losing its last segment.
pub(crate) fn normalize_base(mut url: Url) -> Result<Url, ConfigError> {
	if url.cannot_be_a_base() {
		return Err(ConfigError::CannotBeABase { endpoint: "API base", url: url.to_string() });
	}
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	url.set_query(None);
	url.set_fragment(None);

	Ok(url)
}

fn retry_observed(reason: RetryReason, attempt: u32, wait: StdDuration) {
	obs::log_retry(reason.as_str(), attempt, wait);
	obs::record_retry(reason.as_str());
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn base_urls_gain_a_trailing_slash() {
		let url = normalize_base(Url::parse("https://api.example.com/v1?x=1").expect("URL fixture."))
			.expect("Base should normalize.");

		assert_eq!(url.as_str(), "https://api.example.com/v1/");
		assert_eq!(
			url.join("orgDevices").expect("Join should succeed.").as_str(),
			"https://api.example.com/v1/orgDevices"
		);
		assert!(matches!(
			normalize_base(Url::parse("mailto:ops@example.com").expect("URL fixture.")),
			Err(ConfigError::CannotBeABase { .. })
		));
	}
}
