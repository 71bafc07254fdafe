//! Retry budget, backoff schedule, and the statuses that trigger a retry.

// self
use crate::{_prelude::*, error::ConfigError};

/// Why the transport scheduled another attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RetryReason {
	/// `401`; the token is force-refreshed before the retry.
	Unauthorized,
	/// `429`; the server's `Retry-After` hint wins over the backoff schedule.
	RateLimited,
	/// `5xx` other than `501`.
	ServerError(u16),
	/// No response was received.
	Network,
}
impl RetryReason {
	/// Maps a response status to a retry trigger, or `None` when the status is terminal.
	pub fn for_status(status: u16) -> Option<Self> {
		match status {
			401 => Some(Self::Unauthorized),
			429 => Some(Self::RateLimited),
			501 => None,
			500..=599 => Some(Self::ServerError(status)),
			_ => None,
		}
	}

	/// Returns a stable label suitable for log or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Unauthorized => "unauthorized",
			Self::RateLimited => "rate_limited",
			Self::ServerError(_) => "server_error",
			Self::Network => "network",
		}
	}
}
impl Display for RetryReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Bounded retry policy shared by every request of a client.
///
/// `retry_count` bounds the retries, so a single logical call makes at most `retry_count + 1`
/// attempts whatever mix of triggers it hits. Server `Retry-After` hints are honored up to
/// `max_retry_after`; longer hints are shortened to that ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	retry_count: u32,
	min_wait: StdDuration,
	max_wait: StdDuration,
	max_retry_after: StdDuration,
	retry_network_errors: bool,
}
impl RetryPolicy {
	/// Default number of retries.
	pub const DEFAULT_RETRY_COUNT: u32 = 3;
	/// Default first backoff delay.
	pub const DEFAULT_MIN_WAIT: StdDuration = StdDuration::from_secs(1);
	/// Default backoff ceiling.
	pub const DEFAULT_MAX_WAIT: StdDuration = StdDuration::from_secs(30);
	/// Default ceiling for server `Retry-After` hints.
	pub const DEFAULT_MAX_RETRY_AFTER: StdDuration = StdDuration::from_secs(300);

	/// Returns a builder seeded with the defaults.
	pub fn builder() -> RetryPolicyBuilder {
		RetryPolicyBuilder { policy: Self::default() }
	}

	/// Policy that never retries.
	pub fn disabled() -> Self {
		Self { retry_count: 0, ..Self::default() }
	}

	/// Number of retries after the first attempt.
	pub const fn retry_count(&self) -> u32 {
		self.retry_count
	}

	/// Total attempts allowed per logical call.
	pub const fn max_attempts(&self) -> u32 {
		self.retry_count.saturating_add(1)
	}

	/// First backoff delay.
	pub const fn min_wait(&self) -> StdDuration {
		self.min_wait
	}

	/// Backoff ceiling.
	pub const fn max_wait(&self) -> StdDuration {
		self.max_wait
	}

	/// Ceiling for server `Retry-After` hints.
	pub const fn max_retry_after(&self) -> StdDuration {
		self.max_retry_after
	}

	/// Whether failures without a response are retried.
	pub const fn retry_network_errors(&self) -> bool {
		self.retry_network_errors
	}

	/// Delay before retry number `retry` (1-based): `min_wait` doubled per retry, capped at
	/// `max_wait`.
	pub fn backoff(&self, retry: u32) -> StdDuration {
		let shift = retry.saturating_sub(1).min(31);

		self.min_wait.saturating_mul(1_u32 << shift).min(self.max_wait)
	}

	/// Delay before retry number `retry` after a `429`: the server's hint capped at
	/// `max_retry_after`, or the backoff schedule without one.
	pub fn rate_limit_wait(&self, hint: Option<StdDuration>, retry: u32) -> StdDuration {
		match hint {
			Some(hint) => hint.min(self.max_retry_after),
			None => self.backoff(retry),
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			retry_count: Self::DEFAULT_RETRY_COUNT,
			min_wait: Self::DEFAULT_MIN_WAIT,
			max_wait: Self::DEFAULT_MAX_WAIT,
			max_retry_after: Self::DEFAULT_MAX_RETRY_AFTER,
			retry_network_errors: true,
		}
	}
}

/// Builder for [`RetryPolicy`].
#[derive(Clone, Debug)]
pub struct RetryPolicyBuilder {
	policy: RetryPolicy,
}
impl RetryPolicyBuilder {
	/// Overrides the number of retries.
	pub fn retry_count(mut self, count: u32) -> Self {
		self.policy.retry_count = count;

		self
	}

	/// Overrides the first backoff delay.
	pub fn min_wait(mut self, wait: StdDuration) -> Self {
		self.policy.min_wait = wait;

		self
	}

	/// Overrides the backoff ceiling.
	pub fn max_wait(mut self, wait: StdDuration) -> Self {
		self.policy.max_wait = wait;

		self
	}

	/// Overrides the ceiling for server `Retry-After` hints.
	pub fn max_retry_after(mut self, wait: StdDuration) -> Self {
		self.policy.max_retry_after = wait;

		self
	}

	/// Enables or disables retries for failures without a response.
	pub fn retry_network_errors(mut self, enabled: bool) -> Self {
		self.policy.retry_network_errors = enabled;

		self
	}

	/// Validates and returns the policy.
	pub fn build(self) -> Result<RetryPolicy, ConfigError> {
		if self.policy.min_wait > self.policy.max_wait {
			return Err(ConfigError::InvalidRetryPolicy {
				reason: "min_wait must not exceed max_wait",
			});
		}

		Ok(self.policy)
	}
}
