//! Crate-level error types shared across auth, transport, and pagination.

// self
use crate::{
	_prelude::*,
	classify::{ApiError, HttpError},
};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Only the final, already-classified failure of a call crosses the public boundary; retries are
/// exhausted internally by the transport.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Assertion signing or token exchange failed.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// No HTTP response was received.
	#[error(transparent)]
	Network(#[from] TransportError),
	/// Non-success response carrying the structured error envelope.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// Non-success response without a structured error envelope.
	#[error(transparent)]
	Http(#[from] HttpError),
	/// Caller-supplied input was rejected before any network access.
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// A pagination walk could not continue safely.
	#[error(transparent)]
	Pagination(#[from] PaginationError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// A successful response body did not match the requested type.
	#[error("Response body could not be decoded.")]
	Decode {
		/// Structured decoding failure with the offending JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The request's cancellation token fired before the call completed.
	#[error("Request was cancelled.")]
	Cancelled,
}
impl Error {
	/// Returns the HTTP status attached to the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Api(e) => Some(e.http_status),
			Self::Http(e) => Some(e.status),
			Self::Auth(e) => e.status(),
			_ => None,
		}
	}

	/// Returns the server's `Retry-After` hint carried by a classified response.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Api(e) => e.retry_after,
			Self::Http(e) => e.retry_after,
			_ => None,
		}
	}

	/// Returns `true` when the transport's retry policy treats the failure as transient.
	///
	/// Useful for callers that wrap whole operations in their own retry loop.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Network(_) => true,
			Self::Api(_) | Self::Http(_) => self
				.status()
				.map(|status| status == 401 || status == 429 || (status >= 500 && status != 501))
				.unwrap_or(false),
			_ => false,
		}
	}
}

/// Failures raised while signing assertions or exchanging them for bearer tokens.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// The client assertion could not be signed.
	#[error("Client assertion could not be signed.")]
	Signing {
		/// Underlying signing failure.
		#[source]
		source: jsonwebtoken::errors::Error,
	},
	/// Token endpoint answered with an OAuth error response.
	#[error("Token endpoint rejected the assertion: {reason}.")]
	Rejected {
		/// OAuth `error` code plus the description, when supplied.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint responded with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint response was well-formed but unusable.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	UnexpectedResponse {
		/// Summary of the problem.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint could not be reached.
	#[error("Token endpoint could not be reached.")]
	Unreachable(#[source] TransportError),
}
impl AuthError {
	/// Returns the token endpoint's HTTP status, if one was observed.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. }
			| Self::MalformedResponse { status, .. }
			| Self::UnexpectedResponse { status, .. } => *status,
			Self::Signing { .. } | Self::Unreachable(_) => None,
		}
	}
}

/// Transport-level failures where no HTTP response was produced.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure (DNS, TCP, TLS).
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying HTTP client gave up waiting for the response.
	#[error("Request timed out before a response was received.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::timeout(e) } else { Self::network(e) }
	}
}

/// Caller input rejected before any request is sent.
#[derive(Debug, ThisError)]
pub enum ValidationError {
	/// A required identifier was empty, padded, or oversized.
	#[error(transparent)]
	Identifier(#[from] crate::auth::IdentifierError),
	/// The signing key material could not be loaded.
	#[error("Signing key could not be loaded.")]
	SigningKey {
		/// Underlying key parsing failure.
		#[source]
		source: jsonwebtoken::errors::Error,
	},
	/// A required string field was empty.
	#[error("The {field} must not be empty.")]
	Empty {
		/// Name of the offending field.
		field: &'static str,
	},
	/// The request path cannot be joined onto the API base URL.
	#[error("Request path `{path}` is invalid.")]
	InvalidPath {
		/// Offending path.
		path: String,
	},
	/// A header name or value was rejected.
	#[error("Header `{name}` is invalid.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// A request body could not be serialized.
	#[error("Request body could not be serialized.")]
	Body(#[source] serde_json::Error),
}

/// Failures that stop a pagination walk.
#[derive(Debug, ThisError)]
pub enum PaginationError {
	/// The server handed back a cursor already visited in this walk.
	#[error("Cursor `{cursor}` was already visited on page {page}.")]
	CursorCycle {
		/// Repeated cursor value.
		cursor: String,
		/// Page number (1-based) that returned the repeated cursor.
		page: usize,
	},
	/// The `next` link could not be parsed.
	#[error("Next link `{link}` could not be parsed.")]
	InvalidNextLink {
		/// Raw link value.
		link: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The `next` link did not carry a cursor parameter.
	#[error("Next link `{link}` does not carry a cursor.")]
	MissingCursor {
		/// Raw link value.
		link: String,
	},
	/// The walk exceeded the configured page cap.
	#[error("Pagination exceeded the limit of {max_pages} pages.")]
	PageLimitExceeded {
		/// Configured cap.
		max_pages: usize,
	},
	/// A page body was not a JSON envelope.
	#[error("Page {page} is not a valid JSON envelope.")]
	Envelope {
		/// Page number (1-based).
		page: usize,
		/// Underlying parsing failure.
		#[source]
		source: serde_json::Error,
	},
}

/// Configuration and construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// No HTTP client was supplied and the `reqwest` feature is disabled.
	#[error("An HTTP client must be supplied when the `reqwest` feature is disabled.")]
	MissingHttpClient,
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A configured endpoint is not a valid URL.
	#[error("The {endpoint} URL is invalid.")]
	InvalidUrl {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A base URL cannot have paths joined onto it.
	#[error("The {endpoint} URL `{url}` cannot be used as a base.")]
	CannotBeABase {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Offending URL.
		url: String,
	},
	/// Retry policy bounds are inconsistent.
	#[error("Retry policy is invalid: {reason}.")]
	InvalidRetryPolicy {
		/// Explanation of the violated bound.
		reason: &'static str,
	},
	/// Token refresh margin exceeds the accepted ceiling.
	#[error("Token skew must not exceed {max_secs} seconds.")]
	InvalidSkew {
		/// Largest accepted skew in seconds.
		max_secs: i64,
	},
	/// Assertion lifetime is outside the accepted range.
	#[error("Assertion lifetime must be between 1 second and {max_days} days.")]
	AssertionLifetime {
		/// Maximum number of days accepted.
		max_days: i64,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}
