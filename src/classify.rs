//! Turns non-success API responses into typed errors.
//!
//! Bodies carrying the JSON:API style `{"errors": [...]}` envelope become [`ApiError`]; anything
//! else becomes [`HttpError`] with a bounded body snippet.

// crates.io
use oauth2::http::HeaderMap;
// self
use crate::{_prelude::*, http};

const SNIPPET_LIMIT: usize = 256;

/// Location of the request element an error refers to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSource {
	/// JSON pointer into the request document.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pointer: Option<String>,
	/// Query parameter that caused the error.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parameter: Option<String>,
}

/// One entry of the error envelope.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorEntry {
	/// Unique identifier of this occurrence.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	/// HTTP status rendered as a string.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
	/// Machine-readable error code.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<String>,
	/// Short summary.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	/// Occurrence-specific explanation.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub detail: Option<String>,
	/// Offending request element.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<ErrorSource>,
	/// Related links.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub links: Option<serde_json::Value>,
	/// Non-standard metadata.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub meta: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
	#[serde(default)]
	errors: Vec<ApiErrorEntry>,
}

/// Structured API failure built from the first envelope entry; all entries are retained.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiError {
	/// HTTP status of the response.
	pub http_status: u16,
	/// First entry's status, falling back to the HTTP status.
	pub status: String,
	/// First entry's code.
	pub code: Option<String>,
	/// First entry's title.
	pub title: Option<String>,
	/// First entry's detail.
	pub detail: Option<String>,
	/// First entry's source.
	pub source: Option<ErrorSource>,
	/// First entry's links.
	pub links: Option<serde_json::Value>,
	/// First entry's metadata.
	pub meta: Option<serde_json::Value>,
	/// Every entry of the envelope, in response order.
	pub errors: Vec<ApiErrorEntry>,
	/// Server's `Retry-After` hint, when the response carried one.
	pub retry_after: Option<Duration>,
}
impl ApiError {
	fn from_entries(http_status: u16, errors: Vec<ApiErrorEntry>) -> Option<Self> {
		let first = errors.first()?.clone();

		Some(Self {
			http_status,
			status: first.status.unwrap_or_else(|| http_status.to_string()),
			code: first.code,
			title: first.title,
			detail: first.detail,
			source: first.source,
			links: first.links,
			meta: first.meta,
			errors,
			retry_after: None,
		})
	}
}
impl Display for ApiError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let detail = self.detail.as_deref().or(self.title.as_deref()).unwrap_or_default();

		match &self.code {
			Some(code) => write!(f, "{}: {code} - {detail}", self.status),
			None => write!(f, "{}: {detail}", self.status),
		}
	}
}
impl StdError for ApiError {}

/// Non-success response without a usable error envelope.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("HTTP {status}: {body_snippet}")]
pub struct HttpError {
	/// HTTP status of the response.
	pub status: u16,
	/// Leading bytes of the body, cut on a character boundary.
	pub body_snippet: String,
	/// Server's `Retry-After` hint, when the response carried one.
	pub retry_after: Option<Duration>,
}
impl HttpError {
	/// Builds an error from a status and the raw body.
	pub fn new(status: u16, body: &[u8]) -> Self {
		Self { status, body_snippet: snippet(body), retry_after: None }
	}
}

/// Classifies a non-success response.
///
/// A `Retry-After` header is kept on the error so callers can pace their own retries once the
/// transport's budget is spent.
pub fn classify(status: u16, headers: &HeaderMap, body: &[u8]) -> Error {
	let retry_after = http::parse_retry_after(headers);

	match serde_json::from_slice::<ErrorEnvelope>(body)
		.ok()
		.and_then(|envelope| ApiError::from_entries(status, envelope.errors))
	{
		Some(api) => Error::Api(ApiError { retry_after, ..api }),
		None => Error::Http(HttpError { retry_after, ..HttpError::new(status, body) }),
	}
}

fn snippet(body: &[u8]) -> String {
	let text = String::from_utf8_lossy(body);
	let text = text.trim();

	if text.len() <= SNIPPET_LIMIT {
		return text.to_owned();
	}

	let mut end = SNIPPET_LIMIT;

	while !text.is_char_boundary(end) {
		end -= 1;
	}

	format!("{}…", &text[..end])
}
