//! Request and response model shared by the transport and the pagination walker.

// std
use std::borrow::Cow;
// crates.io
use oauth2::http::{
	self, HeaderMap, HeaderName, HeaderValue, Method,
	header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, ValidationError},
	http::{HttpRequest, HttpResponse},
};

/// Largest `limit` the API accepts per page.
pub const MAX_PAGE_LIMIT: u32 = 1_000;
/// Query key carrying the opaque pagination cursor.
pub const CURSOR_PARAM: &str = "cursor";

const JSON: &str = "application/json";

/// Ordered query parameters with replace-on-set semantics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);
impl QueryParams {
	/// Creates an empty parameter list.
	pub fn new() -> Self {
		Self::default()
	}

	/// Parses an `application/x-www-form-urlencoded` query string.
	pub fn parse(query: &str) -> Self {
		let mut params = Self::new();

		for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
			params.set(key, value);
		}

		params
	}

	/// Sets `key` to `value`, replacing any existing entries for the key in place.
	pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
		let key = key.into();
		let value = value.into();

		match self.0.iter().position(|(k, _)| *k == key) {
			Some(idx) => {
				self.0[idx].1 = value;

				let mut seen = false;

				self.0.retain(|(k, _)| {
					if *k != key {
						return true;
					}

					let keep = !seen;

					seen = true;

					keep
				});
			},
			None => self.0.push((key, value)),
		}
	}

	/// Returns the value for `key`, if present.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
	}

	/// Removes and returns the value for `key`.
	pub fn remove(&mut self, key: &str) -> Option<String> {
		let idx = self.0.iter().position(|(k, _)| k == key)?;

		Some(self.0.remove(idx).1)
	}

	/// Overrides every key present in `other`, leaving the rest untouched.
	pub fn overlay(&mut self, other: &QueryParams) {
		for (key, value) in other.iter() {
			self.set(key, value);
		}
	}

	/// Iterates over the parameters in insertion order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	/// Number of parameters.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when no parameters are set.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// One logical API call.
///
/// The transport and the walker only ever read a request; pagination works on copies.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	method: Method,
	path: String,
	query: QueryParams,
	headers: HeaderMap,
	body: Option<Vec<u8>>,
	cancellation: Option<CancellationToken>,
}
impl ApiRequest {
	/// Creates a request for `path`, relative to the API base URL.
	///
	/// A leading `/` is ignored. Absolute URLs (including scheme-relative forms such as
	/// `http:host/x`), query strings, and fragments are rejected; use the builder methods for
	/// parameters.
	pub fn new(method: Method, path: impl AsRef<str>) -> Result<Self, ValidationError> {
		let raw = path.as_ref();
		let trimmed = raw.trim_start_matches('/');
		let first_segment = trimmed.split('/').next().unwrap_or_default();

		if trimmed.is_empty()
			|| first_segment.contains(':')
			|| trimmed.contains(['?', '#', '\\'])
			|| trimmed.chars().any(char::is_whitespace)
		{
			return Err(ValidationError::InvalidPath { path: raw.to_owned() });
		}

		Ok(Self {
			method,
			path: trimmed.to_owned(),
			query: QueryParams::new(),
			headers: HeaderMap::new(),
			body: None,
			cancellation: None,
		})
	}

	/// Shorthand for a `GET` request.
	pub fn get(path: impl AsRef<str>) -> Result<Self, ValidationError> {
		Self::new(Method::GET, path)
	}

	/// Sets a query parameter, replacing any previous value.
	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.set(key, value);

		self
	}

	/// Restricts the attributes returned for `resource` (`fields[<resource>]=a,b`).
	pub fn with_fields(mut self, resource: &str, fields: &[&str]) -> Self {
		self.query.set(format!("fields[{resource}]"), fields.join(","));

		self
	}

	/// Sets the page size, clamped to `1..=1000`.
	pub fn with_limit(mut self, limit: u32) -> Self {
		self.query.set("limit", limit.clamp(1, MAX_PAGE_LIMIT).to_string());

		self
	}

	/// Starts from an explicit cursor.
	pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
		self.query.set(CURSOR_PARAM, cursor);

		self
	}

	/// Adds a request header.
	pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ValidationError> {
		let invalid = || ValidationError::InvalidHeader { name: name.to_owned() };
		let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;

		if header == AUTHORIZATION {
			return Err(invalid());
		}

		let value = HeaderValue::from_str(value).map_err(|_| invalid())?;

		self.headers.insert(header, value);

		Ok(self)
	}

	/// Serializes `body` as the JSON request payload.
	pub fn json<T>(mut self, body: &T) -> Result<Self, ValidationError>
	where
		T: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(body).map_err(ValidationError::Body)?);
		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));

		Ok(self)
	}

	/// Attaches a cancellation token observed by the transport.
	pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
		self.cancellation = Some(token);

		self
	}

	/// HTTP method.
	pub fn method(&self) -> &Method {
		&self.method
	}

	/// Path relative to the API base URL.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Query parameters.
	pub fn query(&self) -> &QueryParams {
		&self.query
	}

	/// Extra request headers.
	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Request payload, if any.
	pub fn body(&self) -> Option<&[u8]> {
		self.body.as_deref()
	}

	/// Cancellation token, if any.
	pub fn cancellation(&self) -> Option<&CancellationToken> {
		self.cancellation.as_ref()
	}

	/// Returns a copy carrying `query` in place of the current parameters.
	pub(crate) fn with_query_params(&self, query: QueryParams) -> Self {
		Self { query, ..self.clone() }
	}

	/// Resolves the absolute URL against `base`.
	///
	/// The result must stay on `base`'s origin and below its path, so the bearer token is never
	/// sent elsewhere.
	pub fn url(&self, base: &Url) -> Result<Url, ValidationError> {
		let invalid = || ValidationError::InvalidPath { path: self.path.clone() };
		let mut url = base.join(&self.path).map_err(|_| invalid())?;

		if url.origin() != base.origin() || !url.path().starts_with(base.path()) {
			return Err(invalid());
		}

		if self.query.is_empty() {
			url.set_query(None);
		} else {
			url.query_pairs_mut().clear().extend_pairs(self.query.iter());
		}

		Ok(url)
	}

	/// Builds the wire request with `token` as the bearer credential.
	pub fn to_http(&self, base: &Url, token: &TokenSecret) -> Result<HttpRequest> {
		let url = self.url(base)?;
		let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
			.map_err(|_| ValidationError::InvalidHeader { name: AUTHORIZATION.to_string() })?;

		bearer.set_sensitive(true);

		let mut request = http::Request::builder()
			.method(self.method.clone())
			.uri(url.as_str())
			.body(self.body.clone().unwrap_or_default())
			.map_err(ConfigError::from)?;
		let headers = request.headers_mut();

		headers.extend(self.headers.clone());
		headers.insert(AUTHORIZATION, bearer);

		if !headers.contains_key(ACCEPT) {
			headers.insert(ACCEPT, HeaderValue::from_static(JSON));
		}

		Ok(request)
	}
}

/// Successful response handed back to callers.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Body decoded as UTF-8, with invalid sequences replaced.
	pub fn text(&self) -> Cow<'_, str> {
		String::from_utf8_lossy(&self.body)
	}

	/// Deserializes the body as JSON.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de).map_err(|source| Error::Decode { source })
	}
}
impl From<HttpResponse> for ApiResponse {
	fn from(response: HttpResponse) -> Self {
		let (parts, body) = response.into_parts();

		Self { status: parts.status.as_u16(), headers: parts.headers, body }
	}
}
