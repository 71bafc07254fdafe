//! HTTP transport seam shared by the token exchange and resource requests.
//!
//! [`HttpClient`] is the crate's only dependency on an HTTP stack. The default
//! [`ReqwestHttpClient`] wraps reqwest; tests and embedders can supply their own
//! implementation (for example a scripted fake) and every layer above it runs unchanged.
//!
//! The token exchange goes through the `oauth2` crate, which expects an
//! [`AsyncHttpClient`]. [`InstrumentedHandle`] adapts an [`HttpClient`] to that trait while
//! publishing the observed status into a [`ResponseMetadataSlot`], so error mapping can attach
//! the HTTP status to OAuth failures that do not carry one.

// crates.io
use oauth2::{
	AsyncHttpClient,
	http::{HeaderMap, header::RETRY_AFTER},
};
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError};

pub use oauth2::{HttpRequest, HttpResponse};

/// Boxed future returned by [`HttpClient::execute`].
pub type HttpFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports.
///
/// Implementations return `Ok` for every response that reached the client, whatever its status;
/// `Err` is reserved for failures where no response exists (DNS, TCP, TLS, timeouts). Status
/// interpretation belongs to the layers above.
pub trait HttpClient
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and buffers the full response body.
	fn execute(&self, request: HttpRequest) -> HttpFuture<'_>;
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response was received.
	pub status: Option<u16>,
}
impl ResponseMetadata {
	/// Extracts metadata from a buffered response.
	pub fn from_response(response: &HttpResponse) -> Self {
		Self { status: Some(response.status().as_u16()) }
	}
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// [`AsyncHttpClient`] adapter that records response metadata while delegating to an
/// [`HttpClient`].
pub struct InstrumentedHandle<'h> {
	client: &'h dyn HttpClient,
	slot: ResponseMetadataSlot,
}
impl<'h> InstrumentedHandle<'h> {
	/// Wraps `client`, publishing metadata into `slot`.
	pub fn new(client: &'h dyn HttpClient, slot: ResponseMetadataSlot) -> Self {
		Self { client, slot }
	}
}
impl<'c, 'h> AsyncHttpClient<'c> for InstrumentedHandle<'h> {
	type Error = TransportError;
	type Future = HttpFuture<'c>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();

			let response = self.client.execute(request).await?;

			self.slot.store(ResponseMetadata::from_response(&response));

			Ok(response)
		})
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Token endpoints must answer directly, so the builder disables redirect following. Configure any
/// custom [`ReqwestClient`] passed to [`ReqwestHttpClient::with_client`] the same way.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Returns a builder with the crate's default timeouts.
	pub fn builder() -> ReqwestHttpClientBuilder {
		ReqwestHttpClientBuilder::default()
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpClient for ReqwestHttpClient {
	fn execute(&self, request: HttpRequest) -> HttpFuture<'_> {
		Box::pin(async move {
			let request = reqwest::Request::try_from(request)?;
			let response = self.0.execute(request).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut buffered = HttpResponse::new(response.bytes().await?.to_vec());

			*buffered.status_mut() = status;
			*buffered.headers_mut() = headers;

			Ok(buffered)
		})
	}
}

/// Builder for [`ReqwestHttpClient`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHttpClientBuilder {
	timeout: StdDuration,
	connect_timeout: StdDuration,
	user_agent: Option<String>,
}
#[cfg(feature = "reqwest")]
impl ReqwestHttpClientBuilder {
	/// Overrides the per-request timeout (defaults to 60 seconds).
	pub fn timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Overrides the TCP + TLS connect timeout (defaults to 10 seconds).
	pub fn connect_timeout(mut self, timeout: StdDuration) -> Self {
		self.connect_timeout = timeout;

		self
	}

	/// Sets the `User-Agent` header.
	pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
		self.user_agent = Some(agent.into());

		self
	}

	/// Builds the client.
	pub fn build(self) -> Result<ReqwestHttpClient, crate::error::ConfigError> {
		let mut builder = ReqwestClient::builder()
			.timeout(self.timeout)
			.connect_timeout(self.connect_timeout)
			.redirect(reqwest::redirect::Policy::none());

		if let Some(agent) = self.user_agent {
			builder = builder.user_agent(agent);
		}

		Ok(ReqwestHttpClient(builder.build()?))
	}
}
#[cfg(feature = "reqwest")]
impl Default for ReqwestHttpClientBuilder {
	fn default() -> Self {
		Self {
			timeout: StdDuration::from_secs(60),
			connect_timeout: StdDuration::from_secs(10),
			user_agent: Some(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).into()),
		}
	}
}

/// Parses a `Retry-After` header expressed as delta-seconds or an HTTP date.
///
/// Dates in the past yield `None`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
