//! Shared fixtures for integration tests: fixture credentials and a scripted in-process transport.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use abm_client::{
	auth::{Credential, SigningKey},
	error::TransportError,
	http::{HttpClient, HttpFuture, HttpRequest, HttpResponse},
	oauth::oauth2::http::{
		Response,
		header::{AUTHORIZATION, CONTENT_TYPE},
	},
	url::Url,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::time::Instant;

pub const TOKEN_URL: &str = "https://auth.test/oauth2/token";
pub const API_BASE: &str = "https://api.test/v1/";

const EC_PEM: &[u8] = include_bytes!("../fixtures/ec_private.pem");

pub fn credential() -> Credential {
	let key = SigningKey::elliptic_pem(EC_PEM).expect("EC fixture should load.");

	Credential::builder("BUSINESSAPI.test-client", "test-key", key)
		.build()
		.expect("Credential fixture should build.")
}

pub fn url(raw: &str) -> Url {
	Url::parse(raw).expect("URL fixture should parse.")
}

/// Canned reply served by [`ScriptedApi`].
#[derive(Clone, Debug)]
pub enum Reply {
	Http { status: u16, headers: Vec<(&'static str, String)>, body: Vec<u8> },
	Offline,
}
impl Reply {
	pub fn json(status: u16, body: Value) -> Self {
		Self::Http {
			status,
			headers: vec![("content-type", "application/json".into())],
			body: body.to_string().into_bytes(),
		}
	}

	pub fn status(status: u16) -> Self {
		Self::Http { status, headers: Vec::new(), body: Vec::new() }
	}

	pub fn token(secret: &str, expires_in: i64) -> Self {
		Self::json(
			200,
			json!({
				"access_token": secret,
				"token_type": "Bearer",
				"expires_in": expires_in,
				"scope": "business.api"
			}),
		)
	}

	pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
		if let Self::Http { headers, .. } = &mut self {
			headers.push((name, value.into()));
		}

		self
	}
}

/// One request observed on the API host.
#[derive(Clone, Debug)]
pub struct ApiCall {
	pub url: Url,
	pub authorization: Option<String>,
	pub at: Instant,
}
impl ApiCall {
	pub fn query(&self, key: &str) -> Option<String> {
		self.url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
	}
}

/// In-process transport with separate scripts for the token endpoint and the API host.
///
/// Unscripted token requests succeed with `token-<n>` valid for an hour; unscripted API
/// requests get a `418` so a test that under-scripts fails loudly.
#[derive(Debug, Default)]
pub struct ScriptedApi {
	token_replies: Mutex<VecDeque<Reply>>,
	api_replies: Mutex<VecDeque<Reply>>,
	exchanges: AtomicUsize,
	token_forms: Mutex<Vec<String>>,
	api_calls: Mutex<Vec<ApiCall>>,
	exchange_delay: Mutex<Option<StdDuration>>,
}
impl ScriptedApi {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn with_exchange_delay(self: Arc<Self>, delay: StdDuration) -> Arc<Self> {
		*self.exchange_delay.lock() = Some(delay);

		self
	}

	pub fn push_token(&self, reply: Reply) {
		self.token_replies.lock().push_back(reply);
	}

	pub fn push_api(&self, reply: Reply) {
		self.api_replies.lock().push_back(reply);
	}

	pub fn exchanges(&self) -> usize {
		self.exchanges.load(Ordering::SeqCst)
	}

	pub fn token_forms(&self) -> Vec<String> {
		self.token_forms.lock().clone()
	}

	pub fn api_calls(&self) -> Vec<ApiCall> {
		self.api_calls.lock().clone()
	}

	fn render(reply: Reply) -> Result<HttpResponse, TransportError> {
		match reply {
			Reply::Http { status, headers, body } => {
				let mut builder = Response::builder().status(status);

				for (name, value) in headers {
					builder = builder.header(name, value);
				}

				Ok(builder.body(body).expect("Scripted response should build."))
			},
			Reply::Offline => Err(TransportError::Io(std::io::Error::new(
				std::io::ErrorKind::ConnectionRefused,
				"scripted outage",
			))),
		}
	}
}
impl HttpClient for ScriptedApi {
	fn execute(&self, request: HttpRequest) -> HttpFuture<'_> {
		Box::pin(async move {
			let url = url(&request.uri().to_string());

			if url.as_str() == TOKEN_URL {
				let n = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;

				self.token_forms.lock().push(String::from_utf8_lossy(request.body()).into_owned());

				let delay = *self.exchange_delay.lock();

				if let Some(delay) = delay {
					tokio::time::sleep(delay).await;
				}

				let reply = self
					.token_replies
					.lock()
					.pop_front()
					.unwrap_or_else(|| Reply::token(&format!("token-{n}"), 3_600));

				return Self::render(reply);
			}

			let authorization =
				request.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()).map(str::to_owned);

			assert!(
				request.headers().get(CONTENT_TYPE).is_none() || !request.body().is_empty(),
				"Content-Type without a body."
			);

			self.api_calls.lock().push(ApiCall { url, authorization, at: Instant::now() });

			let reply = self
				.api_replies
				.lock()
				.pop_front()
				.unwrap_or_else(|| {
					Reply::json(418, json!({"errors": [{"status": "418", "detail": "unscripted"}]}))
				});

			Self::render(reply)
		})
	}
}
