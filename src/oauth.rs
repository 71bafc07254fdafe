//! Client-credentials token exchange built on the `oauth2` crate.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, EndpointNotSet, EndpointSet, RequestTokenError, Scope, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, CLIENT_ASSERTION_TYPE, ClientId, TokenSecret},
	error::{AuthError, ConfigError, TransportError},
	http::{HttpClient, InstrumentedHandle, ResponseMetadata, ResponseMetadataSlot},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Posts signed client assertions to the token endpoint and maps the outcome.
///
/// The client id travels in the form body (`AuthType::RequestBody`) and no client secret is ever
/// configured; the assertion is the only proof of identity.
#[derive(Clone, Debug)]
pub struct TokenExchange {
	oauth_client: ConfiguredBasicClient,
}
impl TokenExchange {
	/// Configures an exchange against `token_endpoint` for `client_id`.
	pub fn new(token_endpoint: &Url, client_id: &ClientId) -> Result<Self, ConfigError> {
		let token_url = TokenUrl::new(token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidUrl { endpoint: "token", source })?;
		let oauth_client = BasicClient::new(oauth2::ClientId::new(client_id.to_string()))
			.set_token_uri(token_url)
			.set_auth_type(AuthType::RequestBody);

		Ok(Self { oauth_client })
	}

	/// Token endpoint this exchange posts to.
	pub fn token_endpoint(&self) -> &str {
		self.oauth_client.token_uri().as_str()
	}

	/// Exchanges `assertion` for a bearer token scoped to `scope`.
	///
	/// `now` stamps `issued_at`; `expires_at` is derived from the returned `expires_in`.
	pub async fn exchange(
		&self,
		http: &dyn HttpClient,
		scope: &str,
		assertion: &TokenSecret,
		now: OffsetDateTime,
	) -> Result<AccessToken, AuthError> {
		let meta = ResponseMetadataSlot::default();
		let handle = InstrumentedHandle::new(http, meta.clone());
		let response = self
			.oauth_client
			.exchange_client_credentials()
			.add_scope(Scope::new(scope.to_owned()))
			.add_extra_param("client_assertion_type", CLIENT_ASSERTION_TYPE)
			.add_extra_param("client_assertion", assertion.expose().to_owned())
			.request_async(&handle)
			.await
			.map_err(|e| map_request_error(meta.take(), e))?;

		map_token_response(response, now, meta_status(meta.take().as_ref()))
	}
}

fn map_token_response(
	response: BasicTokenResponse,
	now: OffsetDateTime,
	status: Option<u16>,
) -> Result<AccessToken, AuthError> {
	let secret = response.access_token().secret();

	if secret.is_empty() {
		return Err(AuthError::UnexpectedResponse {
			message: "access_token is empty".into(),
			status,
		});
	}

	let expires_in = response.expires_in().ok_or_else(|| AuthError::UnexpectedResponse {
		message: "expires_in is missing".into(),
		status,
	})?;
	let expires_in = i64::try_from(expires_in.as_secs()).map_err(|_| {
		AuthError::UnexpectedResponse { message: "expires_in is out of range".into(), status }
	})?;

	if expires_in <= 0 {
		return Err(AuthError::UnexpectedResponse {
			message: "expires_in must be positive".into(),
			status,
		});
	}

	let expires_at = now.checked_add(Duration::seconds(expires_in)).ok_or_else(|| {
		AuthError::UnexpectedResponse { message: "expires_in is out of range".into(), status }
	})?;
	let scope = response
		.scopes()
		.map(|scopes| scopes.iter().map(|scope| scope.as_str()).collect::<Vec<_>>().join(" "));

	Ok(AccessToken {
		secret: TokenSecret::new(secret.to_owned()),
		issued_at: now,
		expires_at,
		scope,
	})
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<TransportError>,
) -> AuthError {
	let status = meta_status(meta.as_ref());

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response(response, status),
		RequestTokenError::Request(source) => AuthError::Unreachable(source),
		RequestTokenError::Parse(source, _body) => AuthError::MalformedResponse { source, status },
		RequestTokenError::Other(message) => AuthError::UnexpectedResponse { message, status },
	}
}

fn map_server_response(response: BasicErrorResponse, status: Option<u16>) -> AuthError {
	let code = response.error().as_ref();
	let reason = match response.error_description() {
		Some(description) => format!("{code} ({description})"),
		None => code.to_owned(),
	};

	AuthError::Rejected { reason, status }
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::{
		AccessToken as OAuthAccessToken, EmptyExtraTokenFields, StandardErrorResponse,
		basic::{BasicErrorResponseType, BasicTokenType},
	};
	use time::macros;
	// self
	use super::*;

	fn token_response(expires_in: Option<u64>) -> BasicTokenResponse {
		let mut response = BasicTokenResponse::new(
			OAuthAccessToken::new("bearer-1".into()),
			BasicTokenType::Bearer,
			EmptyExtraTokenFields {},
		);

		response.set_expires_in(expires_in.map(StdDuration::from_secs).as_ref());
		response.set_scopes(Some(vec![Scope::new("business.api".into())]));

		response
	}

	#[test]
	fn exchange_reports_its_token_endpoint() {
		let client_id = ClientId::new("BUSINESSAPI.client").expect("Client id should be valid.");
		let endpoint = Url::parse("https://auth.example.com/oauth2/token")
			.expect("Endpoint fixture should parse.");
		let exchange =
			TokenExchange::new(&endpoint, &client_id).expect("Exchange should configure.");

		assert_eq!(exchange.token_endpoint(), "https://auth.example.com/oauth2/token");
	}

	#[test]
	fn token_response_maps_expiry_and_scope() {
		let now = macros::datetime!(2025-06-01 08:00 UTC);
		let token = map_token_response(token_response(Some(3_600)), now, Some(200))
			.expect("Valid response should map.");

		assert_eq!(token.secret.expose(), "bearer-1");
		assert_eq!(token.issued_at, now);
		assert_eq!(token.expires_at, macros::datetime!(2025-06-01 09:00 UTC));
		assert_eq!(token.scope.as_deref(), Some("business.api"));
	}

	#[test]
	fn token_response_requires_positive_expiry() {
		let now = OffsetDateTime::now_utc();

		assert!(matches!(
			map_token_response(token_response(Some(0)), now, Some(200)),
			Err(AuthError::UnexpectedResponse { status: Some(200), .. })
		));
		assert!(matches!(
			map_token_response(token_response(None), now, None),
			Err(AuthError::UnexpectedResponse { .. })
		));
	}

	#[test]
	fn token_response_rejects_unrepresentable_expiry() {
		let now = OffsetDateTime::now_utc();
		let err = map_token_response(token_response(Some(9_000_000_000_000)), now, Some(200))
			.expect_err("Expiry beyond the calendar range must be rejected.");

		match err {
			AuthError::UnexpectedResponse { message, status } => {
				assert_eq!(message, "expires_in is out of range");
				assert_eq!(status, Some(200));
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn server_errors_keep_code_description_and_status() {
		let response = StandardErrorResponse::new(
			BasicErrorResponseType::InvalidClient,
			Some("assertion expired".into()),
			None,
		);
		let err = map_request_error(
			Some(ResponseMetadata { status: Some(401) }),
			RequestTokenError::ServerResponse(response),
		);

		match err {
			AuthError::Rejected { reason, status } => {
				assert_eq!(reason, "invalid_client (assertion expired)");
				assert_eq!(status, Some(401));
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}
}
