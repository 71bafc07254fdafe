//! Signed JWT client assertions (RFC 7523) presented to the token endpoint.

// crates.io
use jsonwebtoken::Header;
// self
use crate::{
	_prelude::*,
	auth::{Credential, TokenSecret},
	error::{AuthError, ConfigError},
};

/// `client_assertion_type` value for JWT bearer assertions.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
/// Longest assertion lifetime the token endpoint accepts.
pub const MAX_ASSERTION_LIFETIME: Duration = Duration::days(180);

/// Claims carried by a client assertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
	/// Issuer; the client identifier.
	pub iss: String,
	/// Subject; the client identifier.
	pub sub: String,
	/// Audience; the token endpoint's expected audience.
	pub aud: String,
	/// Issued-at, in unix seconds.
	pub iat: i64,
	/// Expiry, in unix seconds.
	pub exp: i64,
	/// Unique assertion identifier.
	pub jti: String,
}
impl AssertionClaims {
	/// Builds claims for `credential` issued at `now`.
	pub fn new(credential: &Credential, policy: AssertionPolicy, now: OffsetDateTime) -> Self {
		let iat = now.unix_timestamp();
		let client_id = credential.client_id().to_string();

		Self {
			iss: client_id.clone(),
			sub: client_id,
			aud: credential.audience().to_owned(),
			iat,
			exp: iat + policy.lifetime().whole_seconds(),
			jti: next_jti(),
		}
	}
}

/// Lifetime policy applied to freshly minted assertions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssertionPolicy {
	lifetime: Duration,
}
impl AssertionPolicy {
	/// Creates a policy, rejecting lifetimes outside `(0, 180 days]`.
	pub fn new(lifetime: Duration) -> Result<Self, ConfigError> {
		if lifetime < Duration::SECOND || lifetime > MAX_ASSERTION_LIFETIME {
			return Err(ConfigError::AssertionLifetime {
				max_days: MAX_ASSERTION_LIFETIME.whole_days(),
			});
		}

		Ok(Self { lifetime })
	}

	/// Lifetime between `iat` and `exp`.
	pub const fn lifetime(self) -> Duration {
		self.lifetime
	}
}
impl Default for AssertionPolicy {
	fn default() -> Self {
		Self { lifetime: MAX_ASSERTION_LIFETIME }
	}
}

/// Signs a new client assertion for `credential`.
///
/// Every call produces a distinct `jti`, so assertions are never replayed across exchanges.
pub fn sign(
	credential: &Credential,
	policy: AssertionPolicy,
	now: OffsetDateTime,
) -> Result<TokenSecret, AuthError> {
	let key = credential.signing_key();
	let mut header = Header::new(key.algorithm());

	header.kid = Some(credential.key_id().to_string());

	let claims = AssertionClaims::new(credential, policy, now);

	jsonwebtoken::encode(&header, &claims, key.encoding_key())
		.map(TokenSecret::new)
		.map_err(|source| AuthError::Signing { source })
}

fn next_jti() -> String {
	format!("{:032x}", rand::random::<u128>())
}
