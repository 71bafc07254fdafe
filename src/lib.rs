//! Authenticated transport for the Apple Business Manager API.
//!
//! Requests are authorized with bearer tokens obtained through the OAuth2 client-credentials grant
//! using a signed JWT client assertion. Failed calls are retried with an auth-aware policy, and
//! cursor-paginated collections are walked without knowing anything about the resource schema.
//!
//! The crate is layered leaves-first:
//!
//! - [`auth`] holds the immutable [`Credential`](auth::Credential), signs client assertions, and
//!   caches bearer tokens inside a [`TokenProvider`](auth::TokenProvider).
//! - [`transport`] executes one logical request, injecting the bearer token and applying a
//!   [`RetryPolicy`](transport::RetryPolicy) that knows how to recover from `401`.
//! - [`pagination`] follows `links.next` cursors and hands raw page bytes to the caller.
//! - [`classify`] turns non-success responses into typed errors.
//! - [`client`] wires everything together from a single [`ClientConfig`](client::ClientConfig).

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod classify;
pub mod client;
pub mod error;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod pagination;
pub mod request;
pub mod transport;

pub use client::{Client, ClientBuilder, ClientConfig};

mod _prelude {
	pub use std::{
		collections::HashSet,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use tokio_util::sync::CancellationToken;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use jsonwebtoken;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
