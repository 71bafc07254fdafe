//! Schema-agnostic cursor pagination.
//!
//! The walker knows only the envelope keys that carry the continuation (`links.next`, with
//! `meta.paging.nextCursor` as a fallback). Each page body goes to a caller-supplied consumer as
//! raw bytes, so resource decoding stays with the caller.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	error::PaginationError,
	obs::{self, OpKind, OpOutcome, OpSpan},
	request::{ApiRequest, CURSOR_PARAM, QueryParams},
	transport::RetryableTransport,
};

/// Default cap on pages fetched by one walk.
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// Totals reported after a completed walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalkSummary {
	/// Pages fetched and consumed.
	pub pages: usize,
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
	#[serde(default)]
	links: Option<Links>,
	#[serde(default)]
	meta: Option<Meta>,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
	#[serde(default)]
	next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
	#[serde(default)]
	paging: Option<Paging>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paging {
	#[serde(default)]
	next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct DataPage<T> {
	#[serde(default = "Vec::new")]
	data: Vec<T>,
}

/// Follows `next` cursors until the collection is exhausted.
#[derive(Clone, Debug)]
pub struct PaginationWalker {
	transport: Arc<RetryableTransport>,
	max_pages: usize,
}
impl PaginationWalker {
	/// Creates a walker over `transport` with the default page cap.
	pub fn new(transport: Arc<RetryableTransport>) -> Self {
		Self { transport, max_pages: DEFAULT_MAX_PAGES }
	}

	/// Overrides the page cap. Zero is treated as one.
	pub fn with_max_pages(mut self, max_pages: usize) -> Self {
		self.max_pages = max_pages.max(1);

		self
	}

	/// Configured page cap.
	pub fn max_pages(&self) -> usize {
		self.max_pages
	}

	/// Walks every page reachable from `request`, handing each body to `consume`.
	///
	/// `request` is never modified; each iteration works on a copy whose parameters are overridden
	/// only by the keys carried in the next link. Errors from `consume` stop the walk and are
	/// returned unchanged.
	pub async fn walk<F, E>(&self, request: &ApiRequest, mut consume: F) -> Result<WalkSummary, E>
	where
		F: FnMut(&[u8]) -> Result<(), E>,
		E: From<Error>,
	{
		let span = OpSpan::new(OpKind::Pagination, "walk");

		obs::record_op_outcome(OpKind::Pagination, OpOutcome::Attempt);

		let result = span.instrument(self.walk_pages(request, &mut consume)).await;

		obs::record_op_outcome(OpKind::Pagination, OpOutcome::of(&result));

		result
	}

	async fn walk_pages<F, E>(&self, request: &ApiRequest, consume: &mut F) -> Result<WalkSummary, E>
	where
		F: FnMut(&[u8]) -> Result<(), E>,
		E: From<Error>,
	{
		let mut seen = HashSet::new();
		let mut current = request.clone();
		let mut pages = 0;

		if let Some(cursor) = request.query().get(CURSOR_PARAM) {
			seen.insert(cursor.to_owned());
		}

		loop {
			if pages >= self.max_pages {
				return Err(
					Error::from(PaginationError::PageLimitExceeded { max_pages: self.max_pages })
						.into(),
				);
			}

			let response = self.transport.execute(&current).await?;

			pages += 1;
			consume(&response.body)?;

			let Some(overlay) = self.next_params(&response.body, pages).map_err(Error::from)? else {
				return Ok(WalkSummary { pages });
			};
			let cursor = overlay.get(CURSOR_PARAM).unwrap_or_default().to_owned();

			if !seen.insert(cursor.clone()) {
				return Err(Error::from(PaginationError::CursorCycle { cursor, page: pages }).into());
			}

			let mut query = current.query().clone();

			query.overlay(&overlay);
			current = current.with_query_params(query);
		}
	}

	/// Walks every page and concatenates the `data` arrays decoded as `T`.
	pub async fn collect<T>(&self, request: &ApiRequest) -> Result<Vec<T>>
	where
		T: DeserializeOwned,
	{
		let mut items = Vec::new();

		self.walk(request, |body| {
			let mut de = serde_json::Deserializer::from_slice(body);
			let page: DataPage<T> = serde_path_to_error::deserialize(&mut de)
				.map_err(|source| Error::Decode { source })?;

			items.extend(page.data);

			Ok::<_, Error>(())
		})
		.await?;

		Ok(items)
	}

	/// Extracts the parameters for the next request, or `None` when the walk is complete.
	fn next_params(&self, body: &[u8], page: usize) -> Result<Option<QueryParams>, PaginationError> {
		if body.iter().all(u8::is_ascii_whitespace) {
			return Ok(None);
		}

		let envelope: Envelope = serde_json::from_slice(body)
			.map_err(|source| PaginationError::Envelope { page, source })?;

		if let Some(link) = envelope.links.and_then(|links| links.next).filter(|l| !l.trim().is_empty())
		{
			return overlay_from_link(self.transport.base_url(), &link).map(Some);
		}

		let cursor = envelope
			.meta
			.and_then(|meta| meta.paging)
			.and_then(|paging| paging.next_cursor)
			.filter(|cursor| !cursor.is_empty());

		Ok(cursor.map(|cursor| {
			let mut params = QueryParams::new();

			params.set(CURSOR_PARAM, cursor);

			params
		}))
	}
}

/// Parses a next link (absolute, or relative to `base`) into the parameters it overrides.
fn overlay_from_link(base: &Url, link: &str) -> Result<QueryParams, PaginationError> {
	let url = base
		.join(link.trim())
		.map_err(|source| PaginationError::InvalidNextLink { link: link.to_owned(), source })?;
	let params = QueryParams::parse(url.query().unwrap_or_default());

	match params.get(CURSOR_PARAM) {
		Some(cursor) if !cursor.is_empty() => Ok(params),
		_ => Err(PaginationError::MissingCursor { link: link.to_owned() }),
	}
}
