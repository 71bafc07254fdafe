mod common;

// std
use std::{sync::Arc, time::Duration as StdDuration};
// crates.io
use httpmock::prelude::*;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
// self
use abm_client::{
	Client,
	error::{Error, TransportError},
	http::{HttpClient, ReqwestHttpClient},
	request::ApiRequest,
	transport::RetryPolicy,
};
use common::{API_BASE, Reply, ScriptedApi, TOKEN_URL, credential, url};

fn scripted_client(api: &Arc<ScriptedApi>, policy: RetryPolicy) -> Client {
	let http: Arc<dyn HttpClient> = api.clone();

	Client::builder(credential())
		.base_url(url(API_BASE))
		.token_endpoint(url(TOKEN_URL))
		.retry_policy(policy)
		.shared_http_client(http)
		.build()
		.expect("Client should build.")
}

fn policy(retry_count: u32, min_wait_secs: u64) -> RetryPolicy {
	RetryPolicy::builder()
		.retry_count(retry_count)
		.min_wait(StdDuration::from_secs(min_wait_secs))
		.max_wait(StdDuration::from_secs(30))
		.build()
		.expect("Policy fixture should validate.")
}

fn devices() -> ApiRequest {
	ApiRequest::get("orgDevices").expect("Path fixture should validate.")
}

#[tokio::test]
async fn bearer_token_and_query_reach_the_api() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/oauth2/token");
			then.status(200).header("content-type", "application/json").body(
				r#"{"access_token":"abm-token","token_type":"Bearer","expires_in":3600}"#,
			);
		})
		.await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/v1/orgDevices")
				.header("authorization", "Bearer abm-token")
				.header("accept", "application/json")
				.query_param("limit", "100")
				.query_param("fields[orgDevices]", "serialNumber,deviceModel");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"data":[{"id":"XABC123"}],"links":{}}"#);
		})
		.await;
	let client = Client::builder(credential())
		.base_url(url(&server.url("/v1")))
		.token_endpoint(url(&server.url("/auth/oauth2/token")))
		.http_client(ReqwestHttpClient::default())
		.build()?;
	let request = devices().with_limit(100).with_fields("orgDevices", &["serialNumber", "deviceModel"]);
	let body: Value = client.get_json(&request).await?;

	assert_eq!(body["data"][0]["id"], "XABC123");

	client.execute(&request).await?;
	token.assert_calls_async(1).await;
	api.assert_calls_async(2).await;

	Ok(())
}

#[tokio::test]
async fn unauthorized_response_refreshes_the_token_and_retries_once() {
	let api = ScriptedApi::new();

	api.push_api(Reply::status(401));
	api.push_api(Reply::json(200, json!({"data": []})));

	let client = scripted_client(&api, policy(3, 1));
	let response = client.execute(&devices()).await.expect("Retry after refresh should succeed.");
	let calls = api.api_calls();

	assert_eq!(response.status, 200);
	assert_eq!(api.exchanges(), 2);
	assert_eq!(calls.len(), 2);
	assert_eq!(calls[0].authorization.as_deref(), Some("Bearer token-1"));
	assert_eq!(calls[1].authorization.as_deref(), Some("Bearer token-2"));
	// No backoff precedes the post-refresh attempt.
	assert!(calls[1].at.duration_since(calls[0].at) < StdDuration::from_millis(500));
}

#[tokio::test]
async fn second_unauthorized_response_is_terminal() {
	let api = ScriptedApi::new();

	api.push_api(Reply::json(401, json!({"errors": [{"status": "401", "code": "UNAUTHORIZED"}]})));
	api.push_api(Reply::json(401, json!({"errors": [{"status": "401", "code": "UNAUTHORIZED"}]})));

	let client = scripted_client(&api, policy(3, 1));
	let err = client.execute(&devices()).await.expect_err("Repeated 401 must fail.");

	assert_eq!(err.status(), Some(401));
	assert!(matches!(err, Error::Api(_)));
	assert_eq!(api.api_calls().len(), 2);
	assert_eq!(api.exchanges(), 2);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_responses_honor_retry_after() {
	let api = ScriptedApi::new();

	api.push_api(Reply::status(429).header("retry-after", "2"));
	api.push_api(Reply::json(200, json!({"data": []})));

	let client = scripted_client(&api, policy(3, 10));

	client.execute(&devices()).await.expect("Retry after the hint should succeed.");

	let calls = api.api_calls();
	let gap = calls[1].at.duration_since(calls[0].at);

	assert_eq!(calls.len(), 2);
	assert!(gap >= StdDuration::from_secs(2));
	assert!(gap < StdDuration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn rate_limited_responses_without_a_hint_use_the_backoff_schedule() {
	let api = ScriptedApi::new();

	api.push_api(Reply::status(429));
	api.push_api(Reply::json(200, json!({"data": []})));

	let client = scripted_client(&api, policy(3, 3));

	client.execute(&devices()).await.expect("Retry after backoff should succeed.");

	let calls = api.api_calls();

	assert_eq!(calls.len(), 2);
	assert!(calls[1].at.duration_since(calls[0].at) >= StdDuration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn oversized_retry_after_hints_are_capped_by_the_policy() {
	let api = ScriptedApi::new();

	api.push_api(Reply::status(429).header("retry-after", "4294967295"));
	api.push_api(Reply::json(200, json!({"data": []})));

	let capped = RetryPolicy::builder()
		.max_retry_after(StdDuration::from_secs(5))
		.build()
		.expect("Policy fixture should validate.");
	let client = scripted_client(&api, capped);

	client.execute(&devices()).await.expect("Retry after the capped hint should succeed.");

	let calls = api.api_calls();
	let gap = calls[1].at.duration_since(calls[0].at);

	assert!(gap >= StdDuration::from_secs(5));
	assert!(gap < StdDuration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn token_refresh_consumes_an_attempt_from_the_shared_budget() {
	let api = ScriptedApi::new();

	api.push_api(Reply::status(401));
	api.push_api(Reply::status(503));
	api.push_api(Reply::json(200, json!({"data": []})));

	let client = scripted_client(&api, policy(1, 1));
	let err = client.execute(&devices()).await.expect_err("Budget is spent after the refresh.");

	assert!(matches!(err, Error::Http(ref http) if http.status == 503));
	assert_eq!(api.api_calls().len(), 2);
	assert_eq!(api.exchanges(), 2);
}

#[tokio::test(start_paused = true)]
async fn persistent_network_failures_stop_after_the_budget() {
	let api = ScriptedApi::new();

	for _ in 0..5 {
		api.push_api(Reply::Offline);
	}

	let client = scripted_client(&api, policy(3, 1));
	let err = client.execute(&devices()).await.expect_err("Persistent outage must fail.");

	assert!(matches!(err, Error::Network(TransportError::Io(_))));
	assert_eq!(api.api_calls().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn server_errors_back_off_exponentially_until_the_budget_is_spent() {
	let api = ScriptedApi::new();

	for _ in 0..4 {
		api.push_api(Reply::status(503));
	}

	let client = scripted_client(&api, policy(3, 1));
	let err = client.execute(&devices()).await.expect_err("Persistent 503 must fail.");
	let calls = api.api_calls();

	assert!(matches!(err, Error::Http(ref http) if http.status == 503));
	assert_eq!(calls.len(), 4);

	for (pair, expected) in calls.windows(2).zip([1, 2, 4]) {
		assert!(pair[1].at.duration_since(pair[0].at) >= StdDuration::from_secs(expected));
	}
}

#[tokio::test]
async fn not_implemented_and_client_errors_are_not_retried() {
	let api = ScriptedApi::new();

	api.push_api(Reply::status(501));
	api.push_api(Reply::json(
		404,
		json!({"errors": [{"status": "404", "code": "NOT_FOUND", "detail": "No such device."}]}),
	));

	let client = scripted_client(&api, policy(3, 1));
	let err = client.execute(&devices()).await.expect_err("501 must fail.");

	assert!(matches!(err, Error::Http(ref http) if http.status == 501));
	assert_eq!(api.api_calls().len(), 1);

	let err = client.execute(&devices()).await.expect_err("404 must fail.");

	match &err {
		Error::Api(api_error) => {
			assert_eq!(api_error.code.as_deref(), Some("NOT_FOUND"));
			assert!(err.to_string().contains("NOT_FOUND"));
		},
		other => panic!("Unexpected error: {other:?}"),
	}

	assert_eq!(api.api_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn network_failures_follow_the_policy_switch() {
	let api = ScriptedApi::new();

	api.push_api(Reply::Offline);
	api.push_api(Reply::json(200, json!({"data": []})));

	let client = scripted_client(&api, policy(3, 1));

	client.execute(&devices()).await.expect("Network retry should succeed.");
	assert_eq!(api.api_calls().len(), 2);

	let api = ScriptedApi::new();

	api.push_api(Reply::Offline);

	let strict = RetryPolicy::builder()
		.retry_network_errors(false)
		.build()
		.expect("Policy fixture should validate.");
	let client = scripted_client(&api, strict);
	let err = client.execute(&devices()).await.expect_err("Offline must fail without retry.");

	assert!(matches!(err, Error::Network(TransportError::Io(_))));
	assert!(err.is_retryable());
	assert_eq!(api.api_calls().len(), 1);
}

#[tokio::test]
async fn disabled_policy_makes_a_single_attempt() {
	let api = ScriptedApi::new();

	api.push_api(Reply::status(401));

	let client = scripted_client(&api, RetryPolicy::disabled());
	let err = client.execute(&devices()).await.expect_err("401 must fail without retries.");

	assert_eq!(err.status(), Some(401));
	assert_eq!(api.api_calls().len(), 1);
	assert_eq!(api.exchanges(), 1);
}

#[tokio::test]
async fn cancelled_requests_never_reach_the_network() {
	let api = ScriptedApi::new();
	let client = scripted_client(&api, policy(3, 1));
	let cancellation = CancellationToken::new();

	cancellation.cancel();

	let err = client
		.execute(&devices().with_cancellation(cancellation))
		.await
		.expect_err("Cancelled request must fail.");

	assert!(matches!(err, Error::Cancelled));
	assert!(api.api_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_a_backoff_wait() {
	let api = ScriptedApi::new();

	api.push_api(Reply::status(503));
	api.push_api(Reply::json(200, json!({"data": []})));

	let client = scripted_client(&api, policy(3, 10));
	let cancellation = CancellationToken::new();
	let trigger = cancellation.clone();

	tokio::spawn(async move {
		tokio::time::sleep(StdDuration::from_secs(1)).await;
		trigger.cancel();
	});

	let err = client
		.execute(&devices().with_cancellation(cancellation))
		.await
		.expect_err("Cancellation during backoff must fail.");

	assert!(matches!(err, Error::Cancelled));
	assert_eq!(api.api_calls().len(), 1);
}
