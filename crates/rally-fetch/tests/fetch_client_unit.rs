// crates/rally-fetch/tests/fetch_client_unit.rs
// ============================================================================
// Module: Fetch Client Unit Tests
// Description: Retry, timeout, and classification behavior of FetchClient.
// Purpose: Validate attempt counts and backoff timing with a scripted transport.
// ============================================================================

//! ## Overview
//! Drives [`FetchClient`] with a scripted in-process transport on a paused
//! tokio clock, so backoff sleeps and attempt timeouts elapse instantly and
//! deterministically.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rally_fetch::FetchClient;
use rally_fetch::FetchError;
use rally_fetch::FetchRequest;
use rally_fetch::HttpResponse;
use rally_fetch::HttpTransport;
use rally_fetch::RetryConfig;
use rally_fetch::RetryObserver;
use serde_json::Value;
use serde_json::json;
use tokio::time::Instant;

// ============================================================================
// SECTION: Helpers
// ============================================================================

enum Step {
    Respond(HttpResponse),
    Fail(FetchError),
    Hang,
}

#[derive(Default)]
struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    seen: Mutex<Vec<FetchRequest>>,
}

impl ScriptedTransport {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &FetchRequest) -> Result<HttpResponse, FetchError> {
        self.seen.lock().unwrap().push(request.clone());
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok(HttpResponse::new(200, "{}"))
            }
            None => Err(FetchError::Other("script exhausted".to_string())),
        }
    }
}

#[derive(Default)]
struct RecordingObserver {
    retries: Mutex<Vec<(u32, Duration)>>,
}

impl RetryObserver for RecordingObserver {
    fn on_retry(&self, attempt: u32, _error: &FetchError, delay: Duration) {
        self.retries.lock().unwrap().push((attempt, delay));
    }
}

fn ok_json(body: &Value) -> Step {
    Step::Respond(HttpResponse::new(200, serde_json::to_vec(body).unwrap()))
}

fn status(code: u16) -> Step {
    Step::Respond(HttpResponse::new(code, "{\"error\":\"nope\"}"))
}

fn client_for(transport: &Arc<ScriptedTransport>) -> (FetchClient, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::default());
    let client = FetchClient::new(transport.clone()).with_observer(observer.clone());
    (client, observer)
}

fn request() -> FetchRequest {
    FetchRequest::post_json("https://api.example.test/advice", json!({ "level": "beginner" }))
}

// ============================================================================
// SECTION: Success Paths
// ============================================================================

#[tokio::test(start_paused = true)]
async fn fetch_json_returns_decoded_body_on_first_success() {
    let transport = ScriptedTransport::new(vec![ok_json(&json!({ "tips": ["lob"] }))]);
    let (client, observer) = client_for(&transport);
    let value: Value = client.fetch_json(&request(), &RetryConfig::default()).await.unwrap();
    assert_eq!(value, json!({ "tips": ["lob"] }));
    assert_eq!(transport.calls(), 1);
    assert!(observer.retries.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn fetch_json_recovers_after_server_error() {
    let transport = ScriptedTransport::new(vec![status(503), ok_json(&json!({ "ok": true }))]);
    let (client, observer) = client_for(&transport);
    let value: Value = client.fetch_json(&request(), &RetryConfig::default()).await.unwrap();
    assert_eq!(value["ok"], json!(true));
    assert_eq!(transport.calls(), 2);
    assert_eq!(*observer.retries.lock().unwrap(), vec![(1, Duration::from_millis(1_000))]);
}

#[tokio::test(start_paused = true)]
async fn fetch_json_retries_transient_other_errors() {
    let transport = ScriptedTransport::new(vec![
        Step::Fail(FetchError::Other("connect ECONNREFUSED".to_string())),
        Step::Fail(FetchError::Other("Network request failed".to_string())),
        ok_json(&json!([])),
    ]);
    let (client, _observer) = client_for(&transport);
    let value: Value = client.fetch_json(&request(), &RetryConfig::default()).await.unwrap();
    assert_eq!(value, json!([]));
    assert_eq!(transport.calls(), 3);
}

// ============================================================================
// SECTION: Terminal Failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn not_found_is_attempted_once() {
    let transport = ScriptedTransport::new(vec![status(404), ok_json(&json!({}))]);
    let (client, observer) = client_for(&transport);
    let err = client.fetch_json::<Value>(&request(), &RetryConfig::default()).await.unwrap_err();
    assert_eq!(err.http_status(), Some(404));
    assert_eq!(transport.calls(), 1);
    assert!(observer.retries.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn invalid_json_is_terminal() {
    let transport = ScriptedTransport::new(vec![
        Step::Respond(HttpResponse::new(200, "<html>")),
        ok_json(&json!({})),
    ]);
    let (client, _observer) = client_for(&transport);
    let err = client.fetch_json::<Value>(&request(), &RetryConfig::default()).await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidJson(_)));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_other_error_is_terminal() {
    let transport =
        ScriptedTransport::new(vec![Step::Fail(FetchError::Other("bad certificate".to_string()))]);
    let (client, _observer) = client_for(&transport);
    let err = client.fetch_json::<Value>(&request(), &RetryConfig::default()).await.unwrap_err();
    assert_eq!(err, FetchError::Other("bad certificate".to_string()));
    assert_eq!(transport.calls(), 1);
}

// ============================================================================
// SECTION: Exhaustion
// ============================================================================

#[tokio::test(start_paused = true)]
async fn rate_limit_is_retried_until_attempts_run_out() {
    let transport = ScriptedTransport::new(vec![status(429), status(429), status(429), status(200)]);
    let (client, observer) = client_for(&transport);
    let err = client.fetch_json::<Value>(&request(), &RetryConfig::default()).await.unwrap_err();
    assert_eq!(err.http_status(), Some(429));
    assert_eq!(transport.calls(), 3);
    assert_eq!(
        *observer.retries.lock().unwrap(),
        vec![(1, Duration::from_millis(1_000)), (2, Duration::from_millis(2_000))]
    );
}

#[tokio::test(start_paused = true)]
async fn per_request_observer_replaces_client_observer() {
    let transport = ScriptedTransport::new(vec![status(503), status(502), ok_json(&json!({}))]);
    let (client, client_observer) = client_for(&transport);
    let request_observer = RecordingObserver::default();
    let retry = RetryConfig {
        backoff_multiplier: 1.5,
        ..RetryConfig::default()
    };
    let value: Value =
        client.fetch_json_observed(&request(), &retry, &request_observer).await.unwrap();
    assert_eq!(value, json!({}));
    assert_eq!(
        *request_observer.retries.lock().unwrap(),
        vec![(1, Duration::from_millis(1_000)), (2, Duration::from_millis(1_500))]
    );
    assert!(client_observer.retries.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn hung_attempts_time_out_and_are_retried() {
    let transport = ScriptedTransport::new(vec![Step::Hang, Step::Hang, Step::Hang]);
    let (client, _observer) = client_for(&transport);
    let started = Instant::now();
    let err = client.fetch_json::<Value>(&request(), &RetryConfig::default()).await.unwrap_err();
    let elapsed = started.elapsed();
    assert_eq!(err, FetchError::Timeout);
    assert_eq!(transport.calls(), 3);
    assert!(elapsed >= Duration::from_secs(93), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(94), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn zero_attempts_still_makes_one_call() {
    let transport = ScriptedTransport::new(vec![status(500), status(500)]);
    let (client, _observer) = client_for(&transport);
    let retry = RetryConfig {
        max_attempts: 0,
        ..RetryConfig::default()
    };
    let err = client.fetch_json::<Value>(&request(), &retry).await.unwrap_err();
    assert_eq!(err.http_status(), Some(500));
    assert_eq!(transport.calls(), 1);
}

// ============================================================================
// SECTION: Raw Fetch and Headers
// ============================================================================

#[tokio::test(start_paused = true)]
async fn fetch_with_timeout_returns_raw_non_success_response() {
    let transport = ScriptedTransport::new(vec![status(418)]);
    let (client, _observer) = client_for(&transport);
    let response =
        client.fetch_with_timeout(&request(), Duration::from_secs(5)).await.unwrap();
    assert_eq!(response.status, 418);
    assert!(!response.is_success());
}

#[tokio::test(start_paused = true)]
async fn fetch_with_timeout_reports_timeout() {
    let transport = ScriptedTransport::new(vec![Step::Hang]);
    let (client, _observer) = client_for(&transport);
    let err = client.fetch_with_timeout(&request(), Duration::from_secs(5)).await.unwrap_err();
    assert_eq!(err, FetchError::Timeout);
}

#[test]
fn json_content_type_is_default_and_caller_header_wins() {
    let plain = FetchRequest::get("https://api.example.test/videos");
    assert_eq!(
        plain.effective_headers().get("Content-Type").map(String::as_str),
        Some("application/json")
    );

    let custom = FetchRequest::get("https://api.example.test/videos")
        .with_header("content-type", "text/plain")
        .with_header("Authorization", "Bearer t");
    let headers = custom.effective_headers();
    assert_eq!(headers.get("content-type").map(String::as_str), Some("text/plain"));
    assert!(!headers.contains_key("Content-Type"));
    assert_eq!(headers.len(), 2);
}
