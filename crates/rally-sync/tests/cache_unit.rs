// crates/rally-sync/tests/cache_unit.rs
// ============================================================================
// Module: Response Cache Unit Tests
// Description: TTL, fingerprinting, and corruption handling of ResponseCache.
// Purpose: Validate cache-first fetching without network access.
// ============================================================================

//! ## Overview
//! Uses a [`ManualClock`] for expiry and a scripted transport for
//! [`CachedJsonFetcher`], so no test sleeps or opens a socket.

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
use rally_core::InMemoryKvStore;
use rally_core::KeyValueStore;
use rally_core::ManualClock;
use rally_core::Timestamp;
use rally_fetch::FetchClient;
use rally_fetch::FetchError;
use rally_fetch::FetchRequest;
use rally_fetch::HttpResponse;
use rally_fetch::HttpTransport;
use rally_fetch::RetryConfig;
use rally_sync::CacheNamespace;
use rally_sync::CachedJsonFetcher;
use rally_sync::ResponseCache;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const TTL: Duration = Duration::from_secs(3_600);
const START: i64 = 1_760_000_000_000;

#[derive(Serialize)]
struct AdviceParams {
    skill: &'static str,
    level: &'static str,
}

#[derive(Serialize)]
struct ReorderedParams {
    level: &'static str,
    skill: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Advice {
    tips: Vec<String>,
}

fn advice(tip: &str) -> Advice {
    Advice {
        tips: vec![tip.to_string()],
    }
}

fn setup() -> (Arc<InMemoryKvStore>, ManualClock, ResponseCache) {
    let store = Arc::new(InMemoryKvStore::new());
    let clock = ManualClock::new(Timestamp::from_unix_millis(START));
    let cache = ResponseCache::new(store.clone(), Arc::new(clock.clone()), TTL);
    (store, clock, cache)
}

fn params(skill: &'static str) -> AdviceParams {
    AdviceParams {
        skill,
        level: "beginner",
    }
}

fn stored_entries(store: &InMemoryKvStore, namespace: &CacheNamespace) -> usize {
    let raw = store.get(namespace.key()).unwrap().unwrap();
    let envelope: Value = serde_json::from_str(&raw).unwrap();
    envelope["entries"].as_object().unwrap().len()
}

/// Transport answering from a script and counting calls.
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, FetchError>>>,
    calls: Mutex<usize>,
}

impl ScriptedTransport {
    fn new(steps: Vec<Result<HttpResponse, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            calls: Mutex::new(0),
        })
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, _request: &FetchRequest) -> Result<HttpResponse, FetchError> {
        *self.calls.lock().unwrap() += 1;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Other("script exhausted".to_string())))
    }
}

fn no_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 1,
        ..RetryConfig::default()
    }
}

// ============================================================================
// SECTION: Cache Tests
// ============================================================================

#[test]
fn entry_is_served_until_ttl_elapses() {
    let (_store, clock, cache) = setup();
    let namespace = CacheNamespace::AiAdvice;
    cache.write(&namespace, &params("drop shot"), &advice("stay low"));

    clock.advance(TTL - Duration::from_millis(1));
    assert_eq!(cache.read::<_, Advice>(&namespace, &params("drop shot")), Some(advice("stay low")));

    clock.advance(Duration::from_millis(1));
    assert_eq!(cache.read::<_, Advice>(&namespace, &params("drop shot")), None);
}

#[test]
fn entry_stamped_in_the_future_is_stale_and_pruned() {
    let (store, clock, cache) = setup();
    let namespace = CacheNamespace::AiAdvice;
    cache.write(&namespace, &params("lob"), &advice("high and deep"));

    clock.set(Timestamp::from_unix_millis(START - 1));
    assert_eq!(cache.read::<_, Advice>(&namespace, &params("lob")), None);

    cache.write(&namespace, &params("drive"), &advice("straight"));
    assert_eq!(stored_entries(&store, &namespace), 1);
}

#[test]
fn fingerprints_expire_independently() {
    let (_store, clock, cache) = setup();
    let namespace = CacheNamespace::AiAdvice;
    cache.write(&namespace, &params("boast"), &advice("open the racket"));
    clock.advance(Duration::from_secs(1_800));
    cache.write(&namespace, &params("volley"), &advice("short swing"));
    clock.advance(Duration::from_secs(1_900));

    assert_eq!(cache.read::<_, Advice>(&namespace, &params("boast")), None);
    assert_eq!(cache.read::<_, Advice>(&namespace, &params("volley")), Some(advice("short swing")));
}

#[test]
fn field_order_does_not_change_fingerprint() {
    let (_store, _clock, cache) = setup();
    let namespace = CacheNamespace::YouTube;
    cache.write(&namespace, &params("serve"), &advice("lob it"));

    let reordered = ReorderedParams {
        level: "beginner",
        skill: "serve",
    };
    assert_eq!(cache.read::<_, Advice>(&namespace, &reordered), Some(advice("lob it")));
}

#[test]
fn namespaces_are_isolated() {
    let (store, _clock, cache) = setup();
    cache.write(&CacheNamespace::AiAdvice, &params("serve"), &advice("aim high"));

    assert_eq!(cache.read::<_, Advice>(&CacheNamespace::YouTube, &params("serve")), None);
    assert!(store.get("AI_ADVICE_CACHE").unwrap().is_some());
    assert!(store.get("YOUTUBE_CACHE").unwrap().is_none());
}

#[test]
fn write_prunes_expired_entries() {
    let (store, clock, cache) = setup();
    let namespace = CacheNamespace::AiAdvice;
    cache.write(&namespace, &params("boast"), &advice("a"));
    cache.write(&namespace, &params("drive"), &advice("b"));
    assert_eq!(stored_entries(&store, &namespace), 2);

    clock.advance(TTL);
    cache.write(&namespace, &params("volley"), &advice("c"));
    assert_eq!(stored_entries(&store, &namespace), 1);
}

#[test]
fn corrupt_or_unknown_envelope_is_a_miss_and_is_overwritten() {
    let (store, _clock, cache) = setup();
    let namespace = CacheNamespace::AiAdvice;

    store.set(namespace.key(), "{not json").unwrap();
    assert_eq!(cache.read::<_, Advice>(&namespace, &params("serve")), None);

    store.set(namespace.key(), r#"{"version":2,"entries":{}}"#).unwrap();
    assert_eq!(cache.read::<_, Advice>(&namespace, &params("serve")), None);

    cache.write(&namespace, &params("serve"), &advice("fresh"));
    assert_eq!(cache.read::<_, Advice>(&namespace, &params("serve")), Some(advice("fresh")));
}

#[test]
fn payload_of_unexpected_shape_is_a_miss() {
    let (_store, _clock, cache) = setup();
    let namespace = CacheNamespace::Custom("DRILLS_CACHE".to_string());
    cache.write(&namespace, &params("serve"), &json!({ "tips": "not a list" }));

    assert_eq!(cache.read::<_, Advice>(&namespace, &params("serve")), None);
}

#[test]
fn invalidate_drops_namespace() {
    let (store, _clock, cache) = setup();
    let namespace = CacheNamespace::YouTube;
    cache.write(&namespace, &params("serve"), &advice("x"));
    cache.invalidate(&namespace);

    assert!(store.get(namespace.key()).unwrap().is_none());
    assert_eq!(cache.read::<_, Advice>(&namespace, &params("serve")), None);
}

#[test]
fn namespace_keys_round_trip() {
    for namespace in [
        CacheNamespace::AiAdvice,
        CacheNamespace::YouTube,
        CacheNamespace::Custom("DRILLS_CACHE".to_string()),
    ] {
        assert_eq!(CacheNamespace::from_key(namespace.key()), namespace);
        assert_eq!(namespace.to_string(), namespace.key());
    }
}

// ============================================================================
// SECTION: Fetcher Tests
// ============================================================================

#[tokio::test]
async fn fetcher_serves_repeat_requests_from_cache() {
    let (_store, _clock, cache) = setup();
    let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(
        200,
        r#"{"tips":["watch the ball"]}"#,
    ))]);
    let fetcher = CachedJsonFetcher::new(FetchClient::new(transport.clone()), cache);
    let request = FetchRequest::post_json("https://coach.example/advice", json!({"skill": "serve"}));
    let namespace = CacheNamespace::AiAdvice;

    let first: Advice =
        fetcher.fetch(&namespace, &params("serve"), &request, &no_retry()).await.unwrap();
    let second: Advice =
        fetcher.fetch(&namespace, &params("serve"), &request, &no_retry()).await.unwrap();

    assert_eq!(first, advice("watch the ball"));
    assert_eq!(second, first);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn fetcher_does_not_cache_failures() {
    let (store, _clock, cache) = setup();
    let transport = ScriptedTransport::new(vec![
        Ok(HttpResponse::new(404, "missing")),
        Ok(HttpResponse::new(200, r#"{"tips":["recover to the T"]}"#)),
    ]);
    let fetcher = CachedJsonFetcher::new(FetchClient::new(transport.clone()), cache);
    let request = FetchRequest::get("https://coach.example/advice?skill=drive");
    let namespace = CacheNamespace::AiAdvice;

    let failed = fetcher.fetch::<_, Advice>(&namespace, &params("drive"), &request, &no_retry()).await;
    assert_eq!(failed.unwrap_err().http_status(), Some(404));
    assert!(store.get(namespace.key()).unwrap().is_none());

    let ok: Advice =
        fetcher.fetch(&namespace, &params("drive"), &request, &no_retry()).await.unwrap();
    assert_eq!(ok, advice("recover to the T"));
    assert_eq!(transport.calls(), 2);
}
