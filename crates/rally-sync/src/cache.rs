// crates/rally-sync/src/cache.rs
// ============================================================================
// Module: Response Cache
// Description: TTL cache of remote JSON responses persisted in the KV store.
// Purpose: Avoid repeat remote calls for identical requests.
// Dependencies: rally-core, serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! Each namespace is one key/value entry holding a versioned envelope:
//!
//! ```json
//! { "version": 1, "entries": { "<fingerprint>": { "stored_at": 0, "payload": {} } } }
//! ```
//!
//! Entries are keyed by the canonical fingerprint of the request params and
//! carry their own `stored_at`, so each fingerprint expires independently.
//! Writes prune expired entries of the namespace. The cache never returns an
//! error: storage or decode failures are logged and behave as a miss or a
//! skipped write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rally_core::Clock;
use rally_core::Fingerprint;
use rally_core::KeyValueStore;
use rally_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default entry time-to-live.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3_600);
/// Envelope format version.
const ENVELOPE_VERSION: u32 = 1;

// ============================================================================
// SECTION: Namespaces
// ============================================================================

/// Cache namespace; one KV entry per namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// Coaching advice responses.
    AiAdvice,
    /// Video search responses.
    YouTube,
    /// Caller-defined namespace key.
    Custom(String),
}

impl CacheNamespace {
    /// Returns the KV key for this namespace.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::AiAdvice => "AI_ADVICE_CACHE",
            Self::YouTube => "YOUTUBE_CACHE",
            Self::Custom(key) => key,
        }
    }

    /// Maps a key back to a namespace, recognizing the built-in keys.
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        match key {
            "AI_ADVICE_CACHE" => Self::AiAdvice,
            "YOUTUBE_CACHE" => Self::YouTube,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// Persisted namespace envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEnvelope {
    /// Format version.
    version: u32,
    /// Entries by fingerprint.
    entries: BTreeMap<String, CacheEntry>,
}

impl CacheEnvelope {
    /// Creates an empty envelope.
    const fn empty() -> Self {
        Self {
            version: ENVELOPE_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

/// One cached response.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    /// Store time.
    stored_at: Timestamp,
    /// Cached response.
    payload: Value,
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Fingerprint-keyed TTL cache over a key/value store.
///
/// # Invariants
/// - An entry is served only while `0 <= now - stored_at < ttl`; an entry
///   stamped in the future (clock moved backwards) is stale.
/// - No method returns an error or panics on bad persisted data.
#[derive(Clone)]
pub struct ResponseCache {
    /// Backing store.
    store: Arc<dyn KeyValueStore>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Entry time-to-live in milliseconds.
    ttl_ms: i64,
}

impl ResponseCache {
    /// Creates a cache with the given time-to-live.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// Returns the fresh cached value for `params`, if any.
    #[must_use]
    pub fn read<P, T>(&self, namespace: &CacheNamespace, params: &P) -> Option<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let fingerprint = fingerprint_of(namespace, params)?;
        let envelope = self.load(namespace)?;
        let entry = envelope.entries.get(fingerprint.as_str())?;
        if !self.is_fresh(entry.stored_at, self.clock.now()) {
            debug!(namespace = %namespace, "cache entry expired");
            return None;
        }
        match serde_json::from_value(entry.payload.clone()) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(namespace = %namespace, error = %err, "cached payload has unexpected shape");
                None
            }
        }
    }

    /// Stores `value` for `params`, pruning expired entries of the namespace.
    pub fn write<P, T>(&self, namespace: &CacheNamespace, params: &P, value: &T)
    where
        P: Serialize,
        T: Serialize,
    {
        let Some(fingerprint) = fingerprint_of(namespace, params) else {
            return;
        };
        let payload = match serde_json::to_value(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(namespace = %namespace, error = %err, "cache payload not serializable");
                return;
            }
        };
        let now = self.clock.now();
        let mut envelope = self.load(namespace).unwrap_or_else(CacheEnvelope::empty);
        envelope.entries.retain(|_, entry| self.is_fresh(entry.stored_at, now));
        envelope.entries.insert(
            fingerprint.as_str().to_string(),
            CacheEntry {
                stored_at: now,
                payload,
            },
        );
        let encoded = match serde_json::to_string(&envelope) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(namespace = %namespace, error = %err, "cache envelope not serializable");
                return;
            }
        };
        if let Err(err) = self.store.set(namespace.key(), &encoded) {
            warn!(namespace = %namespace, error = %err, "cache write skipped");
        }
    }

    /// Drops every entry of `namespace`.
    pub fn invalidate(&self, namespace: &CacheNamespace) {
        if let Err(err) = self.store.remove(namespace.key()) {
            warn!(namespace = %namespace, error = %err, "cache invalidate failed");
        }
    }

    /// Returns true when an entry stored at `stored_at` is still fresh at `now`.
    fn is_fresh(&self, stored_at: Timestamp, now: Timestamp) -> bool {
        (0 .. self.ttl_ms).contains(&now.millis_since(stored_at))
    }

    /// Loads and decodes a namespace envelope; unreadable data is a miss.
    fn load(&self, namespace: &CacheNamespace) -> Option<CacheEnvelope> {
        let raw = match self.store.get(namespace.key()) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(namespace = %namespace, error = %err, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str::<CacheEnvelope>(&raw) {
            Ok(envelope) if envelope.version == ENVELOPE_VERSION => Some(envelope),
            Ok(envelope) => {
                warn!(namespace = %namespace, version = envelope.version, "unknown cache version");
                None
            }
            Err(err) => {
                warn!(namespace = %namespace, error = %err, "cache envelope unreadable");
                None
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Fingerprints params, logging failures.
fn fingerprint_of<P: Serialize>(namespace: &CacheNamespace, params: &P) -> Option<Fingerprint> {
    match Fingerprint::of(params) {
        Ok(fingerprint) => Some(fingerprint),
        Err(err) => {
            warn!(namespace = %namespace, error = %err, "cache params not fingerprintable");
            None
        }
    }
}
