// crates/rally-sync/src/fetcher.rs
// ============================================================================
// Module: Cached JSON Fetcher
// Description: Cache-first composition of ResponseCache and FetchClient.
// Purpose: Serve repeat requests locally and fetch only on a miss.
// Dependencies: rally-fetch, serde, tracing
// ============================================================================

//! ## Overview
//! Only successful fetches are cached; a failed fetch leaves the namespace
//! untouched and returns the raw [`FetchError`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use rally_fetch::FetchClient;
use rally_fetch::FetchError;
use rally_fetch::FetchRequest;
use rally_fetch::RetryConfig;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::cache::CacheNamespace;
use crate::cache::ResponseCache;

// ============================================================================
// SECTION: Fetcher
// ============================================================================

/// Reads through the cache, fetching and storing on a miss.
#[derive(Clone)]
pub struct CachedJsonFetcher {
    /// Remote client.
    client: FetchClient,
    /// Response cache.
    cache: ResponseCache,
}

impl CachedJsonFetcher {
    /// Creates a fetcher.
    #[must_use]
    pub const fn new(client: FetchClient, cache: ResponseCache) -> Self {
        Self {
            client,
            cache,
        }
    }

    /// Returns the underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Returns the cached value for `params`, or fetches `request` and
    /// caches the decoded result.
    ///
    /// # Errors
    ///
    /// Returns the fetch error on a miss that could not be fetched; failed
    /// fetches are not cached.
    pub async fn fetch<P, T>(
        &self,
        namespace: &CacheNamespace,
        params: &P,
        request: &FetchRequest,
        retry: &RetryConfig,
    ) -> Result<T, FetchError>
    where
        P: Serialize + Sync,
        T: Serialize + DeserializeOwned,
    {
        if let Some(hit) = self.cache.read(namespace, params) {
            debug!(namespace = %namespace, "cache hit");
            return Ok(hit);
        }
        let value: T = self.client.fetch_json(request, retry).await?;
        self.cache.write(namespace, params, &value);
        Ok(value)
    }
}
