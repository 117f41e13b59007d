// crates/rally-fetch/src/client.rs
// ============================================================================
// Module: Fetch Client
// Description: Timeout-bounded, retrying JSON client over an HttpTransport.
// Purpose: Turn one logical request into a bounded series of attempts.
// Dependencies: serde, tokio, tracing
// ============================================================================

//! ## Overview
//! Each attempt is raced against its timeout; an expired attempt is dropped
//! and reported as [`FetchError::Timeout`]. Non-success statuses become
//! [`FetchError::Network`]. Retryable failures sleep for the backoff delay
//! before the next attempt. Once attempts are exhausted, or a terminal error
//! occurs, the last error is returned unchanged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::warn;

use crate::error::FetchError;
use crate::request::FetchRequest;
use crate::request::HttpResponse;
use crate::retry::NoopRetryObserver;
use crate::retry::RetryConfig;
use crate::retry::RetryObserver;
use crate::retry::backoff_delay;
use crate::transport::HttpTransport;

// ============================================================================
// SECTION: Client
// ============================================================================

/// Retrying JSON client.
///
/// # Invariants
/// - At most `max(retry.max_attempts, 1)` transport calls per logical request.
/// - The observer is called once per retry, before the backoff sleep.
/// - The client-wide observer applies unless a request supplies its own via
///   [`FetchClient::fetch_json_observed`].
#[derive(Clone)]
pub struct FetchClient {
    /// Single-attempt transport.
    transport: Arc<dyn HttpTransport>,
    /// Retry hook.
    observer: Arc<dyn RetryObserver>,
}

impl FetchClient {
    /// Creates a client over `transport` with no retry observer.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            observer: Arc::new(NoopRetryObserver),
        }
    }

    /// Replaces the default retry observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Performs one attempt bounded by `timeout`, returning the raw response
    /// whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Timeout`] when the attempt does not finish in
    /// time, or the transport error.
    pub async fn fetch_with_timeout(
        &self,
        request: &FetchRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, FetchError> {
        match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }

    /// Fetches and decodes a JSON response, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last [`FetchError`] once attempts are exhausted, or the
    /// first terminal error.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: &FetchRequest,
        retry: &RetryConfig,
    ) -> Result<T, FetchError> {
        self.fetch_json_observed(request, retry, self.observer.as_ref()).await
    }

    /// Same as [`FetchClient::fetch_json`], notifying `observer` instead of
    /// the client-wide observer for this request only.
    ///
    /// # Errors
    ///
    /// Returns the last [`FetchError`] once attempts are exhausted, or the
    /// first terminal error.
    pub async fn fetch_json_observed<T: DeserializeOwned>(
        &self,
        request: &FetchRequest,
        retry: &RetryConfig,
        observer: &dyn RetryObserver,
    ) -> Result<T, FetchError> {
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt: u32 = 1;
        loop {
            let error = match self.attempt(request, retry).await {
                Ok(response) => return response.json(),
                Err(error) => error,
            };
            if attempt >= max_attempts || !error.is_retryable() {
                debug!(url = %request.url, attempt, error = %error, "fetch failed");
                return Err(error);
            }
            let delay = backoff_delay(attempt, retry);
            warn!(
                url = %request.url,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "fetch attempt failed; retrying"
            );
            observer.on_retry(attempt, &error, delay);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Runs one attempt and rejects non-success statuses.
    async fn attempt(
        &self,
        request: &FetchRequest,
        retry: &RetryConfig,
    ) -> Result<HttpResponse, FetchError> {
        let response = self.fetch_with_timeout(request, retry.timeout()).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(FetchError::status(response.status))
        }
    }
}
