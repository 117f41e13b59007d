// crates/rally-fetch/src/transport.rs
// ============================================================================
// Module: HTTP Transport
// Description: Transport seam and its reqwest implementation.
// Purpose: Perform a single request attempt with no retry logic.
// Dependencies: async-trait, reqwest
// ============================================================================

//! ## Overview
//! An [`HttpTransport`] performs exactly one attempt and reports any HTTP
//! status as a response. Timeouts and retries are applied by the client. The
//! reqwest transport enforces a hard response size limit while streaming the
//! body.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use reqwest::Client;
use reqwest::Method;
use reqwest::redirect::Policy;

use crate::error::FetchError;
use crate::request::FetchRequest;
use crate::request::HttpMethod;
use crate::request::HttpResponse;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum response body size accepted by the reqwest transport.
pub const MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;
/// Default user agent for outbound requests.
pub const DEFAULT_USER_AGENT: &str = "rally/0.1";
/// Maximum redirects followed.
const MAX_REDIRECTS: usize = 5;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Single-attempt HTTP transport.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends `request` once.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when no response could be obtained.
    async fn send(&self, request: &FetchRequest) -> Result<HttpResponse, FetchError>;
}

// ============================================================================
// SECTION: Reqwest Transport
// ============================================================================

/// Transport backed by an async reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    /// HTTP client.
    client: Client,
    /// Response size limit in bytes.
    max_response_bytes: usize,
}

impl ReqwestTransport {
    /// Builds a transport with the given user agent.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Other`] when the client cannot be constructed.
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent.to_string())
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|err| FetchError::Other(err.to_string()))?;
        Ok(Self {
            client,
            max_response_bytes: MAX_RESPONSE_BYTES,
        })
    }

    /// Overrides the response size limit.
    #[must_use]
    pub const fn with_max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = limit;
        self
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &FetchRequest) -> Result<HttpResponse, FetchError> {
        let mut builder = self.client.request(method_for(request.method), &request.url);
        for (name, value) in request.effective_headers() {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = read_body_with_limit(response, self.max_response_bytes).await?;
        Ok(HttpResponse {
            status,
            body,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a request method onto reqwest.
const fn method_for(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Classifies reqwest failures.
fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_builder() {
        FetchError::Other(err.to_string())
    } else {
        FetchError::transport(err.to_string())
    }
}

/// Reads a response body while enforcing a hard byte limit.
async fn read_body_with_limit(
    mut response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(map_reqwest_error)? {
        let next_total = body.len().saturating_add(chunk.len());
        if next_total > limit {
            return Err(FetchError::Other(format!(
                "response exceeds size limit ({next_total} > {limit})"
            )));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
