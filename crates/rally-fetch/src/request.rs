// crates/rally-fetch/src/request.rs
// ============================================================================
// Module: Fetch Requests
// Description: Transport-neutral request and response values.
// Purpose: Describe an outbound JSON request and the raw response.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Requests default to a JSON content type; a caller-supplied
//! `Content-Type` header always wins.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::FetchError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header name for request content type.
pub const CONTENT_TYPE: &str = "Content-Type";
/// Default request content type.
pub const JSON_CONTENT_TYPE: &str = "application/json";

// ============================================================================
// SECTION: Request
// ============================================================================

/// HTTP method for an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    /// GET.
    #[default]
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
    /// PATCH.
    Patch,
    /// DELETE.
    Delete,
}

impl HttpMethod {
    /// Returns the method token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// Outbound request.
///
/// # Invariants
/// - Header names are compared case-insensitively when defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Caller-supplied headers.
    pub headers: BTreeMap<String, String>,
    /// Optional JSON body.
    pub body: Option<Value>,
}

impl FetchRequest {
    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Creates a POST request with a JSON body.
    #[must_use]
    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: BTreeMap::new(),
            body: Some(body),
        }
    }

    /// Adds or replaces a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Returns the headers to send: caller headers plus a JSON content type
    /// when the caller did not set one.
    #[must_use]
    pub fn effective_headers(&self) -> BTreeMap<String, String> {
        let mut headers = self.headers.clone();
        if !headers.keys().any(|name| name.eq_ignore_ascii_case(CONTENT_TYPE)) {
            headers.insert(CONTENT_TYPE.to_string(), JSON_CONTENT_TYPE.to_string());
        }
        headers
    }
}

// ============================================================================
// SECTION: Response
// ============================================================================

/// Raw response returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200 .. 300).contains(&self.status)
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidJson`] when the body does not decode as `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        serde_json::from_slice(&self.body).map_err(|err| FetchError::InvalidJson(err.to_string()))
    }
}
