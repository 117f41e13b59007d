// crates/rally-fetch/src/lib.rs
// ============================================================================
// Module: Rally Fetch
// Description: Resilient JSON-over-HTTP client for remote collaborators.
// Purpose: Bound, classify, and retry outbound requests.
// Dependencies: async-trait, reqwest, serde, serde_json, thiserror, tokio
// ============================================================================

//! ## Overview
//! [`FetchClient`] issues requests through an [`HttpTransport`], bounds each
//! attempt with a timeout, and retries transient failures with capped
//! exponential backoff. Errors are typed as [`FetchError`]; feature code turns
//! them into short user-facing text with [`user_message`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod client;
pub mod error;
pub mod messages;
pub mod request;
pub mod retry;
pub mod transport;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use client::FetchClient;
pub use error::FetchError;
pub use messages::user_message;
pub use request::FetchRequest;
pub use request::HttpMethod;
pub use request::HttpResponse;
pub use retry::NoopRetryObserver;
pub use retry::RetryConfig;
pub use retry::RetryObserver;
pub use retry::backoff_delay;
pub use transport::HttpTransport;
pub use transport::ReqwestTransport;
