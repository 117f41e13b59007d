// crates/rally-fetch/src/error.rs
// ============================================================================
// Module: Fetch Errors
// Description: Typed failures for outbound requests and their retry class.
// Purpose: Decide which failures are worth another attempt.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`FetchError`] carries enough detail to classify a failure as transient
//! or terminal without inspecting transport internals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Message fragments that mark an otherwise unclassified failure as transient.
/// Matched case-insensitively.
const TRANSIENT_FRAGMENTS: [&str; 4] =
    ["network request failed", "failed to fetch", "econnrefused", "etimedout"];

// ============================================================================
// SECTION: Error
// ============================================================================

/// Outbound request failures.
///
/// # Invariants
/// - Variants are stable for retry classification and user messaging.
/// - `Network { status: None }` means no HTTP response was received.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The attempt did not complete within its timeout.
    #[error("request timed out")]
    Timeout,
    /// Transport failure or non-success HTTP status.
    #[error("network error: {message}")]
    Network {
        /// HTTP status when a response was received.
        status: Option<u16>,
        /// Failure description.
        message: String,
    },
    /// A success response carried a body that was not the expected JSON.
    #[error("invalid json response: {0}")]
    InvalidJson(String),
    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Builds a network error for a non-success HTTP status.
    #[must_use]
    pub fn status(code: u16) -> Self {
        Self::Network {
            status: Some(code),
            message: format!("HTTP {code}"),
        }
    }

    /// Builds a network error for a failure with no HTTP response.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Network {
            status: None,
            message: message.into(),
        }
    }

    /// Returns the HTTP status code, if one was received.
    #[must_use]
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Self::Network {
                status, ..
            } => *status,
            _ => None,
        }
    }

    /// Returns true when another attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Network {
                status: Some(code), ..
            } => !((400 .. 500).contains(code) && *code != 429),
            Self::Network {
                status: None, ..
            } => true,
            Self::InvalidJson(_) => false,
            Self::Other(message) => {
                let lowered = message.to_ascii_lowercase();
                TRANSIENT_FRAGMENTS.iter().any(|fragment| lowered.contains(fragment))
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
