// crates/rally-fetch/src/messages.rs
// ============================================================================
// Module: User Messages
// Description: Maps fetch failures to short user-facing text.
// Purpose: Keep error wording consistent across features.
// Dependencies: crate::error
// ============================================================================

//! ## Overview
//! Fixed wording for the failures users can act on; everything else gets a
//! generic message unless development mode asks for detail.

use crate::error::FetchError;

/// Returns the user-facing message for `error`. With `detailed` set
/// (development builds), unclassified errors show their raw text.
#[must_use]
pub fn user_message(error: &FetchError, detailed: bool) -> String {
    let fixed = match error {
        FetchError::Timeout => {
            Some("Request timed out. Please check your connection and try again.")
        }
        FetchError::Network {
            status: Some(429), ..
        } => Some("Too many requests. Please try again later."),
        FetchError::Network {
            status: Some(401), ..
        } => Some("Authentication failed. Please check your API key."),
        FetchError::Network {
            status: Some(403), ..
        } => Some("Access denied. Please check your permissions."),
        FetchError::Network {
            status: Some(code), ..
        } if *code >= 500 => Some("Server error. Please try again later."),
        FetchError::Network {
            status: None, ..
        } => Some("No internet connection. Please check your network and try again."),
        _ => None,
    };
    match fixed {
        Some(message) => message.to_string(),
        None if detailed => error.to_string(),
        None => "Something went wrong. Please try again later.".to_string(),
    }
}
