// crates/rally-core/src/error.rs
// ============================================================================
// Module: Rally Storage Errors
// Description: Typed failures raised by persistence backends.
// Purpose: Give every store implementation one error surface for callers.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Storage failures are reported through [`StorageError`]. Backends must leave
//! persisted state unchanged when they return an error, so callers never need
//! to reason about partial success.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Persistence engine failures.
///
/// # Invariants
/// - Messages never embed stored values, only keys and engine diagnostics.
/// - Returning an error implies the operation had no observable effect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Filesystem or handle failure.
    #[error("storage io error: {0}")]
    Io(String),
    /// Storage engine rejected or failed a statement.
    #[error("storage db error: {0}")]
    Db(String),
    /// Persisted data could not be interpreted.
    #[error("storage invalid data: {0}")]
    Invalid(String),
    /// Persisted schema version is not supported by this build.
    #[error("storage version mismatch: {0}")]
    VersionMismatch(String),
}
