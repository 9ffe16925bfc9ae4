//! Crate-wide error type for the search core's public surface.
//!
//! Per-block failures (decryption, parsing, index-build) never reach this
//! type — they are handled locally by the owning strategy and surfaced
//! only through stats counters or debug logs. `SearchCoreError` exists
//! solely for the handful of top-level, caller-visible conditions.

use thiserror::Error;

/// Errors surfaced across the `SearchEngine` façade boundary.
#[derive(Error, Debug)]
pub enum SearchCoreError {
    /// Query was empty/whitespace-only, or `max_results` was non-positive.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A search was invoked before the engine finished initialization.
    #[error("search core not ready: {0}")]
    NotReady(String),

    /// The ledger or off-chain storage collaborator failed to respond.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// No strategy could be executed for the query (the router's
    /// last-resort fallback also failed).
    #[error("search routing failed: {0}")]
    RoutingFailed(String),
}

/// Result alias used at the public façade boundary.
pub type SearchCoreResult<T> = Result<T, SearchCoreError>;
