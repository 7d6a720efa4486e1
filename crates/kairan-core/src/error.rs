//! Error taxonomy for the core crate.
//!
//! Storage backends convert their own error types into [`StoreError`] at
//! the trait boundary; external-service failures (push, previews) have
//! their own types and are never folded into store results.

use thiserror::Error;

/// Error returned by [`crate::traits::CommunityStore`] implementations
/// and everything layered on top of them.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller may not act on content they do not own.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A write conflicted in a way uniqueness constraints could not absorb.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backend-specific failure (connection, query, migration).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Row data could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for store-backed operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error from the external push gateway.
///
/// The fan-out engine logs and swallows these; they never propagate to
/// the write path that triggered delivery.
#[derive(Error, Debug)]
pub enum PushError {
    #[error("push gateway request failed: {0}")]
    Request(String),

    #[error("push gateway returned status {0}")]
    Status(u16),

    #[error("push gateway request timed out")]
    Timeout,
}
