//! Application error types for cgm-relay
//!
//! This module defines the error taxonomy shared by the sync scheduler,
//! the retry executor, and connector implementations. All error types use
//! `thiserror` for ergonomic error handling.
//!
//! Retriability is a closed decision table ([`RetryableError`]) rather than
//! a predicate left to callers: silently retrying a non-idempotent request
//! against a vendor API is a correctness hazard, so every variant makes an
//! explicit choice.

use thiserror::Error;

/// Synchronization-related errors
///
/// Covers everything a connector's sync operation can report back to the
/// scheduler. The scheduler itself does not distinguish failure causes,
/// only success/failure; the distinction matters inside
/// [`crate::sync::RetryExecutor`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// Network timeout
    #[error("Network timeout")]
    NetworkTimeout,

    /// Connection refused by the upstream endpoint
    #[error("Connection refused")]
    ConnectionRefused,

    /// Transport-level connection reset
    #[error("Connection reset")]
    ConnectionReset,

    /// Rate limited by the vendor cloud
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Server error
    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    /// Invalid data received from the vendor API
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Resource not found
    #[error("Resource not found")]
    NotFound,

    /// Bad or expired credentials
    #[error("Unauthorized")]
    Unauthorized,

    /// Generic transport error
    #[error("Network error: {0}")]
    Network(String),

    /// Sync aborted because the scheduler was cancelled
    #[error("Cancelled")]
    Cancelled,
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool;
}

impl RetryableError for SyncError {
    fn is_retryable(&self) -> bool {
        match self {
            // Retryable: transient I/O and transport failures
            SyncError::NetworkTimeout => true,
            SyncError::ConnectionRefused => true,
            SyncError::ConnectionReset => true,
            SyncError::RateLimited(_) => true,
            SyncError::ServerError(code) if *code >= 500 => true,
            SyncError::Network(_) => true,

            // Non-retryable: application-level failures and cancellation
            SyncError::InvalidData(_) => false,
            SyncError::NotFound => false,
            SyncError::Unauthorized => false,
            SyncError::ServerError(_) => false, // 4xx errors
            SyncError::Cancelled => false,
        }
    }
}
