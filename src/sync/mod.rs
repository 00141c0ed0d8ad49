//! Data synchronization infrastructure
//!
//! This module provides the machinery for pulling data from unreliable
//! vendor cloud APIs: adaptive per-connector scheduling, bounded retries,
//! and backoff calculation.
//!
//! # Components
//!
//! - [`backoff`]: delay calculation with exponential growth, ceiling, and jitter
//! - [`retry`]: bounded retry of a single async operation with transient-failure classification
//! - [`scheduler`]: the adaptive polling state machine driving each connector
//!
//! # Example
//!
//! ```ignore
//! use cgm_relay::config::ConnectorConfig;
//! use cgm_relay::metrics::MetricsAggregator;
//! use cgm_relay::sync::{ConnectorRuntime, RetryExecutor};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let mut runtime = ConnectorRuntime::new(cancel.clone());
//!
//! // `DexcomSync` implements SyncOperation, typically using RetryExecutor
//! // internally for transient HTTP failures within one attempt.
//! let handle = runtime.add_connector(
//!     "dexcom",
//!     ConnectorConfig::default(),
//!     dexcom_sync,
//!     metrics,
//! );
//!
//! tokio::spawn(runtime.run());
//! ```

pub mod backoff;
pub mod retry;
pub mod scheduler;

// Re-export main types for convenience
pub use backoff::BackoffCalculator;
pub use retry::RetryExecutor;
pub use scheduler::{
    ConnectionState, ConnectorRuntime, SchedulerHandle, SyncOperation, SyncScheduler,
};
