//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use async_trait::async_trait;
use cgm_relay::config::ConnectorConfig;
use cgm_relay::error::SyncError;
use cgm_relay::sync::SyncOperation;
use tokio_util::sync::CancellationToken;

/// Scriptable sync operation for integration tests
///
/// Records the backfill argument of every call and returns queued results,
/// falling back to a default once the queue is drained.
pub struct MockSyncOperation {
    calls: Mutex<Vec<Option<SystemTime>>>,
    results: Mutex<VecDeque<Result<(), SyncError>>>,
    default_result: Result<(), SyncError>,
    call_count: AtomicU32,
}

impl MockSyncOperation {
    /// Operation that always succeeds
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            results: Mutex::new(VecDeque::new()),
            default_result: Ok(()),
            call_count: AtomicU32::new(0),
        })
    }

    /// Operation that always fails with a transient error
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            results: Mutex::new(VecDeque::new()),
            default_result: Err(SyncError::NetworkTimeout),
            call_count: AtomicU32::new(0),
        })
    }

    /// Operation that returns the scripted results in order, then succeeds
    pub fn with_results(results: Vec<Result<(), SyncError>>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            results: Mutex::new(results.into()),
            default_result: Ok(()),
            call_count: AtomicU32::new(0),
        })
    }

    /// Number of sync attempts so far
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Backfill arguments of every call, in order
    pub fn calls(&self) -> Vec<Option<SystemTime>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncOperation for MockSyncOperation {
    async fn execute(
        &self,
        backfill_from: Option<SystemTime>,
        _cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        self.calls.lock().unwrap().push(backfill_from);
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_result.clone())
    }
}

/// Connector configuration with short, test-friendly intervals
pub fn test_connector_config(enabled: bool) -> ConnectorConfig {
    ConnectorConfig {
        enabled,
        normal_polling_interval_secs: 100,
        disconnected_polling_interval_secs: 10,
        max_fast_poll_attempts: 3,
        max_backoff_interval_secs: 60,
        standby_check_interval_secs: 30,
        ..ConnectorConfig::default()
    }
}
