//! Resilient per-connector sync scheduling
//!
//! This module provides the adaptive polling state machine that drives each
//! cloud connector. The scheduler runs as one long-lived task per connector
//! and decides how and when the next sync attempt happens:
//!
//! - **Standby**: while the connector is administratively disabled, the loop
//!   parks and periodically re-checks the enabled flag.
//! - **Healthy**: zero consecutive failures; polls at the connector's normal
//!   interval.
//! - **Fast poll**: after a failure, polls at a short interval to detect
//!   recovery quickly.
//! - **Backoff**: after an extended outage, escalates the interval
//!   exponentially (base 1.5) up to a ceiling, so a recovering endpoint is
//!   not hammered.
//!
//! On the first success after an outage the scheduler passes the previous
//! success watermark to the sync operation so it can backfill the data
//! missed while disconnected.

use crate::config::ConnectorConfig;
use crate::error::SyncError;
use crate::metrics::MetricsAggregator;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Exponent clamp for the escalated backoff curve
const MAX_ESCALATION_EXPONENT: u32 = 10;

/// One sync attempt against a vendor cloud API
///
/// Injected into the scheduler per connector; the scheduler treats it as
/// opaque. An `Err` is one failed cycle, never fatal. The operation must be
/// idempotent-safe at the scheduler level: the scheduler never retries
/// within a cycle, but [`RetryExecutor`](crate::sync::RetryExecutor) is
/// available for transient failures inside one attempt.
#[async_trait]
pub trait SyncOperation: Send + Sync {
    /// Perform one sync attempt
    ///
    /// `backfill_from` is the watermark of the last successful sync when the
    /// connector is recovering from an outage; the operation should request
    /// data from that point forward instead of only "now". The cancellation
    /// token aborts a long-running call when the scheduler shuts down.
    async fn execute(
        &self,
        backfill_from: Option<SystemTime>,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError>;
}

/// Connection health for one connector
///
/// `was_disconnected` is cleared only on the next *success*, never on
/// entering standby, so a connector disabled while disconnected and later
/// re-enabled performs a backfill cycle.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    /// Failed sync cycles since the last success; 0 means healthy
    pub consecutive_failures: u32,
    /// True once any failure has occurred since the last success
    pub was_disconnected: bool,
    /// Watermark used to compute the backfill start
    pub last_successful_sync: Option<SystemTime>,
    /// True while the connector is administratively disabled
    pub is_in_standby: bool,
}

/// State shared between the scheduler loop and external handles
struct Shared {
    /// Hot-reloadable connector configuration; the lock is short-held and
    /// never crosses an await point
    config: Mutex<ConnectorConfig>,
    /// Wakes the standby wait when the configuration is replaced
    config_changed: Notify,
    state: RwLock<ConnectionState>,
}

/// Cloneable handle for configuration updates and state snapshots
///
/// This is the only path by which anything outside the scheduler's own loop
/// touches its state.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Replace the connector configuration
    ///
    /// Whole-object replacement; takes effect on the next scheduler
    /// decision point. Re-enabling a disabled connector wakes the standby
    /// wait immediately rather than waiting out the check interval.
    pub fn on_configuration_changed(&self, new_config: ConnectorConfig) {
        {
            let mut config = self
                .shared
                .config
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *config = new_config;
        }
        self.shared.config_changed.notify_waiters();
    }

    /// Whether the connector is currently enabled
    pub fn is_enabled(&self) -> bool {
        self.shared
            .config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .enabled
    }

    /// Snapshot of the connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.shared
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Adaptive polling scheduler for one connector
///
/// Strictly sequential: no two sync cycles for the same connector ever
/// overlap, because the next cycle is only scheduled after the previous one
/// completes.
pub struct SyncScheduler {
    name: String,
    shared: Arc<Shared>,
    operation: Arc<dyn SyncOperation>,
    metrics: Arc<MetricsAggregator>,
    cancel: CancellationToken,
}

impl SyncScheduler {
    /// Create a new scheduler for one connector
    pub fn new(
        name: impl Into<String>,
        config: ConnectorConfig,
        operation: Arc<dyn SyncOperation>,
        metrics: Arc<MetricsAggregator>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                config: Mutex::new(config),
                config_changed: Notify::new(),
                state: RwLock::new(ConnectionState::default()),
            }),
            operation,
            metrics,
            cancel,
        }
    }

    /// Get a handle for configuration updates and state snapshots
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run the scheduler until its cancellation token fires
    ///
    /// Failures inside a sync cycle never escape this loop; cancellation is
    /// the only clean exit.
    pub async fn run(self) {
        info!(connector = %self.name, "Starting sync scheduler");

        'outer: loop {
            if self.cancel.is_cancelled() {
                break;
            }

            if !self.is_enabled() && !self.standby().await {
                break;
            }

            // (Re-)entering active: one immediate sync cycle, no initial delay
            self.run_sync_cycle().await;

            loop {
                if self.cancel.is_cancelled() {
                    break 'outer;
                }
                // Re-checked every iteration so a mid-run disable parks the
                // loop, not only a disable at startup
                if !self.is_enabled() {
                    continue 'outer;
                }

                let delay = self.next_delay();
                debug!(
                    connector = %self.name,
                    delay_ms = delay.as_millis(),
                    "Scheduled next sync cycle"
                );

                tokio::select! {
                    _ = self.cancel.cancelled() => break 'outer,
                    _ = tokio::time::sleep(delay) => {}
                }

                self.run_sync_cycle().await;
            }
        }

        info!(connector = %self.name, "Sync scheduler stopped");
    }

    /// Park until re-enabled; returns false if cancelled while parked
    ///
    /// The notification future is registered before the enabled flag is
    /// read, so a configuration change landing between the check and the
    /// wait is picked up on the next iteration rather than lost.
    async fn standby(&self) -> bool {
        info!(connector = %self.name, "Connector disabled, entering standby");
        self.set_standby(true);

        loop {
            let notified = self.shared.config_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_enabled() {
                break;
            }

            let check_interval = self.config_snapshot().standby_check_interval();
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = tokio::time::sleep(check_interval) => {}
                _ = &mut notified => {}
            }
        }

        self.set_standby(false);
        info!(connector = %self.name, "Connector re-enabled, leaving standby");
        true
    }

    /// One sync cycle: compute backfill, invoke the operation, record the outcome
    async fn run_sync_cycle(&self) {
        let backfill_from = {
            let state = self
                .shared
                .state
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if state.was_disconnected {
                state.last_successful_sync
            } else {
                None
            }
        };

        debug!(
            connector = %self.name,
            backfill = backfill_from.is_some(),
            "Starting sync cycle"
        );

        match self.operation.execute(backfill_from, &self.cancel).await {
            Ok(()) => self.record_success(),
            Err(err) => self.record_failure(&err),
        }
    }

    fn record_success(&self) {
        let previous_failures;
        {
            let mut state = self
                .shared
                .state
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            previous_failures = state.consecutive_failures;
            state.last_successful_sync = Some(SystemTime::now());
            state.was_disconnected = false;
            state.consecutive_failures = 0;
        }

        if previous_failures > 0 {
            info!(
                connector = %self.name,
                failed_cycles = previous_failures,
                "Connection restored"
            );
        }
        self.metrics.track_sync();
    }

    fn record_failure(&self, err: &SyncError) {
        let max_fast_poll = self.config_snapshot().max_fast_poll_attempts;

        let failures = {
            let mut state = self
                .shared
                .state
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state.consecutive_failures += 1;
            if state.consecutive_failures == 1 {
                state.was_disconnected = true;
            }
            state.consecutive_failures
        };

        if failures == 1 {
            warn!(
                connector = %self.name,
                error = %err,
                "Sync failed, connection degraded; switching to fast polling"
            );
        } else if failures == max_fast_poll.saturating_add(1) {
            warn!(
                connector = %self.name,
                failed_cycles = failures,
                error = %err,
                "Extended outage, escalating to exponential backoff"
            );
        } else {
            debug!(
                connector = %self.name,
                failed_cycles = failures,
                error = %err,
                "Sync failed"
            );
        }
    }

    /// Delay before the next cycle, derived from connection health
    fn next_delay(&self) -> Duration {
        let config = self.config_snapshot();
        let failures = {
            let state = self
                .shared
                .state
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state.consecutive_failures
        };
        Self::delay_for(failures, &config)
    }

    /// Healthy -> normal interval; fast poll -> short interval; beyond the
    /// fast-poll budget -> exponential escalation (base 1.5, exponent capped)
    /// up to `max_backoff_interval`.
    ///
    /// This curve is keyed off whole failed sync cycles and is deliberately
    /// not [`BackoffCalculator`](crate::sync::BackoffCalculator), whose
    /// per-call curve uses a different base.
    fn delay_for(consecutive_failures: u32, config: &ConnectorConfig) -> Duration {
        if consecutive_failures == 0 {
            return config.normal_polling_interval();
        }
        if consecutive_failures <= config.max_fast_poll_attempts {
            return config.disconnected_polling_interval();
        }

        let exponent =
            (consecutive_failures - config.max_fast_poll_attempts).min(MAX_ESCALATION_EXPONENT);
        let escalated =
            config.disconnected_polling_interval().as_secs_f64() * 1.5f64.powi(exponent as i32);
        let capped = escalated.min(config.max_backoff_interval().as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    fn is_enabled(&self) -> bool {
        self.shared
            .config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .enabled
    }

    fn config_snapshot(&self) -> ConnectorConfig {
        self.shared
            .config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_standby(&self, standby: bool) {
        let mut state = self
            .shared
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.is_in_standby = standby;
    }
}

/// Runtime owning one scheduler task per connector
///
/// Connectors run as sibling tasks, each with its own child cancellation
/// token; cancelling the runtime token stops them all and `run` joins every
/// task before returning.
pub struct ConnectorRuntime {
    schedulers: Vec<SyncScheduler>,
    cancel: CancellationToken,
}

impl ConnectorRuntime {
    /// Create an empty runtime driven by the given cancellation token
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            schedulers: Vec::new(),
            cancel,
        }
    }

    /// Register a connector; returns its handle for configuration updates
    pub fn add_connector(
        &mut self,
        name: impl Into<String>,
        config: ConnectorConfig,
        operation: Arc<dyn SyncOperation>,
        metrics: Arc<MetricsAggregator>,
    ) -> SchedulerHandle {
        let scheduler = SyncScheduler::new(
            name,
            config,
            operation,
            metrics,
            self.cancel.child_token(),
        );
        let handle = scheduler.handle();
        self.schedulers.push(scheduler);
        handle
    }

    /// Run all connector schedulers until the runtime token is cancelled
    ///
    /// A worker that panics is a bug, not an operational failure: the panic
    /// is logged at error severity and resumed so the hosting process sees
    /// the crash.
    pub async fn run(self) {
        info!(connectors = self.schedulers.len(), "Starting connector runtime");

        let mut handles = Vec::new();
        for scheduler in self.schedulers {
            handles.push(tokio::spawn(scheduler.run()));
        }

        self.cancel.cancelled().await;

        for handle in handles {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    error!(error = %err, "Sync worker crashed");
                    std::panic::resume_unwind(err.into_panic());
                }
            }
        }

        info!("Connector runtime stopped");
    }
}
