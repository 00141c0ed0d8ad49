//! Per-connector sync metrics
//!
//! This module provides [`MetricsAggregator`], a concurrent aggregator that
//! tracks how much data each connector has pulled in, broken down by data
//! type, with a 24-hour rolling window and a bounded history of recent entry
//! timestamps. One instance is created per connector at process start and is
//! shared between the connector's sync operation (writer) and a status or
//! dashboard endpoint (reader).
//!
//! The hot path (`track_items`) is lock-free aside from a short read lock on
//! the counter maps: every counter update is a single atomic add, and the
//! `last_entry_time` watermark advances through a compare-and-swap loop so a
//! count arriving out of order can never move it backward.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Maximum number of entry timestamps retained by the recent-history ring
pub const RECENT_TIMESTAMP_CAPACITY: usize = 50;

/// Width of the rolling window, in hour buckets
const WINDOW_HOURS: u64 = 24;

/// Category of synced data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// CGM glucose readings
    Glucose,
    /// Insulin dosing records (bolus/basal)
    Insulin,
    /// Carbohydrate / meal entries
    Carbs,
    /// Pump or sensor device status records
    DeviceStatus,
}

/// Concurrent per-connector metrics aggregator
///
/// All operations are safe under concurrent callers. Counters are
/// monotonically increasing and are cleared only by an explicit
/// administrative [`reset`](MetricsAggregator::reset), never by the
/// scheduler.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    /// Total items per data type, never reset except by `reset()`
    totals: RwLock<HashMap<DataType, AtomicU64>>,

    /// Rolling-window buckets keyed by (data type, whole hours since epoch)
    hourly: RwLock<HashMap<(DataType, u64), AtomicU32>>,

    /// Bounded history of entry timestamps, oldest first
    recent: Mutex<VecDeque<SystemTime>>,

    /// Newest entry timestamp seen, in millis since epoch; 0 = never
    last_entry_ms: AtomicU64,

    /// Time of the last successful sync, in millis since epoch; 0 = never
    last_sync_ms: AtomicU64,
}

/// Integer number of whole hours between the Unix epoch and `ts`
///
/// Dense, comparable bucket key for the rolling window; no time-series
/// store required.
fn hour_key(ts: SystemTime) -> u64 {
    ts.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() / 3600
}

fn epoch_millis(ts: SystemTime) -> u64 {
    ts.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl MetricsAggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` synced items of the given type
    ///
    /// No-op when `count` is zero. `latest_timestamp` is the newest entry
    /// timestamp in the batch; it defaults to now and only advances
    /// `last_entry_time` if it is strictly newer than the current watermark.
    pub fn track_items(
        &self,
        data_type: DataType,
        count: u64,
        latest_timestamp: Option<SystemTime>,
    ) {
        self.track_items_at(data_type, count, latest_timestamp, SystemTime::now());
    }

    fn track_items_at(
        &self,
        data_type: DataType,
        count: u64,
        latest_timestamp: Option<SystemTime>,
        now: SystemTime,
    ) {
        if count == 0 {
            return;
        }

        self.add_to_total(data_type, count);

        let ts = latest_timestamp.unwrap_or(now);
        self.advance_last_entry(ts);
        self.push_recent(ts);

        self.increment_hour_bucket(data_type, hour_key(now), count);
        // Opportunistic cleanup so the bucket map stays bounded
        self.prune_buckets(hour_key(now));
    }

    /// Record that a sync cycle completed successfully
    ///
    /// Unlike `last_entry_time`, this is simply most-recent-call-wins.
    pub fn track_sync(&self) {
        self.last_sync_ms
            .store(epoch_millis(SystemTime::now()), Ordering::SeqCst);
    }

    /// Total items ever recorded for the given type
    pub fn total_items(&self, data_type: DataType) -> u64 {
        let totals = self
            .totals
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        totals
            .get(&data_type)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Point-in-time copy of the totals per data type
    pub fn total_items_breakdown(&self) -> HashMap<DataType, u64> {
        let totals = self
            .totals
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        totals
            .iter()
            .map(|(dt, c)| (*dt, c.load(Ordering::SeqCst)))
            .collect()
    }

    /// Items recorded within the last 24 hours for the given type
    pub fn items_last_24_hours(&self, data_type: DataType) -> u64 {
        self.items_last_24_hours_at(data_type, SystemTime::now())
    }

    fn items_last_24_hours_at(&self, data_type: DataType, now: SystemTime) -> u64 {
        let current_hour = hour_key(now);
        self.prune_buckets(current_hour);

        let cutoff = current_hour.saturating_sub(WINDOW_HOURS);
        let hourly = self
            .hourly
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        hourly
            .iter()
            .filter(|((dt, hour), _)| *dt == data_type && *hour >= cutoff)
            .map(|(_, c)| u64::from(c.load(Ordering::SeqCst)))
            .sum()
    }

    /// Point-in-time copy of the 24-hour counts per data type
    pub fn items_last_24_hours_breakdown(&self) -> HashMap<DataType, u64> {
        self.items_last_24_hours_breakdown_at(SystemTime::now())
    }

    fn items_last_24_hours_breakdown_at(&self, now: SystemTime) -> HashMap<DataType, u64> {
        let current_hour = hour_key(now);
        self.prune_buckets(current_hour);

        let cutoff = current_hour.saturating_sub(WINDOW_HOURS);
        let hourly = self
            .hourly
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut breakdown = HashMap::new();
        for ((dt, hour), c) in hourly.iter() {
            if *hour >= cutoff {
                *breakdown.entry(*dt).or_insert(0) += u64::from(c.load(Ordering::SeqCst));
            }
        }
        breakdown
    }

    /// Up to `n` most recent entry timestamps, newest first
    pub fn recent_entry_timestamps(&self, n: usize) -> Vec<SystemTime> {
        let recent = self
            .recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        recent.iter().rev().take(n).copied().collect()
    }

    /// Newest entry timestamp seen, if any
    pub fn last_entry_time(&self) -> Option<SystemTime> {
        match self.last_entry_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Some(UNIX_EPOCH + Duration::from_millis(ms)),
        }
    }

    /// Time of the last successful sync, if any
    pub fn last_sync_time(&self) -> Option<SystemTime> {
        match self.last_sync_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Some(UNIX_EPOCH + Duration::from_millis(ms)),
        }
    }

    /// Clear all counters, buckets, history, and watermarks
    ///
    /// Administrative operation; coarse locking is acceptable here even
    /// though the hot path avoids it. Fields clear in sequence, so a reader
    /// racing a reset may observe a partially-cleared aggregator, but no
    /// write that starts after `reset` returns is ever lost.
    pub fn reset(&self) {
        self.totals
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        self.hourly
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        self.recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        self.last_entry_ms.store(0, Ordering::SeqCst);
        self.last_sync_ms.store(0, Ordering::SeqCst);
    }

    fn add_to_total(&self, data_type: DataType, count: u64) {
        {
            let totals = self
                .totals
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(c) = totals.get(&data_type) {
                c.fetch_add(count, Ordering::SeqCst);
                return;
            }
        }
        // First count for this type; take the write lock to create the slot
        let mut totals = self
            .totals
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        totals
            .entry(data_type)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(count, Ordering::SeqCst);
    }

    fn increment_hour_bucket(&self, data_type: DataType, hour: u64, count: u64) {
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        {
            let hourly = self
                .hourly
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(c) = hourly.get(&(data_type, hour)) {
                c.fetch_add(count, Ordering::SeqCst);
                return;
            }
        }
        let mut hourly = self
            .hourly
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        hourly
            .entry((data_type, hour))
            .or_insert_with(|| AtomicU32::new(0))
            .fetch_add(count, Ordering::SeqCst);
    }

    /// Advance the entry watermark, never moving it backward
    ///
    /// The compare-and-swap retry loop ensures a concurrent even-newer write
    /// is never overwritten by this one.
    fn advance_last_entry(&self, ts: SystemTime) {
        let new = epoch_millis(ts);
        let _ = self
            .last_entry_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (new > current).then_some(new)
            });
    }

    fn push_recent(&self, ts: SystemTime) {
        let mut recent = self
            .recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if recent.len() == RECENT_TIMESTAMP_CAPACITY {
            recent.pop_front();
        }
        recent.push_back(ts);
    }

    fn prune_buckets(&self, current_hour: u64) {
        let cutoff = current_hour.saturating_sub(WINDOW_HOURS);
        let mut hourly = self
            .hourly
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        hourly.retain(|(_, hour), _| *hour >= cutoff);
    }
}
