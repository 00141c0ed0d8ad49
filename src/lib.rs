//! cgm-relay - Resilient synchronization core for CGM and pump cloud connectors
//!
//! This crate provides the scheduling, retry, and metrics machinery used by
//! connector services that pull glucose/pump data from third-party cloud APIs
//! and republish it locally. Vendor-specific HTTP clients, persistence, and
//! the dashboard are external consumers; this crate only decides how and when
//! a sync attempt is scheduled, retried, and measured.

pub mod config;
pub mod error;
pub mod metrics;
pub mod sync;
