//! Publishing statistics
//!
//! Lock-free counters shared across the session, updated on the send
//! path and snapshotted on demand.

pub mod metrics;

pub use metrics::{PublishStats, StatsHandle};
