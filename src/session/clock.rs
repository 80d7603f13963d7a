//! Per-stream timestamp state
//!
//! Encoders restart with timestamps near zero while the connection's clock
//! keeps running. Each stream carries a cumulative offset that maps raw
//! frame timestamps onto the connection timeline, plus the flag forcing a
//! configuration record before the next payload.

/// Synchronization state for one media stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamClock {
    /// Last raw timestamp seen for this stream
    pub last_timestamp: i64,
    /// Cumulative correction applied to outgoing timestamps
    pub time_offset: i64,
    /// Re-emit decoder configuration before the next payload
    pub needs_config: bool,
}

impl StreamClock {
    pub fn new() -> Self {
        StreamClock {
            last_timestamp: 0,
            time_offset: 0,
            needs_config: true,
        }
    }

    /// True when a raw timestamp jumps backwards past the threshold,
    /// marking the start of a new logical segment
    pub fn is_discontinuity(&self, timestamp: i64, threshold: i64) -> bool {
        timestamp - self.last_timestamp < -threshold
    }

    /// Absolute position of the last frame on the connection timeline
    pub fn last_absolute(&self) -> i64 {
        self.last_timestamp + self.time_offset
    }

    /// Map a raw timestamp onto the connection timeline.
    ///
    /// A negative result can only come from offset reconciliation pulling a
    /// stream backwards past zero; it clamps rather than wrapping.
    pub fn absolute(&self, timestamp: i64) -> u64 {
        (timestamp + self.time_offset).max(0) as u64
    }
}

impl Default for StreamClock {
    fn default() -> Self {
        StreamClock::new()
    }
}
