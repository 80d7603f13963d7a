//! Session configuration

use crate::mux::DEFAULT_MAX_INTERLEAVE_DELAY;

/// Chunk size announced to the server at session start
pub const DEFAULT_CHUNK_SIZE: u32 = 2048;

/// Largest chunk size the protocol can express
pub const MAX_CHUNK_SIZE: u32 = 0xFF_FFFF;

/// Backward jump treated as a new logical segment, in media time units
pub const DEFAULT_DISCONTINUITY_THRESHOLD: i64 = 300;

/// Publishing session options
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Longest a packet may wait for the peer stream before forced output
    pub max_interleave_delay: u64,

    /// Backward timestamp jump that starts a new logical segment
    pub discontinuity_threshold: i64,

    /// Outgoing chunk size, announced when it differs from the protocol
    /// default
    pub chunk_size: u32,

    /// Capacity of the session event channel
    pub event_capacity: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_interleave_delay: DEFAULT_MAX_INTERLEAVE_DELAY,
            discontinuity_threshold: DEFAULT_DISCONTINUITY_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            event_capacity: 256,
        }
    }
}

impl PublishConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the staleness bound for the interleaving buffer (0 disables
    /// forced output)
    pub fn max_interleave_delay(mut self, delay: u64) -> Self {
        self.max_interleave_delay = delay;
        self
    }

    /// Set the discontinuity threshold
    pub fn discontinuity_threshold(mut self, threshold: i64) -> Self {
        self.discontinuity_threshold = threshold;
        self
    }

    /// Set the outgoing chunk size
    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.min(MAX_CHUNK_SIZE);
        self
    }

    /// Set the event channel capacity
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
