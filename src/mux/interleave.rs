//! Timestamp-ordered interleaving of the two media streams
//!
//! Video and audio packets arrive on independent threads with independent
//! pacing. Before they go out over the shared connection they must form a
//! single pts-ascending sequence, and a stalled stream must not hold the
//! other back forever.
//!
//! Buffer layout (one merged list, per-channel tail pointers):
//! ```text
//!  head                                              tail
//!   |                                                 |
//!   v                                                 v
//! +------+     +------+     +------+     +------+
//! | a 0  | --> | v 0  | --> | v 33 | --> | a1024|
//! +------+     +------+     +------+     +------+
//!                  ^                         ^
//!              last[video]               last[audio]
//! ```
//!
//! A packet is released when both channels have something buffered, or when
//! the spread between the newest buffered pts and the head pts exceeds the
//! configured delay.

use crate::error::{MuxError, Result};
use crate::media::{Packet, StreamKind};

/// Default staleness bound in media time units
pub const DEFAULT_MAX_INTERLEAVE_DELAY: u64 = 1000;

/// Video and audio
const CHANNELS: usize = 2;

/// Release sink. Return false to stop draining.
pub type ReleaseCallback = Box<dyn FnMut(Packet) -> bool + Send>;

fn channel_index(kind: StreamKind) -> usize {
    debug_assert!(matches!(kind, StreamKind::Video | StreamKind::Audio));
    match kind {
        StreamKind::Video => 0,
        _ => 1,
    }
}

struct Node {
    packet: Packet,
    next: Option<usize>,
}

/// Two-channel interleaving buffer with a bounded-latency flush policy
///
/// Nodes live in a slot arena and link by index. `head`/`tail` bound the
/// merged pts-ascending list; `last` tracks each channel's most recent
/// insertion so near-sorted input inserts in O(1).
pub struct InterleaveBuffer {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    last: [Option<usize>; CHANNELS],
    max_interleave_delay: u64,
    release: Option<ReleaseCallback>,
    buffered: usize,
}

impl InterleaveBuffer {
    /// Create a buffer with the given staleness bound. A bound of 0 disables
    /// forced output; packets then wait for the peer channel indefinitely.
    pub fn new(max_interleave_delay: u64) -> Self {
        InterleaveBuffer {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            last: [None; CHANNELS],
            max_interleave_delay,
            release: None,
            buffered: 0,
        }
    }

    /// Register the release sink
    pub fn set_release_callback<F>(&mut self, callback: F)
    where
        F: FnMut(Packet) -> bool + Send + 'static,
    {
        self.release = Some(Box::new(callback));
    }

    /// Number of packets currently buffered
    pub fn len(&self) -> usize {
        self.buffered
    }

    pub fn is_empty(&self) -> bool {
        self.buffered == 0
    }

    /// Insert a packet, then release every head that becomes eligible.
    ///
    /// Returns the number of packets handed to the callback. Fails when the
    /// callback requests early termination; the packet being delivered at
    /// that point is gone, not re-queued.
    pub fn add_packet(&mut self, packet: Packet) -> Result<usize> {
        self.insert(packet);

        let mut released = 0;
        while let Some(out) = self.next_eligible() {
            released += 1;
            if let Some(callback) = self.release.as_mut() {
                if !callback(out) {
                    return Err(MuxError::ReleaseAborted.into());
                }
            }
        }
        Ok(released)
    }

    /// Drop everything buffered without invoking the release callback
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.last = [None; CHANNELS];
        self.buffered = 0;
    }

    /// Splice a packet into the merged list at its pts position.
    ///
    /// The cursor starts at the link following the channel's previous
    /// insertion. When the incoming packet sorts at or after the global
    /// tail it appends there directly; otherwise it walks forward past
    /// entries with pts <= incoming pts, which keeps equal-pts packets in
    /// arrival order.
    fn insert(&mut self, packet: Packet) {
        let channel = channel_index(packet.kind);
        let pts = packet.pts;
        let idx = self.alloc(packet);

        let mut prev = self.last[channel];
        let mut at = match prev {
            Some(p) => self.next_of(p),
            None => self.head,
        };

        if at.is_some() {
            let tail_sorts_after = self
                .tail
                .and_then(|t| self.pts_of(t))
                .map(|tail_pts| tail_pts > pts)
                .unwrap_or(false);

            if tail_sorts_after {
                while let Some(n) = at {
                    match self.pts_of(n) {
                        Some(node_pts) if node_pts > pts => break,
                        _ => {
                            prev = Some(n);
                            at = self.next_of(n);
                        }
                    }
                }
            } else {
                prev = self.tail;
                at = None;
            }
        }

        if at.is_none() {
            self.tail = Some(idx);
        }

        if let Some(node) = self.slot_mut(idx) {
            node.next = at;
        }
        match prev {
            Some(p) => {
                if let Some(node) = self.slot_mut(p) {
                    node.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }
        self.last[channel] = Some(idx);
    }

    /// Evaluate the flush policy and pop the head if a release is due
    fn next_eligible(&mut self) -> Option<Packet> {
        let stream_count = self.last.iter().filter(|l| l.is_some()).count();
        let mut flush = stream_count == CHANNELS;

        if !flush && self.max_interleave_delay > 0 {
            if let Some(head_pts) = self.head.and_then(|h| self.pts_of(h)) {
                let mut delta_pts = 0;
                for last in self.last.iter().flatten() {
                    if let Some(last_pts) = self.pts_of(*last) {
                        delta_pts = delta_pts.max(last_pts.saturating_sub(head_pts));
                    }
                }

                if delta_pts > self.max_interleave_delay {
                    tracing::warn!(
                        delta_pts = delta_pts,
                        max_delay = self.max_interleave_delay,
                        "Delay between first and last queued packet exceeds limit, forcing output"
                    );
                    flush = true;
                }
            }
        }

        if flush {
            self.pop_head()
        } else {
            None
        }
    }

    fn pop_head(&mut self) -> Option<Packet> {
        let head_idx = self.head?;
        let node = self.slots.get_mut(head_idx).and_then(|s| s.take())?;
        self.free.push(head_idx);
        self.buffered -= 1;

        self.head = node.next;
        if self.head.is_none() {
            self.tail = None;
        }

        let channel = channel_index(node.packet.kind);
        if self.last[channel] == Some(head_idx) {
            self.last[channel] = None;
        }

        Some(node.packet)
    }

    fn alloc(&mut self, packet: Packet) -> usize {
        self.buffered += 1;
        let node = Node { packet, next: None };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    fn slot_mut(&mut self, idx: usize) -> Option<&mut Node> {
        self.slots.get_mut(idx).and_then(|s| s.as_mut())
    }

    fn pts_of(&self, idx: usize) -> Option<u64> {
        self.slots
            .get(idx)
            .and_then(|s| s.as_ref())
            .map(|n| n.packet.pts)
    }

    fn next_of(&self, idx: usize) -> Option<usize> {
        self.slots
            .get(idx)
            .and_then(|s| s.as_ref())
            .and_then(|n| n.next)
    }
}

impl Default for InterleaveBuffer {
    fn default() -> Self {
        InterleaveBuffer::new(DEFAULT_MAX_INTERLEAVE_DELAY)
    }
}
