//! Statistics for publishing sessions
//!
//! Counters are updated from both encode worker threads, so the live state
//! lives behind a cloneable handle with atomic fields. Readers take a
//! point-in-time snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Point-in-time snapshot of session counters
#[derive(Debug, Clone, Default)]
pub struct PublishStats {
    /// Total payload bytes handed to the transport
    pub bytes_sent: u64,
    /// Chunks sent successfully
    pub packets_sent: u64,
    /// Failed chunk sends
    pub send_failures: u64,
    /// Video frames packetized
    pub video_frames: u64,
    /// Audio frames packetized
    pub audio_frames: u64,
    /// Keyframes seen
    pub keyframes: u64,
    /// Configuration records emitted
    pub config_records: u64,
    /// Backward timestamp jumps handled
    pub discontinuities: u64,
    /// Time since the session started
    pub duration: Duration,
}

impl PublishStats {
    /// Outgoing bitrate estimate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration.as_secs();
        if secs > 0 {
            (self.bytes_sent * 8) / secs
        } else {
            0
        }
    }
}

struct Counters {
    started_at: Instant,
    bytes_sent: AtomicU64,
    packets_sent: AtomicU64,
    send_failures: AtomicU64,
    video_frames: AtomicU64,
    audio_frames: AtomicU64,
    keyframes: AtomicU64,
    config_records: AtomicU64,
    discontinuities: AtomicU64,
}

/// Shared recorder for session counters
///
/// Clones share the same underlying counters.
#[derive(Clone)]
pub struct StatsHandle {
    inner: Arc<Counters>,
}

impl StatsHandle {
    pub fn new() -> Self {
        StatsHandle {
            inner: Arc::new(Counters {
                started_at: Instant::now(),
                bytes_sent: AtomicU64::new(0),
                packets_sent: AtomicU64::new(0),
                send_failures: AtomicU64::new(0),
                video_frames: AtomicU64::new(0),
                audio_frames: AtomicU64::new(0),
                keyframes: AtomicU64::new(0),
                config_records: AtomicU64::new(0),
                discontinuities: AtomicU64::new(0),
            }),
        }
    }

    pub fn record_send(&self, bytes: usize) {
        self.inner.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.inner.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_failure(&self) {
        self.inner.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_video_frame(&self, keyframe: bool) {
        self.inner.video_frames.fetch_add(1, Ordering::Relaxed);
        if keyframe {
            self.inner.keyframes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_audio_frame(&self) {
        self.inner.audio_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_config(&self) {
        self.inner.config_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discontinuity(&self) {
        self.inner.discontinuities.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PublishStats {
        PublishStats {
            bytes_sent: self.inner.bytes_sent.load(Ordering::Relaxed),
            packets_sent: self.inner.packets_sent.load(Ordering::Relaxed),
            send_failures: self.inner.send_failures.load(Ordering::Relaxed),
            video_frames: self.inner.video_frames.load(Ordering::Relaxed),
            audio_frames: self.inner.audio_frames.load(Ordering::Relaxed),
            keyframes: self.inner.keyframes.load(Ordering::Relaxed),
            config_records: self.inner.config_records.load(Ordering::Relaxed),
            discontinuities: self.inner.discontinuities.load(Ordering::Relaxed),
            duration: self.inner.started_at.elapsed(),
        }
    }
}

impl Default for StatsHandle {
    fn default() -> Self {
        StatsHandle::new()
    }
}
