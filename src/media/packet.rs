//! Typed media packets
//!
//! A [`Packet`] is the unit moved between the packetizer, the interleave
//! buffer, and the transport sender: an owned payload plus the stream kind
//! and timestamps. Payloads are `Bytes`, so the occasional explicit clone
//! is a cheap refcount bump rather than a copy.

use bytes::Bytes;

/// Which logical stream a packet belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Video elementary stream
    Video,
    /// Audio elementary stream
    Audio,
    /// Control/system messages (chunk size etc.)
    System,
}

/// An owned, typed, timestamped buffer
#[derive(Debug, Clone)]
pub struct Packet {
    /// Stream kind
    pub kind: StreamKind,
    /// Presentation timestamp in milliseconds
    pub pts: u64,
    /// Decode timestamp in milliseconds
    pub dts: u64,
    /// Serialized tag body
    pub payload: Bytes,
}

impl Packet {
    /// Create a packet with distinct pts/dts
    pub fn new(kind: StreamKind, pts: u64, dts: u64, payload: Bytes) -> Self {
        Self {
            kind,
            pts,
            dts,
            payload,
        }
    }

    /// Create a video packet (pts == dts)
    pub fn video(pts: u64, payload: Bytes) -> Self {
        Self::new(StreamKind::Video, pts, pts, payload)
    }

    /// Create an audio packet (pts == dts)
    pub fn audio(pts: u64, payload: Bytes) -> Self {
        Self::new(StreamKind::Audio, pts, pts, payload)
    }

    /// Create a control packet
    pub fn system(pts: u64, payload: Bytes) -> Self {
        Self::new(StreamKind::System, pts, pts, payload)
    }

    /// Check if this is a video packet
    pub fn is_video(&self) -> bool {
        self.kind == StreamKind::Video
    }

    /// Check if this is an audio packet
    pub fn is_audio(&self) -> bool {
        self.kind == StreamKind::Audio
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
