//! Chunk routing types
//!
//! Outgoing messages are routed onto protocol-level chunk channels by
//! message type. Media types get their own channels so the peer can
//! demultiplex without reordering; everything else shares the system
//! channel.

use crate::media::StreamKind;

/// Chunk size the protocol assumes until announced otherwise
pub const PROTOCOL_DEFAULT_CHUNK_SIZE: u32 = 128;

/// Logical chunk channel within one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelId {
    /// Network-related messages (bandwidth reports, pings)
    Network = 2,
    /// Server control messages
    System = 3,
    /// Audio data
    Audio = 4,
    /// Video data
    Video = 6,
    /// Source/stream commands
    Source = 8,
}

impl ChannelId {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            2 => Some(ChannelId::Network),
            3 => Some(ChannelId::System),
            4 => Some(ChannelId::Audio),
            6 => Some(ChannelId::Video),
            8 => Some(ChannelId::Source),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Message type carried in the chunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Announce the sender's outgoing chunk size
    SetChunkSize = 1,
    /// Audio tag
    Audio = 8,
    /// Video tag
    Video = 9,
    /// Script/info data
    Info = 18,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(MessageType::SetChunkSize),
            8 => Some(MessageType::Audio),
            9 => Some(MessageType::Video),
            18 => Some(MessageType::Info),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Channel this message type is routed onto
    pub fn channel(self) -> ChannelId {
        match self {
            MessageType::Video => ChannelId::Video,
            MessageType::Audio | MessageType::Info => ChannelId::Audio,
            _ => ChannelId::System,
        }
    }

    /// Message type for a released media packet.
    ///
    /// System packets carry chunk-size announcements, the only non-media
    /// payload this crate produces.
    pub fn for_kind(kind: StreamKind) -> MessageType {
        match kind {
            StreamKind::Video => MessageType::Video,
            StreamKind::Audio => MessageType::Audio,
            StreamKind::System => MessageType::SetChunkSize,
        }
    }
}
