//! Serialized delivery to the connection
//!
//! Both encode workers emit packets, and configuration records can go out
//! between media tags. One mutex around the send primitive keeps chunk
//! boundaries intact on the shared connection.

use std::sync::Mutex;

use bytes::Bytes;

use crate::error::Result;
use crate::media::Packet;
use crate::stats::StatsHandle;

use super::chunk::{ChannelId, MessageType};

/// External chunked-protocol send primitive.
///
/// Implementations own the connection and handle protocol-level
/// fragmentation of the payload. Calls arrive from one thread at a time.
pub trait ChunkTransport: Send {
    fn send_chunk(
        &mut self,
        channel: ChannelId,
        message_type: MessageType,
        timestamp: u64,
        payload: &Bytes,
    ) -> Result<()>;
}

/// Mutex-guarded sender shared by the media pipelines
pub struct TransportSender<T> {
    transport: Mutex<T>,
    stats: StatsHandle,
}

impl<T: ChunkTransport> TransportSender<T> {
    pub fn new(transport: T, stats: StatsHandle) -> Self {
        TransportSender {
            transport: Mutex::new(transport),
            stats,
        }
    }

    /// Route and send one finalized tag
    pub fn send(&self, message_type: MessageType, timestamp: u64, payload: &Bytes) -> Result<()> {
        let channel = message_type.channel();

        let mut transport = match self.transport.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match transport.send_chunk(channel, message_type, timestamp, payload) {
            Ok(()) => {
                self.stats.record_send(payload.len());
                tracing::trace!(
                    channel = channel.id(),
                    message_type = message_type.id(),
                    timestamp = timestamp,
                    len = payload.len(),
                    "Chunk sent"
                );
                Ok(())
            }
            Err(e) => {
                self.stats.record_send_failure();
                tracing::error!(
                    error = %e,
                    channel = channel.id(),
                    timestamp = timestamp,
                    "Chunk send failed"
                );
                Err(e)
            }
        }
    }

    /// Send a packet released by the interleaving buffer
    pub fn send_packet(&self, packet: &Packet) -> Result<()> {
        self.send(
            MessageType::for_kind(packet.kind),
            packet.pts,
            &packet.payload,
        )
    }

    /// Recover the transport, e.g. to close the connection after shutdown
    pub fn into_inner(self) -> T {
        match self.transport.into_inner() {
            Ok(transport) => transport,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
