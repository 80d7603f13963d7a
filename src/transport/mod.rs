//! Connection-facing delivery
//!
//! The crate does not speak the wire protocol itself; it hands finalized
//! tags to an external [`ChunkTransport`] one at a time. This module owns
//! the routing types and the mutex that serializes access.

pub mod chunk;
pub mod sender;

pub use chunk::{ChannelId, MessageType, PROTOCOL_DEFAULT_CHUNK_SIZE};
pub use sender::{ChunkTransport, TransportSender};
