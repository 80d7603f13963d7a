//! RTMP publishing core
//!
//! Building blocks for pushing a live H.264/AAC stream over an
//! RTMP-style chunked transport:
//! - Encode pipelines driving embedder-supplied codecs on dedicated threads
//! - A two-channel interleaving buffer releasing packets in presentation
//!   order with a bounded holding delay
//! - Per-stream clocks that survive encoder restarts by folding the old
//!   timeline into a cumulative offset
//! - Bit-exact FLV tag bodies for payloads and decoder configuration
//!   records
//!
//! The crate does not encode media and does not own a socket. Encoders
//! implement [`pipeline::VideoEncoder`] / [`pipeline::AudioEncoder`] and
//! the wire is whatever implements [`transport::ChunkTransport`];
//! everything in between is handled by a [`PublishSession`].

pub mod error;
pub mod media;
pub mod mux;
pub mod pipeline;
pub mod session;
pub mod stats;
pub mod transport;

pub use error::{Error, Result};
pub use session::{PublishConfig, PublishSession, SessionEvent};
