//! Publish session assembly
//!
//! This module provides:
//! - Per-stream clock state and discontinuity detection
//! - Frame packetization with configuration-record gating
//! - Session configuration and the top-level [`PublishSession`]

pub mod clock;
pub mod config;
pub mod packetizer;
pub mod publish;

pub use clock::StreamClock;
pub use config::PublishConfig;
pub use packetizer::Packetizer;
pub use publish::{PublishSession, SessionEvent};
