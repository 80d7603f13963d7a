//! Capture-to-packetizer encode pipelines
//!
//! Producers push raw capture buffers; per-kind worker threads run the
//! external encoders and feed the session's packetizer.

pub mod encoder;
pub mod worker;

pub use encoder::{AudioEncoder, AudioFrame, CaptureBuffer, VideoEncoder, VideoFrame};
pub use worker::EncodePipeline;
