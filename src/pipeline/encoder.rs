//! Encoder integration surface
//!
//! The crate does not encode media itself. Embedders implement
//! [`VideoEncoder`] / [`AudioEncoder`] over whatever codec library they
//! ship (MediaCodec, x264, fdk-aac, a test double) and the pipeline
//! workers drive them with raw [`CaptureBuffer`]s.

use bytes::Bytes;

use crate::error::Result;
use crate::media::{h264, ParameterSets};

/// One raw capture buffer from the producer side
///
/// For video this is typically a camera frame in the encoder's input
/// format, for audio a block of PCM samples. The pipeline never looks
/// inside `data`; only the encoder does.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    /// Capture timestamp in stream ticks (milliseconds for video)
    pub timestamp: i64,
    /// Raw capture bytes, opaque to the pipeline
    pub data: Bytes,
}

impl CaptureBuffer {
    pub fn new(timestamp: i64, data: Bytes) -> Self {
        CaptureBuffer { timestamp, data }
    }
}

/// One encoded video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Presentation timestamp in stream ticks
    pub timestamp: i64,
    /// True when the frame can start a decode (IDR)
    pub keyframe: bool,
    /// Encoded NAL units; Annex B start codes are tolerated and
    /// stripped during packetization
    pub nal_units: Vec<Bytes>,
}

impl VideoFrame {
    /// Build a frame from a single Annex B buffer as encoders commonly
    /// emit it. Splits the buffer into NAL units and derives the
    /// keyframe flag from the presence of an IDR slice.
    pub fn from_annex_b(timestamp: i64, stream: &Bytes) -> Self {
        let nal_units = h264::split_annex_b(stream);
        let keyframe = h264::contains_idr(&nal_units);
        VideoFrame {
            timestamp,
            keyframe,
            nal_units,
        }
    }
}

/// One encoded audio frame
///
/// `data` may still carry an ADTS header; the audio worker strips it
/// before packetization.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Presentation timestamp in stream ticks
    pub timestamp: i64,
    /// Encoded AAC bytes, raw or ADTS-framed
    pub data: Bytes,
}

impl AudioFrame {
    pub fn new(timestamp: i64, data: Bytes) -> Self {
        AudioFrame { timestamp, data }
    }
}

/// External video encoder driven by the video pipeline worker
pub trait VideoEncoder: Send {
    /// Encode one capture buffer.
    ///
    /// Returns `Ok(None)` when the encoder buffered the input without
    /// producing output yet (B-frame lookahead, rate control warmup).
    /// An `Err` is fatal to the video pipeline.
    fn encode(&mut self, buffer: CaptureBuffer) -> Result<Option<VideoFrame>>;

    /// The encoder's current SPS/PPS, once known.
    ///
    /// Used as a fallback when the bitstream itself does not carry
    /// parameter sets in-band.
    fn params(&self) -> Option<ParameterSets>;
}

/// External audio encoder driven by the audio pipeline worker
pub trait AudioEncoder: Send {
    /// Encode one block of samples.
    ///
    /// Returns `Ok(None)` when the encoder needs more input before it
    /// can emit a frame. An `Err` is fatal to the audio pipeline.
    fn encode(&mut self, buffer: CaptureBuffer) -> Result<Option<AudioFrame>>;

    /// The 2-byte AudioSpecificConfig matching the encoder settings
    fn config(&self) -> [u8; 2];
}
