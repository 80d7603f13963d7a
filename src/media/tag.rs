//! Outgoing tag payload construction
//!
//! Every message pushed over the connection is an FLV-style tag body. This
//! module models the closed set of bodies the publisher produces and
//! serializes each to its exact wire layout.
//!
//! Video payload:
//! ```text
//! +-----------+------+----------+----------------+----------------+
//! | 0x17/0x27 | 0x01 | CT(3)=0  | be32 len | NAL | be32 len | NAL | ...
//! +-----------+------+----------+----------------+----------------+
//! ```
//!
//! Video config (AVCDecoderConfigurationRecord):
//! ```text
//! +------+------+---------+------+--------------------+------+------+
//! | 0x17 | 0x00 | CT(3)=0 | 0x01 | sps[1] sps[2] sps[3] | 0xFF | 0xE1 |
//! +------+------+---------+------+--------------------+------+------+
//! | be16 sps_len | sps | 0x01 | be16 pps_len | pps |
//! +--------------+-----+------+--------------+-----+
//! ```
//!
//! Audio payload: `[0xAF][0x01]` + raw AAC frame (no ADTS header).
//! Audio config:  `[0xAF][0x00]` + 2-byte AudioSpecificConfig.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MediaError, Result};

use super::h264;
use super::packet::{Packet, StreamKind};

/// Frame type nibble: keyframe
const FRAME_KEY: u8 = 1;
/// Frame type nibble: inter frame
const FRAME_INTER: u8 = 2;
/// Video codec id nibble: AVC (H.264)
const CODEC_AVC: u8 = 7;
/// AVC packet type: sequence header
const AVC_SEQUENCE_HEADER: u8 = 0x00;
/// AVC packet type: NALU payload
const AVC_NALU: u8 = 0x01;
/// Audio tag header: AAC, 44.1kHz flag, 16-bit, stereo
const AAC_TAG_HEADER: u8 = 0xAF;
/// AAC packet type: sequence header
const AAC_SEQUENCE_HEADER: u8 = 0x00;
/// AAC packet type: raw frame
const AAC_RAW: u8 = 0x01;

/// One of the tag bodies this publisher can emit
#[derive(Debug, Clone)]
pub enum TagPayload {
    /// Encoded video frame: length-prefixed NAL units
    VideoPayload {
        /// Keyframe flag (selects 0x17 vs 0x27)
        keyframe: bool,
        /// NAL units, Annex B start codes tolerated
        nal_units: Vec<Bytes>,
    },
    /// Video decoder configuration record built from SPS/PPS
    VideoConfig {
        /// Sequence parameter set (at least 4 bytes)
        sps: Bytes,
        /// Picture parameter set
        pps: Bytes,
    },
    /// Raw AAC frame (ADTS header already removed)
    AudioPayload {
        /// Frame bytes
        frame: Bytes,
    },
    /// 2-byte AudioSpecificConfig
    AudioConfig {
        /// Object type, frequency index, channel config bit-packed
        asc: [u8; 2],
    },
    /// Opaque control-channel body (e.g. chunk-size announcement)
    Control {
        /// Already-serialized control body
        body: Bytes,
    },
}

impl TagPayload {
    /// Stream kind this body belongs to
    pub fn kind(&self) -> StreamKind {
        match self {
            TagPayload::VideoPayload { .. } | TagPayload::VideoConfig { .. } => StreamKind::Video,
            TagPayload::AudioPayload { .. } | TagPayload::AudioConfig { .. } => StreamKind::Audio,
            TagPayload::Control { .. } => StreamKind::System,
        }
    }

    /// Whether this body is a decoder configuration record
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            TagPayload::VideoConfig { .. } | TagPayload::AudioConfig { .. }
        )
    }

    /// Serialize to the exact wire bytes
    pub fn serialize(&self) -> Result<Bytes> {
        match self {
            TagPayload::VideoPayload {
                keyframe,
                nal_units,
            } => Ok(serialize_video_payload(*keyframe, nal_units)),
            TagPayload::VideoConfig { sps, pps } => serialize_video_config(sps, pps),
            TagPayload::AudioPayload { frame } => {
                let mut buf = BytesMut::with_capacity(2 + frame.len());
                buf.put_u8(AAC_TAG_HEADER);
                buf.put_u8(AAC_RAW);
                buf.put_slice(frame);
                Ok(buf.freeze())
            }
            TagPayload::AudioConfig { asc } => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u8(AAC_TAG_HEADER);
                buf.put_u8(AAC_SEQUENCE_HEADER);
                buf.put_slice(asc);
                Ok(buf.freeze())
            }
            TagPayload::Control { body } => Ok(body.clone()),
        }
    }

    /// Serialize into a [`Packet`] stamped with the given absolute timestamp
    pub fn into_packet(self, timestamp: u64) -> Result<Packet> {
        let kind = self.kind();
        let payload = self.serialize()?;
        Ok(Packet::new(kind, timestamp, timestamp, payload))
    }
}

fn serialize_video_payload(keyframe: bool, nal_units: &[Bytes]) -> Bytes {
    let frame_type = if keyframe { FRAME_KEY } else { FRAME_INTER };

    let total: usize = nal_units.iter().map(|n| n.len() + 4).sum();
    let mut buf = BytesMut::with_capacity(5 + total);

    buf.put_u8((frame_type << 4) | CODEC_AVC);
    buf.put_u8(AVC_NALU);
    // Composition time, zero since pts == dts
    buf.put_u8(0x00);
    buf.put_u8(0x00);
    buf.put_u8(0x00);

    for nal in nal_units {
        let nal = h264::strip_start_code(nal.clone());
        buf.put_u32(nal.len() as u32);
        buf.put_slice(&nal);
    }

    buf.freeze()
}

fn serialize_video_config(sps: &Bytes, pps: &Bytes) -> Result<Bytes> {
    let sps = h264::strip_start_code(sps.clone());
    let pps = h264::strip_start_code(pps.clone());

    // The record reads profile/compatibility/level out of sps[1..4]
    if sps.len() < 4 || pps.is_empty() {
        return Err(MediaError::MissingParameterSets.into());
    }

    let mut buf = BytesMut::with_capacity(16 + sps.len() + pps.len());

    buf.put_u8((FRAME_KEY << 4) | CODEC_AVC);
    buf.put_u8(AVC_SEQUENCE_HEADER);
    buf.put_u8(0x00);
    buf.put_u8(0x00);
    buf.put_u8(0x00);

    // configurationVersion
    buf.put_u8(0x01);
    // AVCProfileIndication / profile_compatibility / AVCLevelIndication
    buf.put_u8(sps[1]);
    buf.put_u8(sps[2]);
    buf.put_u8(sps[3]);
    // lengthSizeMinusOne: 4-byte NAL length prefixes
    buf.put_u8(0xFF);
    // numOfSequenceParameterSets: 1
    buf.put_u8(0xE1);
    buf.put_u16(sps.len() as u16);
    buf.put_slice(&sps);
    // numOfPictureParameterSets: 1
    buf.put_u8(0x01);
    buf.put_u16(pps.len() as u16);
    buf.put_slice(&pps);

    Ok(buf.freeze())
}

/// Build the 4-byte big-endian chunk-size announcement body
pub fn chunk_size_body(chunk_size: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u32(chunk_size);
    buf.freeze()
}
