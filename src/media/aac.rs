//! AAC audio helpers
//!
//! Encoders commonly emit AAC frames wrapped in ADTS, but the connection
//! wants raw frames plus a one-time AudioSpecificConfig. This module parses
//! ADTS headers, strips them, and derives the 2-byte config from the header
//! fields.
//!
//! ADTS header (7 bytes without CRC):
//! ```text
//! +--------+--------+--------+--------+--------+--------+--------+
//! |  0xFF  |0xF?    |profile |channels|frame   |frame   |buffer  |
//! |        |sync+flg|+freqidx|+framelen high   |len low |fullness|
//! +--------+--------+--------+--------+--------+--------+--------+
//! ```

use bytes::Bytes;

use crate::error::{MediaError, Result};

/// AAC profile (audio object type)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacProfile {
    /// AAC Main
    Main = 1,
    /// AAC LC (Low Complexity) - most common
    Lc = 2,
    /// AAC SSR (Scalable Sample Rate)
    Ssr = 3,
    /// AAC LTP (Long Term Prediction)
    Ltp = 4,
    /// SBR (Spectral Band Replication) - HE-AAC
    Sbr = 5,
    /// AAC Scalable
    Scalable = 6,
}

impl AacProfile {
    pub fn from_object_type(ot: u8) -> Option<Self> {
        match ot {
            1 => Some(AacProfile::Main),
            2 => Some(AacProfile::Lc),
            3 => Some(AacProfile::Ssr),
            4 => Some(AacProfile::Ltp),
            5 => Some(AacProfile::Sbr),
            6 => Some(AacProfile::Scalable),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AacProfile::Main => "AAC Main",
            AacProfile::Lc => "AAC LC",
            AacProfile::Ssr => "AAC SSR",
            AacProfile::Ltp => "AAC LTP",
            AacProfile::Sbr => "HE-AAC",
            AacProfile::Scalable => "AAC Scalable",
        }
    }
}

/// AudioSpecificConfig fields
///
/// The 2-byte form covers every stream this crate produces. Longer configs
/// (explicit frequency, extension payloads) are out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// Audio object type (profile)
    pub audio_object_type: u8,
    /// Sampling frequency index
    pub sampling_frequency_index: u8,
    /// Channel configuration (1=mono, 2=stereo, etc.)
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    /// Standard sampling frequencies by index
    const SAMPLING_FREQUENCIES: [u32; 16] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350, 0,
        0, 0,
    ];

    /// Unpack from the 2-byte wire form
    ///
    /// Layout: audioObjectType (5 bits), samplingFrequencyIndex (4 bits),
    /// channelConfiguration (4 bits).
    pub fn parse(asc: [u8; 2]) -> Self {
        AudioSpecificConfig {
            audio_object_type: (asc[0] >> 3) & 0x1F,
            sampling_frequency_index: ((asc[0] & 0x07) << 1) | ((asc[1] >> 7) & 0x01),
            channel_configuration: (asc[1] >> 3) & 0x0F,
        }
    }

    /// Pack into the 2-byte wire form
    pub fn to_bytes(&self) -> [u8; 2] {
        [
            ((self.audio_object_type & 0x1F) << 3) | ((self.sampling_frequency_index >> 1) & 0x07),
            ((self.sampling_frequency_index & 0x01) << 7)
                | ((self.channel_configuration & 0x0F) << 3),
        ]
    }

    /// Get the profile
    pub fn profile(&self) -> Option<AacProfile> {
        AacProfile::from_object_type(self.audio_object_type)
    }

    /// Sampling frequency in Hz, 0 for reserved indices
    pub fn sampling_frequency(&self) -> u32 {
        Self::SAMPLING_FREQUENCIES
            .get(self.sampling_frequency_index as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Get channel count
    pub fn channels(&self) -> u8 {
        match self.channel_configuration {
            0 => 0, // Defined in stream
            1 => 1, // Mono
            2 => 2, // Stereo
            3 => 3, // 3.0
            4 => 4, // 4.0
            5 => 5, // 5.0
            6 => 6, // 5.1
            7 => 8, // 7.1
            _ => 0,
        }
    }
}

/// Parsed ADTS frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// CRC absent flag; a present CRC adds 2 header bytes
    pub protection_absent: bool,
    /// Audio object type (ADTS profile field + 1)
    pub audio_object_type: u8,
    /// Sampling frequency index
    pub sampling_frequency_index: u8,
    /// Channel configuration
    pub channel_configuration: u8,
    /// Total frame length including the header
    pub frame_length: usize,
}

impl AdtsHeader {
    /// Header length without CRC
    pub const LEN: usize = 7;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::LEN {
            return Err(MediaError::InvalidAdtsHeader.into());
        }
        if !is_adts(data) {
            return Err(MediaError::InvalidAdtsHeader.into());
        }

        let protection_absent = (data[1] & 0x01) != 0;
        let profile = (data[2] >> 6) & 0x03;
        let sampling_frequency_index = (data[2] >> 2) & 0x0F;
        let channel_configuration = ((data[2] & 0x01) << 2) | ((data[3] >> 6) & 0x03);
        let frame_length = (((data[3] & 0x03) as usize) << 11)
            | ((data[4] as usize) << 3)
            | ((data[5] >> 5) as usize);

        Ok(AdtsHeader {
            protection_absent,
            audio_object_type: profile + 1,
            sampling_frequency_index,
            channel_configuration,
            frame_length,
        })
    }

    /// Bytes occupied by this header in the frame
    pub fn header_len(&self) -> usize {
        if self.protection_absent {
            Self::LEN
        } else {
            Self::LEN + 2
        }
    }

    /// Derive the AudioSpecificConfig announcing this stream
    pub fn to_asc(&self) -> AudioSpecificConfig {
        AudioSpecificConfig {
            audio_object_type: self.audio_object_type,
            sampling_frequency_index: self.sampling_frequency_index,
            channel_configuration: self.channel_configuration,
        }
    }
}

/// Check for the ADTS syncword
pub fn is_adts(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && (data[1] & 0xF0) == 0xF0
}

/// Split an ADTS frame into its header and raw AAC payload.
///
/// The payload slice shares the input's backing storage.
pub fn strip_adts(frame: &Bytes) -> Result<(AdtsHeader, Bytes)> {
    let header = AdtsHeader::parse(frame)?;
    let skip = header.header_len();
    if frame.len() < skip {
        return Err(MediaError::InvalidAdtsHeader.into());
    }
    Ok((header, frame.slice(skip..)))
}
