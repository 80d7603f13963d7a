//! H.264/AVC elementary-stream helpers
//!
//! Encoders emit Annex B byte streams (NAL units delimited by 3- or 4-byte
//! start codes). The connection wants AVCC (length-prefixed NAL units), so
//! the publishing path needs to split Annex B buffers, classify NAL units,
//! and drop start codes before length prefixes go on.
//!
//! Annex B stream:
//! ```text
//! +------------+-----+------------+-----+------------+-----+
//! | 00 00 00 01| NAL | 00 00 01   | NAL | 00 00 00 01| NAL | ...
//! +------------+-----+------------+-----+------------+-----+
//! ```

use bytes::Bytes;

/// NAL unit type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    /// Non-IDR slice
    Slice = 1,
    /// Slice data partition A
    SlicePartA = 2,
    /// Slice data partition B
    SlicePartB = 3,
    /// Slice data partition C
    SlicePartC = 4,
    /// IDR slice (keyframe)
    Idr = 5,
    /// Supplemental enhancement information
    Sei = 6,
    /// Sequence parameter set
    Sps = 7,
    /// Picture parameter set
    Pps = 8,
    /// Access unit delimiter
    Aud = 9,
    /// End of sequence
    EndSeq = 10,
    /// End of stream
    EndStream = 11,
    /// Filler data
    Filler = 12,
}

impl NaluType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            1 => Some(NaluType::Slice),
            2 => Some(NaluType::SlicePartA),
            3 => Some(NaluType::SlicePartB),
            4 => Some(NaluType::SlicePartC),
            5 => Some(NaluType::Idr),
            6 => Some(NaluType::Sei),
            7 => Some(NaluType::Sps),
            8 => Some(NaluType::Pps),
            9 => Some(NaluType::Aud),
            10 => Some(NaluType::EndSeq),
            11 => Some(NaluType::EndStream),
            12 => Some(NaluType::Filler),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(self, NaluType::Idr)
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NaluType::Sps | NaluType::Pps)
    }
}

/// Remove a leading 3- or 4-byte Annex B start code, if present.
///
/// NAL units without a start code pass through untouched, so callers can
/// feed either form.
pub fn strip_start_code(nal: Bytes) -> Bytes {
    if nal.len() >= 4 && nal[0] == 0 && nal[1] == 0 && nal[2] == 0 && nal[3] == 1 {
        nal.slice(4..)
    } else if nal.len() >= 3 && nal[0] == 0 && nal[1] == 0 && nal[2] == 1 {
        nal.slice(3..)
    } else {
        nal
    }
}

/// Classify a NAL unit that may still carry its start code
pub fn nalu_type(nal: &Bytes) -> Option<NaluType> {
    let stripped = strip_start_code(nal.clone());
    stripped.first().and_then(|b| NaluType::from_byte(*b))
}

/// Split an Annex B byte stream into individual NAL units.
///
/// Returned units have their start codes removed. Bytes before the first
/// start code are ignored. The slices share the input's backing storage.
pub fn split_annex_b(stream: &Bytes) -> Vec<Bytes> {
    let mut nals = Vec::new();
    let data = &stream[..];

    let mut start = match next_start_code(data, 0) {
        Some((pos, len)) => pos + len,
        None => return nals,
    };

    while start <= data.len() {
        match next_start_code(data, start) {
            Some((pos, len)) => {
                if pos > start {
                    nals.push(stream.slice(start..pos));
                }
                start = pos + len;
            }
            None => {
                if start < data.len() {
                    nals.push(stream.slice(start..));
                }
                break;
            }
        }
    }

    nals
}

/// Find the next 3- or 4-byte start code at or after `from`.
///
/// Returns (position, start code length). A 4-byte code is preferred when
/// both match at the same position.
fn next_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if i + 4 <= data.len() && data[i + 2] == 0 && data[i + 3] == 1 {
                return Some((i, 4));
            }
            if data[i + 2] == 1 {
                return Some((i, 3));
            }
        }
        i += 1;
    }
    None
}

/// Check whether any NAL unit in the set is an IDR slice
pub fn contains_idr(nal_units: &[Bytes]) -> bool {
    nal_units
        .iter()
        .any(|n| nalu_type(n) == Some(NaluType::Idr))
}

/// SPS and PPS for one encoder configuration, start codes removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSets {
    /// Sequence parameter set
    pub sps: Bytes,
    /// Picture parameter set
    pub pps: Bytes,
}

/// Harvest SPS and PPS from a set of NAL units.
///
/// Encoders configured to repeat headers carry the parameter sets in-band
/// with every keyframe. Returns both, start codes removed, when present.
pub fn find_parameter_sets(nal_units: &[Bytes]) -> Option<ParameterSets> {
    let mut sps = None;
    let mut pps = None;

    for nal in nal_units {
        match nalu_type(nal) {
            Some(NaluType::Sps) if sps.is_none() => sps = Some(strip_start_code(nal.clone())),
            Some(NaluType::Pps) if pps.is_none() => pps = Some(strip_start_code(nal.clone())),
            _ => {}
        }
    }

    match (sps, pps) {
        (Some(sps), Some(pps)) => Some(ParameterSets { sps, pps }),
        _ => None,
    }
}
