//! Media handling for the publishing path
//!
//! This module provides:
//! - Timestamped packet and stream kind types
//! - Message payload construction (video, audio, config, control)
//! - H.264/AVC NALU splitting and classification
//! - AAC ADTS parsing and AudioSpecificConfig derivation

pub mod aac;
pub mod h264;
pub mod packet;
pub mod tag;

pub use aac::{AacProfile, AdtsHeader, AudioSpecificConfig};
pub use h264::{NaluType, ParameterSets};
pub use packet::{Packet, StreamKind};
pub use tag::TagPayload;
