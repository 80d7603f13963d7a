//! Packet interleaving
//!
//! Merges the independently produced video and audio packet sequences into
//! one globally timestamp-ordered stream for the connection.

pub mod interleave;

pub use interleave::{InterleaveBuffer, ReleaseCallback, DEFAULT_MAX_INTERLEAVE_DELAY};
