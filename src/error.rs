//! Crate error types
//!
//! One top-level [`Error`] wrapping per-domain error enums, plus the
//! crate-wide [`Result`] alias. Component code constructs the domain
//! variant and converts with `.into()` / `?`.

use std::fmt;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Media parsing or tag building failed
    Media(MediaError),
    /// Interleave buffer error
    Mux(MuxError),
    /// Transport send error
    Transport(TransportError),
    /// Encode pipeline error
    Pipeline(PipelineError),
    /// I/O error
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Media(e) => write!(f, "media error: {}", e),
            Error::Mux(e) => write!(f, "mux error: {}", e),
            Error::Transport(e) => write!(f, "transport error: {}", e),
            Error::Pipeline(e) => write!(f, "pipeline error: {}", e),
            Error::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Media(e) => Some(e),
            Error::Mux(e) => Some(e),
            Error::Transport(e) => Some(e),
            Error::Pipeline(e) => Some(e),
            Error::Io(e) => Some(e),
        }
    }
}

impl From<MediaError> for Error {
    fn from(e: MediaError) -> Self {
        Error::Media(e)
    }
}

impl From<MuxError> for Error {
    fn from(e: MuxError) -> Self {
        Error::Mux(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<PipelineError> for Error {
    fn from(e: PipelineError) -> Self {
        Error::Pipeline(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Error type for media parsing and tag building
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// SPS or PPS missing/too short to build a configuration record
    MissingParameterSets,
    /// ADTS header malformed (bad syncword or truncated)
    InvalidAdtsHeader,
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::MissingParameterSets => {
                write!(f, "SPS/PPS missing or too short for configuration record")
            }
            MediaError::InvalidAdtsHeader => write!(f, "Invalid ADTS header"),
        }
    }
}

impl std::error::Error for MediaError {}

/// Error type for the interleave buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxError {
    /// The release callback requested that draining stop
    ReleaseAborted,
}

impl fmt::Display for MuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuxError::ReleaseAborted => write!(f, "Release callback aborted draining"),
        }
    }
}

impl std::error::Error for MuxError {}

/// Error type for transport sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The external send primitive reported failure
    SendFailed(String),
    /// Send attempted with no transport attached
    NotAttached,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::SendFailed(reason) => write!(f, "Send failed: {}", reason),
            TransportError::NotAttached => write!(f, "No transport attached"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Error type for the encode pipelines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The external encoder reported failure
    EncoderFailed(String),
    /// Feed after the pipeline was shut down
    Closed,
    /// Spawn attempted while a worker is already running
    AlreadyRunning,
    /// The worker thread panicked
    WorkerPanicked,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::EncoderFailed(reason) => write!(f, "Encoder failed: {}", reason),
            PipelineError::Closed => write!(f, "Pipeline is closed"),
            PipelineError::AlreadyRunning => write!(f, "Encode worker already running"),
            PipelineError::WorkerPanicked => write!(f, "Worker thread panicked"),
        }
    }
}

impl std::error::Error for PipelineError {}
