//! Publish session
//!
//! Composition root tying the pieces together: one transport sender, one
//! packetizer behind the session lock, and up to two encode pipelines
//! feeding it.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{PipelineError, Result};
use crate::media::tag::chunk_size_body;
use crate::media::{ParameterSets, StreamKind};
use crate::pipeline::{AudioEncoder, CaptureBuffer, EncodePipeline, VideoEncoder};
use crate::stats::{PublishStats, StatsHandle};
use crate::transport::{ChunkTransport, MessageType, TransportSender, PROTOCOL_DEFAULT_CHUNK_SIZE};

use super::config::PublishConfig;
use super::packetizer::Packetizer;

/// Events from a publish session
#[derive(Debug)]
pub enum SessionEvent {
    /// Session attached to its transport and ready for frames
    Started,

    /// An encoder failed; that pipeline has stopped
    EncoderFailed {
        kind: StreamKind,
        message: String,
    },

    /// A frame or configuration record could not be sent
    SendFailed { message: String },

    /// Session shut down
    Stopped,
}

/// A live publishing session over one transport
///
/// Owns the stream clocks, the interleaving buffer and the encode
/// pipelines. Frames can be pushed two ways: raw capture buffers through
/// `feed_video` / `feed_audio` (encoded on the worker threads), or
/// already-encoded frames through `send_video` / `send_audio`.
///
/// # Example
/// ```no_run
/// use rtmp_push::{PublishConfig, PublishSession};
/// # use bytes::Bytes;
/// # use rtmp_push::transport::{ChannelId, ChunkTransport, MessageType};
/// # struct NullTransport;
/// # impl ChunkTransport for NullTransport {
/// #     fn send_chunk(
/// #         &mut self,
/// #         _channel: ChannelId,
/// #         _message_type: MessageType,
/// #         _timestamp: u64,
/// #         _payload: &Bytes,
/// #     ) -> rtmp_push::Result<()> {
/// #         Ok(())
/// #     }
/// # }
///
/// # async fn example() -> rtmp_push::Result<()> {
/// let config = PublishConfig::new().chunk_size(2048);
/// let (mut session, mut events) = PublishSession::new(config, NullTransport);
/// session.attach()?;
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// // With pipelines spawned, producers push raw capture buffers:
/// // session.feed_video(CaptureBuffer::new(0, frame_bytes))?;
/// # Ok(())
/// # }
/// ```
pub struct PublishSession<T: ChunkTransport> {
    config: PublishConfig,
    packetizer: Arc<Mutex<Packetizer<T>>>,
    sender: Arc<TransportSender<T>>,
    stats: StatsHandle,
    event_tx: mpsc::Sender<SessionEvent>,
    video: Option<EncodePipeline>,
    audio: Option<EncodePipeline>,
}

impl<T: ChunkTransport + 'static> PublishSession<T> {
    /// Create a session over `transport`.
    ///
    /// Returns the session and a receiver for [`SessionEvent`]s.
    pub fn new(config: PublishConfig, transport: T) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        let stats = StatsHandle::new();
        let sender = Arc::new(TransportSender::new(transport, stats.clone()));
        let packetizer = Arc::new(Mutex::new(Packetizer::new(
            &config,
            Arc::clone(&sender),
            stats.clone(),
        )));

        let session = PublishSession {
            config,
            packetizer,
            sender,
            stats,
            event_tx,
            video: None,
            audio: None,
        };

        (session, event_rx)
    }

    /// Announce session parameters on the freshly connected transport.
    ///
    /// Sends the outgoing chunk size on the control channel when it
    /// differs from the protocol default of 128.
    pub fn attach(&self) -> Result<()> {
        if self.config.chunk_size != PROTOCOL_DEFAULT_CHUNK_SIZE {
            let body = chunk_size_body(self.config.chunk_size);
            self.sender.send(MessageType::SetChunkSize, 0, &body)?;
            tracing::info!(
                chunk_size = self.config.chunk_size,
                "Announced outgoing chunk size"
            );
        }

        let _ = self.event_tx.try_send(SessionEvent::Started);
        Ok(())
    }

    /// Start the video encode pipeline
    pub fn spawn_video<E: VideoEncoder + 'static>(&mut self, encoder: E) -> Result<()> {
        if self.video.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let pipeline = EncodePipeline::spawn_video(
            encoder,
            Arc::clone(&self.packetizer),
            self.event_tx.clone(),
        )?;
        self.video = Some(pipeline);
        Ok(())
    }

    /// Start the audio encode pipeline
    pub fn spawn_audio<E: AudioEncoder + 'static>(&mut self, encoder: E) -> Result<()> {
        if self.audio.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let pipeline = EncodePipeline::spawn_audio(
            encoder,
            Arc::clone(&self.packetizer),
            self.event_tx.clone(),
        )?;
        self.audio = Some(pipeline);
        Ok(())
    }

    /// Queue a raw video capture buffer for encoding
    pub fn feed_video(&self, buffer: CaptureBuffer) -> Result<()> {
        match &self.video {
            Some(pipeline) => pipeline.feed(buffer),
            None => Err(PipelineError::Closed.into()),
        }
    }

    /// Queue a raw audio capture buffer for encoding
    pub fn feed_audio(&self, buffer: CaptureBuffer) -> Result<()> {
        match &self.audio {
            Some(pipeline) => pipeline.feed(buffer),
            None => Err(PipelineError::Closed.into()),
        }
    }

    /// Packetize an already-encoded video frame, bypassing the pipelines.
    ///
    /// NAL units must have their start codes stripped.
    pub fn send_video(
        &self,
        timestamp: i64,
        keyframe: bool,
        nal_units: &[Bytes],
        params: Option<&ParameterSets>,
    ) -> Result<()> {
        let mut packetizer = self.lock_packetizer();
        packetizer
            .on_video_frame(timestamp, keyframe, nal_units, params)
            .map_err(|e| self.report_send_error(e))
    }

    /// Packetize an already-encoded audio frame (no ADTS header)
    pub fn send_audio(&self, timestamp: i64, frame: &Bytes, asc: [u8; 2]) -> Result<()> {
        let mut packetizer = self.lock_packetizer();
        packetizer
            .on_audio_frame(timestamp, frame, asc)
            .map_err(|e| self.report_send_error(e))
    }

    /// Counters snapshot for this session
    pub fn stats(&self) -> PublishStats {
        self.stats.snapshot()
    }

    /// Packets accepted but not yet released to the transport
    pub fn pending(&self) -> usize {
        self.lock_packetizer().pending()
    }

    /// Stop the pipelines and discard anything still queued.
    ///
    /// Queued capture buffers and buffered packets are dropped, never
    /// flushed; a half-sent tail after a teardown is worse than a short
    /// one. Returns the first pipeline error encountered.
    pub fn shutdown(mut self) -> Result<()> {
        let mut result = Ok(());

        if let Some(pipeline) = self.video.take() {
            if let Err(e) = pipeline.shutdown() {
                tracing::error!(error = %e, "Video pipeline shutdown failed");
                result = Err(e);
            }
        }
        if let Some(pipeline) = self.audio.take() {
            if let Err(e) = pipeline.shutdown() {
                tracing::error!(error = %e, "Audio pipeline shutdown failed");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        let discarded = {
            let mut packetizer = self.lock_packetizer();
            let pending = packetizer.pending();
            packetizer.clear_buffer();
            pending
        };
        if discarded > 0 {
            tracing::debug!(discarded, "Dropped unreleased packets");
        }

        let _ = self.event_tx.try_send(SessionEvent::Stopped);
        tracing::info!("Publish session stopped");
        result
    }

    fn lock_packetizer(&self) -> std::sync::MutexGuard<'_, Packetizer<T>> {
        match self.packetizer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn report_send_error(&self, e: crate::error::Error) -> crate::error::Error {
        let _ = self.event_tx.try_send(SessionEvent::SendFailed {
            message: e.to_string(),
        });
        e
    }
}
