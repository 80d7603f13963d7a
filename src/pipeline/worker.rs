//! Encode pipeline workers
//!
//! One [`EncodePipeline`] per media kind: an unbounded feed queue and a
//! dedicated worker thread that drives the external encoder and hands
//! encoded frames to the shared packetizer.
//!
//! ```text
//!  producer ──feed()──▶ queue ──▶ [video-encode thread] ──▶ Packetizer
//!  producer ──feed()──▶ queue ──▶ [audio-encode thread] ──▶    (lock)
//! ```
//!
//! `feed` never blocks the producer; the queue is only memory-bounded.
//! An encoder error stops that worker for good. Packetization errors are
//! reported and the worker moves on to the next frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{PipelineError, Result};
use crate::media::{aac, h264, StreamKind};
use crate::session::{Packetizer, SessionEvent};
use crate::transport::ChunkTransport;

use super::encoder::{AudioEncoder, CaptureBuffer, VideoEncoder};

/// Handle to one running encode worker
pub struct EncodePipeline {
    feed_tx: mpsc::UnboundedSender<CaptureBuffer>,
    worker: JoinHandle<()>,
    stop: Arc<AtomicBool>,
    kind: StreamKind,
}

impl EncodePipeline {
    /// Spawn the video worker thread.
    ///
    /// Each encoded frame has its NAL unit start codes stripped and its
    /// in-band SPS/PPS harvested before packetization; when the bitstream
    /// carries no parameter sets the encoder's own are used.
    pub fn spawn_video<E, T>(
        mut encoder: E,
        packetizer: Arc<Mutex<Packetizer<T>>>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Self>
    where
        E: VideoEncoder + 'static,
        T: ChunkTransport + 'static,
    {
        let (feed_tx, mut feed_rx) = mpsc::unbounded_channel::<CaptureBuffer>();
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        let worker = std::thread::Builder::new()
            .name("video-encode".into())
            .spawn(move || {
                tracing::debug!("Video encode worker started");

                while let Some(buffer) = feed_rx.blocking_recv() {
                    if worker_stop.load(Ordering::Relaxed) {
                        break;
                    }

                    let frame = match encoder.encode(buffer) {
                        Ok(Some(frame)) => frame,
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::error!(error = %e, "Video encoder failed, stopping worker");
                            let _ = events.try_send(SessionEvent::EncoderFailed {
                                kind: StreamKind::Video,
                                message: e.to_string(),
                            });
                            break;
                        }
                    };

                    let nal_units: Vec<Bytes> = frame
                        .nal_units
                        .into_iter()
                        .map(h264::strip_start_code)
                        .collect();
                    let params = h264::find_parameter_sets(&nal_units)
                        .or_else(|| encoder.params());

                    let mut packetizer = match packetizer.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    if let Err(e) = packetizer.on_video_frame(
                        frame.timestamp,
                        frame.keyframe,
                        &nal_units,
                        params.as_ref(),
                    ) {
                        tracing::error!(error = %e, "Video frame dropped");
                        let _ = events.try_send(SessionEvent::SendFailed {
                            message: e.to_string(),
                        });
                    }
                }

                tracing::debug!("Video encode worker ended");
            })?;

        Ok(EncodePipeline {
            feed_tx,
            worker,
            stop,
            kind: StreamKind::Video,
        })
    }

    /// Spawn the audio worker thread.
    ///
    /// ADTS framing is stripped before packetization. The first ADTS
    /// header seen is checked against the encoder's announced
    /// AudioSpecificConfig so a misconfigured encoder shows up in logs
    /// instead of as silent garbage at the far end.
    pub fn spawn_audio<E, T>(
        mut encoder: E,
        packetizer: Arc<Mutex<Packetizer<T>>>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Self>
    where
        E: AudioEncoder + 'static,
        T: ChunkTransport + 'static,
    {
        let (feed_tx, mut feed_rx) = mpsc::unbounded_channel::<CaptureBuffer>();
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        let worker = std::thread::Builder::new()
            .name("audio-encode".into())
            .spawn(move || {
                tracing::debug!("Audio encode worker started");
                let mut config_checked = false;

                while let Some(buffer) = feed_rx.blocking_recv() {
                    if worker_stop.load(Ordering::Relaxed) {
                        break;
                    }

                    let frame = match encoder.encode(buffer) {
                        Ok(Some(frame)) => frame,
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::error!(error = %e, "Audio encoder failed, stopping worker");
                            let _ = events.try_send(SessionEvent::EncoderFailed {
                                kind: StreamKind::Audio,
                                message: e.to_string(),
                            });
                            break;
                        }
                    };

                    let asc = encoder.config();
                    let payload = if aac::is_adts(&frame.data) {
                        match aac::strip_adts(&frame.data) {
                            Ok((header, raw)) => {
                                if !config_checked {
                                    config_checked = true;
                                    let in_band = header.to_asc().to_bytes();
                                    if in_band != asc {
                                        tracing::warn!(
                                            in_band = ?in_band,
                                            configured = ?asc,
                                            "ADTS header disagrees with announced AudioSpecificConfig"
                                        );
                                    }
                                }
                                raw
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Malformed ADTS frame dropped");
                                continue;
                            }
                        }
                    } else {
                        frame.data
                    };

                    let mut packetizer = match packetizer.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    if let Err(e) = packetizer.on_audio_frame(frame.timestamp, &payload, asc) {
                        tracing::error!(error = %e, "Audio frame dropped");
                        let _ = events.try_send(SessionEvent::SendFailed {
                            message: e.to_string(),
                        });
                    }
                }

                tracing::debug!("Audio encode worker ended");
            })?;

        Ok(EncodePipeline {
            feed_tx,
            worker,
            stop,
            kind: StreamKind::Audio,
        })
    }

    /// Queue one capture buffer for encoding. Never blocks.
    pub fn feed(&self, buffer: CaptureBuffer) -> Result<()> {
        self.feed_tx
            .send(buffer)
            .map_err(|_| PipelineError::Closed.into())
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Buffers still queued are discarded, not encoded. Frames already
    /// handed to the packetizer are unaffected.
    pub fn shutdown(self) -> Result<()> {
        let EncodePipeline {
            feed_tx,
            worker,
            stop,
            kind,
        } = self;

        stop.store(true, Ordering::Relaxed);
        drop(feed_tx);

        match worker.join() {
            Ok(()) => Ok(()),
            Err(_) => {
                tracing::error!(kind = ?kind, "Encode worker panicked");
                Err(PipelineError::WorkerPanicked.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ParameterSets;
    use crate::pipeline::encoder::{AudioFrame, VideoFrame};
    use crate::session::PublishConfig;
    use crate::stats::StatsHandle;
    use crate::transport::{ChannelId, MessageType, TransportSender};
    use std::time::{Duration, Instant};

    type SentLog = Arc<Mutex<Vec<(MessageType, u64, Bytes)>>>;

    struct RecordingTransport {
        log: SentLog,
    }

    impl ChunkTransport for RecordingTransport {
        fn send_chunk(
            &mut self,
            _channel: ChannelId,
            message_type: MessageType,
            timestamp: u64,
            payload: &Bytes,
        ) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push((message_type, timestamp, payload.clone()));
            Ok(())
        }
    }

    fn shared_packetizer() -> (Arc<Mutex<Packetizer<RecordingTransport>>>, SentLog) {
        let log: SentLog = Arc::new(Mutex::new(Vec::new()));
        let stats = StatsHandle::new();
        let transport = RecordingTransport {
            log: Arc::clone(&log),
        };
        let sender = Arc::new(TransportSender::new(transport, stats.clone()));
        let packetizer = Packetizer::new(&PublishConfig::default(), sender, stats);
        (Arc::new(Mutex::new(packetizer)), log)
    }

    fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            if Instant::now() > deadline {
                panic!("timed out waiting for {}", what);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Emits one Annex B frame per buffer: keyframes carry SPS/PPS in-band.
    struct StubVideoEncoder;

    impl VideoEncoder for StubVideoEncoder {
        fn encode(&mut self, buffer: CaptureBuffer) -> Result<Option<VideoFrame>> {
            let stream = if buffer.timestamp == 0 {
                Bytes::from_static(&[
                    0x00, 0x00, 0x00, 0x01, 0x67, 0x64, 0x00, 0x1E, //
                    0x00, 0x00, 0x00, 0x01, 0x68, 0xEF, 0x3C, //
                    0x00, 0x00, 0x01, 0x65, 0x88, 0x84,
                ])
            } else {
                Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x41, 0x9A, 0x02])
            };
            Ok(Some(VideoFrame::from_annex_b(buffer.timestamp, &stream)))
        }

        fn params(&self) -> Option<ParameterSets> {
            None
        }
    }

    struct FailingVideoEncoder;

    impl VideoEncoder for FailingVideoEncoder {
        fn encode(&mut self, _buffer: CaptureBuffer) -> Result<Option<VideoFrame>> {
            Err(PipelineError::EncoderFailed("hardware codec gone".into()).into())
        }

        fn params(&self) -> Option<ParameterSets> {
            None
        }
    }

    struct SlowVideoEncoder;

    impl VideoEncoder for SlowVideoEncoder {
        fn encode(&mut self, buffer: CaptureBuffer) -> Result<Option<VideoFrame>> {
            std::thread::sleep(Duration::from_millis(50));
            let stream = Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x41, 0x9A, 0x02]);
            Ok(Some(VideoFrame::from_annex_b(buffer.timestamp, &stream)))
        }

        fn params(&self) -> Option<ParameterSets> {
            None
        }
    }

    /// Emits one ADTS frame per buffer (AAC LC, 44.1 kHz, stereo)
    struct StubAudioEncoder;

    impl AudioEncoder for StubAudioEncoder {
        fn encode(&mut self, buffer: CaptureBuffer) -> Result<Option<AudioFrame>> {
            let data = Bytes::from_static(&[
                0xFF, 0xF1, 0x50, 0x80, 0x0D, 0x7F, 0xFC, // ADTS header
                0xDE, 0xAD, 0xBE, 0xEF,
            ]);
            Ok(Some(AudioFrame::new(buffer.timestamp, data)))
        }

        fn config(&self) -> [u8; 2] {
            [0x12, 0x10]
        }
    }

    #[test]
    fn test_video_worker_harvests_params_and_packetizes() {
        let (packetizer, log) = shared_packetizer();
        let (events_tx, _events_rx) = mpsc::channel(8);

        let pipeline =
            EncodePipeline::spawn_video(StubVideoEncoder, Arc::clone(&packetizer), events_tx)
                .unwrap();
        assert_eq!(pipeline.kind(), StreamKind::Video);

        pipeline
            .feed(CaptureBuffer::new(0, Bytes::from_static(&[0])))
            .unwrap();
        pipeline
            .feed(CaptureBuffer::new(33, Bytes::from_static(&[0])))
            .unwrap();

        // The keyframe's in-band SPS/PPS produce an immediate config send.
        wait_until("config send", || !log.lock().unwrap().is_empty());
        {
            let log = log.lock().unwrap();
            assert_eq!(log[0].0, MessageType::Video);
            assert_eq!(&log[0].2[..2], &[0x17, 0x00]);
        }

        // Both payloads reached the interleaving buffer.
        wait_until("buffered payloads", || {
            packetizer.lock().unwrap().pending() == 2
        });

        pipeline.shutdown().unwrap();
    }

    #[test]
    fn test_audio_worker_strips_adts() {
        let (packetizer, log) = shared_packetizer();
        let (events_tx, _events_rx) = mpsc::channel(8);

        let pipeline =
            EncodePipeline::spawn_audio(StubAudioEncoder, Arc::clone(&packetizer), events_tx)
                .unwrap();

        pipeline
            .feed(CaptureBuffer::new(0, Bytes::from_static(&[0])))
            .unwrap();

        // Config goes out directly; the payload stays buffered.
        wait_until("config send", || !log.lock().unwrap().is_empty());
        {
            let log = log.lock().unwrap();
            assert_eq!(log[0].0, MessageType::Audio);
            assert_eq!(&log[0].2[..], &[0xAF, 0x00, 0x12, 0x10]);
        }

        // A second frame past the interleave delay forces the first
        // payload out, exposing the de-framed bytes.
        pipeline
            .feed(CaptureBuffer::new(1024, Bytes::from_static(&[0])))
            .unwrap();
        wait_until("forced payload", || log.lock().unwrap().len() >= 2);
        pipeline.shutdown().unwrap();

        let log = log.lock().unwrap();
        assert_eq!(&log[1].2[..], &[0xAF, 0x01, 0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(log[1].1, 0);
    }

    #[test]
    fn test_encoder_failure_stops_worker() {
        let (packetizer, log) = shared_packetizer();
        let (events_tx, mut events_rx) = mpsc::channel(8);

        let pipeline =
            EncodePipeline::spawn_video(FailingVideoEncoder, packetizer, events_tx).unwrap();

        pipeline
            .feed(CaptureBuffer::new(0, Bytes::from_static(&[0])))
            .unwrap();

        // The worker exits, after which the feed side reports closure.
        wait_until("worker exit", || {
            pipeline
                .feed(CaptureBuffer::new(1, Bytes::from_static(&[0])))
                .is_err()
        });

        let event = events_rx.blocking_recv();
        match event {
            Some(SessionEvent::EncoderFailed { kind, message }) => {
                assert_eq!(kind, StreamKind::Video);
                assert!(message.contains("hardware codec gone"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert!(log.lock().unwrap().is_empty());
        pipeline.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_discards_queued_buffers() {
        let (packetizer, _log) = shared_packetizer();
        let (events_tx, _events_rx) = mpsc::channel(8);

        let pipeline =
            EncodePipeline::spawn_video(SlowVideoEncoder, Arc::clone(&packetizer), events_tx)
                .unwrap();

        for i in 0..10 {
            pipeline
                .feed(CaptureBuffer::new(i * 33, Bytes::from_static(&[0])))
                .unwrap();
        }
        pipeline.shutdown().unwrap();

        // At 50ms per frame the stop flag lands long before the queue
        // empties, so most buffers are discarded unencoded.
        assert!(packetizer.lock().unwrap().pending() < 10);
    }
}
