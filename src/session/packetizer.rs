//! Frame-to-tag conversion and clock synchronization
//!
//! One packetizer serves both encode workers. Each raw frame becomes a
//! payload tag stamped with an absolute timestamp, preceded by a decoder
//! configuration tag whenever the stream (re)starts or its parameters
//! change.
//!
//! Configuration tags go straight to the transport: they must land
//! immediately before the payload that depends on them on the same channel,
//! so routing them through the interleaving buffer could let the peer
//! stream slip in between. Payload tags always go through the buffer.
//!
//! A raw timestamp jumping backwards past the discontinuity threshold marks
//! an encoder restart. The stream's cumulative offset then absorbs the old
//! clock so the outgoing timeline keeps advancing, and the two streams'
//! offsets are nudged back together when they have drifted apart.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{MediaError, Result};
use crate::media::{ParameterSets, TagPayload};
use crate::mux::InterleaveBuffer;
use crate::stats::StatsHandle;
use crate::transport::{ChunkTransport, MessageType, TransportSender};

use super::clock::StreamClock;
use super::config::PublishConfig;

/// Stream packetizer and synchronization engine
///
/// All entry points require exclusive access: discontinuity handling reads
/// and writes both stream clocks together, and the interleaving buffer is
/// single-threaded by design. The owning session wraps this in a mutex
/// shared by the two encode workers.
pub struct Packetizer<T: ChunkTransport> {
    video: StreamClock,
    audio: StreamClock,
    buffer: InterleaveBuffer,
    sender: Arc<TransportSender<T>>,
    stats: StatsHandle,
    threshold: i64,
    params: Option<ParameterSets>,
}

impl<T: ChunkTransport + 'static> Packetizer<T> {
    pub fn new(
        config: &PublishConfig,
        sender: Arc<TransportSender<T>>,
        stats: StatsHandle,
    ) -> Self {
        let mut buffer = InterleaveBuffer::new(config.max_interleave_delay);

        let release_sender = Arc::clone(&sender);
        buffer.set_release_callback(move |packet| release_sender.send_packet(&packet).is_ok());

        Packetizer {
            video: StreamClock::new(),
            audio: StreamClock::new(),
            buffer,
            sender,
            stats,
            threshold: config.discontinuity_threshold,
            params: None,
        }
    }

    /// Packetize one encoded video frame.
    ///
    /// `params` carries the frame's SPS/PPS when the encoder provides them;
    /// the last seen set is cached for configuration records.
    pub fn on_video_frame(
        &mut self,
        timestamp: i64,
        keyframe: bool,
        nal_units: &[Bytes],
        params: Option<&ParameterSets>,
    ) -> Result<()> {
        if let Some(p) = params {
            if self.params.as_ref() != Some(p) {
                self.params = Some(p.clone());
                self.video.needs_config = true;
            }
        }

        if self.video.is_discontinuity(timestamp, self.threshold) {
            self.reconcile_offsets();
            self.video.time_offset += self.video.last_timestamp;
            self.video.needs_config = true;
            self.stats.record_discontinuity();
            tracing::debug!(
                video_offset = self.video.time_offset,
                audio_offset = self.audio.time_offset,
                "New video segment starts"
            );
        }

        if self.video.needs_config && keyframe {
            self.send_video_config(timestamp)?;
        }

        self.video.last_timestamp = timestamp;

        let tag = TagPayload::VideoPayload {
            keyframe,
            nal_units: nal_units.to_vec(),
        };
        let packet = tag.into_packet(self.video.absolute(timestamp))?;
        self.stats.record_video_frame(keyframe);
        self.buffer.add_packet(packet)?;
        Ok(())
    }

    /// Packetize one raw audio frame (ADTS header already removed)
    pub fn on_audio_frame(&mut self, timestamp: i64, frame: &Bytes, asc: [u8; 2]) -> Result<()> {
        let discontinuity = self.audio.is_discontinuity(timestamp, self.threshold);

        // The config is re-announced at stream start, on a new segment, and
        // after a failed attempt.
        if timestamp == 0 || discontinuity || self.audio.needs_config {
            if discontinuity {
                self.reconcile_offsets();
                self.audio.time_offset += self.audio.last_timestamp;
                self.stats.record_discontinuity();
                tracing::debug!(
                    video_offset = self.video.time_offset,
                    audio_offset = self.audio.time_offset,
                    "New audio segment starts"
                );
            }

            self.send_audio_config(timestamp, asc)?;
        }

        self.audio.last_timestamp = timestamp;

        let tag = TagPayload::AudioPayload {
            frame: frame.clone(),
        };
        let packet = tag.into_packet(self.audio.absolute(timestamp))?;
        self.stats.record_audio_frame();
        self.buffer.add_packet(packet)?;
        Ok(())
    }

    /// Packets accepted but not yet released by the interleaving buffer
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop buffered packets without sending them
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    pub fn video_clock(&self) -> &StreamClock {
        &self.video
    }

    pub fn audio_clock(&self) -> &StreamClock {
        &self.audio
    }

    /// Pull the streams' absolute clocks back together after a restart.
    ///
    /// The stream that lags gets the (signed) gap added to its offset, but
    /// only while the gap is small enough to be restart drift rather than
    /// two genuinely unrelated clocks.
    fn reconcile_offsets(&mut self) {
        let video_abs = self.video.last_absolute();
        let audio_abs = self.audio.last_absolute();
        let shift = audio_abs - video_abs;

        if shift.abs() <= self.threshold * 30 {
            if shift > 0 {
                self.video.time_offset += shift;
            } else {
                self.audio.time_offset += shift;
            }
        }
    }

    fn send_video_config(&mut self, timestamp: i64) -> Result<()> {
        let params = match self.params.as_ref() {
            Some(p) => p,
            None => {
                tracing::error!("Video configuration due but no parameter sets seen");
                return Err(MediaError::MissingParameterSets.into());
            }
        };

        let tag = TagPayload::VideoConfig {
            sps: params.sps.clone(),
            pps: params.pps.clone(),
        };
        let body = tag.serialize()?;
        let pts = self.video.absolute(timestamp);

        match self.sender.send(MessageType::Video, pts, &body) {
            Ok(()) => {
                self.video.needs_config = false;
                self.stats.record_config();
                tracing::debug!(
                    pts = pts,
                    sps_len = params.sps.len(),
                    pps_len = params.pps.len(),
                    "Video configuration sent"
                );
                Ok(())
            }
            Err(e) => {
                self.video.needs_config = true;
                tracing::error!(error = %e, "Send video configuration failed");
                Err(e)
            }
        }
    }

    fn send_audio_config(&mut self, timestamp: i64, asc: [u8; 2]) -> Result<()> {
        let tag = TagPayload::AudioConfig { asc };
        let body = tag.serialize()?;
        let pts = self.audio.absolute(timestamp);

        match self.sender.send(MessageType::Audio, pts, &body) {
            Ok(()) => {
                self.audio.needs_config = false;
                self.stats.record_config();

                let config = crate::media::AudioSpecificConfig::parse(asc);
                tracing::debug!(
                    pts = pts,
                    profile = config.profile().map(|p| p.name()).unwrap_or("unknown"),
                    sample_rate = config.sampling_frequency(),
                    channels = config.channels(),
                    "Audio configuration sent"
                );
                Ok(())
            }
            Err(e) => {
                self.audio.needs_config = true;
                tracing::error!(error = %e, "Send audio configuration failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, MuxError, TransportError};
    use crate::transport::ChannelId;
    use std::sync::Mutex;

    type SentLog = Arc<Mutex<Vec<(MessageType, u64, Bytes)>>>;

    /// Transport that records successes and fails scripted attempt indices
    struct ScriptedTransport {
        log: SentLog,
        fail_on: Vec<usize>,
        attempts: usize,
    }

    impl ChunkTransport for ScriptedTransport {
        fn send_chunk(
            &mut self,
            _channel: ChannelId,
            message_type: MessageType,
            timestamp: u64,
            payload: &Bytes,
        ) -> Result<()> {
            let attempt = self.attempts;
            self.attempts += 1;
            if self.fail_on.contains(&attempt) {
                return Err(TransportError::SendFailed("scripted failure".into()).into());
            }
            self.log
                .lock()
                .unwrap()
                .push((message_type, timestamp, payload.clone()));
            Ok(())
        }
    }

    fn packetizer(
        fail_on: Vec<usize>,
    ) -> (Packetizer<ScriptedTransport>, SentLog, StatsHandle) {
        let log: SentLog = Arc::new(Mutex::new(Vec::new()));
        let stats = StatsHandle::new();
        let transport = ScriptedTransport {
            log: Arc::clone(&log),
            fail_on,
            attempts: 0,
        };
        let sender = Arc::new(TransportSender::new(transport, stats.clone()));
        let config = PublishConfig::default();
        (
            Packetizer::new(&config, sender, stats.clone()),
            log,
            stats,
        )
    }

    fn params() -> ParameterSets {
        ParameterSets {
            sps: Bytes::from_static(&[0x67, 0x64, 0x00, 0x1E]),
            pps: Bytes::from_static(&[0x68, 0xEF, 0x3C, 0x80]),
        }
    }

    fn idr() -> Vec<Bytes> {
        vec![Bytes::from_static(&[0x65, 0x88, 0x84, 0x21])]
    }

    fn slice() -> Vec<Bytes> {
        vec![Bytes::from_static(&[0x41, 0x9A, 0x02])]
    }

    fn aac_frame() -> Bytes {
        Bytes::from_static(&[0x21, 0x00, 0x49, 0x90])
    }

    const ASC: [u8; 2] = [0x12, 0x10];

    fn is_video_config(payload: &Bytes) -> bool {
        payload.len() > 2 && payload[0] == 0x17 && payload[1] == 0x00
    }

    fn is_video_payload(payload: &Bytes) -> bool {
        payload.len() > 2 && (payload[0] == 0x17 || payload[0] == 0x27) && payload[1] == 0x01
    }

    fn is_audio_config(payload: &Bytes) -> bool {
        payload.len() == 4 && payload[0] == 0xAF && payload[1] == 0x00
    }

    #[test]
    fn test_config_before_payload_on_first_keyframe() {
        let (mut pk, log, _) = packetizer(vec![]);

        pk.on_video_frame(0, true, &idr(), Some(&params())).unwrap();
        // Payload is held by the interleaving buffer, config went direct.
        {
            let log = log.lock().unwrap();
            assert_eq!(log.len(), 1);
            assert!(is_video_config(&log[0].2));
        }
        assert_eq!(pk.pending(), 1);

        // Audio arriving releases the buffered video payload.
        pk.on_audio_frame(0, &aac_frame(), ASC).unwrap();

        let log = log.lock().unwrap();
        assert!(is_video_config(&log[0].2));
        assert!(is_audio_config(&log[1].2));
        assert!(is_video_payload(&log[2].2));
    }

    #[test]
    fn test_video_config_matches_tag_serialization() {
        let (mut pk, log, _) = packetizer(vec![]);
        pk.on_video_frame(0, true, &idr(), Some(&params())).unwrap();

        let expected = TagPayload::VideoConfig {
            sps: params().sps,
            pps: params().pps,
        }
        .serialize()
        .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log[0].2, expected);
        assert_eq!(log[0].0, MessageType::Video);
    }

    #[test]
    fn test_no_config_without_keyframe() {
        let (mut pk, log, _) = packetizer(vec![]);

        pk.on_video_frame(0, false, &slice(), Some(&params()))
            .unwrap();
        assert!(log.lock().unwrap().is_empty());
        assert!(pk.video_clock().needs_config);

        pk.on_video_frame(33, true, &idr(), Some(&params())).unwrap();
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(is_video_config(&log[0].2));
        assert!(!pk.video_clock().needs_config);
    }

    #[test]
    fn test_keyframe_without_parameter_sets_is_an_error() {
        let (mut pk, log, _) = packetizer(vec![]);

        let err = pk.on_video_frame(0, true, &idr(), None).unwrap_err();
        assert!(matches!(
            err,
            Error::Media(MediaError::MissingParameterSets)
        ));
        assert!(pk.video_clock().needs_config);
        assert!(log.lock().unwrap().is_empty());
        // The frame was not packetized at all.
        assert_eq!(pk.pending(), 0);

        // Once parameter sets show up the same keyframe goes through.
        pk.on_video_frame(0, true, &idr(), Some(&params())).unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(pk.pending(), 1);
    }

    #[test]
    fn test_parameter_set_change_resends_config() {
        let (mut pk, log, _) = packetizer(vec![]);

        pk.on_video_frame(0, true, &idr(), Some(&params())).unwrap();
        pk.on_video_frame(33, false, &slice(), Some(&params()))
            .unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);

        let changed = ParameterSets {
            sps: Bytes::from_static(&[0x67, 0x64, 0x00, 0x28]),
            pps: Bytes::from_static(&[0x68, 0xEE, 0x3C, 0x80]),
        };
        // Change arrives mid-GOP; config waits for the next keyframe.
        pk.on_video_frame(66, false, &slice(), Some(&changed))
            .unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
        assert!(pk.video_clock().needs_config);

        pk.on_video_frame(100, true, &idr(), Some(&changed)).unwrap();
        let log = log.lock().unwrap();
        let configs: Vec<_> = log.iter().filter(|e| is_video_config(&e.2)).collect();
        assert_eq!(configs.len(), 2);
        let expected = TagPayload::VideoConfig {
            sps: changed.sps.clone(),
            pps: changed.pps.clone(),
        }
        .serialize()
        .unwrap();
        assert_eq!(configs[1].2, expected);
    }

    #[test]
    fn test_video_restart_continues_timeline() {
        let (mut pk, log, stats) = packetizer(vec![]);

        // Both streams run to 5000 in lockstep.
        pk.on_video_frame(0, true, &idr(), Some(&params())).unwrap();
        pk.on_audio_frame(0, &aac_frame(), ASC).unwrap();
        pk.on_video_frame(5000, false, &slice(), None).unwrap();
        pk.on_audio_frame(5000, &aac_frame(), ASC).unwrap();

        // Encoder restart: video timestamps begin again at zero.
        pk.on_video_frame(0, true, &idr(), None).unwrap();

        assert_eq!(pk.video_clock().time_offset, 5000);
        let gap = (pk.video_clock().last_absolute() - pk.audio_clock().last_absolute()).abs();
        assert!(gap <= 300 * 30);
        assert_eq!(stats.snapshot().discontinuities, 1);

        // The restart config went out on the continued timeline.
        let log = log.lock().unwrap();
        let configs: Vec<_> = log.iter().filter(|e| is_video_config(&e.2)).collect();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[1].1, 5000);
    }

    #[test]
    fn test_restart_shifts_video_up_to_audio() {
        let (mut pk, _, _) = packetizer(vec![]);

        // Audio has advanced to 1000, video stalled at 400.
        pk.on_video_frame(0, true, &idr(), Some(&params())).unwrap();
        pk.on_audio_frame(0, &aac_frame(), ASC).unwrap();
        pk.on_video_frame(400, false, &slice(), None).unwrap();
        pk.on_audio_frame(1000, &aac_frame(), ASC).unwrap();

        // Video restarts; the 600-unit lag folds into its offset along
        // with the old clock position.
        pk.on_video_frame(0, true, &idr(), None).unwrap();

        assert_eq!(pk.video_clock().time_offset, 1000);
        assert_eq!(pk.audio_clock().time_offset, 0);
        assert_eq!(
            pk.video_clock().last_absolute(),
            pk.audio_clock().last_absolute()
        );
    }

    #[test]
    fn test_restart_with_large_skew_skips_reconciliation() {
        let (mut pk, _, _) = packetizer(vec![]);

        pk.on_video_frame(0, true, &idr(), Some(&params())).unwrap();
        pk.on_audio_frame(0, &aac_frame(), ASC).unwrap();
        pk.on_video_frame(400, false, &slice(), None).unwrap();
        // Audio is 20000 ahead, beyond 30x the threshold.
        pk.on_audio_frame(20_400, &aac_frame(), ASC).unwrap();

        pk.on_video_frame(0, true, &idr(), None).unwrap();

        // Only the segment continuation applies, no cross-stream shift.
        assert_eq!(pk.video_clock().time_offset, 400);
        assert_eq!(pk.audio_clock().time_offset, 0);
    }

    #[test]
    fn test_audio_first_frame_sends_config() {
        let (mut pk, log, _) = packetizer(vec![]);

        pk.on_audio_frame(0, &aac_frame(), ASC).unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(is_audio_config(&log[0].2));
        assert_eq!(&log[0].2[..], &[0xAF, 0x00, 0x12, 0x10]);
        assert_eq!(log[0].0, MessageType::Audio);
        assert!(!pk.audio_clock().needs_config);
    }

    #[test]
    fn test_audio_config_failure_retries_next_frame() {
        let (mut pk, log, stats) = packetizer(vec![0]);

        let err = pk.on_audio_frame(0, &aac_frame(), ASC).unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::SendFailed(_))
        ));
        assert!(pk.audio_clock().needs_config);
        // The failed frame never reached the buffer.
        assert_eq!(pk.pending(), 0);

        // Next frame retries the config before its payload.
        pk.on_audio_frame(1024, &aac_frame(), ASC).unwrap();
        assert!(!pk.audio_clock().needs_config);
        assert!(is_audio_config(&log.lock().unwrap()[0].2));
        assert_eq!(stats.snapshot().send_failures, 1);
    }

    #[test]
    fn test_audio_restart_resends_config() {
        let (mut pk, log, _) = packetizer(vec![]);

        pk.on_audio_frame(0, &aac_frame(), ASC).unwrap();
        pk.on_audio_frame(1024, &aac_frame(), ASC).unwrap();
        pk.on_audio_frame(2048, &aac_frame(), ASC).unwrap();

        // Restart with no video in play: the idle video clock still gets
        // pulled up before the audio offset absorbs the old clock.
        pk.on_audio_frame(0, &aac_frame(), ASC).unwrap();

        assert_eq!(pk.audio_clock().time_offset, 2048);
        assert_eq!(pk.video_clock().time_offset, 2048);

        let log = log.lock().unwrap();
        let configs: Vec<_> = log.iter().filter(|e| is_audio_config(&e.2)).collect();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[1].1, 2048);
    }

    #[test]
    fn test_release_failure_surfaces_as_mux_error() {
        // First send (audio config) succeeds, everything after fails.
        let (mut pk, _, _) = packetizer(vec![1, 2, 3, 4]);

        pk.on_audio_frame(5, &aac_frame(), ASC).unwrap();
        assert_eq!(pk.pending(), 1);

        // Non-keyframe video skips config; its payload entry makes both
        // channels present and triggers a release that cannot be sent.
        let err = pk
            .on_video_frame(10, false, &slice(), Some(&params()))
            .unwrap_err();
        assert!(matches!(err, Error::Mux(MuxError::ReleaseAborted)));
    }

    #[test]
    fn test_payload_timestamps_carry_offset() {
        let (mut pk, log, _) = packetizer(vec![]);

        pk.on_video_frame(0, true, &idr(), Some(&params())).unwrap();
        pk.on_audio_frame(0, &aac_frame(), ASC).unwrap();
        pk.on_video_frame(5000, false, &slice(), None).unwrap();
        pk.on_audio_frame(5000, &aac_frame(), ASC).unwrap();
        pk.on_video_frame(0, true, &idr(), None).unwrap();
        pk.on_audio_frame(5033, &aac_frame(), ASC).unwrap();
        // Flush stragglers so payload timestamps show up in the log.
        pk.on_video_frame(100, false, &slice(), None).unwrap();
        pk.on_audio_frame(5100, &aac_frame(), ASC).unwrap();

        let log = log.lock().unwrap();
        let payload_ts: Vec<u64> = log
            .iter()
            .filter(|e| is_video_payload(&e.2))
            .map(|e| e.1)
            .collect();
        // Restarted video frames continue from the absorbed clock.
        assert!(payload_ts.contains(&5000));
        for ts in &payload_ts {
            assert!(*ts <= 5100);
        }
    }

    #[test]
    fn test_stats_track_frames_and_configs() {
        let (mut pk, _, stats) = packetizer(vec![]);

        pk.on_video_frame(0, true, &idr(), Some(&params())).unwrap();
        pk.on_video_frame(33, false, &slice(), None).unwrap();
        pk.on_audio_frame(0, &aac_frame(), ASC).unwrap();
        pk.on_audio_frame(1024, &aac_frame(), ASC).unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.video_frames, 2);
        assert_eq!(snapshot.keyframes, 1);
        assert_eq!(snapshot.audio_frames, 2);
        assert_eq!(snapshot.config_records, 2);
        assert_eq!(snapshot.discontinuities, 0);
    }

    #[test]
    fn test_clear_buffer_discards_pending() {
        let (mut pk, log, _) = packetizer(vec![]);

        pk.on_video_frame(0, true, &idr(), Some(&params())).unwrap();
        assert_eq!(pk.pending(), 1);

        pk.clear_buffer();
        assert_eq!(pk.pending(), 0);
        // Only the config was ever sent.
        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
