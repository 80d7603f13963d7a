//! Publish session example with synthetic encoders
//!
//! Run with: cargo run --example publish_session [SECONDS]
//!
//! Examples:
//!   cargo run --example publish_session            # publishes for 10 seconds
//!   cargo run --example publish_session 30         # publishes for 30 seconds
//!
//! Wires a [`PublishSession`] to stand-in encoders that fabricate
//! H.264/AAC frames and to a transport that logs every outgoing chunk
//! instead of writing to a socket. The synthetic capture clock wraps
//! every few seconds, so the encoder-restart handling (offset
//! continuation plus configuration re-send) is visible live:
//!
//!   RUST_LOG=rtmp_push=debug cargo run --example publish_session

use std::time::Duration;

use bytes::Bytes;

use rtmp_push::pipeline::{
    AudioEncoder, AudioFrame, CaptureBuffer, VideoEncoder, VideoFrame,
};
use rtmp_push::transport::{ChannelId, ChunkTransport, MessageType};
use rtmp_push::{PublishConfig, PublishSession};

/// Milliseconds before the synthetic capture clock wraps back to zero
const SEGMENT_MS: i64 = 3000;

/// Keyframe every 30 frames (one second at ~30 fps)
const GOP_FRAMES: u64 = 30;

static SPS: [u8; 4] = [0x67, 0x64, 0x00, 0x1E];
static PPS: [u8; 3] = [0x68, 0xEF, 0x3C];
static ADTS_HEADER: [u8; 7] = [0xFF, 0xF1, 0x50, 0x80, 0x0D, 0x7F, 0xFC];

/// Fabricates Annex B output; keyframes carry SPS/PPS in-band
struct SyntheticVideoEncoder {
    frames: u64,
}

impl VideoEncoder for SyntheticVideoEncoder {
    fn encode(&mut self, buffer: CaptureBuffer) -> rtmp_push::Result<Option<VideoFrame>> {
        let keyframe = self.frames % GOP_FRAMES == 0;
        self.frames += 1;

        let mut stream = Vec::new();
        if keyframe {
            stream.extend_from_slice(&[0, 0, 0, 1]);
            stream.extend_from_slice(&SPS);
            stream.extend_from_slice(&[0, 0, 0, 1]);
            stream.extend_from_slice(&PPS);
            stream.extend_from_slice(&[0, 0, 0, 1, 0x65]);
        } else {
            stream.extend_from_slice(&[0, 0, 0, 1, 0x41]);
        }
        stream.extend_from_slice(&[0xA5; 200]);

        Ok(Some(VideoFrame::from_annex_b(
            buffer.timestamp,
            &Bytes::from(stream),
        )))
    }

    fn params(&self) -> Option<rtmp_push::media::ParameterSets> {
        None
    }
}

/// Fabricates ADTS-framed AAC LC frames (44.1 kHz stereo)
struct SyntheticAudioEncoder;

impl AudioEncoder for SyntheticAudioEncoder {
    fn encode(&mut self, buffer: CaptureBuffer) -> rtmp_push::Result<Option<AudioFrame>> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&ADTS_HEADER);
        frame.extend_from_slice(&[0x5A; 100]);
        Ok(Some(AudioFrame::new(buffer.timestamp, Bytes::from(frame))))
    }

    fn config(&self) -> [u8; 2] {
        [0x12, 0x10]
    }
}

/// Logs outgoing chunks instead of writing them to a socket
struct LoggingTransport {
    chunks: u64,
}

impl ChunkTransport for LoggingTransport {
    fn send_chunk(
        &mut self,
        channel: ChannelId,
        message_type: MessageType,
        timestamp: u64,
        payload: &Bytes,
    ) -> rtmp_push::Result<()> {
        self.chunks += 1;
        tracing::debug!(
            n = self.chunks,
            channel = ?channel,
            message_type = ?message_type,
            timestamp = timestamp,
            bytes = payload.len(),
            "chunk out"
        );
        Ok(())
    }
}

fn print_usage() {
    eprintln!("Usage: publish_session [SECONDS]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  SECONDS    How long to publish (default: 10)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let run_secs: u64 = match args.get(1) {
        Some(arg) => match arg.parse() {
            Ok(secs) => secs,
            Err(_) => {
                eprintln!("Error: invalid duration '{}'", arg);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => 10,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtmp_push=debug".parse()?)
                .add_directive("publish_session=debug".parse()?),
        )
        .init();

    println!("Publishing synthetic A/V for {} seconds", run_secs);
    println!("Capture clock wraps every {} ms to exercise restart handling", SEGMENT_MS);
    println!();

    let config = PublishConfig::new().chunk_size(2048);
    let (mut session, mut events) =
        PublishSession::new(config, LoggingTransport { chunks: 0 });

    session.attach()?;
    session.spawn_video(SyntheticVideoEncoder { frames: 0 })?;
    session.spawn_audio(SyntheticAudioEncoder)?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("Event: {:?}", event);
        }
    });

    let started = std::time::Instant::now();
    let mut video_tick = tokio::time::interval(Duration::from_millis(33));
    let mut audio_tick = tokio::time::interval(Duration::from_millis(23));
    let deadline = tokio::time::sleep(Duration::from_secs(run_secs));
    tokio::pin!(deadline);

    loop {
        let ts = (started.elapsed().as_millis() as i64) % SEGMENT_MS;
        tokio::select! {
            _ = video_tick.tick() => {
                session.feed_video(CaptureBuffer::new(ts, Bytes::new()))?;
            }
            _ = audio_tick.tick() => {
                session.feed_audio(CaptureBuffer::new(ts, Bytes::new()))?;
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
            _ = &mut deadline => {
                break;
            }
        }
    }

    let stats = session.stats();
    session.shutdown()?;

    println!();
    println!(
        "Sent {} packets / {} bytes ({} bps)",
        stats.packets_sent,
        stats.bytes_sent,
        stats.bitrate()
    );
    println!(
        "Frames: video={} (keyframes={}) audio={} configs={} discontinuities={}",
        stats.video_frames,
        stats.keyframes,
        stats.audio_frames,
        stats.config_records,
        stats.discontinuities
    );

    Ok(())
}
