//! # Voicewire
//!
//! Realtime duplex voice pipeline for conversational AI agents.
//!
//! Captures the microphone, streams it to a remote agent as PCM16 frames,
//! and plays the agent's synthesized speech back gaplessly as it arrives.
//! The remote side can interrupt its own playback mid-utterance (barge-in).
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          VoiceSession                            │
//! │                                                                   │
//! │  OUTBOUND                                                         │
//! │  ┌────────────┐    ┌──────────────┐    ┌───────────────────┐     │
//! │  │ Microphone │───▶│ FrameEncoder │───▶│    FrameSender    │──────▶ remote
//! │  │  (capture  │    │ f32 → PCM16  │    │ (fire-and-forget) │     │  agent
//! │  │   thread)  │    │   → base64   │    └───────────────────┘     │
//! │  └────────────┘    └──────────────┘                               │
//! │                                                                   │
//! │  INBOUND                      event loop (single task)            │
//! │  ┌─────────────────┐    ┌──────────────┐    ┌─────────────────┐  │
//! │  │ TransportEvent  │───▶│ ChunkDecoder │───▶│PlaybackScheduler│  │
//! │  │ queue (ordered) │    │ base64 → f32 │    │ cursor = max(   │  │
//! │  └─────────────────┘    └──────────────┘    │  cursor, now)   │  │
//! │          │                                  └────────┬────────┘  │
//! │          │ Interrupted                               ▼           │
//! │          └────────────▶ stop all sources    ┌─────────────────┐  │
//! │                         clear timeline      │    Timeline     │  │
//! │                         cursor = now        │ (mixed by the   │  │
//! │                                             │  output thread) │  │
//! │                                             └────────┬────────┘  │
//! │                                                      ▼           │
//! │                                             ┌─────────────────┐  │
//! │                                             │ Speaker (render │  │
//! │                                             │    thread)      │  │
//! │                                             └─────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
pub use session::{SessionState, VoiceSession};

/// Application-wide constants
pub mod constants {
    /// Sample rate of outbound microphone audio in Hz
    pub const INPUT_SAMPLE_RATE: u32 = 16_000;

    /// Sample rate of inbound agent audio in Hz
    pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

    /// Channel count for both directions (mono)
    pub const CHANNELS: u16 = 1;

    /// Samples per capture block handed to the encoder
    pub const CAPTURE_BLOCK_SIZE: usize = 4096;

    /// Declared mime type of outbound frames
    pub const OUTBOUND_MIME_TYPE: &str = "audio/pcm;rate=16000";

    /// Capacity of the error channel between device threads and owners
    pub const DEVICE_ERROR_CHANNEL_CAPACITY: usize = 16;
}
