//! Inbound chunk decoder
//!
//! Converts base64 PCM16 payloads from the agent into ready-to-play
//! f32 buffers. A malformed chunk is dropped; it never ends the session.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::CodecError;

/// A decoded, ready-to-play audio buffer
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    /// Interleaved f32 samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PlaybackBuffer {
    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Playable duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Decoder for inbound agent audio
pub struct ChunkDecoder {
    sample_rate: u32,
    channels: u16,
    /// Raw byte buffer (reused to avoid allocations)
    byte_buffer: Vec<u8>,
    /// Chunks decoded successfully
    chunks_decoded: u64,
    /// Chunks dropped as malformed
    chunks_dropped: u64,
    /// Total samples produced
    samples_produced: u64,
}

impl ChunkDecoder {
    /// Create a decoder for the declared inbound format
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            byte_buffer: Vec::new(),
            chunks_decoded: 0,
            chunks_dropped: 0,
            samples_produced: 0,
        }
    }

    /// Decode one chunk payload into a playback buffer.
    ///
    /// Rejects invalid base64, odd byte counts and empty payloads; the
    /// caller drops the chunk and the session continues.
    pub fn decode(&mut self, data: &str) -> Result<PlaybackBuffer, CodecError> {
        self.byte_buffer.clear();
        if let Err(e) = BASE64.decode_vec(data, &mut self.byte_buffer) {
            self.chunks_dropped += 1;
            return Err(CodecError::InvalidBase64(e.to_string()));
        }
        if self.byte_buffer.is_empty() {
            self.chunks_dropped += 1;
            return Err(CodecError::EmptyPayload);
        }
        if self.byte_buffer.len() % 2 != 0 {
            self.chunks_dropped += 1;
            return Err(CodecError::TruncatedSample(self.byte_buffer.len()));
        }

        let samples: Vec<f32> = self
            .byte_buffer
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect();

        self.chunks_decoded += 1;
        self.samples_produced += samples.len() as u64;

        Ok(PlaybackBuffer {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }

    /// Get sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get channel count
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Get statistics
    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            chunks_decoded: self.chunks_decoded,
            chunks_dropped: self.chunks_dropped,
            samples_produced: self.samples_produced,
            drop_rate: if self.chunks_decoded + self.chunks_dropped > 0 {
                self.chunks_dropped as f32 / (self.chunks_decoded + self.chunks_dropped) as f32
            } else {
                0.0
            },
        }
    }

    /// Reset statistics
    pub fn reset_stats(&mut self) {
        self.chunks_decoded = 0;
        self.chunks_dropped = 0;
        self.samples_produced = 0;
    }
}

/// Decoder statistics
#[derive(Debug, Clone)]
pub struct DecoderStats {
    pub chunks_decoded: u64,
    pub chunks_dropped: u64,
    pub samples_produced: u64,
    pub drop_rate: f32,
}
