//! Outbound frame encoder
//!
//! Converts raw f32 capture blocks into transport-ready frames:
//! clamp, scale to 16-bit signed PCM, little-endian bytes, base64.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::{BufMut, BytesMut};

use crate::protocol::OutboundFrame;

/// Encoder for outbound capture blocks
pub struct FrameEncoder {
    mime_type: String,
    /// PCM16 byte buffer (reused to avoid allocations)
    pcm_buffer: BytesMut,
    /// Frame counter for statistics
    frames_encoded: u64,
    /// Total samples consumed
    samples_consumed: u64,
    /// Total payload bytes produced (before base64 expansion)
    bytes_produced: u64,
}

impl FrameEncoder {
    /// Create an encoder declaring the given capture sample rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            mime_type: format!("audio/pcm;rate={sample_rate}"),
            pcm_buffer: BytesMut::new(),
            frames_encoded: 0,
            samples_consumed: 0,
            bytes_produced: 0,
        }
    }

    /// Encode one capture block into a wire frame.
    ///
    /// Samples outside [-1.0, 1.0] are clamped; +1.0 saturates to
    /// `i16::MAX`.
    pub fn encode(&mut self, samples: &[f32]) -> OutboundFrame {
        self.pcm_buffer.clear();
        self.pcm_buffer.reserve(samples.len() * 2);
        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * 32768.0) as i16;
            self.pcm_buffer.put_i16_le(value);
        }

        self.frames_encoded += 1;
        self.samples_consumed += samples.len() as u64;
        self.bytes_produced += self.pcm_buffer.len() as u64;

        OutboundFrame {
            data: BASE64.encode(&self.pcm_buffer),
            mime_type: self.mime_type.clone(),
        }
    }

    /// Declared mime type of produced frames
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Get statistics
    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            samples_consumed: self.samples_consumed,
            bytes_produced: self.bytes_produced,
        }
    }

    /// Reset statistics
    pub fn reset_stats(&mut self) {
        self.frames_encoded = 0;
        self.samples_consumed = 0;
        self.bytes_produced = 0;
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub samples_consumed: u64,
    pub bytes_produced: u64,
}
