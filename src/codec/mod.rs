//! PCM16 wire codec
//!
//! Converts between raw f32 device samples and the base64 PCM16
//! payloads the agent speaks on the wire.

pub mod decoder;
pub mod encoder;

pub use decoder::{ChunkDecoder, DecoderStats, PlaybackBuffer};
pub use encoder::{EncoderStats, FrameEncoder};
