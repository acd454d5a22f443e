//! Microphone capture
//!
//! Runs the cpal input stream on a dedicated thread and hands the
//! session fixed-size mono blocks, invoking the block handler directly
//! on the capture thread so encoding happens inside the callback.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::device::resolve_input_device;
use crate::audio::{AudioInput, BlockHandler};
use crate::constants::DEVICE_ERROR_CHANNEL_CAPACITY;
use crate::error::AudioError;

/// Microphone input for a single device
pub struct MicInput {
    /// Device name from config; `None` selects the host default
    device_name: Option<String>,

    /// Requested capture rate in Hz
    sample_rate: u32,

    /// Samples accumulated per delivered block
    block_size: usize,

    /// Whether capture is running
    running: Arc<AtomicBool>,

    /// Stream thread handle
    thread_handle: Option<JoinHandle<()>>,

    /// Channel for stream errors
    error_rx: Option<Receiver<AudioError>>,

    /// Total samples captured
    samples_captured: Arc<AtomicU64>,

    /// Total full blocks delivered to the handler
    blocks_delivered: Arc<AtomicU64>,
}

impl MicInput {
    /// Create a capture handle; the device is acquired on `start`
    pub fn new(device_name: Option<String>, sample_rate: u32, block_size: usize) -> Self {
        Self {
            device_name,
            sample_rate,
            block_size,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            error_rx: None,
            samples_captured: Arc::new(AtomicU64::new(0)),
            blocks_delivered: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get total samples captured
    pub fn samples_captured(&self) -> u64 {
        self.samples_captured.load(Ordering::Relaxed)
    }

    /// Get total blocks delivered
    pub fn blocks_delivered(&self) -> u64 {
        self.blocks_delivered.load(Ordering::Relaxed)
    }

    /// Check if capture is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl AudioInput for MicInput {
    fn start(&mut self, mut handler: BlockHandler) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        // Acquisition failures surface here, synchronously
        let device = resolve_input_device(self.device_name.as_deref())?;
        tracing::info!(device = %device.name, rate = self.sample_rate, "starting microphone capture");

        let (error_tx, error_rx) = bounded::<AudioError>(DEVICE_ERROR_CHANNEL_CAPACITY);
        self.error_rx = Some(error_rx);

        let config = StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let running = self.running.clone();
        let running_for_loop = self.running.clone();
        let samples_captured = self.samples_captured.clone();
        let blocks_delivered = self.blocks_delivered.clone();
        let block_size = self.block_size;
        let build_error_tx = error_tx.clone();

        self.samples_captured.store(0, Ordering::SeqCst);
        self.blocks_delivered.store(0, Ordering::SeqCst);
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("voice-capture".to_string())
            .spawn(move || {
                let cpal_device = device.into_inner();
                let mut block: Vec<f32> = Vec::with_capacity(block_size);

                let stream = cpal_device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }

                        samples_captured.fetch_add(data.len() as u64, Ordering::Relaxed);

                        // Device callbacks vary in size; re-chunk into
                        // fixed blocks before handing off
                        for &sample in data {
                            block.push(sample);
                            if block.len() == block_size {
                                handler(&block);
                                blocks_delivered.fetch_add(1, Ordering::Relaxed);
                                block.clear();
                            }
                        }
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            tracing::error!("Failed to start capture stream: {}", e);
                            let _ = build_error_tx.try_send(AudioError::StreamError(e.to_string()));
                            running_for_loop.store(false, Ordering::SeqCst);
                            return;
                        }

                        // Keep thread alive while running
                        while running_for_loop.load(Ordering::Relaxed) {
                            thread::sleep(std::time::Duration::from_millis(10));
                        }

                        // Stream is dropped here, stopping capture
                    }
                    Err(e) => {
                        tracing::error!("Failed to build capture stream: {}", e);
                        let _ = build_error_tx.try_send(AudioError::StreamError(e.to_string()));
                        running_for_loop.store(false, Ordering::SeqCst);
                    }
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Drop for MicInput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants;

    #[test]
    fn test_new_does_not_touch_devices() {
        let mic = MicInput::new(
            None,
            constants::INPUT_SAMPLE_RATE,
            constants::CAPTURE_BLOCK_SIZE,
        );
        assert!(!mic.is_running());
        assert_eq!(mic.samples_captured(), 0);
    }

    #[test]
    fn test_stop_without_start_is_a_noop() {
        let mut mic = MicInput::new(None, constants::INPUT_SAMPLE_RATE, 4096);
        mic.stop();
        assert!(!mic.is_running());
        assert!(mic.check_errors().is_none());
    }

    #[test]
    fn test_start_with_unknown_device_fails() {
        let mut mic = MicInput::new(
            Some("no-such-device-7f3a".to_string()),
            constants::INPUT_SAMPLE_RATE,
            4096,
        );
        let result = mic.start(Box::new(|_| {}));
        assert!(result.is_err());
        assert!(!mic.is_running());
    }
}
