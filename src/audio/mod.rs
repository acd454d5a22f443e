//! Audio subsystem module

use std::sync::Arc;

use crate::error::AudioError;

pub mod capture;
pub mod device;
pub mod playback;

pub use capture::MicInput;
pub use device::{list_devices, resolve_input_device, resolve_output_device, AudioDevice};
pub use playback::{PlaybackScheduler, SchedulerStats, SpeakerOutput, Timeline};

/// Callback invoked with each fixed-size capture block, on the capture
/// thread.
pub type BlockHandler = Box<dyn FnMut(&[f32]) + Send>;

/// Source of fixed-size mono capture blocks
pub trait AudioInput: Send {
    /// Begin delivering blocks to `handler` until `stop` is called.
    fn start(&mut self, handler: BlockHandler) -> Result<(), AudioError>;

    /// Stop delivering blocks and release the device.
    fn stop(&mut self);

    /// Most recent asynchronous device error, if any.
    fn check_errors(&self) -> Option<AudioError> {
        None
    }
}

/// Sink that renders a shared playback timeline
pub trait AudioOutput: Send {
    /// Begin rendering `timeline` until `stop` is called.
    fn start(&mut self, timeline: Arc<Timeline>) -> Result<(), AudioError>;

    /// Stop rendering and release the device.
    fn stop(&mut self);

    /// Most recent asynchronous device error, if any.
    fn check_errors(&self) -> Option<AudioError> {
        None
    }
}
