//! Playback timeline and gapless scheduler
//!
//! Decoded agent audio is scheduled onto a shared timeline keyed by the
//! output device's own clock: the count of samples it has rendered so
//! far. The scheduler places each buffer at `max(cursor, now)` and
//! advances the cursor by the buffer's length, so consecutive buffers
//! play back-to-back with no gap and no overlap. An interruption stops
//! everything scheduled and snaps the cursor back to real time.
//!
//! All positions are integer sample counts, so back-to-back buffers are
//! sample-exact with no float drift. The timeline is mono; the output
//! device thread fans the mixed signal out to its hardware channels.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::device::resolve_output_device;
use crate::audio::AudioOutput;
use crate::codec::PlaybackBuffer;
use crate::constants::DEVICE_ERROR_CHANNEL_CAPACITY;
use crate::error::AudioError;

/// One buffer bound to a start position on the output clock
struct ScheduledSource {
    start: u64,
    samples: Vec<f32>,
}

impl ScheduledSource {
    fn end(&self) -> u64 {
        self.start + self.samples.len() as u64
    }
}

/// Shared playback timeline: the scheduled source set plus the output
/// clock, advanced by whoever renders (the device thread, or a test).
pub struct Timeline {
    sample_rate: u32,
    /// Samples rendered so far; the output clock
    rendered: Arc<AtomicU64>,
    sources: Mutex<Vec<ScheduledSource>>,
    /// Sources that played to completion
    completed: AtomicU64,
    /// Sources discarded by interruptions
    discarded: AtomicU64,
}

impl Timeline {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            rendered: Arc::new(AtomicU64::new(0)),
            sources: Mutex::new(Vec::new()),
            completed: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Output clock reading in samples
    pub fn now_samples(&self) -> u64 {
        self.rendered.load(Ordering::Acquire)
    }

    /// Output clock reading in seconds
    pub fn now_secs(&self) -> f64 {
        self.now_samples() as f64 / self.sample_rate as f64
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Add a source at `requested_start`, clamped to the clock's
    /// current position under the timeline lock. Returns the actual
    /// start position.
    pub fn add(&self, requested_start: u64, samples: Vec<f32>) -> u64 {
        let mut sources = self.sources.lock();
        let now = self.rendered.load(Ordering::Acquire);
        let start = requested_start.max(now);
        sources.push(ScheduledSource { start, samples });
        start
    }

    /// Stop and discard every scheduled source. Returns how many were
    /// discarded.
    pub fn clear(&self) -> usize {
        let mut sources = self.sources.lock();
        let n = sources.len();
        sources.clear();
        self.discarded.fetch_add(n as u64, Ordering::Relaxed);
        n
    }

    /// Number of sources pending or playing
    pub fn active_sources(&self) -> usize {
        self.sources.lock().len()
    }

    /// Sources that played to their natural end
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Sources discarded by interruptions
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Mix every active source into `out` (mono), advance the clock by
    /// `out.len()` samples and retire sources whose last sample has now
    /// been rendered.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);

        let mut sources = self.sources.lock();
        let start_pos = self.rendered.load(Ordering::Acquire);
        let end_pos = start_pos + out.len() as u64;
        let mut finished = 0u64;

        sources.retain(|source| {
            let overlap_start = source.start.max(start_pos);
            let overlap_end = source.end().min(end_pos);
            if overlap_start < overlap_end {
                let out_offset = (overlap_start - start_pos) as usize;
                let src_offset = (overlap_start - source.start) as usize;
                let len = (overlap_end - overlap_start) as usize;
                for i in 0..len {
                    out[out_offset + i] += source.samples[src_offset + i];
                }
            }
            if source.end() <= end_pos {
                finished += 1;
                false
            } else {
                true
            }
        });

        self.completed.fetch_add(finished, Ordering::Relaxed);
        // Published under the sources lock; add() clamps against it
        self.rendered.store(end_pos, Ordering::Release);
    }
}

/// Gapless scheduler over a shared timeline.
///
/// Owned by the session event loop; never touched concurrently. The
/// cursor is the earliest position the next buffer may start at.
pub struct PlaybackScheduler {
    timeline: Arc<Timeline>,
    cursor: u64,
    buffers_scheduled: u64,
    interruptions: u64,
}

impl PlaybackScheduler {
    pub fn new(timeline: Arc<Timeline>) -> Self {
        Self {
            timeline,
            cursor: 0,
            buffers_scheduled: 0,
            interruptions: 0,
        }
    }

    /// Schedule a decoded buffer at `max(cursor, now)` and advance the
    /// cursor past it. Returns the start position in samples.
    ///
    /// Buffers must be mono and arrive in the order they must be heard.
    pub fn schedule(&mut self, buffer: PlaybackBuffer) -> u64 {
        let frames = buffer.samples.len() as u64;
        let start = self.timeline.add(self.cursor, buffer.samples);
        self.cursor = start + frames;
        self.buffers_scheduled += 1;
        tracing::trace!(start, frames, cursor = self.cursor, "scheduled playback buffer");
        start
    }

    /// Barge-in: stop everything scheduled, clear the set and snap the
    /// cursor to the clock's current position so the next buffer plays
    /// immediately. Returns how many sources were discarded.
    pub fn interrupt(&mut self) -> usize {
        let discarded = self.timeline.clear();
        self.cursor = self.timeline.now_samples();
        self.interruptions += 1;
        tracing::debug!(discarded, cursor = self.cursor, "playback interrupted");
        discarded
    }

    /// Current cursor position in samples
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Sources pending or playing
    pub fn pending(&self) -> usize {
        self.timeline.active_sources()
    }

    /// Get statistics
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            buffers_scheduled: self.buffers_scheduled,
            buffers_completed: self.timeline.completed(),
            buffers_discarded: self.timeline.discarded(),
            interruptions: self.interruptions,
            pending: self.timeline.active_sources(),
        }
    }
}

/// Scheduler statistics
#[derive(Debug, Clone)]
pub struct SchedulerStats {
    pub buffers_scheduled: u64,
    pub buffers_completed: u64,
    pub buffers_discarded: u64,
    pub interruptions: u64,
    pub pending: usize,
}

/// Speaker output for a single device
pub struct SpeakerOutput {
    /// Device name from config; `None` selects the host default
    device_name: Option<String>,

    /// Requested output rate in Hz
    sample_rate: u32,

    /// Whether playback is running
    running: Arc<AtomicBool>,

    /// Stream thread handle
    thread_handle: Option<JoinHandle<()>>,

    /// Channel for stream errors
    error_rx: Option<Receiver<AudioError>>,
}

impl SpeakerOutput {
    /// Create a playback handle; the device is acquired on `start`
    pub fn new(device_name: Option<String>, sample_rate: u32) -> Self {
        Self {
            device_name,
            sample_rate,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            error_rx: None,
        }
    }

    /// Check if playback is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl AudioOutput for SpeakerOutput {
    fn start(&mut self, timeline: Arc<Timeline>) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let device = resolve_output_device(self.device_name.as_deref())?;
        let channels = device.default_output_config()?.channels().max(1);
        tracing::info!(device = %device.name, rate = self.sample_rate, channels, "starting speaker output");

        let (error_tx, error_rx) = bounded::<AudioError>(DEVICE_ERROR_CHANNEL_CAPACITY);
        self.error_rx = Some(error_rx);

        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let running = self.running.clone();
        let running_for_loop = self.running.clone();
        let build_error_tx = error_tx.clone();
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("voice-playback".to_string())
            .spawn(move || {
                let cpal_device = device.into_inner();
                let mut mono: Vec<f32> = Vec::new();

                let stream = cpal_device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        if !running.load(Ordering::Relaxed) {
                            data.fill(0.0);
                            return;
                        }

                        let frames = data.len() / channels as usize;
                        mono.resize(frames, 0.0);
                        timeline.render(&mut mono);

                        // Fan the mono mix out to every hardware channel
                        for (frame, &sample) in
                            data.chunks_exact_mut(channels as usize).zip(mono.iter())
                        {
                            frame.fill(sample);
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
                            tracing::error!("Failed to start playback stream: {}", e);
                            let _ = build_error_tx.try_send(AudioError::StreamError(e.to_string()));
                            running_for_loop.store(false, Ordering::SeqCst);
                            return;
                        }

                        // Keep thread alive while running
                        while running_for_loop.load(Ordering::Relaxed) {
                            thread::sleep(std::time::Duration::from_millis(10));
                        }

                        // Stream is dropped here, stopping playback
                    }
                    Err(e) => {
                        tracing::error!("Failed to build playback stream: {}", e);
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

impl Drop for SpeakerOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RATE: u32 = 24_000;

    fn buffer(samples: Vec<f32>) -> PlaybackBuffer {
        PlaybackBuffer {
            samples,
            sample_rate: RATE,
            channels: 1,
        }
    }

    /// Half a second of samples at the output rate
    fn half_second() -> Vec<f32> {
        vec![0.25; (RATE / 2) as usize]
    }

    #[test]
    fn test_empty_timeline_renders_silence() {
        let timeline = Timeline::new(RATE);
        let mut out = vec![1.0f32; 480];
        timeline.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(timeline.now_samples(), 480);
    }

    #[test]
    fn test_back_to_back_buffers_are_gapless() {
        let timeline = Arc::new(Timeline::new(RATE));
        let mut scheduler = PlaybackScheduler::new(timeline);

        let s1 = scheduler.schedule(buffer(half_second()));
        let s2 = scheduler.schedule(buffer(half_second()));
        let s3 = scheduler.schedule(buffer(half_second()));

        assert_eq!(s1, 0);
        assert_eq!(s2, 12_000);
        assert_eq!(s3, 24_000);
        assert_eq!(scheduler.cursor(), 36_000);
        assert_eq!(scheduler.pending(), 3);
    }

    #[test]
    fn test_cursor_resyncs_after_idle_gap() {
        let timeline = Arc::new(Timeline::new(RATE));
        let mut scheduler = PlaybackScheduler::new(timeline.clone());

        // 0.7 s of silence renders before any audio arrives
        let mut out = vec![0.0f32; 16_800];
        timeline.render(&mut out);

        let start = scheduler.schedule(buffer(half_second()));
        assert_eq!(start, 16_800);
        assert_eq!(scheduler.cursor(), 16_800 + 12_000);
    }

    #[test]
    fn test_render_mixes_at_scheduled_offset() {
        let timeline = Arc::new(Timeline::new(RATE));
        let mut scheduler = PlaybackScheduler::new(timeline.clone());

        scheduler.schedule(buffer(vec![0.5; 100]));
        scheduler.schedule(buffer(vec![-0.25; 100]));

        let mut out = vec![0.0f32; 250];
        timeline.render(&mut out);

        assert!(out[..100].iter().all(|&s| s == 0.5));
        assert!(out[100..200].iter().all(|&s| s == -0.25));
        assert!(out[200..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_sources_retire_on_completion() {
        let timeline = Arc::new(Timeline::new(RATE));
        let mut scheduler = PlaybackScheduler::new(timeline.clone());

        scheduler.schedule(buffer(vec![0.1; 300]));
        assert_eq!(scheduler.pending(), 1);

        let mut out = vec![0.0f32; 200];
        timeline.render(&mut out);
        // Still playing: last sample not yet rendered
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(timeline.completed(), 0);

        timeline.render(&mut out);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(timeline.completed(), 1);
    }

    #[test]
    fn test_partial_render_plays_source_interior() {
        let timeline = Arc::new(Timeline::new(RATE));
        let samples: Vec<f32> = (0..400).map(|i| i as f32 / 400.0).collect();
        timeline.add(0, samples.clone());

        let mut first = vec![0.0f32; 150];
        timeline.render(&mut first);
        let mut second = vec![0.0f32; 150];
        timeline.render(&mut second);

        assert_eq!(&first[..], &samples[..150]);
        assert_eq!(&second[..], &samples[150..300]);
    }

    #[test]
    fn test_interrupt_discards_everything_and_snaps_cursor() {
        let timeline = Arc::new(Timeline::new(RATE));
        let mut scheduler = PlaybackScheduler::new(timeline.clone());

        // Two half-second buffers: 0..12000 and 12000..24000
        scheduler.schedule(buffer(half_second()));
        scheduler.schedule(buffer(half_second()));

        // Playback reaches t = 0.3 s
        let mut out = vec![0.0f32; 7_200];
        timeline.render(&mut out);

        let discarded = scheduler.interrupt();
        assert_eq!(discarded, 2);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.cursor(), 7_200);
        // Discarded sources never count as completed
        assert_eq!(timeline.completed(), 0);

        // Silence from here on
        let mut after = vec![1.0f32; 100];
        timeline.render(&mut after);
        assert!(after.iter().all(|&s| s == 0.0));

        // A chunk arriving just after the barge-in starts right away,
        // not at the stale 24000 cursor
        let start = scheduler.schedule(buffer(half_second()));
        assert_eq!(start, 7_300);
    }

    #[test]
    fn test_interrupt_on_idle_scheduler_is_harmless() {
        let timeline = Arc::new(Timeline::new(RATE));
        let mut scheduler = PlaybackScheduler::new(timeline);
        assert_eq!(scheduler.interrupt(), 0);
        assert_eq!(scheduler.cursor(), 0);
    }

    #[test]
    fn test_stats_track_every_outcome() {
        let timeline = Arc::new(Timeline::new(RATE));
        let mut scheduler = PlaybackScheduler::new(timeline.clone());

        scheduler.schedule(buffer(vec![0.1; 100]));
        let mut out = vec![0.0f32; 100];
        timeline.render(&mut out);

        scheduler.schedule(buffer(vec![0.1; 100]));
        scheduler.interrupt();

        let stats = scheduler.stats();
        assert_eq!(stats.buffers_scheduled, 2);
        assert_eq!(stats.buffers_completed, 1);
        assert_eq!(stats.buffers_discarded, 1);
        assert_eq!(stats.interruptions, 1);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn test_speaker_output_stop_without_start_is_a_noop() {
        let mut speaker = SpeakerOutput::new(None, RATE);
        speaker.stop();
        assert!(!speaker.is_running());
        assert!(speaker.check_errors().is_none());
    }

    #[test]
    fn test_speaker_output_unknown_device_fails() {
        let mut speaker = SpeakerOutput::new(Some("no-such-device-7f3a".to_string()), RATE);
        let timeline = Arc::new(Timeline::new(RATE));
        assert!(speaker.start(timeline).is_err());
        assert!(!speaker.is_running());
    }

    proptest! {
        /// Start positions are the running sum of prior durations for
        /// any sequence submitted before the clock catches up.
        #[test]
        fn prop_starts_are_cumulative(lengths in proptest::collection::vec(1usize..4_000, 1..12)) {
            let timeline = Arc::new(Timeline::new(RATE));
            let mut scheduler = PlaybackScheduler::new(timeline);

            let mut expected = 0u64;
            for len in lengths {
                let start = scheduler.schedule(buffer(vec![0.0; len]));
                prop_assert_eq!(start, expected);
                expected += len as u64;
            }
            prop_assert_eq!(scheduler.cursor(), expected);
        }
    }
}
