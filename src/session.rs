//! Session lifecycle
//!
//! `VoiceSession` is the single owner of everything a live conversation
//! needs: the microphone, the playback timeline, the scheduler and the
//! transport connection. One spawned task consumes the ordered transport
//! event stream and makes every pipeline decision; nothing else mutates
//! scheduler state. Inbound chunks are decoded to completion and
//! scheduled before the next event is consumed, which preserves arrival
//! order through the asynchronous decode step.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::audio::{
    resolve_input_device, resolve_output_device, AudioInput, AudioOutput, MicInput,
    PlaybackScheduler, SpeakerOutput, Timeline,
};
use crate::codec::{ChunkDecoder, FrameEncoder};
use crate::config::{AppConfig, AudioConfig};
use crate::constants;
use crate::error::{Result, SessionError};
use crate::protocol::TransportEvent;
use crate::transport::{FrameSender, Transport};

/// Lifecycle states of a voice session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Closing,
    Closed,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Error => "error",
        }
    }

    /// Whether a new session may be started from this state
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Closed | SessionState::Error
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

enum SessionCommand {
    Stop,
}

#[derive(Default)]
struct SessionCounters {
    chunks_received: AtomicU64,
    chunks_dropped: AtomicU64,
    interruptions: AtomicU64,
}

/// Snapshot of session activity
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub state: SessionState,
    pub frames_queued: u64,
    pub frames_dropped: u64,
    pub chunks_received: u64,
    pub chunks_dropped: u64,
    pub buffers_completed: u64,
    pub buffers_discarded: u64,
    pub interruptions: u64,
    pub playback_position_secs: f64,
}

/// Builds the audio endpoints for one session run. The default factory
/// resolves real devices; tests inject headless stand-ins.
pub type AudioFactory =
    Box<dyn Fn(&AudioConfig) -> Result<(Box<dyn AudioInput>, Box<dyn AudioOutput>)> + Send + Sync>;

/// Device-backed factory: probes both devices up front so acquisition
/// failures surface in `start` rather than mid-session.
fn device_audio(audio: &AudioConfig) -> Result<(Box<dyn AudioInput>, Box<dyn AudioOutput>)> {
    resolve_input_device(audio.input_device.as_deref())
        .map_err(|e| SessionError::MicAcquisition(e.to_string()))?;
    resolve_output_device(audio.output_device.as_deref())
        .map_err(|e| SessionError::SpeakerAcquisition(e.to_string()))?;
    Ok((
        Box::new(MicInput::new(
            audio.input_device.clone(),
            audio.input_sample_rate,
            audio.capture_block,
        )),
        Box::new(SpeakerOutput::new(
            audio.output_device.clone(),
            audio.output_sample_rate,
        )),
    ))
}

/// A duplex voice conversation with a remote agent.
///
/// At most one run is live at a time: `start` is rejected while the
/// session is connecting, active or closing. `stop` converges to
/// `Closed` from any state and is idempotent. Dropping an active
/// session requests the same teardown the `stop` path performs.
pub struct VoiceSession {
    config: AppConfig,
    transport: Arc<dyn Transport>,
    audio_factory: AudioFactory,
    state: Arc<watch::Sender<SessionState>>,
    command_tx: Option<mpsc::UnboundedSender<SessionCommand>>,
    task: Option<JoinHandle<()>>,
    sender: Option<FrameSender>,
    timeline: Option<Arc<Timeline>>,
    counters: Arc<SessionCounters>,
}

impl VoiceSession {
    /// Session over real audio devices
    pub fn new(config: AppConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_audio_factory(config, transport, Box::new(device_audio))
    }

    /// Session with injected audio endpoints
    pub fn with_audio_factory(
        config: AppConfig,
        transport: Arc<dyn Transport>,
        audio_factory: AudioFactory,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            config,
            transport,
            audio_factory,
            state: Arc::new(state_tx),
            command_tx: None,
            task: None,
            sender: None,
            timeline: None,
            counters: Arc::new(SessionCounters::default()),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions without polling
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Snapshot of the current run's activity
    pub fn stats(&self) -> SessionStats {
        let (frames_queued, frames_dropped) = self
            .sender
            .as_ref()
            .map(|s| {
                let q = s.stats();
                (q.frames_queued, q.frames_dropped)
            })
            .unwrap_or((0, 0));
        SessionStats {
            state: self.state(),
            frames_queued,
            frames_dropped,
            chunks_received: self.counters.chunks_received.load(Ordering::Relaxed),
            chunks_dropped: self.counters.chunks_dropped.load(Ordering::Relaxed),
            buffers_completed: self.timeline.as_ref().map(|t| t.completed()).unwrap_or(0),
            buffers_discarded: self.timeline.as_ref().map(|t| t.discarded()).unwrap_or(0),
            interruptions: self.counters.interruptions.load(Ordering::Relaxed),
            playback_position_secs: self.timeline.as_ref().map(|t| t.now_secs()).unwrap_or(0.0),
        }
    }

    /// Begin a session run: acquire audio, connect the transport and
    /// hand both to the event loop. Capture starts once the transport
    /// reports `Opened`.
    pub async fn start(&mut self) -> Result<()> {
        let current = self.state();
        if !current.can_start() {
            return Err(SessionError::AlreadyRunning(current.as_str()).into());
        }
        // A previous run, if any, has fully torn down by now
        self.task = None;
        self.command_tx = None;

        let run_id = Uuid::new_v4();
        tracing::info!(session = %run_id, "starting voice session");
        set_state(&self.state, SessionState::Connecting);

        let (input, output) = match (self.audio_factory)(&self.config.audio) {
            Ok(endpoints) => endpoints,
            Err(e) => {
                tracing::error!(session = %run_id, "audio acquisition failed: {e}");
                set_state(&self.state, SessionState::Error);
                return Err(e);
            }
        };

        let connection = match self
            .transport
            .connect(self.config.setup(), self.config.outbound.policy)
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!(session = %run_id, "transport connect failed: {e}");
                set_state(&self.state, SessionState::Error);
                return Err(e.into());
            }
        };

        let timeline = Arc::new(Timeline::new(self.config.audio.output_sample_rate));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        self.sender = Some(connection.sender.clone());
        self.timeline = Some(timeline.clone());
        self.command_tx = Some(command_tx);
        self.counters = Arc::new(SessionCounters::default());

        let event_loop = EventLoop {
            run_id,
            state: self.state.clone(),
            events: connection.events,
            commands: command_rx,
            sender: connection.sender,
            input,
            output,
            timeline,
            input_sample_rate: self.config.audio.input_sample_rate,
            output_sample_rate: self.config.audio.output_sample_rate,
            counters: self.counters.clone(),
        };
        self.task = Some(tokio::spawn(event_loop.run()));
        Ok(())
    }

    /// Stop the session and release every resource. Converges to
    /// `Closed` from any state; calling it again is a no-op.
    pub async fn stop(&mut self) {
        if let Some(command_tx) = self.command_tx.take() {
            let _ = command_tx.send(SessionCommand::Stop);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("session task join failed: {e}");
            }
        }
        if self.state() != SessionState::Closed {
            set_state(&self.state, SessionState::Closed);
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        // The detached loop still runs; it tears down on this command
        if let Some(command_tx) = self.command_tx.take() {
            let _ = command_tx.send(SessionCommand::Stop);
        }
    }
}

fn set_state(state: &watch::Sender<SessionState>, next: SessionState) {
    let current = *state.borrow();
    if current != next {
        tracing::info!(from = %current, to = %next, "session state changed");
        state.send_replace(next);
    }
}

struct EventLoop {
    run_id: Uuid,
    state: Arc<watch::Sender<SessionState>>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    sender: FrameSender,
    input: Box<dyn AudioInput>,
    output: Box<dyn AudioOutput>,
    timeline: Arc<Timeline>,
    input_sample_rate: u32,
    output_sample_rate: u32,
    counters: Arc<SessionCounters>,
}

impl EventLoop {
    async fn run(mut self) {
        let mut scheduler = PlaybackScheduler::new(self.timeline.clone());
        let mut decoder = ChunkDecoder::new(self.output_sample_rate, constants::CHANNELS);
        let mut health = tokio::time::interval(Duration::from_secs(1));

        let final_state = loop {
            tokio::select! {
                command = self.commands.recv() => {
                    // A dropped handle means the owner is gone; same teardown
                    let _ = command;
                    set_state(&self.state, SessionState::Closing);
                    break SessionState::Closed;
                }
                event = self.events.recv() => match event {
                    Some(TransportEvent::Opened) => {
                        if let Err(e) = self.begin_streaming() {
                            tracing::error!(session = %self.run_id, "failed to start streaming: {e}");
                            break SessionState::Error;
                        }
                        set_state(&self.state, SessionState::Active);
                    }
                    Some(TransportEvent::Chunk { data }) => {
                        self.counters.chunks_received.fetch_add(1, Ordering::Relaxed);
                        // Decode-then-schedule, one chunk at a time,
                        // keeps buffers in arrival order
                        match decoder.decode(&data) {
                            Ok(buffer) => {
                                scheduler.schedule(buffer);
                            }
                            Err(e) => {
                                self.counters.chunks_dropped.fetch_add(1, Ordering::Relaxed);
                                tracing::warn!("dropping malformed chunk: {e}");
                            }
                        }
                    }
                    Some(TransportEvent::Interrupted) => {
                        let discarded = scheduler.interrupt();
                        self.counters.interruptions.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(discarded, "agent interrupted playback");
                    }
                    Some(TransportEvent::Error(e)) => {
                        tracing::error!(session = %self.run_id, "transport failed: {e}");
                        break SessionState::Error;
                    }
                    Some(TransportEvent::Closed) => {
                        tracing::info!(session = %self.run_id, "transport closed");
                        break SessionState::Closed;
                    }
                    None => {
                        tracing::warn!(session = %self.run_id, "event stream ended without close");
                        break SessionState::Closed;
                    }
                },
                _ = health.tick() => {
                    if let Some(e) = self.input.check_errors() {
                        tracing::error!(session = %self.run_id, "capture device failed: {e}");
                        break SessionState::Error;
                    }
                    if let Some(e) = self.output.check_errors() {
                        tracing::error!(session = %self.run_id, "playback device failed: {e}");
                        break SessionState::Error;
                    }
                    let queue = self.sender.stats();
                    let playback = scheduler.stats();
                    tracing::debug!(
                        frames_queued = queue.frames_queued,
                        frames_dropped = queue.frames_dropped,
                        chunks_decoded = decoder.stats().chunks_decoded,
                        pending = playback.pending,
                        position_secs = self.timeline.now_secs(),
                        "pipeline stats"
                    );
                }
            }
        };

        // Resources are released on every exit path, in the same order
        self.input.stop();
        self.output.stop();
        self.sender.close();
        let leftover = self.timeline.clear();
        if leftover > 0 {
            tracing::debug!(leftover, "discarded pending playback");
        }
        set_state(&self.state, final_state);
        tracing::info!(session = %self.run_id, state = %final_state, "session finished");
    }

    /// Wire the capture path: encode each block on the capture thread
    /// and queue it fire-and-forget.
    fn begin_streaming(&mut self) -> Result<()> {
        self.output.start(self.timeline.clone())?;

        let mut encoder = FrameEncoder::new(self.input_sample_rate);
        let sender = self.sender.clone();
        self.input.start(Box::new(move |block| {
            sender.send(encoder.encode(block));
        }))?;
        Ok(())
    }
}
