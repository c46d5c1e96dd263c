//! `NovaEngine`: the single-threaded control loop that owns both audio devices.
//!
//! ## Loop
//!
//! ```text
//! loop {
//!     drain commands (listen / mic test / mute / shutdown)
//!     capture chunk ─► ×wake_gain ─► SliceBuffer ─► WakeWordDetector
//!                                                        │ WakeEvent
//!                                                        ▼
//!                      listening earcon ─► SilenceAwareRecorder ─► VoiceBackend
//!                                                        │ BackendReply
//!                                                        ▼
//!                                          StreamingPlaybackEngine ─► speaker
//! }
//! ```
//!
//! Sessions run inline: while one is in progress the loop does not scan for
//! the wake word, and the [`DeviceContext`] says which activity owns the
//! devices. Every session ends by clearing the busy flag, resetting the
//! slice buffer and disarming the detector, whatever the outcome.
//!
//! ## Threading
//!
//! cpal streams are `!Send` on some hosts, so the devices are opened on the
//! thread that will run the loop and the engine never moves. Commands come in
//! over a `crossbeam-channel`; events go out over a `tokio` broadcast channel
//! that any number of presentation layers can subscribe to.

pub mod command;
pub mod diagnostics;
mod session;

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::audio::{pcm, tones, AudioCapture, AudioOutput, SAMPLE_RATE};
use crate::buffering::{AudioChunk, SliceBuffer};
use crate::clock::Clock;
use crate::context::DeviceContext;
use crate::error::{NovaError, Result};
use crate::inference::WakeClassifier;
use crate::ipc::events::{EngineEvent, EngineStatus};
use crate::net::VoiceBackend;
use crate::playback::{PlaybackConfig, StreamingPlaybackEngine};
use crate::recorder::{RecorderConfig, SilenceAwareRecorder};
use crate::wake::{DetectorConfig, WakeWordDetector};

pub use command::{Command, UnknownCommand};
pub use diagnostics::{DiagnosticsSnapshot, EngineDiagnostics};
pub use mic_test::{MicLevel, MicTestReport};

/// Broadcast channel capacity: 256 events buffered for slow consumers.
pub const BROADCAST_CAP: usize = 256;

/// Consecutive capture failures tolerated while idle before the loop gives up.
const MAX_CAPTURE_FAILURES: u32 = 20;
const CAPTURE_RETRY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Samples per blocking capture read.
    pub chunk_samples: usize,
    /// Samples per classifier slice. Must be a multiple of `chunk_samples`.
    pub slice_samples: usize,
    /// Gain applied to the copy of each chunk fed to the wake classifier.
    pub wake_gain: i32,
    /// Pause after the listening earcon before recording starts.
    #[serde(with = "crate::config::duration_ms")]
    pub capture_settle: Duration,
    #[serde(with = "crate::config::duration_ms")]
    pub mic_test_duration: Duration,
    pub earcons: bool,
    pub detector: DetectorConfig,
    pub recorder: RecorderConfig,
    pub playback: PlaybackConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            chunk_samples: 512,
            slice_samples: 4096,
            wake_gain: 8,
            capture_settle: Duration::from_millis(100),
            mic_test_duration: Duration::from_secs(10),
            earcons: true,
            detector: DetectorConfig::default(),
            recorder: RecorderConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }
}

impl EngineConfig {
    /// # Errors
    /// `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(NovaError::InvalidConfig("sample_rate must be > 0".into()));
        }
        if self.chunk_samples == 0 {
            return Err(NovaError::InvalidConfig("chunk_samples must be > 0".into()));
        }
        if self.slice_samples == 0 || self.slice_samples % self.chunk_samples != 0 {
            return Err(NovaError::InvalidConfig(format!(
                "slice_samples ({}) must be a non-zero multiple of chunk_samples ({})",
                self.slice_samples, self.chunk_samples
            )));
        }
        if self.wake_gain < 1 {
            return Err(NovaError::InvalidConfig("wake_gain must be >= 1".into()));
        }
        if self.recorder.sample_rate != self.sample_rate {
            return Err(NovaError::InvalidConfig(format!(
                "recorder sample_rate ({}) differs from engine sample_rate ({})",
                self.recorder.sample_rate, self.sample_rate
            )));
        }
        self.detector.validate()?;
        self.recorder.validate()?;
        self.playback.validate()
    }
}

/// Everything the engine drives but does not construct itself.
pub struct EngineParts {
    pub capture: Box<dyn AudioCapture>,
    pub output: Box<dyn AudioOutput>,
    pub classifier: Box<dyn WakeClassifier>,
    pub backend: Box<dyn VoiceBackend>,
    pub clock: Arc<dyn Clock>,
    pub commands: Receiver<Command>,
    /// Sender half of the event channel, see [`event_channel`].
    pub events: broadcast::Sender<EngineEvent>,
}

/// Create the event channel before the engine so subscribers can attach
/// from other threads while the engine is still being built.
pub fn event_channel() -> (broadcast::Sender<EngineEvent>, broadcast::Receiver<EngineEvent>) {
    broadcast::channel(BROADCAST_CAP)
}

/// What the caller of [`NovaEngine::step`] should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

pub struct NovaEngine {
    config: EngineConfig,
    capture: Box<dyn AudioCapture>,
    output: Box<dyn AudioOutput>,
    backend: Box<dyn VoiceBackend>,
    clock: Arc<dyn Clock>,
    commands: Receiver<Command>,
    commands_open: bool,
    events: broadcast::Sender<EngineEvent>,
    status: Arc<Mutex<EngineStatus>>,

    detector: WakeWordDetector,
    recorder: SilenceAwareRecorder,
    playback: StreamingPlaybackEngine,
    slices: SliceBuffer,
    chunk: AudioChunk,
    wake_buf: Vec<i16>,
    ctx: DeviceContext,

    diagnostics: Arc<EngineDiagnostics>,
    seq: u64,
    capture_failures: u32,
}

impl NovaEngine {
    /// Validate the config and allocate every fixed buffer up front.
    ///
    /// # Errors
    /// `InvalidConfig` or `AllocationFailure`.
    pub fn new(config: EngineConfig, parts: EngineParts) -> Result<Self> {
        config.validate()?;
        let detector = WakeWordDetector::new(config.detector.clone(), parts.classifier)?;
        let recorder = SilenceAwareRecorder::new(config.recorder.clone())?;
        let playback = StreamingPlaybackEngine::new(config.playback.clone())?;
        let slices = SliceBuffer::new(config.slice_samples)?;

        Ok(Self {
            chunk: AudioChunk::new(config.chunk_samples, config.sample_rate),
            wake_buf: Vec::with_capacity(config.chunk_samples),
            capture: parts.capture,
            output: parts.output,
            backend: parts.backend,
            clock: parts.clock,
            commands: parts.commands,
            commands_open: true,
            events: parts.events,
            status: Arc::new(Mutex::new(EngineStatus::Starting)),
            detector,
            recorder,
            playback,
            slices,
            ctx: DeviceContext::new(),
            diagnostics: Arc::new(EngineDiagnostics::default()),
            seq: 0,
            capture_failures: 0,
            config,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn diagnostics(&self) -> Arc<EngineDiagnostics> {
        Arc::clone(&self.diagnostics)
    }

    /// Shared view of the current status, readable from other threads.
    pub fn status_handle(&self) -> Arc<Mutex<EngineStatus>> {
        Arc::clone(&self.status)
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    pub fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    pub fn detector(&self) -> &WakeWordDetector {
        &self.detector
    }

    pub fn slices(&self) -> &SliceBuffer {
        &self.slices
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run until a `Shutdown` command arrives or capture fails persistently.
    ///
    /// # Errors
    /// The last capture error after `MAX_CAPTURE_FAILURES` consecutive failures.
    pub fn run(&mut self) -> Result<()> {
        info!(
            chunk = self.config.chunk_samples,
            slice = self.config.slice_samples,
            wake_label = self.config.detector.wake_label.as_str(),
            "engine started"
        );
        self.set_status(EngineStatus::Starting, None);
        self.earcon(tones::Earcon::Startup);
        self.set_status(self.idle_status(), None);

        let outcome = loop {
            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Shutdown) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        match &outcome {
            Ok(()) => self.set_status(EngineStatus::Stopped, None),
            Err(e) => self.set_status(EngineStatus::Stopped, Some(e.to_string())),
        }
        info!(diagnostics = ?self.diagnostics.snapshot(), "engine stopped");
        outcome
    }

    /// One loop iteration: pending commands, then one capture chunk.
    ///
    /// # Errors
    /// Only a persistent capture failure. Session failures are reported as
    /// events and the loop carries on.
    pub fn step(&mut self) -> Result<Flow> {
        if self.drain_commands() == Flow::Shutdown {
            return Ok(Flow::Shutdown);
        }

        match self.chunk.read_from(&mut *self.capture) {
            Ok(_) => {
                self.capture_failures = 0;
                EngineDiagnostics::bump(&self.diagnostics.chunks_captured);
            }
            Err(e) => {
                self.capture_failures += 1;
                EngineDiagnostics::bump(&self.diagnostics.capture_errors);
                warn!(failures = self.capture_failures, "capture read failed: {e}");
                if self.capture_failures >= MAX_CAPTURE_FAILURES {
                    return Err(e);
                }
                self.clock.sleep(CAPTURE_RETRY);
                return Ok(Flow::Continue);
            }
        }

        if !self.ctx.detection_enabled() {
            return Ok(Flow::Continue);
        }

        self.wake_buf.clear();
        self.wake_buf.extend_from_slice(self.chunk.samples());
        pcm::apply_gain(&mut self.wake_buf, self.config.wake_gain);

        let overruns_before = self.slices.overruns();
        let completed = self.slices.push(&self.wake_buf);
        if completed == 0 {
            return Ok(Flow::Continue);
        }
        EngineDiagnostics::add(&self.diagnostics.slices_completed, completed as u64);
        EngineDiagnostics::add(
            &self.diagnostics.slice_overruns,
            self.slices.overruns() - overruns_before,
        );

        let now = self.clock.now();
        let errors_before = self.detector.stats().classifier_errors;
        let wake = match self.slices.take_ready() {
            Some(slice) => self.detector.on_slice(&self.ctx, slice.samples, now),
            None => None,
        };
        EngineDiagnostics::add(
            &self.diagnostics.classifier_errors,
            self.detector.stats().classifier_errors - errors_before,
        );

        if let Some(event) = wake {
            EngineDiagnostics::bump(&self.diagnostics.wakes);
            info!(label = event.label.as_str(), score = event.score, "wake word detected");
            self.converse(Some(event));
        }
        Ok(Flow::Continue)
    }

    fn drain_commands(&mut self) -> Flow {
        while self.commands_open {
            match self.commands.try_recv() {
                Ok(command) => {
                    if self.handle_command(command) == Flow::Shutdown {
                        return Flow::Shutdown;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("command channel closed; wake word only from now on");
                    self.commands_open = false;
                }
            }
        }
        Flow::Continue
    }

    fn handle_command(&mut self, command: Command) -> Flow {
        debug!(?command, "command received");
        match command {
            Command::Listen => {
                EngineDiagnostics::bump(&self.diagnostics.manual_listens);
                self.converse(None);
            }
            Command::MicTest => self.mic_test(),
            Command::ToggleMute => {
                let muted = self.ctx.toggle_mute();
                info!(muted, "mute toggled");
                self.earcon(if muted {
                    tones::Earcon::Muted
                } else {
                    tones::Earcon::Unmuted
                });
                if !muted {
                    self.slices.reset();
                    self.detector.disarm();
                }
                self.set_status(self.idle_status(), None);
            }
            Command::Shutdown => {
                info!("shutdown requested");
                return Flow::Shutdown;
            }
        }
        Flow::Continue
    }

    fn idle_status(&self) -> EngineStatus {
        if self.ctx.is_muted() {
            EngineStatus::Muted
        } else {
            EngineStatus::Listening
        }
    }

    fn set_status(&self, status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = status;
        let _ = self.events.send(EngineEvent::Status { status, detail });
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Queue an earcon without waiting for it to finish. Output failures are
    /// logged and otherwise ignored.
    fn earcon(&mut self, earcon: tones::Earcon) {
        if !self.config.earcons {
            return;
        }
        if let Err(e) = tones::play(&mut *self.output, earcon) {
            warn!(?earcon, "earcon failed: {e}");
        }
    }
}
