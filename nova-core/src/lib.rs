//! # nova-core
//!
//! Audio core of the Nova voice appliance: wake word, recording, streaming
//! playback.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → AudioChunk ─┬─► ×gain → SliceBuffer → WakeWordDetector
//!                                         │                              │ WakeEvent
//!                                         └─► SilenceAwareRecorder ◄─────┘
//!                                                    │ trimmed PCM16
//!                                              VoiceBackend::submit
//!                                                    │ ByteStream
//!                                         StreamingPlaybackEngine → AudioOutput → Speaker
//!
//!                 NovaEngine (control loop) ──► broadcast::Sender<EngineEvent>
//! ```
//!
//! Device callbacks only touch lock-free rings. Everything else runs on the
//! control loop thread, with deadlines taken from a [`clock::Clock`].

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod clock;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod inference;
pub mod ipc;
pub mod net;
pub mod playback;
pub mod recorder;
pub mod vad;
pub mod wake;

// Convenience re-exports for downstream crates
pub use audio::{AudioCapture, AudioOutput};
pub use buffering::{AudioChunk, SliceBuffer};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use context::{Activity, DeviceContext};
pub use engine::{Command, EngineConfig, EngineParts, NovaEngine};
pub use error::{NovaError, Result};
pub use inference::{ClassificationResult, StubClassifier, WakeClassifier};
pub use ipc::events::{EngineEvent, EngineStatus};
pub use net::{BackendReply, ByteStream, ReplyMetadata, VoiceBackend};
pub use playback::{PlaybackConfig, PlaybackPhase, PlaybackReport, StreamingPlaybackEngine};
pub use recorder::{Recording, RecorderConfig, SilenceAwareRecorder, StopReason};
pub use wake::{DetectorConfig, WakeEvent, WakeWordDetector};

#[cfg(feature = "audio-cpal")]
pub use audio::{CpalMicrophone, CpalSpeaker};

#[cfg(feature = "http")]
pub use net::HttpBackend;
