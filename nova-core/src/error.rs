use std::time::Duration;

use thiserror::Error;

/// All errors produced by nova-core.
#[derive(Debug, Error)]
pub enum NovaError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    /// A session buffer could not be obtained. Fatal for the current session only.
    #[error("failed to allocate {bytes} bytes")]
    AllocationFailure { bytes: usize },

    /// The wake-word classifier failed on one slice. Never fatal.
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Capture or output peripheral failed (or exceeded its hardware timeout).
    #[error("hardware I/O error: {0}")]
    HardwareIo(String),

    #[error("backend sent no audio within {0:?}")]
    NetworkTimeout(Duration),

    #[error("reply stream ended after {received} of {expected} bytes")]
    NetworkIncomplete { expected: u64, received: u64 },

    #[error("voice backend error: {0}")]
    Backend(String),

    #[error("voice backend returned HTTP {0}")]
    BackendStatus(u16),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, NovaError>;
