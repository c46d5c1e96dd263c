//! Voice activity decisions for the recorder.
//!
//! The recorder asks a `VoiceActivityDetector` about every chunk it captures.
//! [`PeakGate`] is the default: a chunk is speech iff its peak absolute
//! amplitude exceeds a fixed threshold.

pub mod peak;

pub use peak::PeakGate;

/// Whether a given chunk contains sound or silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    Speech,
    Silence,
}

impl VadDecision {
    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}

/// Implementors may be stateful (hangover counters and the like).
pub trait VoiceActivityDetector: Send {
    /// Analyse one chunk of raw (pre-gain) mono PCM16.
    fn classify(&mut self, samples: &[i16]) -> VadDecision;

    /// Reset any internal state between recordings.
    fn reset(&mut self) {}
}
