//! Peak-amplitude gate.
//!
//! ## Algorithm
//!
//! 1. Take the largest absolute sample of the chunk.
//! 2. Strictly above `threshold` → `Speech`, otherwise `Silence`.
//!
//! The same comparison decides which samples survive trimming, so the
//! recorder stops and trims on one definition of "sound".

use super::{VadDecision, VoiceActivityDetector};
use crate::audio::pcm::peak_amplitude;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakGate {
    threshold: u16,
}

impl PeakGate {
    pub fn new(threshold: u16) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u16 {
        self.threshold
    }

    /// Whether a single sample counts as sound.
    #[inline]
    pub fn is_sound(&self, sample: i16) -> bool {
        sample.unsigned_abs() > self.threshold
    }
}

impl Default for PeakGate {
    fn default() -> Self {
        Self::new(200)
    }
}

impl VoiceActivityDetector for PeakGate {
    fn classify(&mut self, samples: &[i16]) -> VadDecision {
        if peak_amplitude(samples) > self.threshold {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_exclusive() {
        let mut gate = PeakGate::new(200);
        assert_eq!(gate.classify(&[0, 200, -200]), VadDecision::Silence);
        assert_eq!(gate.classify(&[0, -201]), VadDecision::Speech);
        assert!(!gate.is_sound(-200));
        assert!(gate.is_sound(i16::MIN));
    }

    #[test]
    fn empty_chunk_is_silence() {
        let mut gate = PeakGate::default();
        assert!(!gate.classify(&[]).is_speech());
    }
}
