//! `StubClassifier`: placeholder backend that scores slices by loudness.
//!
//! Used on hosts without a trained model. Any sufficiently loud slice reads as
//! the wake word, so the whole listen → record → reply loop can be exercised
//! end-to-end by clapping or speaking near the microphone.

use tracing::trace;

use super::{ClassificationResult, WakeClassifier};
use crate::audio::pcm::mean_amplitude;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct StubClassifier {
    wake_label: String,
    competitor_label: String,
    /// Mean amplitude at or below which the wake score is 0.
    floor: u32,
    /// Mean amplitude at or above which the wake score is 1.
    loud: u32,
    slices: u64,
}

impl StubClassifier {
    pub fn new(wake_label: impl Into<String>, floor: u32, loud: u32) -> Self {
        let floor = floor.min(u32::MAX - 1);
        Self {
            wake_label: wake_label.into(),
            competitor_label: "noise".into(),
            floor,
            loud: loud.max(floor + 1),
            slices: 0,
        }
    }

    pub fn slices_scored(&self) -> u64 {
        self.slices
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new("nova", 300, 3_000)
    }
}

impl WakeClassifier for StubClassifier {
    fn classify(&mut self, samples: &[i16]) -> Result<ClassificationResult> {
        self.slices += 1;
        let level = mean_amplitude(samples);
        let wake = level.saturating_sub(self.floor) as f32 / (self.loud - self.floor) as f32;
        let wake = wake.min(1.0);
        trace!(level, wake, "stub classify");

        Ok(ClassificationResult::new()
            .with(self.wake_label.as_str(), wake)
            .with(self.competitor_label.as_str(), 1.0 - wake))
    }

    fn reset(&mut self) {
        self.slices = 0;
    }
}
