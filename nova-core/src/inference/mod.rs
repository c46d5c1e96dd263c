//! Wake-word classifier abstraction.
//!
//! The `WakeClassifier` trait decouples the detector from any specific model
//! runtime. Only the scoring contract lives here: one slice of mono PCM16 in,
//! one label → confidence map out.
//!
//! `&mut self` on `classify` expresses that classifiers may be stateful
//! (feature windows, recurrent state), and the detector is the only caller.

pub mod stub;

pub use stub::StubClassifier;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Label → confidence in `[0, 1]` for one classifier invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    scores: BTreeMap<String, f32>,
}

impl ClassificationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Scores are clamped to `[0, 1]`; NaN becomes 0.
    pub fn with(mut self, label: impl Into<String>, score: f32) -> Self {
        self.insert(label, score);
        self
    }

    pub fn insert(&mut self, label: impl Into<String>, score: f32) {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        self.scores.insert(label.into(), score);
    }

    /// Score for `label`, 0 when the classifier did not report it.
    pub fn score(&self, label: &str) -> f32 {
        self.scores.get(label).copied().unwrap_or(0.0)
    }

    /// Highest score among every label except `label`.
    pub fn best_other(&self, label: &str) -> f32 {
        self.scores
            .iter()
            .filter(|(l, _)| l.as_str() != label)
            .map(|(_, s)| *s)
            .fold(0.0, f32::max)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.scores.iter().map(|(l, s)| (l.as_str(), *s))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f32)> for ClassificationResult {
    fn from_iter<I: IntoIterator<Item = (S, f32)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (label, score) in iter {
            out.insert(label, score);
        }
        out
    }
}

/// Contract for wake-word scoring backends.
pub trait WakeClassifier: Send {
    /// Score one inference slice of mono PCM16 at the pipeline rate.
    ///
    /// # Errors
    /// `NovaError::Classifier` when the model fails. The detector discards
    /// the slice and carries on.
    fn classify(&mut self, samples: &[i16]) -> Result<ClassificationResult>;

    /// Drop any internal state, e.g. after a conversation.
    fn reset(&mut self) {}
}

impl<C: WakeClassifier + ?Sized> WakeClassifier for Box<C> {
    fn classify(&mut self, samples: &[i16]) -> Result<ClassificationResult> {
        (**self).classify(samples)
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_other_ignores_wake_label() {
        let r = ClassificationResult::new()
            .with("nova", 0.9)
            .with("noise", 0.3)
            .with("unknown", 0.05);
        assert_eq!(r.score("nova"), 0.9);
        assert_eq!(r.best_other("nova"), 0.3);
        assert_eq!(r.score("missing"), 0.0);
    }

    #[test]
    fn scores_are_clamped() {
        let r: ClassificationResult = [("a", 1.5), ("b", -0.2), ("c", f32::NAN)]
            .into_iter()
            .collect();
        assert_eq!(r.score("a"), 1.0);
        assert_eq!(r.score("b"), 0.0);
        assert_eq!(r.score("c"), 0.0);
    }

    #[test]
    fn best_other_of_single_label_is_zero() {
        let r = ClassificationResult::new().with("nova", 0.4);
        assert_eq!(r.best_other("nova"), 0.0);
    }
}
