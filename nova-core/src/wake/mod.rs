//! Wake-word decision policy over per-slice classifier scores.
//!
//! ```text
//!   Idle ──slice──► Accumulating ──window full──► Evaluating ──k windows──► Armed
//!     ▲                  ▲                            │
//!     └──── not qualifying / cooling down ────────────┘
//! ```
//!
//! A window is `slices_per_window` consecutive successfully scored slices. It
//! qualifies iff the wake label's window score reaches `threshold` and beats
//! the best competing label by at least `margin`. `consecutive` qualifying
//! windows in a row fire one [`WakeEvent`]; then `cooldown` suppresses the
//! next firing.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::DeviceContext;
use crate::error::{NovaError, Result};
use crate::inference::{ClassificationResult, WakeClassifier};

/// Slack for f32 rounding when comparing scores against the threshold and
/// margin, so a gap of exactly `margin` qualifies.
const SCORE_EPSILON: f32 = 1e-6;

/// How the per-slice results of one window become the window's scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WindowScoring {
    /// Scores of the last slice in the window.
    #[default]
    Latest,
    /// Per-label mean over every slice in the window.
    Mean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectorConfig {
    pub wake_label: String,
    pub threshold: f32,
    pub margin: f32,
    /// Qualifying windows in a row needed to fire (k ≥ 1).
    pub consecutive: u32,
    pub slices_per_window: usize,
    #[serde(with = "crate::config::duration_ms")]
    pub cooldown: Duration,
    pub scoring: WindowScoring,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            wake_label: "nova".into(),
            threshold: 0.60,
            margin: 0.10,
            consecutive: 1,
            slices_per_window: 4,
            cooldown: Duration::from_secs(2),
            scoring: WindowScoring::Latest,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.wake_label.trim().is_empty() {
            return Err(NovaError::InvalidConfig("wake label must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(NovaError::InvalidConfig(format!(
                "wake threshold {} outside [0, 1]",
                self.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.margin) {
            return Err(NovaError::InvalidConfig(format!(
                "wake margin {} outside [0, 1]",
                self.margin
            )));
        }
        if self.consecutive == 0 {
            return Err(NovaError::InvalidConfig("consecutive windows must be >= 1".into()));
        }
        if self.slices_per_window == 0 {
            return Err(NovaError::InvalidConfig("slices per window must be >= 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DetectorPhase {
    Idle,
    Accumulating,
    Evaluating,
    Armed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WakeEvent {
    pub label: String,
    /// Window score of the wake label.
    pub score: f32,
    /// Window score of the best competing label.
    pub best_other: f32,
    /// Windows counted toward this firing.
    pub windows: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectorStats {
    pub slices_scored: u64,
    pub classifier_errors: u64,
    pub windows_evaluated: u64,
    pub windows_qualified: u64,
    pub suppressed_by_cooldown: u64,
    pub wakes: u64,
}

pub struct WakeWordDetector {
    config: DetectorConfig,
    classifier: Box<dyn WakeClassifier>,
    phase: DetectorPhase,
    window: Vec<ClassificationResult>,
    consecutive: u32,
    last_trigger: Option<Instant>,
    stats: DetectorStats,
}

impl WakeWordDetector {
    /// # Errors
    /// `InvalidConfig` if the config fails validation.
    pub fn new(config: DetectorConfig, classifier: Box<dyn WakeClassifier>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            window: Vec::with_capacity(config.slices_per_window),
            config,
            classifier,
            phase: DetectorPhase::Idle,
            consecutive: 0,
            last_trigger: None,
            stats: DetectorStats::default(),
        })
    }

    /// Score one completed slice and advance the decision policy.
    ///
    /// Nothing is scored and no state changes while `ctx` is muted or busy.
    /// A classifier error discards the slice without advancing the window.
    pub fn on_slice(
        &mut self,
        ctx: &DeviceContext,
        samples: &[i16],
        now: Instant,
    ) -> Option<WakeEvent> {
        if !ctx.detection_enabled() {
            return None;
        }

        let result = match self.classifier.classify(samples) {
            Ok(result) => result,
            Err(e) => {
                self.stats.classifier_errors += 1;
                warn!("classifier failed, slice discarded: {e}");
                return None;
            }
        };
        self.stats.slices_scored += 1;

        self.window.push(result);
        if self.window.len() < self.config.slices_per_window {
            self.phase = DetectorPhase::Accumulating;
            return None;
        }

        self.phase = DetectorPhase::Evaluating;
        let (score, best_other) = self.window_scores();
        self.window.clear();
        self.stats.windows_evaluated += 1;

        let qualifies = score + SCORE_EPSILON >= self.config.threshold
            && score - best_other + SCORE_EPSILON >= self.config.margin;
        if !qualifies {
            self.consecutive = 0;
            self.phase = DetectorPhase::Idle;
            return None;
        }
        self.stats.windows_qualified += 1;

        if self.cooling_down(now) {
            self.stats.suppressed_by_cooldown += 1;
            self.consecutive = 0;
            self.phase = DetectorPhase::Idle;
            debug!(score, "qualifying window during cooldown ignored");
            return None;
        }

        self.consecutive += 1;
        if self.consecutive < self.config.consecutive {
            self.phase = DetectorPhase::Accumulating;
            return None;
        }

        let windows = self.consecutive;
        self.consecutive = 0;
        self.last_trigger = Some(now);
        self.phase = DetectorPhase::Armed;
        self.stats.wakes += 1;
        info!(
            label = self.config.wake_label.as_str(),
            score, best_other, windows, "wake word detected"
        );

        Some(WakeEvent {
            label: self.config.wake_label.clone(),
            score,
            best_other,
            windows,
        })
    }

    fn window_scores(&self) -> (f32, f32) {
        let label = self.config.wake_label.as_str();
        match self.config.scoring {
            WindowScoring::Latest => self
                .window
                .last()
                .map(|r| (r.score(label), r.best_other(label)))
                .unwrap_or((0.0, 0.0)),
            WindowScoring::Mean => {
                let n = self.window.len().max(1) as f32;
                let mean: ClassificationResult = self
                    .window
                    .iter()
                    .flat_map(|r| r.iter())
                    .fold(
                        std::collections::BTreeMap::<&str, f32>::new(),
                        |mut acc, (l, s)| {
                            *acc.entry(l).or_default() += s;
                            acc
                        },
                    )
                    .into_iter()
                    .map(|(l, sum)| (l, sum / n))
                    .collect();
                (mean.score(label), mean.best_other(label))
            }
        }
    }

    fn cooling_down(&self, now: Instant) -> bool {
        self.last_trigger
            .is_some_and(|t| now.saturating_duration_since(t) < self.config.cooldown)
    }

    /// Forget partial windows and consecutive counts, e.g. after a
    /// conversation. The cooldown reference is kept.
    pub fn disarm(&mut self) {
        self.window.clear();
        self.consecutive = 0;
        self.phase = DetectorPhase::Idle;
        self.classifier.reset();
    }

    pub fn phase(&self) -> DetectorPhase {
        self.phase
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// Slices scored toward the current window.
    pub fn window_progress(&self) -> usize {
        self.window.len()
    }

    pub fn last_trigger(&self) -> Option<Instant> {
        self.last_trigger
    }

    pub fn stats(&self) -> DetectorStats {
        self.stats
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}
