//! Bounded utterance capture with silence / max-duration stop and
//! leading/trailing silence trim.
//!
//! ```text
//!   Idle ──record()──► Recording ──SilenceTimeout | MaxDurationReached──► Trimming ──► Done
//! ```
//!
//! The whole byte buffer is reserved before the first read, so a recording
//! never reallocates and an allocation failure aborts before any capture.

use std::ops::Range;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::audio::{pcm, AudioCapture, SAMPLE_RATE};
use crate::buffering::chunk::AudioChunk;
use crate::clock::Clock;
use crate::error::{NovaError, Result};
use crate::vad::{PeakGate, VoiceActivityDetector};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecorderConfig {
    /// Peak absolute amplitude a chunk (or sample) must exceed to count as sound.
    pub silence_threshold: u16,
    /// Quiet time after the last sound that ends a recording.
    #[serde(with = "crate::config::duration_ms")]
    pub silence_duration: Duration,
    /// Silence cannot stop a recording before this much has elapsed.
    #[serde(with = "crate::config::duration_ms")]
    pub min_duration: Duration,
    /// Hard cap; also sizes the buffer.
    #[serde(with = "crate::config::duration_ms")]
    pub max_duration: Duration,
    /// Integer multiplier applied to every captured sample, saturating.
    pub gain: i32,
    pub sample_rate: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 200,
            silence_duration: Duration::from_millis(1_000),
            min_duration: Duration::from_millis(1_500),
            max_duration: Duration::from_secs(30),
            gain: 3,
            sample_rate: SAMPLE_RATE,
        }
    }
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_duration.is_zero() {
            return Err(NovaError::InvalidConfig("max recording duration must be > 0".into()));
        }
        if self.min_duration > self.max_duration {
            return Err(NovaError::InvalidConfig(
                "min recording duration exceeds max".into(),
            ));
        }
        if self.gain < 1 {
            return Err(NovaError::InvalidConfig("recording gain must be >= 1".into()));
        }
        if self.sample_rate == 0 {
            return Err(NovaError::InvalidConfig("sample rate must be > 0".into()));
        }
        Ok(())
    }

    /// Bytes needed to hold `max_duration` of mono PCM16.
    pub fn capacity_bytes(&self) -> usize {
        let samples = u128::from(self.sample_rate) * self.max_duration.as_millis() / 1000;
        usize::try_from(samples * 2).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    SilenceTimeout,
    MaxDurationReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecorderPhase {
    Idle,
    Recording,
    Trimming,
    Done,
}

/// A finished, trimmed recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pcm: Vec<u8>,
    pub stop_reason: StopReason,
    /// Samples captured before trimming.
    pub captured_samples: usize,
    /// Kept span, in sample indices of the untrimmed capture. Empty when the
    /// capture never rose above the threshold.
    pub trimmed: Range<usize>,
    pub elapsed: Duration,
}

impl Recording {
    /// Contiguous little-endian PCM16 mono.
    pub fn bytes(&self) -> &[u8] {
        &self.pcm
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.pcm
    }

    pub fn len_bytes(&self) -> usize {
        self.pcm.len()
    }

    pub fn samples(&self) -> usize {
        self.pcm.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }
}

pub struct SilenceAwareRecorder {
    config: RecorderConfig,
    gate: PeakGate,
    phase: RecorderPhase,
}

impl SilenceAwareRecorder {
    pub fn new(config: RecorderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            gate: PeakGate::new(config.silence_threshold),
            config,
            phase: RecorderPhase::Idle,
        })
    }

    pub fn phase(&self) -> RecorderPhase {
        self.phase
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Capture one utterance.
    ///
    /// Per chunk: the raw peak decides sound vs. silence, the stop conditions
    /// are checked, then gain is applied and the chunk appended. The chunk that
    /// trips the silence stop is not kept.
    ///
    /// # Errors
    /// `AllocationFailure` before any capture if the buffer cannot be
    /// reserved. `HardwareIo` from the capture driver. Either way the
    /// recorder returns to `Idle`.
    pub fn record(
        &mut self,
        capture: &mut dyn AudioCapture,
        chunk: &mut AudioChunk,
        clock: &dyn Clock,
    ) -> Result<Recording> {
        let _span = info_span!("record").entered();
        let result = self.record_inner(capture, chunk, clock);
        self.phase = match result {
            Ok(_) => RecorderPhase::Done,
            Err(_) => RecorderPhase::Idle,
        };
        result
    }

    fn record_inner(
        &mut self,
        capture: &mut dyn AudioCapture,
        chunk: &mut AudioChunk,
        clock: &dyn Clock,
    ) -> Result<Recording> {
        let capacity = self.config.capacity_bytes();
        let mut buf: Vec<u8> = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| NovaError::AllocationFailure { bytes: capacity })?;

        self.phase = RecorderPhase::Recording;
        self.gate.reset();
        let start = clock.now();
        let mut last_sound = start;
        info!(capacity, "recording started");

        let stop_reason = loop {
            let samples = chunk.read_from(capture)?;
            let now = clock.now();
            let elapsed = now.saturating_duration_since(start);

            if self.gate.classify(samples).is_speech() {
                last_sound = now;
            }

            if elapsed > self.config.min_duration
                && now.saturating_duration_since(last_sound) > self.config.silence_duration
            {
                debug!(elapsed_ms = elapsed.as_millis() as u64, "silence timeout");
                break StopReason::SilenceTimeout;
            }

            let samples = chunk.samples_mut();
            pcm::apply_gain(samples, self.config.gain);

            let room = (capacity - buf.len()) / 2;
            let take = samples.len().min(room);
            pcm::extend_le_bytes(&mut buf, &samples[..take]);

            if take < samples.len() || buf.len() >= capacity || elapsed >= self.config.max_duration
            {
                if take < samples.len() {
                    warn!(dropped = samples.len() - take, "recording buffer full");
                }
                break StopReason::MaxDurationReached;
            }
        };

        let elapsed = clock.now().saturating_duration_since(start);
        self.phase = RecorderPhase::Trimming;

        let captured_samples = buf.len() / 2;
        let trimmed = trim_silence(&mut buf, &self.gate);

        info!(
            ?stop_reason,
            elapsed_ms = elapsed.as_millis() as u64,
            captured_bytes = captured_samples * 2,
            trimmed_bytes = buf.len(),
            "recording finished"
        );

        Ok(Recording {
            pcm: buf,
            stop_reason,
            captured_samples,
            trimmed,
            elapsed,
        })
    }
}

/// Cut leading and trailing silence from little-endian PCM16 in place.
///
/// Keeps exactly the inclusive span from the first to the last sample the gate
/// counts as sound and returns it as a sample range of the input. Input with
/// no such sample becomes empty and the range is `0..0`. A trailing odd byte
/// is dropped.
pub fn trim_silence(pcm: &mut Vec<u8>, gate: &PeakGate) -> Range<usize> {
    let is_sound = |pair: &[u8]| gate.is_sound(i16::from_le_bytes([pair[0], pair[1]]));

    let Some(first) = pcm.chunks_exact(2).position(is_sound) else {
        pcm.clear();
        return 0..0;
    };
    // Scans from the end; `first` itself is sound so this always finds a
    // sample at or after it.
    let last = pcm
        .chunks_exact(2)
        .rposition(is_sound)
        .unwrap_or(first);

    let (start, end) = (first * 2, (last + 1) * 2);
    pcm.copy_within(start..end, 0);
    pcm.truncate(end - start);
    first..last + 1
}
