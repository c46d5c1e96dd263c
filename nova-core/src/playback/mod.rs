//! Streams a network reply to the speaker under bounded patience.
//!
//! ```text
//!   AwaitingFirstByte ──data──► Streaming ──declared length reached──► Completed
//!          │                       │
//!          │ first-byte timeout    └─ stall past patience ──► Completed | Incomplete
//!          ▼
//!        Error
//! ```
//!
//! Patience while streaming:
//!
//! | situation                               | patience            |
//! |-----------------------------------------|---------------------|
//! | declared length, not reached yet        | `long_patience`     |
//! | no declared length, peer connected      | `short_patience`    |
//! | no declared length, peer disconnected   | `disconnected_patience` |
//!
//! A disconnect while declared bytes are still missing does not end playback;
//! late bytes may still be buffered. All deadlines come from the [`Clock`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::audio::{pcm, AudioOutput, OUTPUT_CHANNELS};
use crate::clock::Clock;
use crate::error::{NovaError, Result};
use crate::net::ByteStream;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaybackConfig {
    /// Upper bound for one pull from the stream.
    pub read_chunk_bytes: usize,
    #[serde(with = "crate::config::duration_ms")]
    pub first_byte_timeout: Duration,
    #[serde(with = "crate::config::duration_ms")]
    pub long_patience: Duration,
    #[serde(with = "crate::config::duration_ms")]
    pub short_patience: Duration,
    #[serde(with = "crate::config::duration_ms")]
    pub disconnected_patience: Duration,
    /// Sleep after every empty poll.
    #[serde(with = "crate::config::duration_ms")]
    pub poll_interval: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            read_chunk_bytes: 16 * 1024,
            first_byte_timeout: Duration::from_secs(30),
            long_patience: Duration::from_secs(30),
            short_patience: Duration::from_secs(8),
            disconnected_patience: Duration::from_secs(3),
            poll_interval: Duration::from_millis(1),
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<()> {
        if self.read_chunk_bytes < 4 {
            return Err(NovaError::InvalidConfig(
                "playback read chunk must hold at least one stereo frame".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(NovaError::InvalidConfig("poll interval must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackPhase {
    AwaitingFirstByte,
    Streaming,
    Completed,
    Incomplete,
    Error,
}

impl PlaybackPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Incomplete | Self::Error)
    }
}

/// Outcome of one playback session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackReport {
    pub phase: PlaybackPhase,
    /// `None` when the reply declared no (or a zero) length.
    pub declared_len: Option<u64>,
    pub consumed: u64,
    /// Interleaved stereo samples handed to the output.
    pub samples_written: u64,
    /// Empty polls since the last data at the moment playback ended.
    pub stall_polls: u64,
    /// Time without data at the moment playback ended.
    #[serde(with = "crate::config::duration_ms")]
    pub idle: Duration,
}

impl PlaybackReport {
    /// Map terminal phases onto the error taxonomy: `Incomplete` becomes
    /// `NetworkIncomplete`, `Error` becomes `NetworkTimeout`.
    pub fn into_result(self) -> Result<Self> {
        match self.phase {
            PlaybackPhase::Incomplete => Err(NovaError::NetworkIncomplete {
                expected: self.declared_len.unwrap_or(0),
                received: self.consumed,
            }),
            PlaybackPhase::Error => Err(NovaError::NetworkTimeout(self.idle)),
            _ => Ok(self),
        }
    }
}

pub struct StreamingPlaybackEngine {
    config: PlaybackConfig,
    read_buf: Vec<u8>,
    /// Bytes of an incomplete frame carried to the next read.
    carry: Vec<u8>,
    out: Vec<i16>,
    phase: PlaybackPhase,
}

impl StreamingPlaybackEngine {
    /// # Errors
    /// `InvalidConfig` if the config fails validation, `AllocationFailure` if
    /// the read buffer cannot be reserved.
    pub fn new(config: PlaybackConfig) -> Result<Self> {
        config.validate()?;
        let mut read_buf = Vec::new();
        read_buf
            .try_reserve_exact(config.read_chunk_bytes)
            .map_err(|_| NovaError::AllocationFailure {
                bytes: config.read_chunk_bytes,
            })?;
        read_buf.resize(config.read_chunk_bytes, 0);

        Ok(Self {
            read_buf,
            carry: Vec::with_capacity(OUTPUT_CHANNELS * 2),
            out: Vec::with_capacity(config.read_chunk_bytes),
            config,
            phase: PlaybackPhase::AwaitingFirstByte,
        })
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Play one reply to completion or until patience runs out.
    ///
    /// `channels` is the channel count of the body (1 is duplicated to
    /// stereo). Bytes past `declared_len` are never read.
    ///
    /// # Errors
    /// Only output failures (`HardwareIo`) are errors; network outcomes are
    /// reported in [`PlaybackReport::phase`].
    pub fn play(
        &mut self,
        stream: &mut dyn ByteStream,
        declared_len: Option<u64>,
        channels: u16,
        output: &mut dyn AudioOutput,
        clock: &dyn Clock,
    ) -> Result<PlaybackReport> {
        let declared = declared_len.filter(|&n| n > 0);
        let channels = if channels == 1 { 1 } else { OUTPUT_CHANNELS };
        let _span = info_span!("playback", declared_len = declared, channels).entered();

        self.phase = PlaybackPhase::AwaitingFirstByte;
        self.carry.clear();

        let start = clock.now();
        let mut last_data = start;
        let mut consumed: u64 = 0;
        let mut samples_written: u64 = 0;
        let mut stall_polls: u64 = 0;

        loop {
            if declared.is_some_and(|total| consumed >= total) {
                self.phase = PlaybackPhase::Completed;
                break;
            }

            let available = stream.available();
            if available > 0 {
                let mut want = available.min(self.read_buf.len());
                if let Some(total) = declared {
                    let remaining = usize::try_from(total - consumed).unwrap_or(usize::MAX);
                    want = want.min(remaining);
                }

                let n = match stream.read(&mut self.read_buf[..want]) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!("reply stream read failed: {e}");
                        0
                    }
                };

                if n > 0 {
                    if self.phase == PlaybackPhase::AwaitingFirstByte {
                        debug!(
                            waited_ms = clock.now().saturating_duration_since(start).as_millis() as u64,
                            "first reply bytes"
                        );
                        self.phase = PlaybackPhase::Streaming;
                    }
                    consumed += n as u64;
                    stall_polls = 0;
                    last_data = clock.now();
                    samples_written += self.write_bytes(n, channels, output)?;
                    continue;
                }
            }

            let idle = clock.now().saturating_duration_since(last_data);
            match self.phase {
                PlaybackPhase::AwaitingFirstByte => {
                    if idle >= self.config.first_byte_timeout {
                        warn!(timeout_ms = idle.as_millis() as u64, "no reply bytes");
                        self.phase = PlaybackPhase::Error;
                        break;
                    }
                }
                _ => {
                    let (patience, outcome) = match declared {
                        Some(_) => (self.config.long_patience, PlaybackPhase::Incomplete),
                        None if stream.connected() => {
                            (self.config.short_patience, PlaybackPhase::Completed)
                        }
                        None => (self.config.disconnected_patience, PlaybackPhase::Completed),
                    };
                    if idle >= patience {
                        self.phase = outcome;
                        break;
                    }
                }
            }

            stall_polls += 1;
            clock.sleep(self.config.poll_interval);
        }

        if !self.carry.is_empty() {
            debug!(bytes = self.carry.len(), "dropping partial trailing frame");
            self.carry.clear();
        }
        if samples_written > 0 {
            output.drain()?;
        }

        let report = PlaybackReport {
            phase: self.phase,
            declared_len: declared,
            consumed,
            samples_written,
            stall_polls,
            idle: clock.now().saturating_duration_since(last_data),
        };

        match report.phase {
            PlaybackPhase::Incomplete => warn!(
                expected = declared.unwrap_or(0),
                received = consumed,
                "reply stream incomplete"
            ),
            phase => info!(?phase, consumed, "playback finished"),
        }
        Ok(report)
    }

    /// Decode `read_buf[..n]` (plus any carried bytes) into whole frames and
    /// write them as interleaved stereo. Returns samples written.
    fn write_bytes(&mut self, n: usize, channels: usize, output: &mut dyn AudioOutput) -> Result<u64> {
        self.carry.extend_from_slice(&self.read_buf[..n]);
        let frame_bytes = 2 * channels;
        let whole = self.carry.len() / frame_bytes * frame_bytes;
        if whole == 0 {
            return Ok(0);
        }

        self.out.clear();
        let decoded = pcm::le_samples(&self.carry[..whole]);
        if channels == 1 {
            for s in decoded {
                self.out.push(s);
                self.out.push(s);
            }
        } else {
            self.out.extend(decoded);
        }
        self.carry.drain(..whole);

        let mut rest = &self.out[..];
        while !rest.is_empty() {
            let accepted = output.write(rest)?;
            if accepted == 0 {
                return Err(NovaError::HardwareIo("output accepted no samples".into()));
            }
            rest = &rest[accepted.min(rest.len())..];
        }
        Ok(self.out.len() as u64)
    }
}
