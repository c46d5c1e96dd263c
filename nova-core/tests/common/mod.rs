//! Scripted devices and collaborators for driving the real components with a
//! `ManualClock`.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nova_core::net::Emotion;
use nova_core::{
    AudioCapture, AudioOutput, BackendReply, ByteStream, ClassificationResult, ManualClock,
    NovaError, ReplyMetadata, Result, VoiceBackend, WakeClassifier,
};
use parking_lot::Mutex;

pub const RATE: u64 = 16_000;

pub fn samples_to_duration(samples: usize) -> Duration {
    Duration::from_nanos(samples as u64 * 1_000_000_000 / RATE)
}

/// Plays back `(amplitude, samples)` segments, then `fallback` forever.
/// Signs alternate so the signal has no DC offset. Every read advances the
/// clock by the duration of the samples it returned.
pub struct ScriptedCapture {
    clock: ManualClock,
    segments: VecDeque<(i16, usize)>,
    fallback: i16,
    produced: usize,
    /// `(sample index, reads)`: fail this many reads once the index is reached.
    fault: Option<(usize, u32)>,
}

impl ScriptedCapture {
    pub fn new(clock: ManualClock, segments: &[(i16, usize)], fallback: i16) -> Self {
        Self {
            clock,
            segments: segments.iter().copied().collect(),
            fallback,
            produced: 0,
            fault: None,
        }
    }

    /// After `at_sample` samples, the next `reads` reads fail with `HardwareIo`.
    pub fn failing_at(mut self, at_sample: usize, reads: u32) -> Self {
        self.fault = Some((at_sample, reads));
        self
    }

    fn next_amplitude(&mut self) -> i16 {
        match self.segments.front_mut() {
            Some((amp, left)) => {
                let amp = *amp;
                *left -= 1;
                if *left == 0 {
                    self.segments.pop_front();
                }
                amp
            }
            None => self.fallback,
        }
    }
}

impl AudioCapture for ScriptedCapture {
    fn read_chunk(&mut self, out: &mut [i16]) -> Result<usize> {
        if let Some((at, left)) = self.fault.as_mut() {
            if self.produced >= *at {
                *left -= 1;
                if *left == 0 {
                    self.fault = None;
                }
                return Err(NovaError::HardwareIo("microphone stopped responding".into()));
            }
        }
        for s in out.iter_mut() {
            let amp = self.next_amplitude();
            *s = if self.produced % 2 == 0 { amp } else { -amp };
            self.produced += 1;
        }
        self.clock.advance(samples_to_duration(out.len()));
        Ok(out.len())
    }
}

/// Output whose contents stay inspectable after it is boxed into the engine.
#[derive(Clone, Default)]
pub struct SharedOutput {
    pub written: Arc<Mutex<Vec<i16>>>,
    pub drains: Arc<AtomicUsize>,
}

impl SharedOutput {
    pub fn samples(&self) -> usize {
        self.written.lock().len()
    }

    pub fn drain_count(&self) -> usize {
        self.drains.load(Ordering::SeqCst)
    }
}

impl AudioOutput for SharedOutput {
    fn write(&mut self, interleaved: &[i16]) -> Result<usize> {
        self.written.lock().extend_from_slice(interleaved);
        Ok(interleaved.len())
    }

    fn drain(&mut self) -> Result<()> {
        self.drains.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Whole body available up front. Once drained, reports `stay_connected`.
pub struct ScriptedStream {
    data: VecDeque<u8>,
    stay_connected: bool,
    /// Bytes that show up once the clock reaches the given offset.
    late: VecDeque<(Duration, Vec<u8>)>,
    clock: Option<ManualClock>,
}

impl ScriptedStream {
    pub fn new(body: Vec<u8>, stay_connected: bool) -> Self {
        Self {
            data: body.into(),
            stay_connected,
            late: VecDeque::new(),
            clock: None,
        }
    }

    /// Deliver `bytes` once `clock` has advanced to `at`. Bursts must be added
    /// in time order.
    pub fn with_burst_at(mut self, clock: &ManualClock, at: Duration, bytes: Vec<u8>) -> Self {
        self.clock = Some(clock.clone());
        self.late.push_back((at, bytes));
        self
    }

    fn release_due(&mut self) {
        let Some(now) = self.clock.as_ref().map(ManualClock::elapsed) else {
            return;
        };
        while self.late.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, bytes)) = self.late.pop_front() {
                self.data.extend(bytes);
            }
        }
    }

    /// Bytes never read by the consumer.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }
}

impl ByteStream for ScriptedStream {
    fn available(&mut self) -> usize {
        self.release_due();
        self.data.len()
    }

    fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        let n = out.len().min(self.data.len());
        for (dst, src) in out.iter_mut().zip(self.data.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn connected(&self) -> bool {
        !self.data.is_empty() || self.stay_connected
    }
}

/// Same scores for every slice.
pub struct FixedClassifier {
    pub result: ClassificationResult,
}

impl FixedClassifier {
    pub fn new(wake: f32, other: f32) -> Self {
        Self {
            result: ClassificationResult::new()
                .with("nova", wake)
                .with("noise", other),
        }
    }
}

impl WakeClassifier for FixedClassifier {
    fn classify(&mut self, _samples: &[i16]) -> Result<ClassificationResult> {
        Ok(self.result.clone())
    }
}

/// Records every submission and answers with a canned reply or status.
#[derive(Clone)]
pub struct FakeBackend {
    pub submitted: Arc<Mutex<Vec<Vec<u8>>>>,
    pub body: Vec<u8>,
    pub declared_len: Option<u64>,
    pub channels: u16,
    pub fail_status: Option<u16>,
}

impl FakeBackend {
    pub fn replying(body: Vec<u8>) -> Self {
        Self {
            submitted: Arc::default(),
            declared_len: Some(body.len() as u64),
            body,
            channels: 2,
            fail_status: None,
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Self::replying(Vec::new())
        }
    }

    /// Declares `declared` bytes but only ever sends `body`.
    pub fn truncated(body: Vec<u8>, declared: u64) -> Self {
        Self {
            declared_len: Some(declared),
            ..Self::replying(body)
        }
    }

    pub fn submissions(&self) -> Vec<usize> {
        self.submitted.lock().iter().map(Vec::len).collect()
    }
}

impl VoiceBackend for FakeBackend {
    fn submit(&mut self, pcm: &[u8]) -> Result<BackendReply> {
        self.submitted.lock().push(pcm.to_vec());
        if let Some(status) = self.fail_status {
            return Err(NovaError::BackendStatus(status));
        }
        Ok(BackendReply {
            stream: Box::new(ScriptedStream::new(self.body.clone(), false)),
            declared_len: self.declared_len,
            metadata: ReplyMetadata {
                transcription: Some("what time is it".into()),
                response_text: Some("almost noon".into()),
                emotion: Emotion::Happy,
                channels: self.channels,
            },
        })
    }
}

/// Little-endian PCM16 of `samples` stereo frames with a ramp pattern.
pub fn stereo_body(frames: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(frames * 4);
    for i in 0..frames {
        let s = (i % 1000) as i16;
        out.extend_from_slice(&s.to_le_bytes());
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}
