//! Fixed-size capture chunk passed from the capture driver to the slice buffer
//! and the recorder.

use crate::audio::AudioCapture;
use crate::error::{NovaError, Result};

/// One blocking capture read worth of mono PCM16 samples.
///
/// Allocated once by the control loop and refilled on every read.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    buf: Box<[i16]>,
    filled: usize,
    sample_rate: u32,
}

impl AudioChunk {
    pub fn new(size: usize, sample_rate: u32) -> Self {
        Self {
            buf: vec![0i16; size].into_boxed_slice(),
            filled: 0,
            sample_rate,
        }
    }

    /// Refill from the capture driver. A zero-sample read is a hardware fault:
    /// the driver is supposed to block until at least one sample arrives.
    pub fn read_from(&mut self, capture: &mut dyn AudioCapture) -> Result<&[i16]> {
        self.filled = 0;
        let n = capture.read_chunk(&mut self.buf)?;
        if n == 0 {
            return Err(NovaError::HardwareIo("capture returned no samples".into()));
        }
        self.filled = n.min(self.buf.len());
        Ok(self.samples())
    }

    /// The samples produced by the last read.
    pub fn samples(&self) -> &[i16] {
        &self.buf[..self.filled]
    }

    pub fn samples_mut(&mut self) -> &mut [i16] {
        &mut self.buf[..self.filled]
    }

    /// Capacity in samples.
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration of the samples currently held.
    pub fn duration_secs(&self) -> f64 {
        self.filled as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }
}
