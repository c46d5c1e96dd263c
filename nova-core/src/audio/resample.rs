//! Sample-rate conversion between host devices and the 16 kHz pipeline, using
//! a rubato `FastFixedIn` resampler.
//!
//! Host devices usually run at 44.1 or 48 kHz. The microphone driver converts
//! device → pipeline rate after popping its ring; the speaker driver converts
//! pipeline → device rate before pushing. Both run off the real-time thread,
//! where allocation is allowed.
//!
//! When the two rates match, `RateConverter` is a passthrough and no rubato
//! session is created.
//!
//! ```ignore
//! let mut rc = RateConverter::new(48_000, 16_000, 960)?;
//! let out = rc.process(&raw_samples); // Vec<f32> at 16 kHz
//! ```

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{debug, error};

use crate::error::{NovaError, Result};

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` in passthrough mode.
    resampler: Option<FastFixedIn<f32>>,
    /// Partial input block carried between calls.
    input_buf: Vec<f32>,
    /// Input frames rubato expects per process call.
    chunk_size: usize,
    /// Output frames per input frame.
    ratio: f64,
    /// `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// `NovaError::AudioDevice` if rubato rejects the ratio or chunk size.
    pub fn new(from_rate: u32, to_rate: u32, chunk_size: usize) -> Result<Self> {
        if from_rate == to_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                ratio: 1.0,
                output_buf: Vec::new(),
            });
        }

        let ratio = f64::from(to_rate) / f64::from(from_rate);

        let resampler =
            FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
                .map_err(|e| NovaError::AudioDevice(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();

        debug!(from_rate, to_rate, chunk_size, max_out, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            ratio,
            output_buf: vec![vec![0f32; max_out]; 1],
        })
    }

    /// Feed samples and return whatever output is ready (may be empty).
    ///
    /// Input accumulates until a full `chunk_size` block is available; the
    /// remainder waits for the next call or for [`RateConverter::flush`].
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        if self.resampler.is_none() {
            return samples.to_vec();
        }
        self.input_buf.extend_from_slice(samples);

        let mut result = Vec::new();
        while self.input_buf.len() >= self.chunk_size {
            self.run_block(&mut result);
        }
        result
    }

    /// Zero-pad and convert any partial block so the tail of a stream is not
    /// left behind. Passthrough converters hold nothing.
    pub fn flush(&mut self) -> Vec<f32> {
        let mut result = Vec::new();
        if self.resampler.is_none() || self.input_buf.is_empty() {
            return result;
        }
        let real = self.input_buf.len();
        self.input_buf.resize(self.chunk_size, 0.0);
        self.run_block(&mut result);

        // Drop the output produced by the padding. The resampler delay means a
        // block can yield fewer frames than the ratio implies, never more.
        let keep = (real as f64 * self.ratio).ceil() as usize;
        result.truncate(keep);
        result
    }

    fn run_block(&mut self, result: &mut Vec<f32>) {
        let Some(ref mut resampler) = self.resampler else {
            return;
        };
        let input_slice = &self.input_buf[..self.chunk_size];
        match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None) {
            Ok((_consumed, produced)) => {
                result.extend_from_slice(&self.output_buf[0][..produced]);
            }
            Err(e) => {
                error!("resampler process error: {e}");
            }
        }
        self.input_buf.drain(..self.chunk_size);
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}
