//! Audio drivers.
//!
//! The core only talks to the two blocking traits below. On the appliance they
//! wrap DMA-backed I2S peripherals; on a desktop host they wrap cpal streams
//! ([`CpalMicrophone`], [`speaker::CpalSpeaker`]).
//!
//! # Design constraints (cpal backend)
//!
//! The cpal callbacks run on an OS audio thread at elevated priority. They
//! **must not** allocate after the first callback, block on a lock, or do I/O.
//! They only move samples through SPSC ring buffers; the blocking `read_chunk`
//! / `write` calls on the control-loop thread do the waiting, resampling and
//! format conversion.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). Create and drop the cpal drivers on the thread that runs the engine.

pub mod device;
pub mod pcm;
pub mod resample;
pub mod speaker;
pub mod tones;

use crate::error::Result;

/// Fixed pipeline sample rate (Hz) for capture, recording and output.
pub const SAMPLE_RATE: u32 = 16_000;

/// Output is always interleaved stereo with the same signal on both channels.
pub const OUTPUT_CHANNELS: usize = 2;

/// Blocking microphone read.
pub trait AudioCapture {
    /// Fill `out` with mono PCM16 samples at [`SAMPLE_RATE`].
    ///
    /// Blocks until samples are available, bounded by the driver's own timeout.
    ///
    /// # Errors
    /// `NovaError::HardwareIo` when the peripheral fails or times out.
    fn read_chunk(&mut self, out: &mut [i16]) -> Result<usize>;

    /// Discard anything captured but not yet read.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Blocking speaker write.
pub trait AudioOutput {
    /// Queue interleaved stereo PCM16 samples for playback.
    ///
    /// Returns the number of samples accepted. Blocks while the device queue
    /// is full, bounded by the driver's own timeout.
    fn write(&mut self, interleaved: &[i16]) -> Result<usize>;

    /// Wait until queued audio has been played, then leave the device silent.
    fn drain(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(feature = "audio-cpal")]
pub use mic::CpalMicrophone;
#[cfg(feature = "audio-cpal")]
pub use speaker::CpalSpeaker;

#[cfg(feature = "audio-cpal")]
mod mic {
    use std::collections::VecDeque;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };
    use std::time::{Duration, Instant};

    use cpal::{
        traits::{DeviceTrait, StreamTrait},
        SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
    };
    use tracing::{error, info, warn};

    use super::{
        device::{select_device, Direction},
        pcm::f32_to_i16,
        resample::RateConverter,
        AudioCapture,
    };
    use crate::buffering::{
        create_sample_ring, Consumer, Observer, Producer, SampleConsumer, SampleProducer,
        CAPTURE_RING_CAPACITY,
    };
    use crate::error::{NovaError, Result};

    /// Samples popped from the ring per attempt.
    const DRAIN_CHUNK: usize = 960;
    /// Sleep between empty ring polls.
    const POLL_INTERVAL: Duration = Duration::from_millis(2);

    /// cpal-backed microphone delivering mono PCM16 at the pipeline rate.
    ///
    /// **Not `Send`**, see the module-level threading note.
    pub struct CpalMicrophone {
        /// Kept alive so the stream is not dropped prematurely.
        _stream: Stream,
        consumer: SampleConsumer,
        /// Cleared on drop so the callback stops producing.
        running: Arc<AtomicBool>,
        resampler: RateConverter,
        raw: Vec<f32>,
        pending: VecDeque<i16>,
        read_timeout: Duration,
        /// Native capture rate reported by the device (Hz).
        pub device_rate: u32,
    }

    impl CpalMicrophone {
        /// Open an input device by preferred name, otherwise the default
        /// input device, otherwise the first available one.
        ///
        /// # Errors
        /// `NoDefaultInputDevice` when no microphone exists, `AudioStream` if
        /// cpal cannot build or start the stream.
        pub fn open(
            preferred_device_name: Option<&str>,
            target_rate: u32,
            read_timeout: Duration,
        ) -> Result<Self> {
            let device = select_device(preferred_device_name, Direction::Input)?;

            info!(
                device = device.name().unwrap_or_default().as_str(),
                "opening input device"
            );

            let supported = device
                .default_input_config()
                .map_err(|e| NovaError::AudioDevice(e.to_string()))?;

            let device_rate = supported.sample_rate().0;
            let channels = supported.channels();
            info!(device_rate, channels, target_rate, "capture config selected");

            let config = StreamConfig {
                channels,
                sample_rate: SampleRate(device_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let (producer, consumer) = create_sample_ring(CAPTURE_RING_CAPACITY);
            let running = Arc::new(AtomicBool::new(true));
            let cb_running = Arc::clone(&running);

            let stream = match supported.sample_format() {
                SampleFormat::F32 => {
                    build_mono_input::<f32>(&device, &config, producer, cb_running, |s| s)
                }
                SampleFormat::I16 => build_mono_input::<i16>(
                    &device,
                    &config,
                    producer,
                    cb_running,
                    super::pcm::i16_to_f32,
                ),
                SampleFormat::U8 => {
                    build_mono_input::<u8>(&device, &config, producer, cb_running, |s| {
                        (f32::from(s) - 128.0) / 128.0
                    })
                }
                fmt => {
                    return Err(NovaError::AudioStream(format!(
                        "unsupported sample format: {fmt:?}"
                    )))
                }
            }
            .map_err(|e| NovaError::AudioStream(e.to_string()))?;

            stream
                .play()
                .map_err(|e| NovaError::AudioStream(e.to_string()))?;

            Ok(Self {
                _stream: stream,
                consumer,
                running,
                resampler: RateConverter::new(device_rate, target_rate, DRAIN_CHUNK)?,
                raw: vec![0f32; DRAIN_CHUNK],
                pending: VecDeque::with_capacity(DRAIN_CHUNK * 4),
                read_timeout,
                device_rate,
            })
        }
    }

    impl AudioCapture for CpalMicrophone {
        fn read_chunk(&mut self, out: &mut [i16]) -> Result<usize> {
            let deadline = Instant::now() + self.read_timeout;

            while self.pending.len() < out.len() {
                let n = self.consumer.pop_slice(&mut self.raw);
                if n == 0 {
                    if Instant::now() >= deadline {
                        return Err(NovaError::HardwareIo(format!(
                            "no capture data within {:?}",
                            self.read_timeout
                        )));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                    continue;
                }
                let resampled = self.resampler.process(&self.raw[..n]);
                self.pending
                    .extend(resampled.into_iter().map(f32_to_i16));
            }

            let n = out.len();
            for (dst, src) in out.iter_mut().zip(self.pending.drain(..n)) {
                *dst = src;
            }
            Ok(n)
        }

        fn flush(&mut self) -> Result<()> {
            let stale = self.consumer.occupied_len();
            self.consumer.skip(stale);
            self.pending.clear();
            Ok(())
        }
    }

    impl Drop for CpalMicrophone {
        fn drop(&mut self) {
            self.running.store(false, Ordering::Release);
        }
    }

    /// Build an input stream that downmixes every frame to mono f32 and
    /// pushes it into `producer`.
    fn build_mono_input<T: SizedSample + 'static>(
        device: &cpal::Device,
        config: &StreamConfig,
        mut producer: SampleProducer,
        running: Arc<AtomicBool>,
        to_f32: fn(T) -> f32,
    ) -> std::result::Result<Stream, cpal::BuildStreamError> {
        let ch = usize::from(config.channels.max(1));
        let mut mix_buf: Vec<f32> = Vec::new();

        device.build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                let frames = data.len() / ch;
                mix_buf.resize(frames, 0.0);
                for (slot, frame) in mix_buf.iter_mut().zip(data.chunks_exact(ch)) {
                    let sum: f32 = frame.iter().map(|&s| to_f32(s)).sum();
                    *slot = sum / ch as f32;
                }
                let written = producer.push_slice(&mix_buf);
                if written < mix_buf.len() {
                    warn!(
                        "capture ring full: dropped {} frames",
                        mix_buf.len() - written
                    );
                }
            },
            |err| error!("audio input stream error: {err}"),
            None,
        )
    }
}
