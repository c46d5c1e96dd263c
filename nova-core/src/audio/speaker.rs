//! cpal-backed speaker.
//!
//! `write` takes the pipeline's interleaved stereo PCM16, folds it to mono f32,
//! resamples to the device rate and pushes it into an SPSC ring. The output
//! callback pops one sample per frame and copies it to every device channel,
//! writing silence on underrun.

#![cfg(feature = "audio-cpal")]

use std::thread;
use std::time::{Duration, Instant};

use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};
use tracing::{debug, error, info};

use super::{
    device::{select_device, Direction},
    pcm::{f32_to_i16, i16_to_f32},
    resample::RateConverter,
    AudioOutput, OUTPUT_CHANNELS,
};
use crate::buffering::{
    create_sample_ring, Consumer, Observer, Producer, SampleConsumer, SampleProducer,
    OUTPUT_RING_CAPACITY,
};
use crate::error::{NovaError, Result};

const RESAMPLE_CHUNK: usize = 256;
const POLL_INTERVAL: Duration = Duration::from_millis(2);
/// Time left for the device's own buffer after the ring empties.
const DEVICE_TAIL: Duration = Duration::from_millis(200);

/// **Not `Send`**, see the `audio` module threading note.
pub struct CpalSpeaker {
    _stream: Stream,
    producer: SampleProducer,
    resampler: RateConverter,
    mono: Vec<f32>,
    write_timeout: Duration,
    pub device_rate: u32,
}

impl CpalSpeaker {
    /// # Errors
    /// `NoDefaultOutputDevice` when no speaker exists, `AudioStream` if cpal
    /// cannot build or start the stream.
    pub fn open(
        preferred_device_name: Option<&str>,
        source_rate: u32,
        write_timeout: Duration,
    ) -> Result<Self> {
        let device = select_device(preferred_device_name, Direction::Output)?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening output device"
        );

        let supported = device
            .default_output_config()
            .map_err(|e| NovaError::AudioDevice(e.to_string()))?;
        let device_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(device_rate, channels, source_rate, "output config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(device_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (producer, consumer) = create_sample_ring(OUTPUT_RING_CAPACITY);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_mono_output::<f32>(&device, &config, consumer, |s| s),
            SampleFormat::I16 => build_mono_output::<i16>(&device, &config, consumer, f32_to_i16),
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
            producer,
            resampler: RateConverter::new(source_rate, device_rate, RESAMPLE_CHUNK)?,
            mono: Vec::with_capacity(RESAMPLE_CHUNK * 8),
            write_timeout,
            device_rate,
        })
    }

    fn push_blocking(&mut self, mut samples: &[f32]) -> Result<()> {
        let deadline = Instant::now() + self.write_timeout;
        while !samples.is_empty() {
            let n = self.producer.push_slice(samples);
            samples = &samples[n..];
            if samples.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                return Err(NovaError::HardwareIo(format!(
                    "speaker queue did not drain within {:?}",
                    self.write_timeout
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }
}

impl AudioOutput for CpalSpeaker {
    fn write(&mut self, interleaved: &[i16]) -> Result<usize> {
        self.mono.clear();
        self.mono.extend(interleaved.chunks(OUTPUT_CHANNELS).map(|frame| {
            let sum: f32 = frame.iter().map(|&s| i16_to_f32(s)).sum();
            sum / frame.len() as f32
        }));

        let resampled = self.resampler.process(&self.mono);
        self.push_blocking(&resampled)?;
        Ok(interleaved.len())
    }

    fn drain(&mut self) -> Result<()> {
        let tail = self.resampler.flush();
        self.push_blocking(&tail)?;

        let deadline = Instant::now() + self.write_timeout;
        while self.producer.occupied_len() > 0 {
            if Instant::now() >= deadline {
                return Err(NovaError::HardwareIo("speaker drain timed out".into()));
            }
            thread::sleep(POLL_INTERVAL);
        }
        thread::sleep(DEVICE_TAIL);
        debug!("speaker drained");
        Ok(())
    }
}

fn build_mono_output<T: SizedSample + 'static>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: SampleConsumer,
    from_f32: fn(f32) -> T,
) -> std::result::Result<Stream, cpal::BuildStreamError> {
    let ch = usize::from(config.channels.max(1));

    device.build_output_stream(
        config,
        move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
            for frame in data.chunks_mut(ch) {
                let value = from_f32(consumer.try_pop().unwrap_or(0.0));
                for slot in frame.iter_mut() {
                    *slot = value;
                }
            }
        },
        |err| error!("audio output stream error: {err}"),
        None,
    )
}
