//! Short feedback tones ("earcons") played around each interaction.
//!
//! Each earcon is a fixed melody of sine notes rendered as interleaved stereo
//! PCM16 at the pipeline rate and written straight to the output driver.

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{pcm::extend_stereo, AudioOutput, SAMPLE_RATE};
use crate::error::Result;

/// Fade-in/out length per note, avoids clicks at note boundaries.
const FADE_MS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Earcon {
    Startup,
    Muted,
    Unmuted,
    Listening,
    Processing,
    Success,
    Error,
}

/// One note. A frequency of 0 is a rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub freq_hz: u32,
    pub duration_ms: u32,
}

const fn note(freq_hz: u32, duration_ms: u32) -> Note {
    Note { freq_hz, duration_ms }
}

// C5 E5 G5
const STARTUP: &[Note] = &[note(523, 150), note(659, 150), note(784, 300)];
const MUTED: &[Note] = &[note(880, 100), note(440, 200)];
const UNMUTED: &[Note] = &[note(440, 100), note(880, 200)];
const LISTENING: &[Note] = &[note(1047, 150)];
const PROCESSING: &[Note] = &[note(523, 200), note(659, 200)];
// E5 G5 C6
const SUCCESS: &[Note] = &[note(659, 100), note(784, 100), note(1047, 200)];
const ERROR: &[Note] = &[note(392, 200), note(330, 300)];

impl Earcon {
    pub fn notes(self) -> &'static [Note] {
        match self {
            Self::Startup => STARTUP,
            Self::Muted => MUTED,
            Self::Unmuted => UNMUTED,
            Self::Listening => LISTENING,
            Self::Processing => PROCESSING,
            Self::Success => SUCCESS,
            Self::Error => ERROR,
        }
    }

    /// Peak amplitude as a fraction of full scale.
    pub fn volume(self) -> f32 {
        match self {
            Self::Muted | Self::Unmuted | Self::Processing | Self::Error => 0.15,
            Self::Startup | Self::Listening | Self::Success => 0.2,
        }
    }

    /// Total length of the melody.
    pub fn duration_ms(self) -> u32 {
        self.notes().iter().map(|n| n.duration_ms).sum()
    }
}

/// Render a mono sine note (or silence for a rest).
pub fn render_note(n: Note, volume: f32, sample_rate: u32) -> Vec<i16> {
    let len = (u64::from(sample_rate) * u64::from(n.duration_ms) / 1000) as usize;
    if n.freq_hz == 0 {
        return vec![0; len];
    }

    let fade = ((sample_rate * FADE_MS / 1000) as usize).min(len / 2).max(1);
    let amplitude = volume.clamp(0.0, 1.0) * f32::from(i16::MAX);
    let step = TAU * n.freq_hz as f32 / sample_rate as f32;

    (0..len)
        .map(|i| {
            let edge = i.min(len - 1 - i);
            let envelope = if edge < fade {
                edge as f32 / fade as f32
            } else {
                1.0
            };
            ((step * i as f32).sin() * amplitude * envelope) as i16
        })
        .collect()
}

/// Render a whole earcon as interleaved stereo PCM16 at [`SAMPLE_RATE`].
pub fn render(earcon: Earcon) -> Vec<i16> {
    let mut out = Vec::new();
    for n in earcon.notes() {
        extend_stereo(&mut out, &render_note(*n, earcon.volume(), SAMPLE_RATE));
    }
    out
}

/// Write an earcon to the speaker. Does not drain; the tone overlaps whatever
/// the caller does next.
pub fn play(output: &mut dyn AudioOutput, earcon: Earcon) -> Result<()> {
    trace!(?earcon, "earcon");
    let pcm = render(earcon);
    output.write(&pcm)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::peak_amplitude;

    #[test]
    fn rendered_length_matches_melody() {
        for earcon in [Earcon::Startup, Earcon::Error, Earcon::Listening] {
            let frames = (SAMPLE_RATE * earcon.duration_ms() / 1000) as usize;
            assert_eq!(render(earcon).len(), frames * 2, "{earcon:?}");
        }
    }

    #[test]
    fn peak_respects_volume() {
        let pcm = render_note(note(440, 100), 0.2, SAMPLE_RATE);
        let peak = peak_amplitude(&pcm);
        assert!(peak <= (0.2 * 32767.0) as u16 + 1);
        assert!(peak > 5_000, "peak={peak}");
    }

    #[test]
    fn note_edges_are_faded() {
        let pcm = render_note(note(1047, 150), 0.2, SAMPLE_RATE);
        assert_eq!(pcm[0], 0);
        assert!(pcm[pcm.len() - 1].unsigned_abs() < 200);
    }

    #[test]
    fn rest_is_silence() {
        let pcm = render_note(note(0, 50), 0.2, SAMPLE_RATE);
        assert_eq!(pcm.len(), 800);
        assert!(pcm.iter().all(|&s| s == 0));
    }

    #[test]
    fn every_earcon_has_a_melody() {
        for earcon in [
            Earcon::Startup,
            Earcon::Muted,
            Earcon::Unmuted,
            Earcon::Listening,
            Earcon::Processing,
            Earcon::Success,
            Earcon::Error,
        ] {
            let notes: &'static [Note] = earcon.notes();
            assert!(!notes.is_empty(), "{earcon:?}");
            assert!(earcon.duration_ms() >= 150, "{earcon:?}");
        }
        assert_eq!(Earcon::Startup.notes()[2], note(784, 300));
    }

    #[test]
    fn stereo_channels_are_identical() {
        let pcm = render(Earcon::Muted);
        assert!(pcm.chunks_exact(2).all(|f| f[0] == f[1]));
    }
}
