//! PCM16 helpers shared by the recorder, playback and the cpal drivers.

/// Largest absolute sample value. `i16::MIN` maps to 32768 rather than overflowing.
pub fn peak_amplitude(samples: &[i16]) -> u16 {
    samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0)
}

/// Mean absolute sample value.
pub fn mean_amplitude(samples: &[i16]) -> u32 {
    if samples.is_empty() {
        return 0;
    }
    let sum: u64 = samples.iter().map(|s| u64::from(s.unsigned_abs())).sum();
    (sum / samples.len() as u64) as u32
}

/// Multiply every sample by `gain`, saturating at the i16 range.
pub fn apply_gain(samples: &mut [i16], gain: i32) {
    if gain == 1 {
        return;
    }
    for s in samples.iter_mut() {
        *s = (i32::from(*s) * gain).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
    }
}

/// Append samples to `out` as little-endian bytes.
pub fn extend_le_bytes(out: &mut Vec<u8>, samples: &[i16]) {
    out.reserve(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
}

/// Decode little-endian PCM16. A trailing odd byte is ignored.
pub fn le_samples(bytes: &[u8]) -> impl Iterator<Item = i16> + '_ {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
}

/// Interleave a mono signal into stereo by duplicating each sample.
pub fn extend_stereo(out: &mut Vec<i16>, mono: &[i16]) {
    out.reserve(mono.len() * 2);
    for &s in mono {
        out.push(s);
        out.push(s);
    }
}

#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}
