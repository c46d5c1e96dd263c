//! Audio device enumeration and selection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Input,
    Output,
}

/// Metadata about an audio device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    pub direction: Direction,
    /// Whether this is the system default device for its direction.
    pub is_default: bool,
    /// Input devices that likely capture system output rather than a microphone.
    pub is_loopback_like: bool,
    /// The device [`select_device`] would pick with no preference given.
    pub is_recommended: bool,
}

const LOOPBACK_KEYWORDS: &[&str] = &[
    "stereo mix",
    "wave out",
    "what u hear",
    "what you hear",
    "loopback",
    "virtual output",
    "monitor of",
    "speakers (",
    "headphones (",
];

const MIC_POSITIVE_KEYWORDS: &[&str] = &[
    "microphone",
    "mic",
    "array",
    "headset",
    "input",
    "line in",
    "usb",
    "i2s",
    "webcam",
];

/// Best-effort heuristic for loopback / system-output capture devices. The
/// wake detector would otherwise hear its own replies.
pub fn is_loopback_like_name(name: &str) -> bool {
    let lowered = name.trim().to_ascii_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Higher is better. Non-loopback devices always outrank loopback ones.
pub fn mic_preference_score(name: &str) -> i32 {
    let lowered = name.trim().to_ascii_lowercase();
    let mut score = if is_loopback_like_name(&lowered) { -16 } else { 8 };
    if MIC_POSITIVE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        score += 6;
    }
    if lowered.contains("default") {
        score += 1;
    }
    score
}

/// Order devices the way they are presented to the user: recommended first,
/// then non-loopback, then default, then by name.
fn mark_and_sort(list: &mut [DeviceInfo]) {
    let best = list
        .iter()
        .enumerate()
        .max_by_key(|(_, d)| match d.direction {
            Direction::Input => mic_preference_score(&d.name) + if d.is_default { 2 } else { 0 },
            Direction::Output => i32::from(d.is_default),
        })
        .map(|(idx, _)| idx);
    if let Some(best) = best.and_then(|idx| list.get_mut(idx)) {
        best.is_recommended = true;
    }

    list.sort_by_key(|d| {
        (
            !d.is_recommended,
            d.is_loopback_like,
            !d.is_default,
            d.name.to_ascii_lowercase(),
        )
    });
}

/// List audio devices for one direction.
///
/// Returns an empty `Vec` if no devices exist or enumeration fails.
#[cfg(feature = "audio-cpal")]
pub fn list_devices(direction: Direction) -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = default_device(&host, direction).and_then(|d| d.name().ok());

    let devices = match direction {
        Direction::Input => host.input_devices().map(|d| d.collect::<Vec<_>>()),
        Direction::Output => host.output_devices().map(|d| d.collect::<Vec<_>>()),
    };

    let devices = match devices {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!(?direction, "failed to enumerate devices: {e}");
            default_device(&host, direction).into_iter().collect()
        }
    };

    let mut list = devices
        .iter()
        .enumerate()
        .map(|(idx, device)| {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("{direction:?} Device {}", idx + 1));
            DeviceInfo {
                is_default: default_name.as_deref() == Some(name.as_str()),
                is_loopback_like: direction == Direction::Input && is_loopback_like_name(&name),
                is_recommended: false,
                direction,
                name,
            }
        })
        .collect::<Vec<_>>();

    mark_and_sort(&mut list);
    list
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_devices(_direction: Direction) -> Vec<DeviceInfo> {
    vec![]
}

#[cfg(feature = "audio-cpal")]
fn default_device(host: &cpal::Host, direction: Direction) -> Option<cpal::Device> {
    use cpal::traits::HostTrait;
    match direction {
        Direction::Input => host.default_input_device(),
        Direction::Output => host.default_output_device(),
    }
}

/// Resolve a device: exact (case-insensitive) name match on `preferred`, then
/// the recommended device, then the host default.
///
/// # Errors
/// `NoDefaultInputDevice` / `NoDefaultOutputDevice` when nothing is available.
#[cfg(feature = "audio-cpal")]
pub(crate) fn select_device(
    preferred: Option<&str>,
    direction: Direction,
) -> crate::error::Result<cpal::Device> {
    use cpal::traits::{DeviceTrait, HostTrait};
    use tracing::warn;

    use crate::error::NovaError;

    let host = cpal::default_host();
    let missing = || match direction {
        Direction::Input => NovaError::NoDefaultInputDevice,
        Direction::Output => NovaError::NoDefaultOutputDevice,
    };

    let mut all: Vec<cpal::Device> = match direction {
        Direction::Input => host.input_devices().map(|d| d.collect()),
        Direction::Output => host.output_devices().map(|d| d.collect()),
    }
    .unwrap_or_default();

    if let Some(wanted) = preferred.map(str::trim).filter(|w| !w.is_empty()) {
        if let Some(idx) = all
            .iter()
            .position(|d| d.name().is_ok_and(|n| n.eq_ignore_ascii_case(wanted)))
        {
            return Ok(all.swap_remove(idx));
        }
        warn!(?direction, wanted, "preferred device not found, falling back");
    }

    let recommended = list_devices(direction)
        .into_iter()
        .find(|d| d.is_recommended && !d.is_loopback_like)
        .and_then(|info| all.iter().position(|d| d.name().is_ok_and(|n| n == info.name)));

    match recommended {
        Some(idx) => Ok(all.swap_remove(idx)),
        None => default_device(&host, direction).ok_or_else(missing),
    }
}
