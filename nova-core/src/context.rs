//! Device-wide flags shared by the control loop and its components.
//!
//! Passed explicitly into component calls instead of living in globals. Only
//! the control loop mutates it.

use serde::{Deserialize, Serialize};

/// What currently owns the microphone or speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Activity {
    Recording,
    AwaitingReply,
    Playing,
    MicTest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceContext {
    busy: Option<Activity>,
    muted: bool,
}

impl DeviceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    pub fn activity(&self) -> Option<Activity> {
        self.busy
    }

    /// Mark the devices as owned by `activity`. Replaces any previous activity
    /// so a session can move from recording to playback without a gap.
    pub fn set_busy(&mut self, activity: Activity) {
        self.busy = Some(activity);
    }

    pub fn clear_busy(&mut self) {
        self.busy = None;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Returns the new mute state.
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }

    /// Wake scanning runs only when idle and unmuted.
    pub fn detection_enabled(&self) -> bool {
        !self.muted && self.busy.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_requires_idle_and_unmuted() {
        let mut ctx = DeviceContext::new();
        assert!(ctx.detection_enabled());

        ctx.set_busy(Activity::Recording);
        assert!(!ctx.detection_enabled());
        ctx.set_busy(Activity::Playing);
        assert_eq!(ctx.activity(), Some(Activity::Playing));
        ctx.clear_busy();
        assert!(ctx.detection_enabled());

        assert!(ctx.toggle_mute());
        assert!(!ctx.detection_enabled());
        assert!(!ctx.toggle_mute());
    }
}
