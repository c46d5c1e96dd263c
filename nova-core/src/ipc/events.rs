//! Events broadcast by the engine to presentation layers.
//!
//! ## Channel names
//!
//! | Event | Channel |
//! |-------|---------|
//! | `EngineEvent::Status` | `"nova://status"` |
//! | `EngineEvent::Wake` | `"nova://wake"` |
//! | `EngineEvent::Recorded` / `Reply` / `Played` | `"nova://session"` |
//! | `EngineEvent::MicTest` | `"nova://diagnostics"` |
//!
//! LEDs, a display or a log printer subscribe to the same broadcast channel;
//! none of them can influence the audio path.

use serde::{Deserialize, Serialize};

use crate::engine::mic_test::MicTestReport;
use crate::net::ReplyMetadata;
use crate::playback::PlaybackPhase;
use crate::recorder::StopReason;

/// Current state of the appliance as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Devices opening, startup tone.
    Starting,
    /// Scanning for the wake word.
    Listening,
    /// Capturing an utterance.
    Recording,
    /// Waiting on the backend.
    Thinking,
    /// Playing a reply.
    Speaking,
    /// Wake scanning disabled by the user.
    Muted,
    /// Control loop exited.
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    #[serde(rename_all = "camelCase")]
    Status {
        status: EngineStatus,
        /// Optional human-readable detail (e.g. error message).
        detail: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Wake {
        seq: u64,
        label: String,
        score: f32,
        best_other: f32,
        /// `false` for a manual listen command.
        by_voice: bool,
    },
    #[serde(rename_all = "camelCase")]
    Recorded {
        seq: u64,
        stop_reason: StopReason,
        bytes: usize,
        duration_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    Reply {
        seq: u64,
        #[serde(flatten)]
        metadata: ReplyMetadata,
    },
    #[serde(rename_all = "camelCase")]
    Played {
        seq: u64,
        phase: PlaybackPhase,
        consumed: u64,
        declared_len: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    SessionFailed { seq: u64, detail: String },
    MicTest(MicTestReport),
}

impl EngineEvent {
    pub fn status(status: EngineStatus) -> Self {
        Self::Status { status, detail: None }
    }

    pub fn channel(&self) -> &'static str {
        match self {
            Self::Status { .. } => "nova://status",
            Self::Wake { .. } => "nova://wake",
            Self::Recorded { .. } | Self::Reply { .. } | Self::Played { .. } | Self::SessionFailed { .. } => {
                "nova://session"
            }
            Self::MicTest(_) => "nova://diagnostics",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Emotion;

    #[test]
    fn status_event_serializes_with_type_tag_and_lowercase_status() {
        let json = serde_json::to_value(EngineEvent::Status {
            status: EngineStatus::Thinking,
            detail: Some("posting 48000 bytes".into()),
        })
        .expect("serialize status event");
        assert_eq!(json["type"], "status");
        assert_eq!(json["status"], "thinking");
        assert_eq!(json["detail"], "posting 48000 bytes");
    }

    #[test]
    fn reply_event_flattens_metadata() {
        let event = EngineEvent::Reply {
            seq: 3,
            metadata: ReplyMetadata {
                transcription: Some("lights off".into()),
                response_text: None,
                emotion: Emotion::Sleepy,
                channels: 2,
            },
        };
        assert_eq!(event.channel(), "nova://session");

        let json = serde_json::to_value(&event).expect("serialize reply event");
        assert_eq!(json["type"], "reply");
        assert_eq!(json["seq"], 3);
        assert_eq!(json["transcription"], "lights off");
        assert_eq!(json["emotion"], "sleepy");

        let back: EngineEvent = serde_json::from_value(json).expect("deserialize reply event");
        assert!(matches!(back, EngineEvent::Reply { seq: 3, .. }));
    }

    #[test]
    fn played_event_uses_camel_case_fields() {
        let json = serde_json::to_value(EngineEvent::Played {
            seq: 1,
            phase: PlaybackPhase::Incomplete,
            consumed: 3_000,
            declared_len: Some(10_000),
        })
        .unwrap();
        assert_eq!(json["phase"], "incomplete");
        assert_eq!(json["declaredLen"], 10_000);
    }

    #[test]
    fn status_rejects_unknown_values() {
        let parsed = serde_json::from_str::<EngineStatus>(r#""dancing""#);
        assert!(parsed.is_err());
    }
}
