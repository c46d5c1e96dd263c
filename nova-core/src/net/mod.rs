//! Network collaborator interfaces.
//!
//! The core never opens sockets itself. A [`VoiceBackend`] takes the trimmed
//! recording and hands back a [`BackendReply`]: a pull-based [`ByteStream`] of
//! PCM16 plus whatever the backend said about it.

pub mod stream;

#[cfg(feature = "http")]
pub mod http;

pub use stream::ReaderStream;

#[cfg(feature = "http")]
pub use http::HttpBackend;

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const HEADER_TRANSCRIPTION: &str = "X-Transcription";
pub const HEADER_RESPONSE_TEXT: &str = "X-AI-Response";
pub const HEADER_EMOTION: &str = "X-Emotion";
pub const HEADER_EXPRESSION: &str = "X-Expression";
pub const HEADER_CHANNELS: &str = "X-Audio-Channels";

/// Pull-based reply body.
pub trait ByteStream: Send {
    /// Bytes that can be read right now without blocking.
    fn available(&mut self) -> usize;

    /// Read up to `buf.len()` bytes without blocking. Returns 0 when nothing
    /// is buffered.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Best-effort: `false` once the peer has closed. Buffered bytes may
    /// still be readable afterwards.
    fn connected(&self) -> bool;
}

/// Facial/emotional hint attached to a reply. Only forwarded to presentation
/// layers; audio handling ignores it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Emotion {
    #[default]
    Normal,
    Happy,
    Sad,
    Excited,
    Scared,
    Shock,
    Angry,
    Romantic,
    Cold,
    Hot,
    Serious,
    Confused,
    Curious,
    Sleepy,
}

impl Emotion {
    /// Case-insensitive name; anything unknown is `Normal`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "happy" => Self::Happy,
            "sad" => Self::Sad,
            "excited" => Self::Excited,
            "scared" => Self::Scared,
            "shock" => Self::Shock,
            "angry" => Self::Angry,
            "romantic" => Self::Romantic,
            "cold" => Self::Cold,
            "hot" => Self::Hot,
            "serious" => Self::Serious,
            "confused" => Self::Confused,
            "curious" => Self::Curious,
            "sleepy" => Self::Sleepy,
            _ => Self::Normal,
        }
    }

    /// Numeric expression code: 0 neutral, 1 happy, 2 thinking, 3 excited,
    /// 4 sad, 5 smiling, 6 surprised.
    pub fn from_expression_code(code: i64) -> Self {
        match code {
            1 | 5 => Self::Happy,
            2 => Self::Curious,
            3 => Self::Excited,
            4 => Self::Sad,
            6 => Self::Shock,
            _ => Self::Normal,
        }
    }
}

/// What the backend said about its reply, decoded once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyMetadata {
    pub transcription: Option<String>,
    pub response_text: Option<String>,
    pub emotion: Emotion,
    /// Interleaved channels in the body: 1 or 2.
    pub channels: u16,
}

impl Default for ReplyMetadata {
    fn default() -> Self {
        Self {
            transcription: None,
            response_text: None,
            emotion: Emotion::Normal,
            channels: 2,
        }
    }
}

impl ReplyMetadata {
    /// Decode the reply headers. `get` looks a header up by name.
    ///
    /// `X-Emotion` wins over `X-Expression`; a missing or unsupported channel
    /// count means stereo.
    pub fn from_headers<'a>(get: impl Fn(&str) -> Option<&'a str>) -> Self {
        let text = |name: &str| {
            get(name)
                .map(decode_header_text)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
        };

        let emotion = match get(HEADER_EMOTION).map(str::trim).filter(|e| !e.is_empty()) {
            Some(name) => Emotion::from_name(name),
            None => get(HEADER_EXPRESSION)
                .and_then(|code| code.trim().parse::<i64>().ok())
                .map(Emotion::from_expression_code)
                .unwrap_or_default(),
        };

        let channels = get(HEADER_CHANNELS)
            .and_then(|c| c.trim().parse::<u16>().ok())
            .filter(|c| matches!(c, 1 | 2))
            .unwrap_or(2);

        Self {
            transcription: text(HEADER_TRANSCRIPTION),
            response_text: text(HEADER_RESPONSE_TEXT),
            emotion,
            channels,
        }
    }
}

/// Percent-decode header text where `+` also means a space. Malformed escapes
/// leave the raw value.
pub fn decode_header_text(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(Cow::Borrowed(s)) => s.to_string(),
        Ok(Cow::Owned(s)) => s,
        Err(_) => spaced,
    }
}

pub struct BackendReply {
    pub stream: Box<dyn ByteStream>,
    /// Declared body length. `None` (or `Some(0)`) means unknown.
    pub declared_len: Option<u64>,
    pub metadata: ReplyMetadata,
}

impl std::fmt::Debug for BackendReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendReply")
            .field("declared_len", &self.declared_len)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Sends a recording, returns the streamed reply.
pub trait VoiceBackend {
    /// `pcm` is little-endian PCM16 mono at the pipeline rate.
    ///
    /// # Errors
    /// `Backend` / `BackendStatus` when the request fails or is rejected,
    /// `NetworkTimeout` when no response arrives in time.
    fn submit(&mut self, pcm: &[u8]) -> Result<BackendReply>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emotion_names_are_case_insensitive() {
        assert_eq!(Emotion::from_name("Happy"), Emotion::Happy);
        assert_eq!(Emotion::from_name(" SLEEPY "), Emotion::Sleepy);
        assert_eq!(Emotion::from_name("grumpy"), Emotion::Normal);
    }

    #[test]
    fn header_text_is_url_decoded() {
        assert_eq!(decode_header_text("turn+on%20the+lights"), "turn on the lights");
        assert_eq!(decode_header_text("caf%C3%A9"), "café");
    }

    #[test]
    fn metadata_from_headers() {
        let headers = [
            ("X-Transcription", "what+time+is+it"),
            ("X-AI-Response", "It%27s+noon."),
            ("X-Expression", "3"),
            ("X-Audio-Channels", "1"),
        ];
        let get = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| *v)
        };
        let meta = ReplyMetadata::from_headers(get);
        assert_eq!(meta.transcription.as_deref(), Some("what time is it"));
        assert_eq!(meta.response_text.as_deref(), Some("It's noon."));
        assert_eq!(meta.emotion, Emotion::Excited);
        assert_eq!(meta.channels, 1);
    }

    #[test]
    fn emotion_header_beats_expression_code() {
        let get = |name: &str| match name {
            HEADER_EMOTION => Some("sad"),
            HEADER_EXPRESSION => Some("1"),
            HEADER_CHANNELS => Some("6"),
            _ => None,
        };
        let meta = ReplyMetadata::from_headers(get);
        assert_eq!(meta.emotion, Emotion::Sad);
        assert_eq!(meta.channels, 2);
        assert!(meta.transcription.is_none());
    }

    #[test]
    fn expression_codes_map_to_emotions() {
        assert_eq!(Emotion::from_expression_code(0), Emotion::Normal);
        assert_eq!(Emotion::from_expression_code(2), Emotion::Curious);
        assert_eq!(Emotion::from_expression_code(5), Emotion::Happy);
        assert_eq!(Emotion::from_expression_code(6), Emotion::Shock);
        assert_eq!(Emotion::from_expression_code(42), Emotion::Normal);
    }
}
