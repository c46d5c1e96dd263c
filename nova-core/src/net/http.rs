//! Blocking HTTP voice backend.
//!
//! POSTs the recording as `application/octet-stream` and streams the PCM16
//! reply body through a [`ReaderStream`] so playback can start on the first
//! bytes.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{info, warn};

use super::stream::{ReaderStream, DEFAULT_QUEUE_BYTES};
use super::{BackendReply, ReplyMetadata, VoiceBackend};
use crate::error::{NovaError, Result};

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    endpoint: String,
    request_timeout: Duration,
    queue_bytes: usize,
}

impl HttpBackend {
    /// `request_timeout` bounds the whole exchange, body included, so it
    /// must cover the longest reply.
    ///
    /// # Errors
    /// `Backend` if the TLS stack or client cannot be initialised.
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NovaError::Backend(format!("http client build failed: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            request_timeout,
            queue_bytes: DEFAULT_QUEUE_BYTES,
        })
    }

    pub fn with_queue_bytes(mut self, bytes: usize) -> Self {
        self.queue_bytes = bytes;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl VoiceBackend for HttpBackend {
    fn submit(&mut self, pcm: &[u8]) -> Result<BackendReply> {
        info!(bytes = pcm.len(), endpoint = self.endpoint.as_str(), "submitting recording");

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(pcm.to_vec())
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    NovaError::NetworkTimeout(self.request_timeout)
                } else {
                    NovaError::Backend(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "backend rejected recording");
            return Err(NovaError::BackendStatus(status.as_u16()));
        }

        let headers = response.headers();
        let metadata = ReplyMetadata::from_headers(|name| {
            headers.get(name).and_then(|v| v.to_str().ok())
        });
        let declared_len = response.content_length().filter(|&n| n > 0);

        info!(
            declared_len,
            channels = metadata.channels,
            emotion = ?metadata.emotion,
            "reply headers received"
        );

        let stream = ReaderStream::spawn(response, self.queue_bytes)?;
        Ok(BackendReply {
            stream: Box::new(stream),
            declared_len,
            metadata,
        })
    }
}
