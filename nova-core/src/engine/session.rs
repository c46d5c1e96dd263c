//! One conversation: earcon, record, submit, stream the reply.

use tracing::{info, info_span, warn};

use super::mic_test::run_mic_test;
use super::{EngineDiagnostics, NovaEngine};
use crate::audio::tones::{self, Earcon};
use crate::context::Activity;
use crate::error::Result;
use crate::ipc::events::{EngineEvent, EngineStatus};
use crate::playback::PlaybackPhase;
use crate::wake::WakeEvent;

impl NovaEngine {
    /// Run a full session and put the engine back into wake scanning,
    /// whatever happened. `wake` is `None` for a manual listen.
    pub(super) fn converse(&mut self, wake: Option<WakeEvent>) {
        self.seq += 1;
        let seq = self.seq;
        let by_voice = wake.is_some();
        let _span = info_span!("session", seq, by_voice).entered();

        let event = match wake {
            Some(w) => EngineEvent::Wake {
                seq,
                label: w.label,
                score: w.score,
                best_other: w.best_other,
                by_voice,
            },
            None => EngineEvent::Wake {
                seq,
                label: self.config.detector.wake_label.clone(),
                score: 0.0,
                best_other: 0.0,
                by_voice,
            },
        };
        self.emit(event);

        let outcome = self.run_session(seq);

        self.ctx.clear_busy();
        self.slices.reset();
        self.detector.disarm();
        if let Err(e) = self.capture.flush() {
            warn!("capture flush after session failed: {e}");
        }

        match outcome {
            Ok(()) => EngineDiagnostics::bump(&self.diagnostics.sessions_completed),
            Err(e) => {
                EngineDiagnostics::bump(&self.diagnostics.sessions_failed);
                warn!("session failed: {e}");
                self.earcon(Earcon::Error);
                self.emit(EngineEvent::SessionFailed {
                    seq,
                    detail: e.to_string(),
                });
            }
        }
        self.set_status(self.idle_status(), None);
    }

    fn run_session(&mut self, seq: u64) -> Result<()> {
        self.ctx.set_busy(Activity::Recording);
        self.set_status(EngineStatus::Recording, None);
        if self.config.earcons {
            // The cue has to finish before the microphone opens.
            tones::play(&mut *self.output, Earcon::Listening)?;
            self.output.drain()?;
        }
        self.capture.flush()?;
        self.clock.sleep(self.config.capture_settle);

        let recording = self
            .recorder
            .record(&mut *self.capture, &mut self.chunk, &*self.clock)?;
        EngineDiagnostics::add(
            &self.diagnostics.bytes_recorded,
            recording.len_bytes() as u64,
        );
        self.emit(EngineEvent::Recorded {
            seq,
            stop_reason: recording.stop_reason,
            bytes: recording.len_bytes(),
            duration_ms: u64::try_from(recording.elapsed.as_millis()).unwrap_or(u64::MAX),
        });

        if recording.is_empty() {
            info!("nothing above the silence threshold, not submitting");
            return Ok(());
        }

        self.ctx.set_busy(Activity::AwaitingReply);
        self.set_status(
            EngineStatus::Thinking,
            Some(format!("sending {} bytes", recording.len_bytes())),
        );
        self.earcon(Earcon::Processing);
        let reply = self.backend.submit(recording.bytes())?;
        drop(recording);

        self.earcon(Earcon::Success);
        if let Some(text) = reply.metadata.transcription.as_deref() {
            info!(transcription = text, "heard");
        }
        if let Some(text) = reply.metadata.response_text.as_deref() {
            info!(response = text, emotion = ?reply.metadata.emotion, "reply");
        }
        let declared_len = reply.declared_len;
        let channels = reply.metadata.channels;
        let mut stream = reply.stream;
        self.emit(EngineEvent::Reply {
            seq,
            metadata: reply.metadata,
        });

        self.ctx.set_busy(Activity::Playing);
        self.set_status(EngineStatus::Speaking, None);
        let report = self.playback.play(
            &mut *stream,
            declared_len,
            channels,
            &mut *self.output,
            &*self.clock,
        )?;
        drop(stream);

        EngineDiagnostics::add(&self.diagnostics.bytes_played, report.consumed);
        if report.phase == PlaybackPhase::Incomplete {
            EngineDiagnostics::bump(&self.diagnostics.incomplete_replies);
        }
        self.emit(EngineEvent::Played {
            seq,
            phase: report.phase,
            consumed: report.consumed,
            declared_len: report.declared_len,
        });
        report.into_result().map(|_| ())
    }

    pub(super) fn mic_test(&mut self) {
        let _span = info_span!("mic_test").entered();
        self.ctx.set_busy(Activity::MicTest);
        self.set_status(EngineStatus::Recording, Some("mic test".into()));

        let outcome = run_mic_test(
            &mut *self.capture,
            &mut *self.output,
            &mut self.chunk,
            self.config.mic_test_duration,
            &*self.clock,
        );

        self.ctx.clear_busy();
        self.slices.reset();
        self.detector.disarm();
        if let Err(e) = self.capture.flush() {
            warn!("capture flush after mic test failed: {e}");
        }

        match outcome {
            Ok(report) => {
                info!(peak = report.peak, average = report.average, level = ?report.level, "mic test finished");
                self.emit(EngineEvent::MicTest(report));
            }
            Err(e) => {
                warn!("mic test failed: {e}");
                self.earcon(Earcon::Error);
            }
        }
        self.set_status(self.idle_status(), None);
    }
}
