//! End-to-end timing and boundary properties of the detector, recorder and
//! playback engine, driven with scripted devices on a manual clock.

mod common;

use std::time::Duration;

use common::{samples_to_duration, ScriptedCapture, ScriptedStream, SharedOutput, FixedClassifier};
use nova_core::recorder::trim_silence;
use nova_core::vad::PeakGate;
use nova_core::{
    AudioChunk, Clock, DetectorConfig, DeviceContext, ManualClock, PlaybackConfig, PlaybackPhase,
    RecorderConfig, SilenceAwareRecorder, SliceBuffer, StopReason, StreamingPlaybackEngine,
    WakeWordDetector,
};

fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

// ── wake word ──────────────────────────────────────────────────────────

fn detector(wake: f32, other: f32) -> WakeWordDetector {
    let config = DetectorConfig {
        threshold: 0.6,
        margin: 0.1,
        consecutive: 1,
        ..DetectorConfig::default()
    };
    WakeWordDetector::new(config, Box::new(FixedClassifier::new(wake, other))).unwrap()
}

#[test]
fn wake_fires_when_threshold_and_margin_are_met() {
    let clock = ManualClock::new();
    let ctx = DeviceContext::new();
    let mut det = detector(0.7, 0.5);
    let slice = vec![0i16; 4096];
    let per_window = det.config().slices_per_window;

    let mut fired = None;
    for _ in 0..per_window {
        fired = det.on_slice(&ctx, &slice, clock.now());
    }
    let event = fired.expect("0.7 vs 0.5 must fire");
    assert_eq!(event.label, "nova");
    approx::assert_relative_eq!(event.score, 0.7);
    approx::assert_relative_eq!(event.best_other, 0.5);
}

#[test]
fn wake_does_not_fire_when_margin_is_too_small() {
    let clock = ManualClock::new();
    let ctx = DeviceContext::new();
    let mut det = detector(0.65, 0.6);
    let slice = vec![0i16; 4096];

    for _ in 0..40 {
        assert!(det.on_slice(&ctx, &slice, clock.now()).is_none());
        clock.advance(Duration::from_millis(256));
    }
    assert_eq!(det.stats().wakes, 0);
    assert_eq!(det.stats().windows_evaluated, 10);
}

// ── slice buffer ───────────────────────────────────────────────────────

#[test]
fn completed_slice_never_belongs_to_the_epoch_being_written() {
    let mut slices = SliceBuffer::new(4096).unwrap();
    let chunk: Vec<i16> = (0..512).map(|i| i as i16).collect();

    for _ in 0..64 {
        slices.push(&chunk);
        let done = slices.read_completed();
        assert!(done.epoch < slices.write_epoch() || slices.write_epoch() == 0);
    }
    assert_eq!(slices.write_epoch(), 8);
}

// ── recorder ───────────────────────────────────────────────────────────

#[test]
fn recording_stops_after_silence_following_minimum_duration() {
    let clock = ManualClock::new();
    // Loud for exactly 1200 ms, silent afterwards.
    let loud_samples = 16 * 1200;
    let mut capture = ScriptedCapture::new(clock.clone(), &[(1_000, loud_samples)], 0);
    let mut chunk = AudioChunk::new(160, 16_000);
    let mut recorder = SilenceAwareRecorder::new(RecorderConfig {
        silence_threshold: 200,
        min_duration: Duration::from_millis(1_000),
        silence_duration: Duration::from_millis(1_500),
        ..RecorderConfig::default()
    })
    .unwrap();

    let recording = recorder.record(&mut capture, &mut chunk, &clock).unwrap();

    assert_eq!(recording.stop_reason, StopReason::SilenceTimeout);
    let stopped_ms = recording.elapsed.as_millis();
    assert!(
        (2_690..=2_740).contains(&stopped_ms),
        "stopped at {stopped_ms} ms"
    );
    // Trailing silence is trimmed back to the loud span.
    assert_eq!(recording.samples(), loud_samples);
    assert_eq!(recording.trimmed, 0..loud_samples);
    assert!(recording.captured_samples > loud_samples);
}

#[test]
fn recording_hits_the_hard_cap_when_never_silent() {
    let clock = ManualClock::new();
    let mut capture = ScriptedCapture::new(clock.clone(), &[], 2_000);
    let mut chunk = AudioChunk::new(512, 16_000);
    let mut recorder = SilenceAwareRecorder::new(RecorderConfig {
        min_duration: Duration::from_millis(100),
        max_duration: Duration::from_millis(640),
        ..RecorderConfig::default()
    })
    .unwrap();

    let recording = recorder.record(&mut capture, &mut chunk, &clock).unwrap();
    assert_eq!(recording.stop_reason, StopReason::MaxDurationReached);
    assert_eq!(recording.samples(), 10_240);
    assert_eq!(samples_to_duration(recording.samples()), Duration::from_millis(640));
}

// ── trimming ───────────────────────────────────────────────────────────

#[test]
fn trim_keeps_exactly_the_loud_span_and_is_idempotent() {
    let gate = PeakGate::new(200);
    let samples: Vec<i16> = (0..2_000)
        .map(|i| if (500..=1_500).contains(&i) { 1_000 } else { 50 })
        .collect();
    let mut pcm = pcm_bytes(&samples);

    let span = trim_silence(&mut pcm, &gate);
    assert_eq!(span, 500..1_501);
    assert_eq!(pcm.len(), 1_001 * 2);

    let again = trim_silence(&mut pcm, &gate);
    assert_eq!(again, 0..1_001);
    assert_eq!(pcm.len(), 1_001 * 2);
}

#[test]
fn trim_of_an_all_silent_buffer_is_empty() {
    let gate = PeakGate::new(200);
    let mut pcm = pcm_bytes(&[200, -200, 0, 199, -12].repeat(400));
    let span = trim_silence(&mut pcm, &gate);
    assert!(span.is_empty());
    assert!(pcm.is_empty());
}

// ── playback ───────────────────────────────────────────────────────────

fn play(
    stream: &mut ScriptedStream,
    declared: Option<u64>,
    clock: &ManualClock,
) -> (nova_core::PlaybackReport, SharedOutput) {
    let mut engine = StreamingPlaybackEngine::new(PlaybackConfig::default()).unwrap();
    let mut output = SharedOutput::default();
    let report = engine
        .play(stream, declared, 2, &mut output, clock)
        .unwrap();
    (report, output)
}

#[test]
fn declared_length_completes_exactly_and_leaves_extra_bytes_unread() {
    let clock = ManualClock::new();
    let mut stream = ScriptedStream::new(vec![1u8; 12_000], true);

    let (report, output) = play(&mut stream, Some(10_000), &clock);

    assert_eq!(report.phase, PlaybackPhase::Completed);
    assert_eq!(report.consumed, 10_000);
    assert_eq!(stream.remaining(), 2_000);
    assert_eq!(output.samples(), 5_000);
    assert_eq!(output.drain_count(), 1);
    // No waiting once the declared length is reached.
    assert_eq!(clock.elapsed(), Duration::ZERO);
}

#[test]
fn unknown_length_completes_after_short_patience_while_connected() {
    let clock = ManualClock::new();
    let mut stream = ScriptedStream::new(vec![0u8; 4_096], true);

    let (report, _) = play(&mut stream, None, &clock);

    assert_eq!(report.phase, PlaybackPhase::Completed);
    assert_eq!(report.consumed, 4_096);
    assert_eq!(report.idle, Duration::from_secs(8));
    assert_eq!(clock.elapsed(), Duration::from_secs(8));
}

#[test]
fn data_after_a_stall_restarts_the_patience_window() {
    let clock = ManualClock::new();
    let mut stream = ScriptedStream::new(vec![0u8; 4_096], true).with_burst_at(
        &clock,
        Duration::from_secs(6),
        vec![0u8; 4_096],
    );

    let (report, output) = play(&mut stream, None, &clock);

    assert_eq!(report.phase, PlaybackPhase::Completed);
    assert_eq!(report.consumed, 8_192);
    assert_eq!(output.samples(), 4_096);
    // Patience counted from the second burst, not from the first.
    assert_eq!(report.idle, Duration::from_secs(8));
    assert_eq!(report.stall_polls, 8_000);
    assert_eq!(clock.elapsed(), Duration::from_secs(14));
}

#[test]
fn late_bytes_after_disconnect_still_complete_the_declared_length() {
    let clock = ManualClock::new();
    let mut stream = ScriptedStream::new(vec![0u8; 3_000], false).with_burst_at(
        &clock,
        Duration::from_secs(20),
        vec![0u8; 7_000],
    );

    let (report, output) = play(&mut stream, Some(10_000), &clock);

    assert_eq!(report.phase, PlaybackPhase::Completed);
    assert_eq!(report.consumed, 10_000);
    assert_eq!(report.stall_polls, 0);
    assert_eq!(report.idle, Duration::ZERO);
    assert_eq!(output.samples(), 5_000);
    assert_eq!(output.drain_count(), 1);
    assert_eq!(clock.elapsed(), Duration::from_secs(20));
    assert!(report.into_result().is_ok());
}

#[test]
fn disconnect_before_declared_length_is_incomplete() {
    let clock = ManualClock::new();
    let mut stream = ScriptedStream::new(vec![0u8; 3_000], false);

    let (report, output) = play(&mut stream, Some(10_000), &clock);

    assert_eq!(report.phase, PlaybackPhase::Incomplete);
    assert_eq!(report.consumed, 3_000);
    // Disconnection does not cut the wait short while bytes are still owed.
    assert_eq!(report.idle, Duration::from_secs(30));
    assert_eq!(output.samples(), 1_500);
    assert!(report.into_result().is_err());
}
