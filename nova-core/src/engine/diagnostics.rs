//! Lock-free counters updated by the control loop and readable from any thread.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct EngineDiagnostics {
    pub chunks_captured: AtomicU64,
    pub capture_errors: AtomicU64,
    pub slices_completed: AtomicU64,
    pub slice_overruns: AtomicU64,
    pub classifier_errors: AtomicU64,
    pub wakes: AtomicU64,
    pub manual_listens: AtomicU64,
    pub sessions_completed: AtomicU64,
    pub sessions_failed: AtomicU64,
    pub bytes_recorded: AtomicU64,
    pub bytes_played: AtomicU64,
    pub incomplete_replies: AtomicU64,
}

impl EngineDiagnostics {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        for counter in self.counters() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn counters(&self) -> [&AtomicU64; 12] {
        [
            &self.chunks_captured,
            &self.capture_errors,
            &self.slices_completed,
            &self.slice_overruns,
            &self.classifier_errors,
            &self.wakes,
            &self.manual_listens,
            &self.sessions_completed,
            &self.sessions_failed,
            &self.bytes_recorded,
            &self.bytes_played,
            &self.incomplete_replies,
        ]
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        DiagnosticsSnapshot {
            chunks_captured: load(&self.chunks_captured),
            capture_errors: load(&self.capture_errors),
            slices_completed: load(&self.slices_completed),
            slice_overruns: load(&self.slice_overruns),
            classifier_errors: load(&self.classifier_errors),
            wakes: load(&self.wakes),
            manual_listens: load(&self.manual_listens),
            sessions_completed: load(&self.sessions_completed),
            sessions_failed: load(&self.sessions_failed),
            bytes_recorded: load(&self.bytes_recorded),
            bytes_played: load(&self.bytes_played),
            incomplete_replies: load(&self.incomplete_replies),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub chunks_captured: u64,
    pub capture_errors: u64,
    pub slices_completed: u64,
    pub slice_overruns: u64,
    pub classifier_errors: u64,
    pub wakes: u64,
    pub manual_listens: u64,
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub bytes_recorded: u64,
    pub bytes_played: u64,
    pub incomplete_replies: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_and_reset() {
        let d = EngineDiagnostics::default();
        EngineDiagnostics::bump(&d.wakes);
        EngineDiagnostics::add(&d.bytes_played, 4096);
        let snap = d.snapshot();
        assert_eq!(snap.wakes, 1);
        assert_eq!(snap.bytes_played, 4096);

        d.reset();
        assert_eq!(d.snapshot(), DiagnosticsSnapshot::default());
    }
}
