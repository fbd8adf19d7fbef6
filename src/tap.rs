//! Named timing taps.
//!
//! Cursors wrap `open` and `next` in a [`TapGuard`]; when taps are enabled the
//! guard adds one call and its elapsed time to the named [`TapStats`] on drop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Accumulated calls and time for one tap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TapStats {
    pub count: u64,
    pub total: Duration,
}

/// Collects [`TapStats`] by name. Shared between all cursors of one execution.
#[derive(Debug, Default)]
pub struct TapRecorder {
    stats: Mutex<HashMap<&'static str, TapStats>>,
}

impl TapRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &'static str, elapsed: Duration) {
        let mut stats = self.stats.lock();
        let entry = stats.entry(name).or_default();
        entry.count += 1;
        entry.total += elapsed;
    }

    pub fn stats(&self, name: &str) -> TapStats {
        self.stats.lock().get(name).copied().unwrap_or_default()
    }

    /// Snapshot of every tap, sorted by name.
    pub fn report(&self) -> Vec<(&'static str, TapStats)> {
        let mut report: Vec<_> = self
            .stats
            .lock()
            .iter()
            .map(|(name, stats)| (*name, *stats))
            .collect();
        report.sort_by_key(|(name, _)| *name);
        report
    }

    pub fn reset(&self) {
        self.stats.lock().clear();
    }
}

/// Records one tap event when dropped. Inert when taps are disabled.
#[must_use = "the tap is recorded when the guard is dropped"]
pub struct TapGuard {
    active: Option<(Arc<TapRecorder>, &'static str, Instant)>,
}

impl TapGuard {
    pub(crate) fn start(recorder: &Arc<TapRecorder>, name: &'static str) -> Self {
        Self {
            active: Some((Arc::clone(recorder), name, Instant::now())),
        }
    }

    pub(crate) fn disabled() -> Self {
        Self { active: None }
    }
}

impl Drop for TapGuard {
    fn drop(&mut self) {
        if let Some((recorder, name, start)) = self.active.take() {
            recorder.record(name, start.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_records_on_drop() {
        let recorder = Arc::new(TapRecorder::new());
        {
            let _tap = TapGuard::start(&recorder, "scan.next");
            assert_eq!(recorder.stats("scan.next").count, 0);
        }
        let _ = TapGuard::start(&recorder, "scan.next");
        assert_eq!(recorder.stats("scan.next").count, 2);
    }

    #[test]
    fn test_disabled_guard_records_nothing() {
        let recorder = Arc::new(TapRecorder::new());
        drop(TapGuard::disabled());
        assert!(recorder.report().is_empty());
    }

    #[test]
    fn test_report_sorted() {
        let recorder = TapRecorder::new();
        recorder.record("b", Duration::from_millis(1));
        recorder.record("a", Duration::from_millis(2));
        let names: Vec<_> = recorder.report().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
        recorder.reset();
        assert_eq!(recorder.stats("a"), TapStats::default());
    }
}
