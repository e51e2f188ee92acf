//! Upload Progress Reporting
//!
//! Translates raw transfer events into a monotonic 0-100 percentage used to
//! drive UI feedback. Transports without incremental transfer events emit a
//! synthetic two-point sequence instead (a non-zero "busy" value at start,
//! 100 on completion) so an atomic call never reads as a stall.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Percent emitted by [`UploadProgressReporter::begin`] before an atomic
/// transfer produces any events. Non-zero by contract: 0% reads as a stall.
pub const SYNTHETIC_START_PERCENT: u8 = 10;

type ProgressSink = dyn Fn(u8) + Send + Sync;

struct ReporterInner {
    /// Last emitted percent; updated with an atomic max so a slow event can
    /// never move the percentage backwards.
    last_percent: AtomicU8,
    sink: Box<ProgressSink>,
}

/// Monotonic upload progress reporter for a single submission.
///
/// Cheaply cloneable; clones share the same monotonic counter and sink, so a
/// transport can move a clone into a streaming body while the caller keeps
/// reading the latest percent.
#[derive(Clone)]
pub struct UploadProgressReporter {
    inner: Arc<ReporterInner>,
}

impl std::fmt::Debug for UploadProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadProgressReporter")
            .field("percent", &self.percent())
            .finish_non_exhaustive()
    }
}

impl UploadProgressReporter {
    /// Creates a reporter that forwards each newly reached percent to `sink`.
    pub fn new(sink: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                last_percent: AtomicU8::new(0),
                sink: Box::new(sink),
            }),
        }
    }

    /// Creates a reporter that discards events (callers that only read
    /// [`percent`](Self::percent)).
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    /// Records a raw transfer event `(bytes_sent, bytes_total)`.
    ///
    /// Emits `round(sent / total * 100)` clamped to 0-100. Events that would
    /// lower the percentage are ignored.
    pub fn transfer(&self, bytes_sent: u64, bytes_total: u64) {
        if bytes_total == 0 {
            return;
        }
        let ratio = bytes_sent as f64 / bytes_total as f64;
        let percent = (ratio * 100.0).round().clamp(0.0, 100.0) as u8;
        self.advance_to(percent);
    }

    /// Signals the start of an atomic (non-incremental) transfer.
    pub fn begin(&self) {
        self.advance_to(SYNTHETIC_START_PERCENT);
    }

    /// Signals completion of the transfer.
    pub fn finish(&self) {
        self.advance_to(100);
    }

    /// Last emitted percent.
    pub fn percent(&self) -> u8 {
        self.inner.last_percent.load(Ordering::Relaxed)
    }

    fn advance_to(&self, percent: u8) {
        let previous = self
            .inner
            .last_percent
            .fetch_max(percent, Ordering::Relaxed);
        if percent > previous {
            (self.inner.sink)(percent);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_reporter() -> (UploadProgressReporter, Arc<Mutex<Vec<u8>>>) {
        let emitted = Arc::new(Mutex::new(Vec::new()));
        let sink_emitted = emitted.clone();
        let reporter = UploadProgressReporter::new(move |p| {
            sink_emitted.lock().unwrap().push(p);
        });
        (reporter, emitted)
    }

    #[test]
    fn test_percent_computation() {
        let (reporter, emitted) = recording_reporter();

        reporter.transfer(0, 1000);
        reporter.transfer(500, 1000);
        reporter.transfer(1000, 1000);

        assert_eq!(*emitted.lock().unwrap(), vec![50, 100]);
        assert_eq!(reporter.percent(), 100);
    }

    #[test]
    fn test_monotonic_non_decreasing() {
        let (reporter, emitted) = recording_reporter();

        reporter.transfer(800, 1000);
        // A late, slower event must not move the percentage backwards.
        reporter.transfer(300, 1000);
        reporter.transfer(900, 1000);

        assert_eq!(*emitted.lock().unwrap(), vec![80, 90]);
    }

    #[test]
    fn test_clamped_to_hundred() {
        let (reporter, emitted) = recording_reporter();

        reporter.transfer(1500, 1000);
        assert_eq!(*emitted.lock().unwrap(), vec![100]);
    }

    #[test]
    fn test_zero_total_ignored() {
        let (reporter, emitted) = recording_reporter();

        reporter.transfer(10, 0);
        assert!(emitted.lock().unwrap().is_empty());
        assert_eq!(reporter.percent(), 0);
    }

    #[test]
    fn test_synthetic_two_point_sequence() {
        let (reporter, emitted) = recording_reporter();

        reporter.begin();
        reporter.finish();

        // Never a bare 0-to-100 jump: the start value signals "busy".
        assert_eq!(
            *emitted.lock().unwrap(),
            vec![SYNTHETIC_START_PERCENT, 100]
        );
    }

    #[test]
    fn test_clones_share_state() {
        let (reporter, emitted) = recording_reporter();

        let clone = reporter.clone();
        clone.transfer(250, 1000);
        reporter.transfer(750, 1000);

        assert_eq!(*emitted.lock().unwrap(), vec![25, 75]);
        assert_eq!(reporter.percent(), 75);
        assert_eq!(clone.percent(), 75);
    }
}
