//! Progress Reporting
//!
//! `TigerStyle`: One sink abstraction; monotonicity enforced in one place.

use std::sync::{Mutex, PoisonError};

use crate::constants::{PROGRESS_PERCENT_COMPLETE, PROGRESS_PERCENT_MIN};

/// Receives completion percentages in `[0, 100]`.
pub trait ProgressSink: Send + Sync {
    /// Report a percentage.
    fn report(&self, percent: f64);
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn report(&self, percent: f64) {
        self(percent);
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: f64) {}
}

/// Sink that keeps every reported value (for testing and diagnostics).
#[derive(Debug, Default)]
pub struct ProgressRecorder {
    values: Mutex<Vec<f64>>,
}

impl ProgressRecorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Values reported so far, in order.
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Last reported value.
    #[must_use]
    pub fn last(&self) -> Option<f64> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
    }
}

impl ProgressSink for ProgressRecorder {
    fn report(&self, percent: f64) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(percent);
    }
}

/// Wraps a sink so the caller only ever sees non-decreasing values.
///
/// Batches are reported within the current stage, a span ending at the
/// stage ceiling. A Backend A stage stops short of 100 until its commit
/// marker lands; a Backend B stage started after a fallback spans whatever
/// range is left, so its batches stay visible.
pub(crate) struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    last: Option<f64>,
    floor: f64,
    ceiling: f64,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last: None,
            floor: PROGRESS_PERCENT_MIN,
            ceiling: PROGRESS_PERCENT_COMPLETE,
        }
    }

    /// Start a stage spanning from the last reported value to `ceiling`.
    pub(crate) fn begin_stage(&mut self, ceiling: f64) {
        let floor = self.last.unwrap_or(PROGRESS_PERCENT_MIN);
        // Precondition
        assert!(
            ceiling <= PROGRESS_PERCENT_COMPLETE,
            "ceiling ({ceiling}) exceeds {PROGRESS_PERCENT_COMPLETE}"
        );

        self.floor = floor;
        self.ceiling = ceiling.max(floor);
    }

    /// Report `done` of `total` units of the current stage.
    pub(crate) fn batch_done(&mut self, done: usize, total: usize) {
        // Precondition
        assert!(done <= total, "done ({done}) exceeds total ({total})");

        #[allow(clippy::cast_precision_loss)]
        let percent = if total == 0 {
            self.ceiling
        } else {
            self.floor + (done as f64 / total as f64) * (self.ceiling - self.floor)
        };
        self.report(percent);
    }

    /// Report exactly 100.
    pub(crate) fn complete(&mut self) {
        self.report(PROGRESS_PERCENT_COMPLETE);
    }

    fn report(&mut self, percent: f64) {
        let percent = percent.clamp(PROGRESS_PERCENT_MIN, PROGRESS_PERCENT_COMPLETE);
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        self.sink.report(percent);
    }
}
