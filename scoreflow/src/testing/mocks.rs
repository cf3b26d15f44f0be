//! Mock stages for testing.
//!
//! The mocks key their behaviour off an `id` column holding each row's
//! dataset position, so a test can target exact batches.

use crate::core::Frame;
use crate::errors::StageError;
use crate::stages::{Predictor, Transformer};
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const ID_COLUMN: &str = "id";

fn touches(frame: &Frame, rows: &Range<usize>) -> bool {
    frame.column(ID_COLUMN).is_some_and(|c| {
        c.values
            .iter()
            .any(|&id| id >= 0.0 && rows.contains(&(id as usize)))
    })
}

/// Predicts the value of one column, recording calls and peak concurrency.
#[derive(Debug)]
pub struct ColumnPredictor {
    column: String,
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ColumnPredictor {
    /// Creates a predictor that echoes `column`.
    #[must_use]
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Makes every call sleep for `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `predict` calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `predict` calls observed.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl Predictor for ColumnPredictor {
    fn name(&self) -> &str {
        "ColumnPredictor"
    }

    fn predict(&self, frame: &Frame) -> Result<Vec<f64>, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let result = frame
            .column(&self.column)
            .map(|c| c.values.clone())
            .ok_or_else(|| StageError::MissingColumn(self.column.clone()));
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Passes frames through, failing any batch that contains an id in `rows`.
#[derive(Debug, Clone)]
pub struct FailOnRows {
    rows: Range<usize>,
    panic: bool,
}

impl FailOnRows {
    /// Fails with a [`StageError`].
    #[must_use]
    pub fn new(rows: Range<usize>) -> Self {
        Self { rows, panic: false }
    }

    /// Panics instead of returning an error.
    #[must_use]
    pub fn panicking(rows: Range<usize>) -> Self {
        Self { rows, panic: true }
    }
}

impl Transformer for FailOnRows {
    fn name(&self) -> &str {
        "FailOnRows"
    }

    fn transform(&self, frame: Frame) -> Result<Frame, StageError> {
        if !touches(&frame, &self.rows) {
            return Ok(frame);
        }
        assert!(!self.panic, "poisoned rows {:?}", self.rows);
        Err(StageError::failed(format!("poisoned rows {:?}", self.rows)))
    }
}

/// Passes frames through after sleeping.
#[derive(Debug, Clone)]
pub struct SlowStage {
    delay: Duration,
    rows: Option<Range<usize>>,
}

impl SlowStage {
    /// Sleeps for `delay` on every batch.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay, rows: None }
    }

    /// Creates a slow stage with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Only sleeps on batches containing an id in `rows`.
    #[must_use]
    pub fn for_rows(mut self, rows: Range<usize>) -> Self {
        self.rows = Some(rows);
        self
    }
}

impl Transformer for SlowStage {
    fn name(&self) -> &str {
        "SlowStage"
    }

    fn transform(&self, frame: Frame) -> Result<Frame, StageError> {
        if self.rows.as_ref().map_or(true, |rows| touches(&frame, rows)) {
            std::thread::sleep(self.delay);
        }
        Ok(frame)
    }
}
