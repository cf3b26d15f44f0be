//! The executable, immutable result of pipeline assembly.

use crate::core::Frame;
use crate::errors::{PipelineRunError, StageError};
use crate::stages::{Predictor, Transformer};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Runs one stage call, turning a panic into [`StageError::Panicked`].
fn guarded<T>(call: impl FnOnce() -> Result<T, StageError>) -> Result<T, StageError> {
    catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Err(StageError::Panicked(message))
    })
}

/// A chain of transformers ending in a predictor.
///
/// Shared read-only across scoring workers. Every stage takes `&self`, so
/// concurrent runs on different frames never interfere.
#[derive(Debug, Clone)]
pub struct AssembledPipeline {
    transformers: Vec<(String, Arc<dyn Transformer>)>,
    predictor: (String, Arc<dyn Predictor>),
}

impl AssembledPipeline {
    /// Creates a pipeline from named transformers and a named predictor.
    #[must_use]
    pub fn new(
        transformers: Vec<(String, Arc<dyn Transformer>)>,
        predictor: (String, Arc<dyn Predictor>),
    ) -> Self {
        Self {
            transformers,
            predictor,
        }
    }

    /// Creates a pipeline that is only a predictor.
    #[must_use]
    pub fn from_predictor(name: impl Into<String>, predictor: Arc<dyn Predictor>) -> Self {
        Self::new(Vec::new(), (name.into(), predictor))
    }

    /// Number of stages, including the predictor.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transformers.len() + 1
    }

    /// Always false: a pipeline has at least its predictor.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.transformers
            .iter()
            .map(|(name, _)| name.as_str())
            .chain(std::iter::once(self.predictor.0.as_str()))
            .collect()
    }

    /// Runs only the transformers.
    ///
    /// # Errors
    ///
    /// Returns the first failing stage with its position.
    pub fn transform(&self, frame: Frame) -> Result<Frame, PipelineRunError> {
        let num_rows = frame.num_rows();
        self.transformers
            .iter()
            .enumerate()
            .try_fold(frame, |frame, (position, (name, stage))| {
                let fail = |source| PipelineRunError {
                    position,
                    stage: name.clone(),
                    source,
                };
                let out = guarded(|| stage.transform(frame)).map_err(fail)?;
                if out.num_rows() == num_rows {
                    Ok(out)
                } else {
                    Err(fail(StageError::LengthMismatch {
                        expected: num_rows,
                        actual: out.num_rows(),
                    }))
                }
            })
    }

    /// Runs the whole pipeline: one prediction per input row, in row order.
    ///
    /// # Errors
    ///
    /// Returns the first failing stage with its position. A stage that changes
    /// the row count or panics is a failure.
    pub fn run(&self, frame: Frame) -> Result<Vec<f64>, PipelineRunError> {
        let num_rows = frame.num_rows();
        let features = self.transform(frame)?;
        let (name, predictor) = &self.predictor;
        let fail = |source| PipelineRunError {
            position: self.transformers.len(),
            stage: name.clone(),
            source,
        };
        let predictions = guarded(|| predictor.predict(&features)).map_err(fail)?;
        if predictions.len() != num_rows {
            return Err(fail(StageError::LengthMismatch {
                expected: num_rows,
                actual: predictions.len(),
            }));
        }
        Ok(predictions)
    }
}
