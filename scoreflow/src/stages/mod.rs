//! Stage traits and the built-in stage catalogue.
//!
//! Stages are the units an assembled pipeline is made of. Every stage but the
//! last is a [`Transformer`]; the last is a [`Predictor`]. Stages are shared
//! read-only across scoring workers, so both traits take `&self` and require
//! `Send + Sync`.

pub mod compose;
pub mod decomposition;
pub mod ensemble;
pub mod linear_model;
mod params;
pub mod preprocessing;
pub mod selection;
mod stats;

pub use params::StageParams;

use crate::core::{Frame, StageKind};
use crate::errors::StageError;
use crate::registry::StageRegistry;
use std::fmt::Debug;
use std::sync::Arc;

/// A stage that maps a frame to a frame with the same rows.
pub trait Transformer: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Transforms a frame.
    ///
    /// Implementations must return exactly as many rows as they receive.
    fn transform(&self, frame: Frame) -> Result<Frame, StageError>;
}

/// A stage that produces one prediction per row.
pub trait Predictor: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Predicts one value per row of `frame`, in row order.
    fn predict(&self, frame: &Frame) -> Result<Vec<f64>, StageError>;
}

/// A constructed stage, tagged by the capability it exposes.
#[derive(Debug, Clone)]
pub enum Stage {
    /// A transforming stage.
    Transform(Arc<dyn Transformer>),
    /// A predicting stage.
    Predict(Arc<dyn Predictor>),
}

impl Stage {
    /// Wraps a transformer.
    pub fn transformer(stage: impl Transformer + 'static) -> Self {
        Self::Transform(Arc::new(stage))
    }

    /// Wraps a predictor.
    pub fn predictor(stage: impl Predictor + 'static) -> Self {
        Self::Predict(Arc::new(stage))
    }

    /// Returns the stage kind.
    #[must_use]
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Transform(_) => StageKind::Transform,
            Self::Predict(_) => StageKind::Predict,
        }
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Transform(t) => t.name(),
            Self::Predict(p) => p.name(),
        }
    }

    /// Returns the transformer, if this is one.
    #[must_use]
    pub fn as_transformer(&self) -> Option<&Arc<dyn Transformer>> {
        match self {
            Self::Transform(t) => Some(t),
            Self::Predict(_) => None,
        }
    }

    /// Returns the predictor, if this is one.
    #[must_use]
    pub fn as_predictor(&self) -> Option<&Arc<dyn Predictor>> {
        match self {
            Self::Transform(_) => None,
            Self::Predict(p) => Some(p),
        }
    }
}

/// A closure-based transformer.
pub struct FnTransformer<F>
where
    F: Fn(Frame) -> Result<Frame, StageError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnTransformer<F>
where
    F: Fn(Frame) -> Result<Frame, StageError> + Send + Sync,
{
    /// Creates a new closure-based transformer.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnTransformer<F>
where
    F: Fn(Frame) -> Result<Frame, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTransformer")
            .field("name", &self.name)
            .finish()
    }
}

impl<F> Transformer for FnTransformer<F>
where
    F: Fn(Frame) -> Result<Frame, StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, frame: Frame) -> Result<Frame, StageError> {
        (self.func)(frame)
    }
}

/// A closure-based predictor.
pub struct FnPredictor<F>
where
    F: Fn(&Frame) -> Result<Vec<f64>, StageError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnPredictor<F>
where
    F: Fn(&Frame) -> Result<Vec<f64>, StageError> + Send + Sync,
{
    /// Creates a new closure-based predictor.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnPredictor<F>
where
    F: Fn(&Frame) -> Result<Vec<f64>, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPredictor")
            .field("name", &self.name)
            .finish()
    }
}

impl<F> Predictor for FnPredictor<F>
where
    F: Fn(&Frame) -> Result<Vec<f64>, StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, frame: &Frame) -> Result<Vec<f64>, StageError> {
        (self.func)(frame)
    }
}

/// Registers every built-in stage.
pub(crate) fn register_builtins(registry: &mut StageRegistry) {
    preprocessing::register(registry);
    selection::register(registry);
    compose::register(registry);
    decomposition::register(registry);
    linear_model::register(registry);
    ensemble::register(registry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Column;

    fn frame() -> Frame {
        Frame::new(vec![Column::new("x", vec![1.0, 2.0])]).unwrap()
    }

    #[test]
    fn test_fn_transformer() {
        let stage = FnTransformer::new("identity", Ok);
        assert_eq!(stage.name(), "identity");
        assert_eq!(stage.transform(frame()).unwrap(), frame());
    }

    #[test]
    fn test_fn_predictor() {
        let stage = FnPredictor::new("rows", |f: &Frame| Ok(vec![0.0; f.num_rows()]));
        assert_eq!(stage.predict(&frame()).unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_stage_kind_and_accessors() {
        let t = Stage::transformer(FnTransformer::new("t", Ok));
        let p = Stage::predictor(FnPredictor::new("p", |f: &Frame| Ok(vec![1.0; f.num_rows()])));

        assert_eq!(t.kind(), StageKind::Transform);
        assert_eq!(p.kind(), StageKind::Predict);
        assert_eq!(t.name(), "t");
        assert!(t.as_transformer().is_some());
        assert!(t.as_predictor().is_none());
        assert!(p.as_predictor().is_some());
    }
}
