//! Column scaling, imputation and normalisation stages.
//!
//! Stages without fixed statistics fit them on each frame they receive and
//! keep the result in locals, so a stage is never mutated by a call.

use super::stats::{nan_mean, nan_median, nan_min_max, nan_std, safe_scale};
use super::{Stage, StageParams, Transformer};
use crate::core::{Column, Frame};
use crate::errors::StageError;
use crate::registry::StageRegistry;
use serde::Deserialize;

pub(crate) fn register(registry: &mut StageRegistry) {
    registry.register("preprocessing.StandardScaler", |params| {
        StandardScaler::from_params(&params).map(Stage::transformer)
    });
    registry.register("preprocessing.MinMaxScaler", |params| {
        MinMaxScaler::from_params(&params).map(Stage::transformer)
    });
    registry.register("preprocessing.SimpleImputer", |params| {
        SimpleImputer::from_params(&params).map(Stage::transformer)
    });
    registry.register("preprocessing.Normalizer", |params| {
        Normalizer::from_params(&params).map(Stage::transformer)
    });
    registry.register("preprocessing.Binarizer", |params| {
        Binarizer::from_params(&params).map(Stage::transformer)
    });
}

fn default_true() -> bool {
    true
}

fn check_width(expected: usize, frame: &Frame) -> Result<(), StageError> {
    if expected == frame.num_columns() {
        Ok(())
    } else {
        Err(StageError::ColumnCountMismatch {
            expected,
            actual: frame.num_columns(),
        })
    }
}

fn map_columns<F>(frame: Frame, mut f: F) -> Result<Frame, StageError>
where
    F: FnMut(usize, Column) -> Column,
{
    let num_rows = frame.num_rows();
    let columns = frame
        .into_columns()
        .into_iter()
        .enumerate()
        .map(|(i, c)| f(i, c))
        .collect();
    Frame::with_rows(num_rows, columns)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StandardScalerParams {
    #[serde(default = "default_true")]
    with_mean: bool,
    #[serde(default = "default_true")]
    with_std: bool,
    #[serde(default)]
    mean: Option<Vec<f64>>,
    #[serde(default)]
    scale: Option<Vec<f64>>,
}

/// Standardises each column to zero mean and unit variance.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    with_mean: bool,
    with_std: bool,
    mean: Option<Vec<f64>>,
    scale: Option<Vec<f64>>,
}

impl Default for StandardScaler {
    fn default() -> Self {
        Self {
            with_mean: true,
            with_std: true,
            mean: None,
            scale: None,
        }
    }
}

impl StandardScaler {
    /// Creates a scaler that fits statistics on every frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scaler with fixed, pre-computed statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if `mean` and `scale` have different lengths.
    pub fn fitted(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, StageError> {
        if mean.len() != scale.len() {
            return Err(StageError::invalid_params(format!(
                "mean has {} entries but scale has {}",
                mean.len(),
                scale.len()
            )));
        }
        Ok(Self {
            mean: Some(mean),
            scale: Some(scale),
            ..Self::default()
        })
    }

    fn from_params(params: &StageParams) -> Result<Self, StageError> {
        params.deny_stages_except(&[])?;
        let p: StandardScalerParams = params.parse()?;
        if let (Some(mean), Some(scale)) = (&p.mean, &p.scale) {
            if mean.len() != scale.len() {
                return Err(StageError::invalid_params(
                    "mean and scale must have the same length",
                ));
            }
        }
        Ok(Self {
            with_mean: p.with_mean,
            with_std: p.with_std,
            mean: p.mean,
            scale: p.scale,
        })
    }
}

impl Transformer for StandardScaler {
    fn name(&self) -> &str {
        "StandardScaler"
    }

    fn transform(&self, frame: Frame) -> Result<Frame, StageError> {
        if let Some(mean) = &self.mean {
            check_width(mean.len(), &frame)?;
        }
        if let Some(scale) = &self.scale {
            check_width(scale.len(), &frame)?;
        }
        map_columns(frame, |i, mut column| {
            let fitted_mean = nan_mean(&column.values).unwrap_or(0.0);
            let mean = match (&self.mean, self.with_mean) {
                (_, false) => 0.0,
                (Some(fixed), true) => fixed[i],
                (None, true) => fitted_mean,
            };
            let scale = match (&self.scale, self.with_std) {
                (_, false) => 1.0,
                (Some(fixed), true) => safe_scale(fixed[i]),
                (None, true) => safe_scale(nan_std(&column.values, fitted_mean).unwrap_or(1.0)),
            };
            for v in &mut column.values {
                *v = (*v - mean) / scale;
            }
            column
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MinMaxScalerParams {
    #[serde(default = "default_feature_range")]
    feature_range: (f64, f64),
    #[serde(default)]
    data_min: Option<Vec<f64>>,
    #[serde(default)]
    data_max: Option<Vec<f64>>,
}

fn default_feature_range() -> (f64, f64) {
    (0.0, 1.0)
}

/// Rescales each column into `feature_range`.
#[derive(Debug, Clone)]
pub struct MinMaxScaler {
    feature_range: (f64, f64),
    data_min: Option<Vec<f64>>,
    data_max: Option<Vec<f64>>,
}

impl MinMaxScaler {
    /// Creates a scaler that fits column ranges on every frame.
    ///
    /// # Errors
    ///
    /// Returns an error unless `min < max`.
    pub fn new(min: f64, max: f64) -> Result<Self, StageError> {
        if !(min < max) {
            return Err(StageError::invalid_params(format!(
                "feature_range minimum {min} must be smaller than maximum {max}"
            )));
        }
        Ok(Self {
            feature_range: (min, max),
            data_min: None,
            data_max: None,
        })
    }

    fn from_params(params: &StageParams) -> Result<Self, StageError> {
        params.deny_stages_except(&[])?;
        let p: MinMaxScalerParams = params.parse()?;
        let mut scaler = Self::new(p.feature_range.0, p.feature_range.1)?;
        match (p.data_min, p.data_max) {
            (Some(lo), Some(hi)) if lo.len() == hi.len() => {
                scaler.data_min = Some(lo);
                scaler.data_max = Some(hi);
            }
            (None, None) => {}
            _ => {
                return Err(StageError::invalid_params(
                    "data_min and data_max must be given together with the same length",
                ))
            }
        }
        Ok(scaler)
    }
}

impl Transformer for MinMaxScaler {
    fn name(&self) -> &str {
        "MinMaxScaler"
    }

    fn transform(&self, frame: Frame) -> Result<Frame, StageError> {
        if let Some(lo) = &self.data_min {
            check_width(lo.len(), &frame)?;
        }
        let (out_lo, out_hi) = self.feature_range;
        map_columns(frame, |i, mut column| {
            let (lo, hi) = match (&self.data_min, &self.data_max) {
                (Some(lo), Some(hi)) => (lo[i], hi[i]),
                _ => nan_min_max(&column.values).unwrap_or((0.0, 1.0)),
            };
            let range = safe_scale(hi - lo);
            for v in &mut column.values {
                *v = (*v - lo) / range * (out_hi - out_lo) + out_lo;
            }
            column
        })
    }
}

/// How missing values are replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    /// Column mean.
    #[default]
    Mean,
    /// Column median.
    Median,
    /// A constant `fill_value`.
    Constant,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SimpleImputerParams {
    #[serde(default)]
    strategy: ImputeStrategy,
    #[serde(default)]
    fill_value: f64,
}

/// Replaces `NaN` values column by column.
///
/// A column with no observed values is filled with `fill_value`.
#[derive(Debug, Clone)]
pub struct SimpleImputer {
    strategy: ImputeStrategy,
    fill_value: f64,
}

impl SimpleImputer {
    /// Creates a new imputer.
    #[must_use]
    pub fn new(strategy: ImputeStrategy, fill_value: f64) -> Self {
        Self {
            strategy,
            fill_value,
        }
    }

    fn from_params(params: &StageParams) -> Result<Self, StageError> {
        params.deny_stages_except(&[])?;
        let p: SimpleImputerParams = params.parse()?;
        Ok(Self::new(p.strategy, p.fill_value))
    }
}

impl Transformer for SimpleImputer {
    fn name(&self) -> &str {
        "SimpleImputer"
    }

    fn transform(&self, frame: Frame) -> Result<Frame, StageError> {
        map_columns(frame, |_, mut column| {
            let fill = match self.strategy {
                ImputeStrategy::Mean => nan_mean(&column.values),
                ImputeStrategy::Median => nan_median(&column.values),
                ImputeStrategy::Constant => None,
            }
            .unwrap_or(self.fill_value);
            for v in column.values.iter_mut().filter(|v| v.is_nan()) {
                *v = fill;
            }
            column
        })
    }
}

/// Row norm used by [`Normalizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Norm {
    /// Sum of absolute values.
    L1,
    /// Euclidean length.
    #[default]
    L2,
    /// Largest absolute value.
    Max,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NormalizerParams {
    #[serde(default)]
    norm: Norm,
}

/// Scales each row to unit norm. Rows with zero norm are left unchanged.
#[derive(Debug, Clone)]
pub struct Normalizer {
    norm: Norm,
}

impl Normalizer {
    /// Creates a new normalizer.
    #[must_use]
    pub fn new(norm: Norm) -> Self {
        Self { norm }
    }

    fn from_params(params: &StageParams) -> Result<Self, StageError> {
        params.deny_stages_except(&[])?;
        let p: NormalizerParams = params.parse()?;
        Ok(Self::new(p.norm))
    }

    fn row_norm(&self, frame: &Frame, row: usize) -> f64 {
        let values = frame.columns().iter().map(|c| c.values[row].abs());
        match self.norm {
            Norm::L1 => values.sum(),
            Norm::L2 => values.map(|v| v * v).sum::<f64>().sqrt(),
            Norm::Max => values.fold(0.0, f64::max),
        }
    }
}

impl Transformer for Normalizer {
    fn name(&self) -> &str {
        "Normalizer"
    }

    fn transform(&self, frame: Frame) -> Result<Frame, StageError> {
        let norms: Vec<f64> = (0..frame.num_rows())
            .map(|row| safe_scale(self.row_norm(&frame, row)))
            .collect();
        map_columns(frame, |_, mut column| {
            for (v, norm) in column.values.iter_mut().zip(&norms) {
                *v /= norm;
            }
            column
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BinarizerParams {
    #[serde(default)]
    threshold: f64,
}

/// Maps values above `threshold` to 1 and the rest to 0. `NaN` is kept.
#[derive(Debug, Clone)]
pub struct Binarizer {
    threshold: f64,
}

impl Binarizer {
    /// Creates a new binarizer.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    fn from_params(params: &StageParams) -> Result<Self, StageError> {
        params.deny_stages_except(&[])?;
        let p: BinarizerParams = params.parse()?;
        Ok(Self::new(p.threshold))
    }
}

impl Transformer for Binarizer {
    fn name(&self) -> &str {
        "Binarizer"
    }

    fn transform(&self, frame: Frame) -> Result<Frame, StageError> {
        map_columns(frame, |_, mut column| {
            for v in column.values.iter_mut().filter(|v| !v.is_nan()) {
                *v = if *v > self.threshold { 1.0 } else { 0.0 };
            }
            column
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame() -> Frame {
        Frame::new(vec![
            Column::new("a", vec![1.0, 2.0, 3.0]),
            Column::new("b", vec![5.0, 5.0, 5.0]),
        ])
        .unwrap()
    }

    fn approx(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn test_standard_scaler_fits_per_frame() {
        let out = StandardScaler::new().transform(frame()).unwrap();
        let s = (2.0_f64 / 3.0).sqrt();
        approx(&out.column("a").unwrap().values, &[-1.0 / s, 0.0, 1.0 / s]);
        // Constant column keeps unit scale.
        approx(&out.column("b").unwrap().values, &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_standard_scaler_fixed_stats() {
        let scaler = StandardScaler::fitted(vec![1.0, 5.0], vec![2.0, 1.0]).unwrap();
        let out = scaler.transform(frame()).unwrap();
        approx(&out.column("a").unwrap().values, &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_standard_scaler_fixed_stats_width_mismatch() {
        let scaler = StandardScaler::fitted(vec![1.0], vec![2.0]).unwrap();
        let err = scaler.transform(frame()).unwrap_err();
        assert_eq!(err, StageError::ColumnCountMismatch { expected: 1, actual: 2 });
    }

    #[test]
    fn test_standard_scaler_params() {
        let params = StageParams::from_value(json!({"with_mean": false, "with_std": false}));
        let scaler = StandardScaler::from_params(&params).unwrap();
        assert_eq!(scaler.transform(frame()).unwrap(), frame());

        let bad = StageParams::from_value(json!({"mean": [1.0], "scale": [1.0, 2.0]}));
        assert!(StandardScaler::from_params(&bad).is_err());
    }

    #[test]
    fn test_standard_scaler_is_stateless_across_calls() {
        let scaler = StandardScaler::new();
        let first = scaler.transform(frame()).unwrap();
        let other = Frame::new(vec![
            Column::new("a", vec![100.0, 200.0, 300.0]),
            Column::new("b", vec![1.0, 2.0, 3.0]),
        ])
        .unwrap();
        let _ = scaler.transform(other).unwrap();
        assert_eq!(scaler.transform(frame()).unwrap(), first);
    }

    #[test]
    fn test_min_max_scaler() {
        let out = MinMaxScaler::new(0.0, 1.0).unwrap().transform(frame()).unwrap();
        approx(&out.column("a").unwrap().values, &[0.0, 0.5, 1.0]);
        approx(&out.column("b").unwrap().values, &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_min_max_scaler_params() {
        let params = StageParams::from_value(json!({"feature_range": [-1.0, 1.0]}));
        let out = MinMaxScaler::from_params(&params).unwrap().transform(frame()).unwrap();
        approx(&out.column("a").unwrap().values, &[-1.0, 0.0, 1.0]);

        let inverted = StageParams::from_value(json!({"feature_range": [1.0, 0.0]}));
        assert!(MinMaxScaler::from_params(&inverted).is_err());

        let half = StageParams::from_value(json!({"data_min": [0.0, 0.0]}));
        assert!(MinMaxScaler::from_params(&half).is_err());
    }

    #[test]
    fn test_simple_imputer_strategies() {
        let with_gap = Frame::new(vec![Column::new("a", vec![1.0, f64::NAN, 5.0, 2.0])]).unwrap();

        let mean = SimpleImputer::new(ImputeStrategy::Mean, 0.0)
            .transform(with_gap.clone())
            .unwrap();
        approx(&mean.column("a").unwrap().values, &[1.0, 8.0 / 3.0, 5.0, 2.0]);

        let median = SimpleImputer::new(ImputeStrategy::Median, 0.0)
            .transform(with_gap.clone())
            .unwrap();
        approx(&median.column("a").unwrap().values, &[1.0, 2.0, 5.0, 2.0]);

        let constant = SimpleImputer::new(ImputeStrategy::Constant, -1.0)
            .transform(with_gap)
            .unwrap();
        approx(&constant.column("a").unwrap().values, &[1.0, -1.0, 5.0, 2.0]);
    }

    #[test]
    fn test_simple_imputer_all_missing_uses_fill_value() {
        let empty = Frame::new(vec![Column::new("a", vec![f64::NAN, f64::NAN])]).unwrap();
        let out = SimpleImputer::new(ImputeStrategy::Mean, 7.0).transform(empty).unwrap();
        approx(&out.column("a").unwrap().values, &[7.0, 7.0]);
    }

    #[test]
    fn test_simple_imputer_rejects_unknown_strategy() {
        let params = StageParams::from_value(json!({"strategy": "most_frequent"}));
        assert!(SimpleImputer::from_params(&params).is_err());
    }

    #[test]
    fn test_normalizer() {
        let frame = Frame::new(vec![
            Column::new("x", vec![3.0, 0.0]),
            Column::new("y", vec![4.0, 0.0]),
        ])
        .unwrap();

        let l2 = Normalizer::new(Norm::L2).transform(frame.clone()).unwrap();
        approx(&l2.column("x").unwrap().values, &[0.6, 0.0]);
        approx(&l2.column("y").unwrap().values, &[0.8, 0.0]);

        let l1 = Normalizer::new(Norm::L1).transform(frame.clone()).unwrap();
        approx(&l1.column("x").unwrap().values, &[3.0 / 7.0, 0.0]);

        let max = Normalizer::new(Norm::Max).transform(frame).unwrap();
        approx(&max.column("y").unwrap().values, &[1.0, 0.0]);
    }

    #[test]
    fn test_binarizer() {
        let frame = Frame::new(vec![Column::new("x", vec![-1.0, 0.5, 2.0])]).unwrap();
        let out = Binarizer::new(0.5).transform(frame).unwrap();
        approx(&out.column("x").unwrap().values, &[0.0, 0.0, 1.0]);
    }
}
