//! Linear predictors with fixed, pre-trained coefficients.

use super::{Predictor, Stage, StageParams};
use crate::core::Frame;
use crate::errors::StageError;
use crate::registry::StageRegistry;
use serde::Deserialize;

pub(crate) fn register(registry: &mut StageRegistry) {
    registry.register("linear_model.LinearRegression", |params| {
        LinearRegression::from_params(&params).map(Stage::predictor)
    });
    registry.register("linear_model.LogisticRegression", |params| {
        LogisticRegression::from_params(&params).map(Stage::predictor)
    });
    registry.register("linear_model.ThresholdClassifier", |params| {
        ThresholdClassifier::from_params(&params).map(Stage::predictor)
    });
}

fn decision(coef: &[f64], intercept: f64, frame: &Frame) -> Result<Vec<f64>, StageError> {
    if coef.len() != frame.num_columns() {
        return Err(StageError::ColumnCountMismatch {
            expected: coef.len(),
            actual: frame.num_columns(),
        });
    }
    let mut out = vec![intercept; frame.num_rows()];
    for (column, weight) in frame.columns().iter().zip(coef) {
        for (acc, v) in out.iter_mut().zip(&column.values) {
            *acc += weight * v;
        }
    }
    Ok(out)
}

fn require_coef(coef: &[f64]) -> Result<(), StageError> {
    if coef.is_empty() {
        Err(StageError::invalid_params("coef must not be empty"))
    } else {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LinearRegressionParams {
    coef: Vec<f64>,
    #[serde(default)]
    intercept: f64,
}

/// Predicts `intercept + coef · row`.
#[derive(Debug, Clone)]
pub struct LinearRegression {
    coef: Vec<f64>,
    intercept: f64,
}

impl LinearRegression {
    /// Creates a new linear model.
    ///
    /// # Errors
    ///
    /// Returns an error if `coef` is empty.
    pub fn new(coef: Vec<f64>, intercept: f64) -> Result<Self, StageError> {
        require_coef(&coef)?;
        Ok(Self { coef, intercept })
    }

    fn from_params(params: &StageParams) -> Result<Self, StageError> {
        params.deny_stages_except(&[])?;
        let p: LinearRegressionParams = params.parse()?;
        Self::new(p.coef, p.intercept)
    }
}

impl Predictor for LinearRegression {
    fn name(&self) -> &str {
        "LinearRegression"
    }

    fn predict(&self, frame: &Frame) -> Result<Vec<f64>, StageError> {
        decision(&self.coef, self.intercept, frame)
    }
}

/// What [`LogisticRegression`] emits per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogisticOutput {
    /// 1 if the probability reaches the threshold, else 0.
    #[default]
    Class,
    /// The positive-class probability.
    Probability,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogisticRegressionParams {
    coef: Vec<f64>,
    #[serde(default)]
    intercept: f64,
    #[serde(default = "default_threshold")]
    threshold: f64,
    #[serde(default)]
    output: LogisticOutput,
}

fn default_threshold() -> f64 {
    0.5
}

/// Binary logistic model.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    coef: Vec<f64>,
    intercept: f64,
    threshold: f64,
    output: LogisticOutput,
}

impl LogisticRegression {
    /// Creates a classifier with a 0.5 decision threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if `coef` is empty.
    pub fn new(coef: Vec<f64>, intercept: f64) -> Result<Self, StageError> {
        require_coef(&coef)?;
        Ok(Self {
            coef,
            intercept,
            threshold: default_threshold(),
            output: LogisticOutput::Class,
        })
    }

    /// Sets what the model emits.
    #[must_use]
    pub fn with_output(mut self, output: LogisticOutput) -> Self {
        self.output = output;
        self
    }

    fn from_params(params: &StageParams) -> Result<Self, StageError> {
        params.deny_stages_except(&[])?;
        let p: LogisticRegressionParams = params.parse()?;
        if !(0.0..=1.0).contains(&p.threshold) {
            return Err(StageError::invalid_params(format!(
                "threshold {} is not a probability",
                p.threshold
            )));
        }
        let mut model = Self::new(p.coef, p.intercept)?.with_output(p.output);
        model.threshold = p.threshold;
        Ok(model)
    }
}

impl Predictor for LogisticRegression {
    fn name(&self) -> &str {
        "LogisticRegression"
    }

    fn predict(&self, frame: &Frame) -> Result<Vec<f64>, StageError> {
        let mut out = decision(&self.coef, self.intercept, frame)?;
        for v in &mut out {
            let p = 1.0 / (1.0 + (-*v).exp());
            *v = match self.output {
                LogisticOutput::Probability => p,
                LogisticOutput::Class if p.is_nan() => f64::NAN,
                LogisticOutput::Class => f64::from(u8::from(p >= self.threshold)),
            };
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ThresholdClassifierParams {
    threshold: f64,
    #[serde(default)]
    column: Option<String>,
    #[serde(default = "default_above")]
    above: f64,
    #[serde(default)]
    below: f64,
}

fn default_above() -> f64 {
    1.0
}

/// Labels rows by comparing one column against a threshold.
///
/// Rows at or above `threshold` get `above`, the rest get `below`. Uses the
/// first column unless `column` is set. `NaN` inputs predict `NaN`.
#[derive(Debug, Clone)]
pub struct ThresholdClassifier {
    threshold: f64,
    column: Option<String>,
    above: f64,
    below: f64,
}

impl ThresholdClassifier {
    /// Creates a 0/1 classifier over the first column.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            column: None,
            above: default_above(),
            below: 0.0,
        }
    }

    /// Compares the named column instead of the first one.
    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    fn from_params(params: &StageParams) -> Result<Self, StageError> {
        params.deny_stages_except(&[])?;
        let p: ThresholdClassifierParams = params.parse()?;
        Ok(Self {
            threshold: p.threshold,
            column: p.column,
            above: p.above,
            below: p.below,
        })
    }
}

impl Predictor for ThresholdClassifier {
    fn name(&self) -> &str {
        "ThresholdClassifier"
    }

    fn predict(&self, frame: &Frame) -> Result<Vec<f64>, StageError> {
        let column = match &self.column {
            Some(name) => frame
                .column(name)
                .ok_or_else(|| StageError::MissingColumn(name.clone()))?,
            None => frame.columns().first().ok_or_else(|| {
                StageError::InvalidFrame("threshold classifier needs at least one column".to_string())
            })?,
        };
        Ok(column
            .values
            .iter()
            .map(|v| match v {
                v if v.is_nan() => f64::NAN,
                v if *v >= self.threshold => self.above,
                _ => self.below,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Column;
    use serde_json::json;

    fn frame() -> Frame {
        Frame::new(vec![
            Column::new("a", vec![1.0, -2.0, 0.0]),
            Column::new("b", vec![2.0, 1.0, f64::NAN]),
        ])
        .unwrap()
    }

    #[test]
    fn test_linear_regression() {
        let model = LinearRegression::new(vec![2.0, 1.0], 0.5).unwrap();
        let out = model.predict(&frame()).unwrap();
        assert!((out[0] - 4.5).abs() < 1e-12);
        assert!((out[1] + 2.5).abs() < 1e-12);
        assert!(out[2].is_nan());
    }

    #[test]
    fn test_linear_regression_width_mismatch() {
        let model = LinearRegression::new(vec![1.0], 0.0).unwrap();
        assert_eq!(
            model.predict(&frame()).unwrap_err(),
            StageError::ColumnCountMismatch { expected: 1, actual: 2 }
        );
    }

    #[test]
    fn test_logistic_regression_outputs() {
        let single = Frame::new(vec![Column::new("a", vec![0.0, 10.0, -10.0])]).unwrap();

        let classes = LogisticRegression::new(vec![1.0], 0.0).unwrap();
        assert_eq!(classes.predict(&single).unwrap(), vec![1.0, 1.0, 0.0]);

        let probs = classes.with_output(LogisticOutput::Probability);
        let out = probs.predict(&single).unwrap();
        assert!((out[0] - 0.5).abs() < 1e-12);
        assert!(out[1] > 0.99 && out[2] < 0.01);
    }

    #[test]
    fn test_logistic_regression_params() {
        let params = StageParams::from_value(json!({
            "coef": [1.0], "threshold": 0.9, "output": "class"
        }));
        let model = LogisticRegression::from_params(&params).unwrap();
        let single = Frame::new(vec![Column::new("a", vec![0.0, 3.0])]).unwrap();
        assert_eq!(model.predict(&single).unwrap(), vec![0.0, 1.0]);

        let bad = StageParams::from_value(json!({"coef": [1.0], "threshold": 2.0}));
        assert!(LogisticRegression::from_params(&bad).is_err());
        let empty = StageParams::from_value(json!({"coef": []}));
        assert!(LogisticRegression::from_params(&empty).is_err());
    }

    #[test]
    fn test_threshold_classifier_first_column() {
        let model = ThresholdClassifier::new(0.0);
        assert_eq!(model.predict(&frame()).unwrap(), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_threshold_classifier_named_column_and_labels() {
        let params = StageParams::from_value(json!({
            "threshold": 1.5, "column": "b", "above": -1.0, "below": 7.0
        }));
        let model = ThresholdClassifier::from_params(&params).unwrap();
        let out = model.predict(&frame()).unwrap();
        assert_eq!(&out[..2], &[-1.0, 7.0]);
        assert!(out[2].is_nan());

        let missing = ThresholdClassifier::new(0.0).with_column("zzz");
        assert_eq!(
            missing.predict(&frame()).unwrap_err(),
            StageError::MissingColumn("zzz".to_string())
        );
    }

    #[test]
    fn test_threshold_classifier_requires_threshold() {
        assert!(ThresholdClassifier::from_params(&StageParams::default()).is_err());
    }
}
