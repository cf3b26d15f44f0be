//! Ensembles over nested predictors.

use super::{Predictor, Stage, StageParams};
use crate::core::Frame;
use crate::errors::StageError;
use crate::registry::StageRegistry;
use serde::Deserialize;
use std::sync::Arc;

pub(crate) fn register(registry: &mut StageRegistry) {
    registry.register("ensemble.VotingClassifier", |params| {
        VotingClassifier::from_params(params).map(Stage::predictor)
    });
}

/// How member predictions are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Voting {
    /// Weighted majority label. Ties go to the smallest label.
    #[default]
    Hard,
    /// Weighted mean of member outputs.
    Mean,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VotingParams {
    #[serde(default)]
    voting: Voting,
    #[serde(default)]
    weights: Option<Vec<f64>>,
}

/// Combines the predictions of several predictors row by row.
///
/// Members that predict `NaN` for a row abstain; a row where every member
/// abstains predicts `NaN`.
#[derive(Debug, Clone)]
pub struct VotingClassifier {
    estimators: Vec<Arc<dyn Predictor>>,
    weights: Vec<f64>,
    voting: Voting,
}

impl VotingClassifier {
    /// Creates an unweighted ensemble.
    ///
    /// # Errors
    ///
    /// Returns an error if `estimators` is empty.
    pub fn new(estimators: Vec<Arc<dyn Predictor>>, voting: Voting) -> Result<Self, StageError> {
        if estimators.is_empty() {
            return Err(StageError::invalid_params("estimators must not be empty"));
        }
        let weights = vec![1.0; estimators.len()];
        Ok(Self {
            estimators,
            weights,
            voting,
        })
    }

    /// Sets per-member weights.
    ///
    /// # Errors
    ///
    /// Returns an error if the weight count differs from the member count or
    /// a weight is negative or not finite.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Result<Self, StageError> {
        if weights.len() != self.estimators.len() {
            return Err(StageError::invalid_params(format!(
                "{} weights given for {} estimators",
                weights.len(),
                self.estimators.len()
            )));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(StageError::invalid_params("weights must be finite and non-negative"));
        }
        self.weights = weights;
        Ok(self)
    }

    fn from_params(mut params: StageParams) -> Result<Self, StageError> {
        params.deny_stages_except(&["estimators"])?;
        let p: VotingParams = params.parse()?;
        let stages = params
            .take_stages("estimators")
            .ok_or_else(|| StageError::invalid_params("missing nested stages 'estimators'"))?;
        let estimators = stages
            .into_iter()
            .enumerate()
            .map(|(i, stage)| match stage {
                Stage::Predict(p) => Ok(p),
                Stage::Transform(t) => Err(StageError::invalid_params(format!(
                    "estimators[{i}] ('{}') is a transformer; only predictors are allowed here",
                    t.name()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let model = Self::new(estimators, p.voting)?;
        match p.weights {
            Some(weights) => model.with_weights(weights),
            None => Ok(model),
        }
    }

    fn combine(&self, votes: &[(f64, f64)]) -> f64 {
        if votes.is_empty() {
            return f64::NAN;
        }
        match self.voting {
            Voting::Mean => {
                let total: f64 = votes.iter().map(|(_, w)| w).sum();
                if total == 0.0 {
                    return f64::NAN;
                }
                votes.iter().map(|(v, w)| v * w).sum::<f64>() / total
            }
            Voting::Hard => {
                let mut tally: Vec<(f64, f64)> = Vec::new();
                for &(label, weight) in votes {
                    match tally.iter_mut().find(|(l, _)| *l == label) {
                        Some((_, w)) => *w += weight,
                        None => tally.push((label, weight)),
                    }
                }
                tally
                    .into_iter()
                    .fold(None::<(f64, f64)>, |best, (label, weight)| match best {
                        Some((bl, bw)) if bw > weight || (bw == weight && bl < label) => {
                            Some((bl, bw))
                        }
                        _ => Some((label, weight)),
                    })
                    .map_or(f64::NAN, |(label, _)| label)
            }
        }
    }
}

impl Predictor for VotingClassifier {
    fn name(&self) -> &str {
        "VotingClassifier"
    }

    fn predict(&self, frame: &Frame) -> Result<Vec<f64>, StageError> {
        let num_rows = frame.num_rows();
        let outputs = self
            .estimators
            .iter()
            .map(|estimator| {
                let out = estimator.predict(frame)?;
                if out.len() == num_rows {
                    Ok(out)
                } else {
                    Err(StageError::LengthMismatch {
                        expected: num_rows,
                        actual: out.len(),
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut votes = Vec::with_capacity(outputs.len());
        Ok((0..num_rows)
            .map(|row| {
                votes.clear();
                votes.extend(
                    outputs
                        .iter()
                        .zip(&self.weights)
                        .map(|(out, w)| (out[row], *w))
                        .filter(|(v, _)| !v.is_nan()),
                );
                self.combine(&votes)
            })
            .collect())
    }
}
