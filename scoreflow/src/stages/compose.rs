//! Composite stages built from nested stage descriptors.

use super::{Stage, StageParams, Transformer};
use crate::core::{Column, Frame};
use crate::errors::StageError;
use crate::registry::StageRegistry;
use serde::Deserialize;
use std::sync::Arc;

pub(crate) fn register(registry: &mut StageRegistry) {
    registry.register("compose.FeatureUnion", |params| {
        FeatureUnion::from_params(params).map(Stage::transformer)
    });
    registry.register("compose.Sequential", |params| {
        Sequential::from_params(params).map(Stage::transformer)
    });
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoOptions {}

/// Pulls the nested stages stored under `key`, all of which must transform.
fn nested_transformers(
    params: &mut StageParams,
    key: &str,
) -> Result<Vec<Arc<dyn Transformer>>, StageError> {
    params.deny_stages_except(&[key])?;
    let _: NoOptions = params.parse()?;
    let stages = params
        .take_stages(key)
        .ok_or_else(|| StageError::invalid_params(format!("missing nested stages '{key}'")))?;
    if stages.is_empty() {
        return Err(StageError::invalid_params(format!("'{key}' must not be empty")));
    }
    stages
        .into_iter()
        .enumerate()
        .map(|(i, stage)| match stage {
            Stage::Transform(t) => Ok(t),
            Stage::Predict(p) => Err(StageError::invalid_params(format!(
                "{key}[{i}] ('{}') is a predictor; only transformers are allowed here",
                p.name()
            ))),
        })
        .collect()
}

fn check_rows(expected: usize, frame: &Frame) -> Result<(), StageError> {
    if frame.num_rows() == expected {
        Ok(())
    } else {
        Err(StageError::LengthMismatch {
            expected,
            actual: frame.num_rows(),
        })
    }
}

/// Derives output prefixes from stage names: lowercase, with `-1`, `-2`, ...
/// appended when a name occurs more than once.
fn union_prefixes(parts: &[Arc<dyn Transformer>]) -> Vec<String> {
    let names: Vec<String> = parts.iter().map(|p| p.name().to_lowercase()).collect();
    let mut seen = std::collections::HashMap::<&str, usize>::new();
    names
        .iter()
        .map(|name| {
            if names.iter().filter(|n| *n == name).count() > 1 {
                let counter = seen.entry(name.as_str()).or_insert(0);
                *counter += 1;
                format!("{name}-{counter}")
            } else {
                name.clone()
            }
        })
        .collect()
}

/// Applies several transformers to the same frame and concatenates their
/// outputs column-wise. Output columns are named `<part>__<column>`.
#[derive(Debug, Clone)]
pub struct FeatureUnion {
    parts: Vec<Arc<dyn Transformer>>,
    prefixes: Vec<String>,
}

impl FeatureUnion {
    /// Creates a new feature union.
    #[must_use]
    pub fn new(parts: Vec<Arc<dyn Transformer>>) -> Self {
        let prefixes = union_prefixes(&parts);
        Self { parts, prefixes }
    }

    fn from_params(mut params: StageParams) -> Result<Self, StageError> {
        nested_transformers(&mut params, "transformer_list").map(Self::new)
    }
}

impl Transformer for FeatureUnion {
    fn name(&self) -> &str {
        "FeatureUnion"
    }

    fn transform(&self, frame: Frame) -> Result<Frame, StageError> {
        let num_rows = frame.num_rows();
        let mut columns = Vec::new();
        for (part, prefix) in self.parts.iter().zip(&self.prefixes) {
            let out = part.transform(frame.clone())?;
            check_rows(num_rows, &out)?;
            columns.extend(
                out.into_columns()
                    .into_iter()
                    .map(|c| Column::new(format!("{prefix}__{}", c.name), c.values)),
            );
        }
        Frame::with_rows(num_rows, columns)
    }
}

/// Chains transformers, feeding each one's output into the next.
#[derive(Debug, Clone)]
pub struct Sequential {
    steps: Vec<Arc<dyn Transformer>>,
}

impl Sequential {
    /// Creates a new transformer chain.
    #[must_use]
    pub fn new(steps: Vec<Arc<dyn Transformer>>) -> Self {
        Self { steps }
    }

    fn from_params(mut params: StageParams) -> Result<Self, StageError> {
        nested_transformers(&mut params, "steps").map(Self::new)
    }
}

impl Transformer for Sequential {
    fn name(&self) -> &str {
        "Sequential"
    }

    fn transform(&self, frame: Frame) -> Result<Frame, StageError> {
        let num_rows = frame.num_rows();
        self.steps.iter().try_fold(frame, |frame, step| {
            let out = step.transform(frame)?;
            check_rows(num_rows, &out)?;
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::preprocessing::{Binarizer, MinMaxScaler};
    use crate::stages::{FnPredictor, FnTransformer};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn frame() -> Frame {
        Frame::new(vec![Column::new("x", vec![0.0, 5.0, 10.0])]).unwrap()
    }

    #[test]
    fn test_feature_union_concatenates_prefixed_columns() {
        let union = FeatureUnion::new(vec![
            Arc::new(MinMaxScaler::new(0.0, 1.0).unwrap()),
            Arc::new(Binarizer::new(4.0)),
        ]);
        let out = union.transform(frame()).unwrap();

        assert_eq!(out.column_names(), vec!["minmaxscaler__x", "binarizer__x"]);
        assert_eq!(out.column("minmaxscaler__x").unwrap().values, vec![0.0, 0.5, 1.0]);
        assert_eq!(out.column("binarizer__x").unwrap().values, vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_feature_union_disambiguates_repeated_parts() {
        let union = FeatureUnion::new(vec![
            Arc::new(Binarizer::new(1.0)),
            Arc::new(Binarizer::new(6.0)),
        ]);
        let out = union.transform(frame()).unwrap();
        assert_eq!(out.column_names(), vec!["binarizer-1__x", "binarizer-2__x"]);
    }

    #[test]
    fn test_feature_union_rejects_row_changes() {
        let union = FeatureUnion::new(vec![Arc::new(FnTransformer::new("shrink", |mut f: Frame| {
            Ok(f.take_front(1))
        }))]);
        assert_eq!(
            union.transform(frame()).unwrap_err(),
            StageError::LengthMismatch { expected: 3, actual: 1 }
        );
    }

    #[test]
    fn test_sequential_chains_steps() {
        let chain = Sequential::new(vec![
            Arc::new(MinMaxScaler::new(0.0, 1.0).unwrap()),
            Arc::new(Binarizer::new(0.4)),
        ]);
        let out = chain.transform(frame()).unwrap();
        assert_eq!(out.column("x").unwrap().values, vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_from_params_requires_nested_transformers() {
        assert!(Sequential::from_params(StageParams::default()).is_err());

        let with_predictor = StageParams::default().with_stages(
            "steps",
            vec![Stage::predictor(FnPredictor::new("p", |f: &Frame| {
                Ok(vec![0.0; f.num_rows()])
            }))],
        );
        let err = Sequential::from_params(with_predictor).unwrap_err();
        assert!(err.to_string().contains("predictor"));

        let extra = StageParams::from_value(json!({"n_jobs": 2}))
            .with_stages("transformer_list", vec![Stage::transformer(Binarizer::new(0.0))]);
        assert!(FeatureUnion::from_params(extra).is_err());
    }
}
