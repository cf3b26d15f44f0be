//! Linear projection onto fixed principal components.

use super::stats::nan_mean;
use super::{Stage, StageParams, Transformer};
use crate::core::{Column, Frame};
use crate::errors::StageError;
use crate::registry::StageRegistry;
use serde::Deserialize;

pub(crate) fn register(registry: &mut StageRegistry) {
    registry.register("decomposition.PCA", |params| {
        Pca::from_params(&params).map(Stage::transformer)
    });
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PcaParams {
    components: Vec<Vec<f64>>,
    #[serde(default)]
    mean: Option<Vec<f64>>,
}

/// Projects each row onto fixed principal axes.
///
/// `components` holds one row of feature loadings per output column. Rows are
/// centred on `mean` when given, otherwise on the column means of the frame
/// being transformed. Output columns are named `pca0`, `pca1`, ...
#[derive(Debug, Clone)]
pub struct Pca {
    components: Vec<Vec<f64>>,
    mean: Option<Vec<f64>>,
}

impl Pca {
    /// Creates a projection that centres on per-frame column means.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no components or their widths differ.
    pub fn new(components: Vec<Vec<f64>>) -> Result<Self, StageError> {
        check_components(&components)?;
        Ok(Self {
            components,
            mean: None,
        })
    }

    /// Creates a projection with a fixed centring vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the components are invalid or `mean` does not
    /// match their width.
    pub fn fitted(components: Vec<Vec<f64>>, mean: Vec<f64>) -> Result<Self, StageError> {
        let width = check_components(&components)?;
        if mean.len() != width {
            return Err(StageError::invalid_params(format!(
                "components have {width} features but mean has {}",
                mean.len()
            )));
        }
        Ok(Self {
            components,
            mean: Some(mean),
        })
    }

    fn from_params(params: &StageParams) -> Result<Self, StageError> {
        params.deny_stages_except(&[])?;
        let p: PcaParams = params.parse()?;
        match p.mean {
            Some(mean) => Self::fitted(p.components, mean),
            None => Self::new(p.components),
        }
    }

    /// Number of output columns.
    #[must_use]
    pub fn n_components(&self) -> usize {
        self.components.len()
    }
}

fn check_components(components: &[Vec<f64>]) -> Result<usize, StageError> {
    let Some(first) = components.first() else {
        return Err(StageError::invalid_params("components must not be empty"));
    };
    if first.is_empty() {
        return Err(StageError::invalid_params("components must have at least one feature"));
    }
    if let Some((i, row)) = components
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != first.len())
    {
        return Err(StageError::invalid_params(format!(
            "component {i} has {} features, expected {}",
            row.len(),
            first.len()
        )));
    }
    Ok(first.len())
}

impl Transformer for Pca {
    fn name(&self) -> &str {
        "PCA"
    }

    fn transform(&self, frame: Frame) -> Result<Frame, StageError> {
        let width = self.components.first().map_or(0, Vec::len);
        if frame.num_columns() != width {
            return Err(StageError::ColumnCountMismatch {
                expected: width,
                actual: frame.num_columns(),
            });
        }
        let num_rows = frame.num_rows();
        let mean: Vec<f64> = match &self.mean {
            Some(fixed) => fixed.clone(),
            None => frame
                .columns()
                .iter()
                .map(|c| nan_mean(&c.values).unwrap_or(0.0))
                .collect(),
        };

        let columns = self
            .components
            .iter()
            .enumerate()
            .map(|(k, loadings)| {
                let mut values = vec![0.0; num_rows];
                for ((column, weight), centre) in frame.columns().iter().zip(loadings).zip(&mean) {
                    for (out, v) in values.iter_mut().zip(&column.values) {
                        *out += (v - centre) * weight;
                    }
                }
                Column::new(format!("pca{k}"), values)
            })
            .collect();
        Frame::with_rows(num_rows, columns)
    }
}
