//! Column projection stages.

use super::{Stage, StageParams, Transformer};
use crate::core::Frame;
use crate::errors::StageError;
use crate::registry::StageRegistry;
use serde::Deserialize;

pub(crate) fn register(registry: &mut StageRegistry) {
    registry.register("feature_selection.SelectColumns", |params| {
        SelectColumns::from_params(&params).map(Stage::transformer)
    });
    registry.register("feature_selection.DropColumns", |params| {
        DropColumns::from_params(&params).map(Stage::transformer)
    });
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ColumnsParams {
    columns: Vec<String>,
}

fn parse_columns(params: &StageParams) -> Result<Vec<String>, StageError> {
    params.deny_stages_except(&[])?;
    let p: ColumnsParams = params.parse()?;
    if p.columns.is_empty() {
        return Err(StageError::invalid_params("columns must not be empty"));
    }
    Ok(p.columns)
}

/// Keeps only the named columns, in the given order.
#[derive(Debug, Clone)]
pub struct SelectColumns {
    columns: Vec<String>,
}

impl SelectColumns {
    /// Creates a new column selector.
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    fn from_params(params: &StageParams) -> Result<Self, StageError> {
        parse_columns(params).map(Self::new)
    }
}

impl Transformer for SelectColumns {
    fn name(&self) -> &str {
        "SelectColumns"
    }

    fn transform(&self, frame: Frame) -> Result<Frame, StageError> {
        frame.select(&self.columns)
    }
}

/// Removes the named columns. Every named column must be present.
#[derive(Debug, Clone)]
pub struct DropColumns {
    columns: Vec<String>,
}

impl DropColumns {
    /// Creates a new column dropper.
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    fn from_params(params: &StageParams) -> Result<Self, StageError> {
        parse_columns(params).map(Self::new)
    }
}

impl Transformer for DropColumns {
    fn name(&self) -> &str {
        "DropColumns"
    }

    fn transform(&self, frame: Frame) -> Result<Frame, StageError> {
        if let Some(missing) = self.columns.iter().find(|c| frame.column(c).is_none()) {
            return Err(StageError::MissingColumn(missing.clone()));
        }
        let num_rows = frame.num_rows();
        let kept = frame
            .into_columns()
            .into_iter()
            .filter(|c| !self.columns.contains(&c.name))
            .collect();
        Frame::with_rows(num_rows, kept)
    }
}
