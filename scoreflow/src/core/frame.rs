//! Column-major numeric frames passed between pipeline stages.

use crate::errors::StageError;
use serde::{Deserialize, Serialize};

/// A named column of `f64` values. Missing values are `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column values, one per row.
    pub values: Vec<f64>,
}

impl Column {
    /// Creates a new column.
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// A bounded table of numeric records.
///
/// The row count is tracked explicitly so a frame with no columns still
/// knows how many records it represents.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    num_rows: usize,
    columns: Vec<Column>,
}

impl Frame {
    /// Creates a frame from columns of equal length.
    ///
    /// # Errors
    ///
    /// Returns an error if the columns have different lengths or duplicate names.
    pub fn new(columns: Vec<Column>) -> Result<Self, StageError> {
        let num_rows = columns.first().map_or(0, |c| c.values.len());
        Self::with_rows(num_rows, columns)
    }

    /// Creates a frame with an explicit row count.
    ///
    /// # Errors
    ///
    /// Returns an error if any column length differs from `num_rows` or two
    /// columns share a name.
    pub fn with_rows(num_rows: usize, columns: Vec<Column>) -> Result<Self, StageError> {
        for (i, column) in columns.iter().enumerate() {
            if column.values.len() != num_rows {
                return Err(StageError::InvalidFrame(format!(
                    "column '{}' has {} values, expected {}",
                    column.name,
                    column.values.len(),
                    num_rows
                )));
            }
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(StageError::InvalidFrame(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { num_rows, columns })
    }

    /// Creates an empty frame with the given column names and no rows.
    #[must_use]
    pub fn empty(names: &[String]) -> Self {
        Self {
            num_rows: 0,
            columns: names.iter().map(|n| Column::new(n.clone(), Vec::new())).collect(),
        }
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the frame has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Returns the columns.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Consumes the frame and returns its columns.
    #[must_use]
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    /// Returns the column names in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the values of row `index` across all columns.
    #[must_use]
    pub fn row(&self, index: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c.values[index]).collect()
    }

    /// Returns a frame with only the named columns, in the requested order.
    ///
    /// # Errors
    ///
    /// Returns `MissingColumn` if a name is absent.
    pub fn select(&self, names: &[String]) -> Result<Self, StageError> {
        let columns = names
            .iter()
            .map(|name| {
                self.column(name)
                    .cloned()
                    .ok_or_else(|| StageError::MissingColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::with_rows(self.num_rows, columns)
    }

    /// Appends the rows of `other`, which must have the same column names.
    ///
    /// # Errors
    ///
    /// Returns an error if the column layouts differ.
    pub fn append(&mut self, other: Self) -> Result<(), StageError> {
        if self.columns.is_empty() && self.num_rows == 0 {
            *self = other;
            return Ok(());
        }
        if self.column_names() != other.column_names() {
            return Err(StageError::InvalidFrame(
                "cannot append frames with different columns".to_string(),
            ));
        }
        for (mine, theirs) in self.columns.iter_mut().zip(other.columns) {
            mine.values.extend(theirs.values);
        }
        self.num_rows += other.num_rows;
        Ok(())
    }

    /// Splits off the first `n` rows, leaving the remainder in `self`.
    ///
    /// If `n` exceeds the row count, all rows are taken.
    #[must_use]
    pub fn take_front(&mut self, n: usize) -> Self {
        let n = n.min(self.num_rows);
        let columns = self
            .columns
            .iter_mut()
            .map(|c| {
                let rest = c.values.split_off(n);
                let front = std::mem::replace(&mut c.values, rest);
                Column::new(c.name.clone(), front)
            })
            .collect();
        self.num_rows -= n;
        Self {
            num_rows: n,
            columns,
        }
    }
}
