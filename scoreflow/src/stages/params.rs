//! Construction parameters handed to stage constructors.

use super::Stage;
use crate::errors::StageError;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Named construction parameters for one stage.
///
/// Scalar and mapping options stay in `values` and are deserialized into a
/// typed parameter struct. Options that held nested stage descriptors have
/// already been assembled by the pipeline assembler and live in `stages`.
#[derive(Debug, Clone, Default)]
pub struct StageParams {
    values: Map<String, Value>,
    stages: IndexMap<String, Vec<Stage>>,
}

impl StageParams {
    /// Creates parameters from plain option values.
    #[must_use]
    pub fn new(values: Map<String, Value>) -> Self {
        Self {
            values,
            stages: IndexMap::new(),
        }
    }

    /// Creates parameters from a JSON object value.
    ///
    /// Non-object values produce empty parameters.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::new(map),
            _ => Self::default(),
        }
    }

    /// Attaches assembled nested stages under `key`.
    #[must_use]
    pub fn with_stages(mut self, key: impl Into<String>, stages: Vec<Stage>) -> Self {
        self.stages.insert(key.into(), stages);
        self
    }

    /// Returns the plain option values.
    #[must_use]
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Returns a single option value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the nested stages assembled for `key`.
    #[must_use]
    pub fn stages(&self, key: &str) -> Option<&[Stage]> {
        self.stages.get(key).map(Vec::as_slice)
    }

    /// Removes and returns the nested stages assembled for `key`.
    pub fn take_stages(&mut self, key: &str) -> Option<Vec<Stage>> {
        self.stages.shift_remove(key)
    }

    /// Returns the keys that hold nested stages.
    pub fn stage_keys(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    /// Returns true if there are no options at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.stages.is_empty()
    }

    /// Deserializes the plain option values into a typed parameter struct.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` if an option is unknown, missing or mistyped.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, StageError> {
        serde_json::from_value(Value::Object(self.values.clone()))
            .map_err(|e| StageError::invalid_params(e.to_string()))
    }

    /// Fails if nested stages were supplied under keys the stage does not accept.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` naming the first unexpected key.
    pub fn deny_stages_except(&self, allowed: &[&str]) -> Result<(), StageError> {
        match self.stage_keys().find(|k| !allowed.contains(k)) {
            Some(key) => Err(StageError::invalid_params(format!(
                "unexpected nested stages for '{key}'"
            ))),
            None => Ok(()),
        }
    }
}
