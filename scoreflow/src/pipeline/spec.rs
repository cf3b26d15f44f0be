//! Stage descriptors and the pipeline document.

use crate::errors::ConfigurationError;
use crate::registry::is_qualified_name;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// A single stage in a pipeline document: a qualified name and its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageDescriptor {
    /// Qualified stage name, e.g. `preprocessing.StandardScaler`.
    pub name: String,
    /// Construction options. Values may hold nested descriptors.
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl StageDescriptor {
    /// Creates a descriptor with no options.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    /// Adds an option.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Parses a descriptor from a JSON value, reporting problems at `path`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedDescriptor` if the value is not
    /// `{"name": <qualified name>, "params": {...}}`.
    pub fn from_value(value: Value, path: &str) -> Result<Self, ConfigurationError> {
        let malformed = |reason: String| ConfigurationError::MalformedDescriptor {
            path: path.to_string(),
            reason,
        };
        if !value.is_object() {
            return Err(malformed(format!("expected an object, got {value}")));
        }
        let descriptor: Self = serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;
        descriptor.validate(path)?;
        Ok(descriptor)
    }

    /// Checks the qualified-name syntax.
    ///
    /// # Errors
    ///
    /// Returns `MalformedDescriptor` if the name is not `namespace.Name`.
    pub fn validate(&self, path: &str) -> Result<(), ConfigurationError> {
        if is_qualified_name(&self.name) {
            Ok(())
        } else {
            Err(ConfigurationError::MalformedDescriptor {
                path: path.to_string(),
                reason: format!("'{}' is not a qualified name (namespace.Name)", self.name),
            })
        }
    }
}

/// An ordered list of stage descriptors. Order is assembly order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// The descriptors.
    pub steps: Vec<StageDescriptor>,
}

impl PipelineSpec {
    /// Creates a pipeline from ordered descriptors.
    #[must_use]
    pub fn new(steps: Vec<StageDescriptor>) -> Self {
        Self { steps }
    }

    /// Appends a descriptor.
    #[must_use]
    pub fn with_step(mut self, step: StageDescriptor) -> Self {
        self.steps.push(step);
        self
    }

    /// Number of top-level steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if there are no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Checks every top-level descriptor's name syntax.
    ///
    /// # Errors
    ///
    /// Returns the first `MalformedDescriptor`.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.steps
            .iter()
            .enumerate()
            .try_for_each(|(i, step)| step.validate(&format!("steps[{i}]")))
    }
}

/// A parsed pipeline document: `{"steps": [...], "model": "<key>"?}`.
///
/// The document is comment-tolerant (JSON5): `//` and `/* */` comments and
/// trailing commas are accepted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineDocument {
    /// The stage descriptors.
    pub spec: PipelineSpec,
    /// Key of an injected model artifact appended as the terminal stage.
    pub model: Option<String>,
}

impl PipelineDocument {
    /// Parses a document from text.
    ///
    /// # Errors
    ///
    /// Returns `MalformedDocument` if the text is not a JSON5 object with a
    /// `steps` array, or `MalformedDescriptor` for the first bad step.
    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        let value: Value =
            json5::from_str(text).map_err(|e| ConfigurationError::MalformedDocument(e.to_string()))?;
        let Value::Object(mut root) = value else {
            return Err(ConfigurationError::MalformedDocument(
                "top level must be an object".to_string(),
            ));
        };

        let steps = match root.remove("steps") {
            Some(Value::Array(steps)) => steps,
            Some(other) => {
                return Err(ConfigurationError::MalformedDocument(format!(
                    "'steps' must be an array, got {other}"
                )))
            }
            None => {
                return Err(ConfigurationError::MalformedDocument(
                    "missing 'steps'".to_string(),
                ))
            }
        };
        let model = match root.remove("model") {
            None | Some(Value::Null) => None,
            Some(Value::String(key)) => Some(key),
            Some(other) => {
                return Err(ConfigurationError::MalformedDocument(format!(
                    "'model' must be a string, got {other}"
                )))
            }
        };
        if let Some(key) = root.keys().next() {
            return Err(ConfigurationError::MalformedDocument(format!(
                "unknown top-level key '{key}'"
            )));
        }

        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(i, step)| StageDescriptor::from_value(step, &format!("steps[{i}]")))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            spec: PipelineSpec::new(steps),
            model,
        })
    }

    /// Reads and parses a document from a file.
    ///
    /// # Errors
    ///
    /// Returns `UnreadableDocument` if the file cannot be read, otherwise as
    /// [`PipelineDocument::parse`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigurationError::UnreadableDocument {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&text)
    }
}

impl std::str::FromStr for PipelineDocument {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
