//! Pipeline assembler: turns stage descriptors into an executable pipeline.

use super::{AssembledPipeline, PipelineDocument, PipelineSpec, StageDescriptor};
use crate::errors::{ConfigurationError, ErrorInfo, PipelineBuildError, ScoreflowError};
use crate::registry::{is_qualified_name, StageRegistry};
use crate::stages::{Predictor, Stage, StageParams, Transformer};
use serde_json::{Map, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info};

/// Builds [`AssembledPipeline`]s from descriptors using a [`StageRegistry`].
///
/// Assembly performs no I/O. Any failure aborts assembly; nothing partially
/// built escapes.
#[derive(Debug, Clone)]
pub struct PipelineAssembler {
    registry: Arc<StageRegistry>,
}

impl PipelineAssembler {
    /// Creates a new assembler.
    #[must_use]
    pub fn new(registry: Arc<StageRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry used for resolution.
    #[must_use]
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Builds a pipeline whose last descriptor is the predictor.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for unknown, disallowed or malformed
    /// descriptors and `PipelineBuild` when a stage cannot be constructed or
    /// the chain does not end in exactly one predictor.
    pub fn build(&self, spec: &PipelineSpec) -> Result<AssembledPipeline, ScoreflowError> {
        self.assemble(spec, None)
    }

    /// Builds a pipeline with an externally supplied predictor as its last
    /// stage. With no descriptors the model is the whole pipeline.
    ///
    /// # Errors
    ///
    /// As [`PipelineAssembler::build`]. With a model, every descriptor must
    /// build a transformer.
    pub fn build_with_model(
        &self,
        spec: &PipelineSpec,
        model: Option<Arc<dyn Predictor>>,
    ) -> Result<AssembledPipeline, ScoreflowError> {
        let model = model.map(|m| (m.name().to_string(), m));
        self.assemble(spec, model)
    }

    /// Builds a pipeline from a document, resolving its `model` key against
    /// the registry's injected models.
    ///
    /// # Errors
    ///
    /// Returns `UnknownModel` if the key is not registered, otherwise as
    /// [`PipelineAssembler::build_with_model`].
    pub fn build_document(&self, document: &PipelineDocument) -> Result<AssembledPipeline, ScoreflowError> {
        let model = match &document.model {
            Some(key) => {
                let model = self
                    .registry
                    .model(key)
                    .ok_or_else(|| ConfigurationError::UnknownModel(key.clone()))?;
                Some((key.clone(), model))
            }
            None => None,
        };
        self.assemble(&document.spec, model)
    }

    fn assemble(
        &self,
        spec: &PipelineSpec,
        model: Option<(String, Arc<dyn Predictor>)>,
    ) -> Result<AssembledPipeline, ScoreflowError> {
        let mut built = Vec::with_capacity(spec.len());
        for (position, descriptor) in spec.steps.iter().enumerate() {
            let path = format!("steps[{position}]");
            let stage = self.construct(descriptor, position, &path)?;
            debug!(position, stage = %descriptor.name, kind = %stage.kind(), "Stage constructed");
            built.push((descriptor.name.clone(), stage));
        }

        let has_model = model.is_some();
        let (transformers, predictor) = split_chain(built, model)?;
        let pipeline = AssembledPipeline::new(transformers, predictor);
        info!(
            stages = pipeline.len(),
            injected_model = has_model,
            "Pipeline assembled"
        );
        Ok(pipeline)
    }

    fn construct(
        &self,
        descriptor: &StageDescriptor,
        position: usize,
        path: &str,
    ) -> Result<Stage, ScoreflowError> {
        descriptor.validate(path)?;
        let constructor = self
            .registry
            .resolve(&descriptor.name)
            .map_err(|source| ConfigurationError::UnknownStage {
                position,
                path: path.to_string(),
                source,
            })?;

        let params = self.assemble_params(&descriptor.params, position, path)?;
        let constructed = catch_unwind(AssertUnwindSafe(|| constructor(params)));
        match constructed {
            Ok(Ok(stage)) => Ok(stage),
            Ok(Err(e)) => Err(PipelineBuildError::new(position, path, &descriptor.name, e.to_string())
                .with_error_info(
                    ErrorInfo::new("BUILD-001-CONSTRUCTION", "Stage constructor rejected its options")
                        .with_fix_hint("Check the option names and types against the stage's parameters.")
                        .with_context_entry("stage", &descriptor.name),
                )
                .into()),
            Err(_) => Err(PipelineBuildError::new(
                position,
                path,
                &descriptor.name,
                "stage constructor panicked",
            )
            .with_error_info(ErrorInfo::new("BUILD-005-PANIC", "Stage constructor panicked"))
            .into()),
        }
    }

    /// Splits options into plain values and assembled nested stages.
    fn assemble_params(
        &self,
        options: &Map<String, Value>,
        position: usize,
        path: &str,
    ) -> Result<StageParams, ScoreflowError> {
        let mut values = Map::new();
        let mut nested = Vec::new();
        for (key, value) in options {
            let key_path = format!("{path}.{key}");
            match nested_descriptors(value, &key_path)? {
                Some(descriptors) => {
                    let stages = descriptors
                        .iter()
                        .map(|(child_path, child)| self.construct(child, position, child_path))
                        .collect::<Result<Vec<_>, _>>()?;
                    nested.push((key.clone(), stages));
                }
                None => {
                    values.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(nested
            .into_iter()
            .fold(StageParams::new(values), |params, (key, stages)| {
                params.with_stages(key, stages)
            }))
    }
}

/// Splits built stages into transformers and the terminal predictor.
fn split_chain(
    built: Vec<(String, Stage)>,
    model: Option<(String, Arc<dyn Predictor>)>,
) -> Result<(Vec<(String, Arc<dyn Transformer>)>, (String, Arc<dyn Predictor>)), PipelineBuildError> {
    let count = built.len();
    let mut transformers = Vec::with_capacity(count);
    let mut predictor = model;
    let has_model = predictor.is_some();

    for (position, (name, stage)) in built.into_iter().enumerate() {
        match stage {
            Stage::Transform(t) => transformers.push((name, t)),
            Stage::Predict(p) if position + 1 == count && !has_model => predictor = Some((name, p)),
            Stage::Predict(_) => {
                let fix_hint = if has_model {
                    "An injected model is the final stage; configured steps must all be transformers."
                } else {
                    "Move the predictor to the end of the steps list."
                };
                return Err(PipelineBuildError::new(
                    position,
                    format!("steps[{position}]"),
                    &name,
                    "predictor is not the final stage",
                )
                .with_error_info(
                    ErrorInfo::new("BUILD-002-MISPLACED_PREDICTOR", "Only the last stage may predict")
                        .with_fix_hint(fix_hint),
                ));
            }
        }
    }

    match predictor {
        Some(predictor) => Ok((transformers, predictor)),
        None if count == 0 => Err(PipelineBuildError::new(0, "steps", "", "pipeline has no stages")
            .with_error_info(
                ErrorInfo::new("BUILD-003-EMPTY", "Cannot build an empty pipeline")
                    .with_fix_hint("Add at least one step or inject a model."),
            )),
        None => {
            let name = transformers.last().map_or("", |(n, _)| n.as_str());
            Err(PipelineBuildError::new(
                count - 1,
                format!("steps[{}]", count - 1),
                name,
                "the final stage does not predict",
            )
            .with_error_info(
                ErrorInfo::new("BUILD-004-MISSING_PREDICTOR", "Pipeline has no predictor")
                    .with_fix_hint("End the steps list with a predictor or inject a model."),
            ))
        }
    }
}

/// Reads a mapping as a nested descriptor: `{"name": <qualified>, "params": {...}}`
/// or `{<qualified>: {...}}`.
fn as_descriptor(map: &Map<String, Value>) -> Option<StageDescriptor> {
    if let Some(Value::String(name)) = map.get("name") {
        let params = match map.get("params") {
            None => Some(Map::new()),
            Some(Value::Object(p)) => Some(p.clone()),
            Some(_) => None,
        }?;
        let only_known_keys = map.keys().all(|k| k == "name" || k == "params");
        return (only_known_keys && is_qualified_name(name)).then(|| StageDescriptor {
            name: name.clone(),
            params,
        });
    }
    match map.iter().next() {
        Some((name, Value::Object(params))) if map.len() == 1 && is_qualified_name(name) => {
            Some(StageDescriptor {
                name: name.clone(),
                params: params.clone(),
            })
        }
        _ => None,
    }
}

/// Finds nested descriptors in an option value.
///
/// Returns `None` for plain values. Arrays qualify only when every element
/// is a descriptor; mixing descriptors and plain values is an error.
fn nested_descriptors(
    value: &Value,
    path: &str,
) -> Result<Option<Vec<(String, StageDescriptor)>>, ConfigurationError> {
    match value {
        Value::Object(map) => Ok(as_descriptor(map).map(|d| vec![(path.to_string(), d)])),
        Value::Array(items) if !items.is_empty() => {
            let found: Vec<Option<StageDescriptor>> = items
                .iter()
                .map(|item| item.as_object().and_then(as_descriptor))
                .collect();
            let count = found.iter().filter(|d| d.is_some()).count();
            if count == 0 {
                Ok(None)
            } else if count == items.len() {
                Ok(Some(
                    found
                        .into_iter()
                        .flatten()
                        .enumerate()
                        .map(|(j, d)| (format!("{path}[{j}]"), d))
                        .collect(),
                ))
            } else {
                Err(ConfigurationError::MalformedDescriptor {
                    path: path.to_string(),
                    reason: "list mixes stage descriptors and plain values".to_string(),
                })
            }
        }
        _ => Ok(None),
    }
}
