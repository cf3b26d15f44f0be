//! Stage registry: the closed mapping from qualified names to constructors.
//!
//! Names resolve only when their namespace is inside the configured
//! allowlist, so an untrusted pipeline document can never reach a stage the
//! operator did not permit.

use crate::errors::{ConfigurationError, StageError, UnknownStageError};
use crate::stages::{self, Predictor, Stage, StageParams};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// Constructor function for a registered stage.
pub type StageConstructor = Arc<dyn Fn(StageParams) -> Result<Stage, StageError> + Send + Sync>;

/// Namespaces permitted by default.
pub const DEFAULT_NAMESPACES: &[&str] = &[
    "preprocessing",
    "feature_selection",
    "decomposition",
    "compose",
    "linear_model",
    "ensemble",
];

fn qualified_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)+$")
            .unwrap_or_else(|e| unreachable!("static pattern is valid: {e}"))
    })
}

fn namespace_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
            .unwrap_or_else(|e| unreachable!("static pattern is valid: {e}"))
    })
}

/// Returns true if `name` looks like `namespace.Name` (at least one dot,
/// identifier segments).
#[must_use]
pub fn is_qualified_name(name: &str) -> bool {
    qualified_name_pattern().is_match(name)
}

/// Returns the namespace part of a qualified name (everything before the last dot).
#[must_use]
pub fn namespace_of(name: &str) -> &str {
    name.rsplit_once('.').map_or("", |(ns, _)| ns)
}

/// Registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Permitted top-level namespaces.
    #[serde(default = "default_namespaces")]
    pub allowed_namespaces: Vec<String>,
}

fn default_namespaces() -> Vec<String> {
    DEFAULT_NAMESPACES.iter().map(|s| (*s).to_string()).collect()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            allowed_namespaces: default_namespaces(),
        }
    }
}

impl RegistryConfig {
    /// Creates a configuration with an explicit allowlist.
    #[must_use]
    pub fn with_allowed_namespaces(namespaces: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed_namespaces: namespaces.into_iter().map(Into::into).collect(),
        }
    }

    /// Validates every namespace.
    ///
    /// # Errors
    ///
    /// Returns `InvalidNamespace` for the first namespace that is not a
    /// dotted identifier path.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self
            .allowed_namespaces
            .iter()
            .find(|ns| !namespace_pattern().is_match(ns))
        {
            Some(ns) => Err(ConfigurationError::InvalidNamespace(ns.clone())),
            None => Ok(()),
        }
    }
}

/// Registry of stage constructors and injected model artifacts.
#[derive(Clone, Default)]
pub struct StageRegistry {
    allowed_namespaces: Vec<String>,
    constructors: IndexMap<String, StageConstructor>,
    models: IndexMap<String, Arc<dyn Predictor>>,
}

impl StageRegistry {
    /// Creates an empty registry with the given allowlist.
    #[must_use]
    pub fn new(allowed_namespaces: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed_namespaces: allowed_namespaces.into_iter().map(Into::into).collect(),
            constructors: IndexMap::new(),
            models: IndexMap::new(),
        }
    }

    /// Creates a registry from validated configuration, with the built-in
    /// stages registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the allowlist is invalid.
    pub fn from_config(config: &RegistryConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self::with_builtin_stages(config.allowed_namespaces.clone()))
    }

    /// Creates a registry with the built-in stages registered.
    #[must_use]
    pub fn with_builtin_stages(allowed_namespaces: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut registry = Self::new(allowed_namespaces);
        stages::register_builtins(&mut registry);
        registry
    }

    /// Registers a stage constructor under a qualified name.
    ///
    /// Registering does not bypass the allowlist: a name outside it is
    /// stored but never resolves.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(StageParams) -> Result<Stage, StageError> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    /// Registers an externally built model artifact under a key.
    pub fn register_model(&mut self, key: impl Into<String>, model: Arc<dyn Predictor>) {
        self.models.insert(key.into(), model);
    }

    /// Returns true if the name's namespace is inside the allowlist.
    #[must_use]
    pub fn is_allowed(&self, name: &str) -> bool {
        let namespace = namespace_of(name);
        !namespace.is_empty()
            && self.allowed_namespaces.iter().any(|allowed| {
                namespace == allowed
                    || namespace
                        .strip_prefix(allowed.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            })
    }

    /// Resolves a qualified name to its constructor.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStageError` if the name is outside the allowlist or
    /// not registered.
    pub fn resolve(&self, name: &str) -> Result<StageConstructor, UnknownStageError> {
        if !self.is_allowed(name) {
            return Err(UnknownStageError::disallowed(name, namespace_of(name)));
        }
        self.constructors
            .get(name)
            .cloned()
            .ok_or_else(|| UnknownStageError::not_registered(name))
    }

    /// Looks up an injected model artifact.
    #[must_use]
    pub fn model(&self, key: &str) -> Option<Arc<dyn Predictor>> {
        self.models.get(key).cloned()
    }

    /// Returns the allowlist.
    #[must_use]
    pub fn allowed_namespaces(&self) -> &[String] {
        &self.allowed_namespaces
    }

    /// Returns the registered names that currently resolve, in registration order.
    #[must_use]
    pub fn resolvable_names(&self) -> Vec<&str> {
        self.constructors
            .keys()
            .map(String::as_str)
            .filter(|name| self.is_allowed(name))
            .collect()
    }

    /// Returns true if a constructor is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Number of registered constructors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Returns true if no constructors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("allowed_namespaces", &self.allowed_namespaces)
            .field("constructor_count", &self.constructors.len())
            .field("model_count", &self.models.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::UnknownStageReason;
    use crate::stages::{FnPredictor, FnTransformer};
    use crate::core::Frame;

    fn identity(_params: StageParams) -> Result<Stage, StageError> {
        Ok(Stage::transformer(FnTransformer::new("Identity", Ok)))
    }

    #[test]
    fn test_qualified_name_syntax() {
        assert!(is_qualified_name("ns.Scaler"));
        assert!(is_qualified_name("preprocessing.extra.Scaler_2"));
        assert!(!is_qualified_name("Scaler"));
        assert!(!is_qualified_name("ns..Scaler"));
        assert!(!is_qualified_name("ns.Scaler()"));
        assert!(!is_qualified_name("1ns.Scaler"));
    }

    #[test]
    fn test_namespace_of() {
        assert_eq!(namespace_of("a.b.C"), "a.b");
        assert_eq!(namespace_of("C"), "");
    }

    #[test]
    fn test_resolve_registered_stage() {
        let mut registry = StageRegistry::new(["ns"]);
        registry.register("ns.Identity", identity);

        let ctor = registry.resolve("ns.Identity").unwrap();
        let stage = ctor(StageParams::default()).unwrap();
        assert_eq!(stage.name(), "Identity");
    }

    #[test]
    fn test_resolve_not_registered() {
        let registry = StageRegistry::new(["ns"]);
        let Err(err) = registry.resolve("ns.Missing") else {
            panic!("ns.Missing should not resolve");
        };
        assert_eq!(err.reason, UnknownStageReason::NotRegistered);
    }

    #[test]
    fn test_registered_but_disallowed_never_resolves() {
        let mut registry = StageRegistry::new(["ns"]);
        registry.register("os.System", identity);

        assert!(registry.contains("os.System"));
        let Err(err) = registry.resolve("os.System") else {
            panic!("os.System should not resolve");
        };
        assert_eq!(
            err.reason,
            UnknownStageReason::Disallowed {
                namespace: "os".to_string()
            }
        );
        assert!(registry.resolvable_names().is_empty());
    }

    #[test]
    fn test_allowlist_matches_namespace_prefix_only_on_dot() {
        let registry = StageRegistry::new(["preprocessing"]);
        assert!(registry.is_allowed("preprocessing.StandardScaler"));
        assert!(registry.is_allowed("preprocessing.extra.Scaler"));
        assert!(!registry.is_allowed("preprocessingx.Scaler"));
        assert!(!registry.is_allowed("Scaler"));
    }

    #[test]
    fn test_builtin_stages_resolve() {
        let registry = StageRegistry::with_builtin_stages(DEFAULT_NAMESPACES.iter().copied());
        for name in [
            "preprocessing.StandardScaler",
            "preprocessing.MinMaxScaler",
            "preprocessing.SimpleImputer",
            "preprocessing.Normalizer",
            "preprocessing.Binarizer",
            "feature_selection.SelectColumns",
            "feature_selection.DropColumns",
            "compose.FeatureUnion",
            "compose.Sequential",
            "decomposition.PCA",
            "linear_model.LinearRegression",
            "linear_model.LogisticRegression",
            "linear_model.ThresholdClassifier",
            "ensemble.VotingClassifier",
        ] {
            assert!(registry.resolve(name).is_ok(), "{name} should resolve");
        }
    }

    #[test]
    fn test_restricted_allowlist_hides_builtins() {
        let registry = StageRegistry::with_builtin_stages(["preprocessing"]);
        assert!(registry.resolve("preprocessing.StandardScaler").is_ok());
        assert!(registry.resolve("linear_model.LinearRegression").is_err());
    }

    #[test]
    fn test_models() {
        let mut registry = StageRegistry::new(["ns"]);
        let model: Arc<dyn Predictor> = Arc::new(FnPredictor::new("zeros", |f: &Frame| {
            Ok(vec![0.0; f.num_rows()])
        }));
        registry.register_model("vibration-v1", model);

        assert!(registry.model("vibration-v1").is_some());
        assert!(registry.model("other").is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(RegistryConfig::default().validate().is_ok());

        let bad = RegistryConfig::with_allowed_namespaces(["ok", "not ok"]);
        assert!(matches!(
            bad.validate(),
            Err(ConfigurationError::InvalidNamespace(ns)) if ns == "not ok"
        ));
        assert!(StageRegistry::from_config(&bad).is_err());
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: RegistryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.allowed_namespaces.len(), DEFAULT_NAMESPACES.len());
    }
}
