use crate::instance::ErrorPtr;
use config::ConfigError;
use itertools::Itertools;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error;

/// Misconfiguration detected while resolving an instance.
#[derive(Error, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum ConfigurationError {
    #[error("Cannot choose a constructor for {type_name} - candidates: {}", .candidates.iter().join(", "))]
    AmbiguousConstructor {
        type_name: &'static str,
        candidates: Vec<&'static str>,
    },
    #[error("Type {0} declares no constructors")]
    NoConstructor(&'static str),
    #[error("Explicitly selected constructor {constructor} is not declared by {type_name}")]
    MissingExplicitConstructor {
        type_name: &'static str,
        constructor: &'static str,
    },
    #[error("Constructor filter selected constructor #{index} of {type_name}, which declares {count}")]
    InvalidConstructorChoice {
        type_name: &'static str,
        index: usize,
        count: usize,
    },
    #[error("Cannot resolve parameter '{parameter}' of type {parameter_type} for {type_name}")]
    UnresolvableParameter {
        type_name: &'static str,
        parameter: &'static str,
        parameter_type: &'static str,
    },
    #[error("Neither a binding nor a constructor is registered for {0}")]
    UnknownType(&'static str),
    #[error("Unrecognized scope: {0}")]
    UnrecognizedScope(String),
    #[error("Instance is not compatible with requested type {0}")]
    IncompatibleInstance(&'static str),
}

/// Errors related to wrapping instances in interception proxies.
#[derive(Error, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum ProxyGenerationError {
    #[error("{type_name} has aspects attached, but is exposed as {exposed_as} which cannot be intercepted")]
    NotExtensible {
        type_name: &'static str,
        exposed_as: &'static str,
    },
    #[error("Interception surface {surface} cannot wrap an instance of {type_name}")]
    IncompatibleSurface {
        type_name: &'static str,
        surface: &'static str,
    },
}

/// Errors returned to the caller of the injector.
#[derive(Error, Clone, Debug)]
pub enum ResolutionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("Circular dependency found: {}", .path.iter().join(" -> "))]
    CircularDependency { path: Vec<&'static str> },
    #[error("Error constructing {type_name}: {source}")]
    ConstructionFailed {
        type_name: &'static str,
        source: ErrorPtr,
    },
    #[error(transparent)]
    ProxyGeneration(#[from] ProxyGenerationError),
}

impl ResolutionError {
    /// Wraps a failure raised by user code while constructing or injecting given type.
    pub fn construction_failed<E: Error + Send + Sync + 'static>(
        type_name: &'static str,
        error: E,
    ) -> Self {
        Self::ConstructionFailed {
            type_name,
            source: Arc::new(error) as ErrorPtr,
        }
    }
}

/// Failures produced by the interception runtime itself, as opposed to the ones raised by
/// intercepted methods or weavers.
#[derive(Error, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum InterceptionError {
    #[error("Method {method} completed without a result - a weaver suppressed a failure without providing one")]
    MissingResult { method: &'static str },
    #[error("Result of method {method} has been replaced with an incompatible value")]
    ResultTypeMismatch { method: &'static str },
    #[error("Argument {index} of method {method} has been replaced with an incompatible value")]
    ArgumentTypeMismatch { method: &'static str, index: usize },
    #[error("Argument {index} of method {method} is missing")]
    MissingArgument { method: &'static str, index: usize },
}

/// Error related to binding registries.
#[derive(Error, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum BindingRegistryError {
    #[error("Attempted to re-bind type: {0}")]
    DuplicateBinding(&'static str),
}

/// Errors which can occur when building an [Injector](crate::injector::Injector).
#[derive(Error, Debug)]
pub enum InjectorBuildError {
    #[error("Error loading injector configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Binding(#[from] BindingRegistryError),
}
