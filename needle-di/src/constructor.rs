//! Constructor selection. A type can declare multiple constructors, and an ordered chain of
//! [ConstructorFilter]s decides which one gets used. Each filter either selects a constructor,
//! defers to the next filter, or fails. Built-in filters, in order:
//!
//! 1. [ExplicitConstructorFilter] - uses the constructor named by `#[injectable(constructor = "...")]`
//! 2. [DefaultMarkerFilter] - uses the constructor marked with `#[default_constructor]`
//! 3. custom filters registered with the injector builder
//! 4. [FallbackConstructorFilter] - uses the only constructor, or the one without parameters

use crate::descriptor::{ConstructorDescriptor, TypeDescriptor};
use crate::error::ConfigurationError;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use tracing::trace;

pub type ConstructorFilterPtr = Arc<dyn ConstructorFilter + Send + Sync>;

/// Outcome of a single [ConstructorFilter].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConstructorChoice {
    /// Index of the selected constructor.
    Selected(usize),
    Deferred,
}

#[cfg_attr(test, automock)]
pub trait ConstructorFilter {
    fn filter(&self, descriptor: &TypeDescriptor) -> Result<ConstructorChoice, ConfigurationError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ExplicitConstructorFilter;

impl ConstructorFilter for ExplicitConstructorFilter {
    fn filter(&self, descriptor: &TypeDescriptor) -> Result<ConstructorChoice, ConfigurationError> {
        let Some(name) = descriptor.explicit_constructor else {
            return Ok(ConstructorChoice::Deferred);
        };

        descriptor
            .constructors
            .iter()
            .position(|constructor| constructor.name == name)
            .map(ConstructorChoice::Selected)
            .ok_or(ConfigurationError::MissingExplicitConstructor {
                type_name: descriptor.key.name,
                constructor: name,
            })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultMarkerFilter;

impl ConstructorFilter for DefaultMarkerFilter {
    fn filter(&self, descriptor: &TypeDescriptor) -> Result<ConstructorChoice, ConfigurationError> {
        let mut marked = descriptor
            .constructors
            .iter()
            .enumerate()
            .filter(|(_, constructor)| constructor.is_default);

        match (marked.next(), marked.next()) {
            (None, _) => Ok(ConstructorChoice::Deferred),
            (Some((index, _)), None) => Ok(ConstructorChoice::Selected(index)),
            (Some(_), Some(_)) => Err(ConfigurationError::AmbiguousConstructor {
                type_name: descriptor.key.name,
                candidates: descriptor
                    .constructors
                    .iter()
                    .filter(|constructor| constructor.is_default)
                    .map(|constructor| constructor.name)
                    .collect(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FallbackConstructorFilter;

impl ConstructorFilter for FallbackConstructorFilter {
    fn filter(&self, descriptor: &TypeDescriptor) -> Result<ConstructorChoice, ConfigurationError> {
        match descriptor.constructors.as_slice() {
            [] => Err(ConfigurationError::NoConstructor(descriptor.key.name)),
            [_] => Ok(ConstructorChoice::Selected(0)),
            constructors => constructors
                .iter()
                .position(|constructor| constructor.parameters.is_empty())
                .map(ConstructorChoice::Selected)
                .ok_or_else(|| ConfigurationError::AmbiguousConstructor {
                    type_name: descriptor.key.name,
                    candidates: constructors
                        .iter()
                        .map(|constructor| constructor.name)
                        .collect(),
                }),
        }
    }
}

/// Runs the filter chain.
#[derive(Clone)]
pub struct ConstructorSelector {
    filters: Vec<ConstructorFilterPtr>,
}

impl ConstructorSelector {
    /// Creates a selector with built-in filters surrounding the given custom ones.
    pub fn new(custom_filters: Vec<ConstructorFilterPtr>) -> Self {
        let mut filters: Vec<ConstructorFilterPtr> = vec![
            Arc::new(ExplicitConstructorFilter),
            Arc::new(DefaultMarkerFilter),
        ];
        filters.extend(custom_filters);
        filters.push(Arc::new(FallbackConstructorFilter));

        Self { filters }
    }

    pub fn select<'a>(
        &self,
        descriptor: &'a TypeDescriptor,
    ) -> Result<&'a ConstructorDescriptor, ConfigurationError> {
        for filter in &self.filters {
            if let ConstructorChoice::Selected(index) = filter.filter(descriptor)? {
                let constructor = descriptor.constructors.get(index).ok_or(
                    ConfigurationError::InvalidConstructorChoice {
                        type_name: descriptor.key.name,
                        index,
                        count: descriptor.constructors.len(),
                    },
                )?;

                trace!(
                    type_name = descriptor.key.name,
                    constructor = constructor.name,
                    "Selected constructor"
                );
                return Ok(constructor);
            }
        }

        Err(ConfigurationError::AmbiguousConstructor {
            type_name: descriptor.key.name,
            candidates: descriptor
                .constructors
                .iter()
                .map(|constructor| constructor.name)
                .collect(),
        })
    }
}

impl Default for ConstructorSelector {
    fn default() -> Self {
        Self::new(vec![])
    }
}
