//! Resolution of constructor and injection method parameters. Every parameter goes through an
//! ordered chain of [ParameterHandler]s, each of which either produces a value, deliberately skips
//! the parameter, or defers to the next handler. Built-in handlers, in order:
//!
//! 1. [IgnoreHandler] - skips parameters marked with `#[ignore]`
//! 2. [ScopeAttributeHandler] - caches values of `#[scope_attr]` parameters under their name
//! 3. custom handlers registered with the injector builder
//! 4. [DefaultParameterHandler] - asks the injector for an instance of the parameter type
//!
//! Exhausting the chain is a [ConfigurationError::UnresolvableParameter].

use crate::descriptor::{ParameterDescriptor, ResolvedArgument};
use crate::error::{ConfigurationError, ResolutionError};
use crate::injector::Injector;
use crate::instance::{InstanceAnyPtr, TypeKey};
use crate::resolution::ResolutionContext;
use crate::scope::{ScopeKey, ScopedInstance};
use std::sync::Arc;
use tracing::trace;

pub type ParameterHandlerPtr = Arc<dyn ParameterHandler + Send + Sync>;

/// Outcome of a single [ParameterHandler].
#[derive(Clone, Debug)]
pub enum ParameterOutcome {
    Handled(InstanceAnyPtr),
    /// A value created for this parameter, which hands the ownership of its proxy runtime (if any)
    /// to whoever keeps the value.
    Created(ScopedInstance),
    /// The parameter deliberately receives no value.
    Skipped,
    /// The parameter is not a concern of given handler.
    Deferred,
}

/// Parameter being resolved, along with the type declaring it.
#[derive(Clone, Copy, Debug)]
pub struct ParameterRequest<'a> {
    pub owner: TypeKey,
    pub parameter: &'a ParameterDescriptor,
}

pub trait ParameterHandler {
    /// Tries to resolve given parameter. `chain` contains the handlers following this one, which
    /// can be used to delegate value creation.
    fn handle(
        &self,
        request: &ParameterRequest<'_>,
        chain: &ParameterChain<'_>,
    ) -> Result<ParameterOutcome, ResolutionError>;
}

/// Remaining part of the handler chain for a single resolution call.
#[derive(Clone, Copy)]
pub struct ParameterChain<'a> {
    handlers: &'a [ParameterHandlerPtr],
    injector: &'a Injector,
    context: &'a ResolutionContext,
}

impl<'a> ParameterChain<'a> {
    pub fn new(
        handlers: &'a [ParameterHandlerPtr],
        injector: &'a Injector,
        context: &'a ResolutionContext,
    ) -> Self {
        Self {
            handlers,
            injector,
            context,
        }
    }

    #[inline]
    pub fn injector(&self) -> &'a Injector {
        self.injector
    }

    #[inline]
    pub fn context(&self) -> &'a ResolutionContext {
        self.context
    }

    /// Runs the remaining handlers until one of them produces a value or skips the parameter.
    pub fn proceed(
        &self,
        request: &ParameterRequest<'_>,
    ) -> Result<ParameterOutcome, ResolutionError> {
        for (index, handler) in self.handlers.iter().enumerate() {
            let rest = Self {
                handlers: &self.handlers[index + 1..],
                ..*self
            };

            match handler.handle(request, &rest)? {
                ParameterOutcome::Deferred => continue,
                outcome => return Ok(outcome),
            }
        }

        Ok(ParameterOutcome::Deferred)
    }

    /// Like [ParameterChain::proceed], but treats an exhausted chain as an error.
    pub fn resolve(
        &self,
        request: &ParameterRequest<'_>,
    ) -> Result<ResolvedArgument, ResolutionError> {
        Ok(match self.resolve_scoped(request)? {
            Some(created) => ResolvedArgument::Value(created.instance),
            None => ResolvedArgument::Skipped,
        })
    }

    /// Like [ParameterChain::resolve], but keeps the proxy runtime of a newly created value, so the
    /// caller can take over its teardown. Returns `None` for skipped parameters.
    pub fn resolve_scoped(
        &self,
        request: &ParameterRequest<'_>,
    ) -> Result<Option<ScopedInstance>, ResolutionError> {
        match self.proceed(request)? {
            ParameterOutcome::Handled(instance) => Ok(Some(ScopedInstance::new(instance))),
            ParameterOutcome::Created(created) => Ok(Some(created)),
            ParameterOutcome::Skipped => Ok(None),
            ParameterOutcome::Deferred => Err(unresolvable(request).into()),
        }
    }
}

fn unresolvable(request: &ParameterRequest<'_>) -> ConfigurationError {
    ConfigurationError::UnresolvableParameter {
        type_name: request.owner.name,
        parameter: request.parameter.name,
        parameter_type: request.parameter.type_key.name,
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IgnoreHandler;

impl ParameterHandler for IgnoreHandler {
    fn handle(
        &self,
        request: &ParameterRequest<'_>,
        _chain: &ParameterChain<'_>,
    ) -> Result<ParameterOutcome, ResolutionError> {
        Ok(if request.parameter.markers.ignore {
            trace!(
                type_name = request.owner.name,
                parameter = request.parameter.name,
                "Skipping ignored parameter"
            );
            ParameterOutcome::Skipped
        } else {
            ParameterOutcome::Deferred
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ScopeAttributeHandler;

impl ParameterHandler for ScopeAttributeHandler {
    fn handle(
        &self,
        request: &ParameterRequest<'_>,
        chain: &ParameterChain<'_>,
    ) -> Result<ParameterOutcome, ResolutionError> {
        let Some(attribute) = &request.parameter.markers.scope_attribute else {
            return Ok(ParameterOutcome::Deferred);
        };

        let scope = chain
            .injector()
            .attribute_scope(attribute.task_local, chain.context());
        let key = ScopeKey::Attribute(attribute.name.clone());

        if let Some(instance) = scope.instance(&key) {
            trace!(
                type_name = request.owner.name,
                parameter = request.parameter.name,
                attribute = %attribute.name,
                "Using cached scope attribute"
            );
            return Ok(ParameterOutcome::Handled(instance));
        }

        // the value is created by the supplier, so shared stores create it once under their
        // creation lock and keep the teardown of a created proxy
        let mut skipped = false;
        let stored = scope.register_if_absent(key, &mut || match chain.resolve_scoped(request)? {
            Some(created) => Ok(created),
            None => {
                skipped = true;
                Err(unresolvable(request).into())
            }
        });

        if skipped {
            return Ok(ParameterOutcome::Skipped);
        }

        stored.map(ParameterOutcome::Handled)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultParameterHandler;

impl ParameterHandler for DefaultParameterHandler {
    fn handle(
        &self,
        request: &ParameterRequest<'_>,
        chain: &ParameterChain<'_>,
    ) -> Result<ParameterOutcome, ResolutionError> {
        let type_key = request.parameter.type_key;
        if chain.injector().can_resolve(type_key.id) {
            return chain
                .injector()
                .resolve_scoped(type_key, chain.context())
                .map(ParameterOutcome::Created);
        }

        Ok(if request.parameter.optional {
            trace!(
                type_name = request.owner.name,
                parameter = request.parameter.name,
                "Skipping unknown optional parameter"
            );
            ParameterOutcome::Skipped
        } else {
            ParameterOutcome::Deferred
        })
    }
}

/// Creates the full handler chain with given custom handlers.
pub fn handler_chain(custom_handlers: Vec<ParameterHandlerPtr>) -> Vec<ParameterHandlerPtr> {
    let mut handlers: Vec<ParameterHandlerPtr> =
        vec![Arc::new(IgnoreHandler), Arc::new(ScopeAttributeHandler)];
    handlers.extend(custom_handlers);
    handlers.push(Arc::new(DefaultParameterHandler));
    handlers
}
