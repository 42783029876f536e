//! Bindings map requested types to the way their instances are created, along with the scope
//! governing their lifetime.
//!
//! ```
//! use needle_di::binding::Binding;
//! use needle_di::instance::InstancePtr;
//! use needle_di::scope::ScopeKind;
//! use needle_di::{implements, injectable};
//!
//! #[injectable]
//! trait Clock {
//!     fn now(&self) -> u64;
//! }
//!
//! struct SystemClock;
//!
//! #[injectable]
//! impl SystemClock {
//!     fn new() -> Self {
//!         Self
//!     }
//! }
//!
//! #[implements]
//! impl Clock for SystemClock {
//!     fn now(&self) -> u64 {
//!         0
//!     }
//! }
//!
//! let by_type = Binding::bind::<dyn Clock + Send + Sync>()
//!     .to::<SystemClock>()
//!     .in_scope(ScopeKind::Singleton);
//! let fixed = Binding::bind::<SystemClock>().to_instance(InstancePtr::new(SystemClock));
//! ```

use crate::aop::InterceptionSurface;
use crate::descriptor::{Constructible, TypeDescriptor};
use crate::error::{BindingRegistryError, ResolutionError};
use crate::injector::Resolver;
use crate::instance::{Injectable, InstanceAnyPtr, InstancePtr, TypeKey, Upcast};
use crate::scope::ScopeKind;
use derivative::Derivative;
use fxhash::FxHashMap;
use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

pub type FactoryFn =
    Arc<dyn Fn(&Resolver<'_>) -> Result<InstanceAnyPtr, ResolutionError> + Send + Sync>;

/// Converts a constructed instance into the representation of the bound type. Returns the
/// instance back on type mismatch.
pub type UpcastFn = fn(InstanceAnyPtr) -> Result<InstanceAnyPtr, InstanceAnyPtr>;

/// How instances of a bound type are obtained.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub enum BindingStrategy {
    /// Construct a concrete type using its [TypeDescriptor].
    Type {
        target: TypeKey,
        #[derivative(Debug = "ignore")]
        descriptor: Option<fn() -> TypeDescriptor>,
        #[derivative(Debug = "ignore")]
        upcast: UpcastFn,
    },
    /// Call a user-supplied function.
    Factory(#[derivative(Debug = "ignore")] FactoryFn),
    /// Return a pre-built instance.
    Instance(#[derivative(Debug = "ignore")] InstanceAnyPtr),
}

#[derive(Clone, Debug)]
pub struct Binding {
    pub key: TypeKey,
    pub strategy: BindingStrategy,
    pub scope: ScopeKind,
    /// Interception surface of the bound type, if any.
    pub surface: Option<&'static InterceptionSurface>,
}

impl Binding {
    /// Starts binding given type.
    pub fn bind<I: Injectable + ?Sized>() -> BindingBuilder<I> {
        BindingBuilder {
            _phantom: PhantomData,
        }
    }

    pub fn in_scope(mut self, scope: ScopeKind) -> Self {
        self.scope = scope;
        self
    }

    /// Type whose aspects apply to instances created by this binding.
    pub fn target(&self) -> TypeKey {
        match &self.strategy {
            BindingStrategy::Type { target, .. } => *target,
            _ => self.key,
        }
    }

    fn implicit(descriptor: &TypeDescriptor) -> Self {
        Self {
            key: descriptor.key,
            strategy: BindingStrategy::Type {
                target: descriptor.key,
                descriptor: None,
                upcast: Ok,
            },
            scope: descriptor.scope.clone().unwrap_or_default(),
            surface: None,
        }
    }
}

pub struct BindingBuilder<I: ?Sized> {
    _phantom: PhantomData<fn(&I)>,
}

impl<I: Injectable + ?Sized> BindingBuilder<I> {
    /// Binds to a concrete implementation.
    pub fn to<C: Constructible + Upcast<I>>(self) -> Binding {
        self.with_strategy(BindingStrategy::Type {
            target: TypeKey::of::<C>(),
            descriptor: Some(C::descriptor as fn() -> TypeDescriptor),
            upcast: upcast::<I, C>,
        })
    }

    /// Binds to a function creating instances.
    pub fn to_factory<F>(self, factory: F) -> Binding
    where
        F: Fn(&Resolver<'_>) -> Result<InstancePtr<I>, ResolutionError> + Send + Sync + 'static,
    {
        self.with_strategy(BindingStrategy::Factory(Arc::new(move |resolver| {
            factory(resolver).map(I::into_any)
        })))
    }

    /// Binds to a pre-built instance.
    pub fn to_instance(self, instance: InstancePtr<I>) -> Binding {
        self.with_strategy(BindingStrategy::Instance(I::into_any(instance)))
    }

    fn with_strategy(self, strategy: BindingStrategy) -> Binding {
        Binding {
            key: TypeKey::of::<I>(),
            strategy,
            scope: ScopeKind::default(),
            surface: I::surface(),
        }
    }
}

impl<I: Constructible> BindingBuilder<I> {
    /// Binds the type to itself.
    pub fn to_self(self) -> Binding {
        self.with_strategy(BindingStrategy::Type {
            target: TypeKey::of::<I>(),
            descriptor: Some(I::descriptor as fn() -> TypeDescriptor),
            upcast: Ok,
        })
    }
}

fn upcast<I: Injectable + ?Sized, C: Injectable + Upcast<I>>(
    instance: InstanceAnyPtr,
) -> Result<InstanceAnyPtr, InstanceAnyPtr> {
    C::downcast(instance).map(|instance| I::into_any(C::upcast(instance)))
}

/// Bindings of an injector, read-only after the injector is built.
#[derive(Clone, Debug)]
pub struct BindingRegistry {
    bindings: FxHashMap<TypeId, Binding>,
    allow_binding_overriding: bool,
}

impl BindingRegistry {
    pub fn new(allow_binding_overriding: bool) -> Self {
        Self {
            bindings: Default::default(),
            allow_binding_overriding,
        }
    }

    /// Adds an explicit binding.
    pub fn register(&mut self, binding: Binding) -> Result<(), BindingRegistryError> {
        if !self.allow_binding_overriding && self.is_bound(binding.key.id) {
            return Err(BindingRegistryError::DuplicateBinding(binding.key.name));
        }

        debug!(type_name = binding.key.name, scope = %binding.scope, "Registering binding");
        self.bindings.insert(binding.key.id, binding);
        Ok(())
    }

    /// Binds a constructible type to itself, unless it's bound explicitly.
    pub fn register_implicit(&mut self, descriptor: &TypeDescriptor) {
        self.bindings
            .entry(descriptor.key.id)
            .or_insert_with(|| Binding::implicit(descriptor));
    }

    #[inline]
    pub fn binding(&self, type_id: TypeId) -> Option<&Binding> {
        self.bindings.get(&type_id)
    }

    #[inline]
    pub fn is_bound(&self, type_id: TypeId) -> bool {
        self.bindings.contains_key(&type_id)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }
}

#[cfg(test)]
mod tests {
    use crate::binding::{Binding, BindingRegistry, BindingStrategy};
    use crate::descriptor::{Constructible, TypeDescriptor};
    use crate::error::BindingRegistryError;
    use crate::instance::{Injectable, InstanceAnyPtr, InstancePtr, TypeKey, Upcast};
    use crate::scope::ScopeKind;
    use std::any::TypeId;

    trait Greeter: Send + Sync {
        fn greet(&self) -> &'static str;
    }

    impl Injectable for dyn Greeter + Send + Sync {
        fn downcast(instance: InstanceAnyPtr) -> Result<InstancePtr<Self>, InstanceAnyPtr> {
            instance
                .downcast::<InstancePtr<Self>>()
                .map(|instance| InstancePtr::clone(&*instance))
        }

        fn into_any(instance: InstancePtr<Self>) -> InstanceAnyPtr {
            InstancePtr::new(instance)
        }
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> &'static str {
            "hello"
        }
    }

    impl Injectable for English {
        fn downcast(instance: InstanceAnyPtr) -> Result<InstancePtr<Self>, InstanceAnyPtr> {
            instance.downcast()
        }

        fn into_any(instance: InstancePtr<Self>) -> InstanceAnyPtr {
            instance
        }
    }

    impl Constructible for English {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::new::<Self>(vec![]).with_scope(ScopeKind::Singleton)
        }
    }

    impl Upcast<dyn Greeter + Send + Sync> for English {
        fn upcast(instance: InstancePtr<Self>) -> InstancePtr<dyn Greeter + Send + Sync> {
            instance
        }
    }

    #[test]
    fn should_upcast_to_bound_type() {
        let binding = Binding::bind::<dyn Greeter + Send + Sync>().to::<English>();
        assert_eq!(binding.key, TypeKey::of::<dyn Greeter + Send + Sync>());
        assert_eq!(binding.target(), TypeKey::of::<English>());
        assert_eq!(binding.scope, ScopeKind::Prototype);

        let BindingStrategy::Type { upcast, .. } = binding.strategy else {
            panic!("expected a type binding");
        };

        let instance = upcast(InstancePtr::new(English) as InstanceAnyPtr).unwrap();
        let greeter = <dyn Greeter + Send + Sync>::downcast(instance).unwrap();
        assert_eq!(greeter.greet(), "hello");
    }

    #[test]
    fn should_reject_duplicate_binding() {
        let mut registry = BindingRegistry::new(false);
        registry
            .register(Binding::bind::<English>().to_self())
            .unwrap();

        assert_eq!(
            registry
                .register(Binding::bind::<English>().to_instance(InstancePtr::new(English)))
                .unwrap_err(),
            BindingRegistryError::DuplicateBinding(TypeKey::of::<English>().name)
        );
    }

    #[test]
    fn should_override_binding() {
        let mut registry = BindingRegistry::new(true);
        registry
            .register(Binding::bind::<English>().to_self())
            .unwrap();
        registry
            .register(
                Binding::bind::<English>()
                    .to_instance(InstancePtr::new(English))
                    .in_scope(ScopeKind::Singleton),
            )
            .unwrap();

        let binding = registry.binding(TypeId::of::<English>()).unwrap();
        assert!(matches!(binding.strategy, BindingStrategy::Instance(_)));
    }

    #[test]
    fn should_not_replace_explicit_binding_with_implicit() {
        let mut registry = BindingRegistry::new(false);
        registry
            .register(Binding::bind::<English>().to_self())
            .unwrap();
        registry.register_implicit(&English::descriptor());

        assert_eq!(
            registry.binding(TypeId::of::<English>()).unwrap().scope,
            ScopeKind::Prototype
        );
    }

    #[test]
    fn should_use_declared_scope_for_implicit_binding() {
        let mut registry = BindingRegistry::new(false);
        registry.register_implicit(&English::descriptor());

        assert_eq!(
            registry.binding(TypeId::of::<English>()).unwrap().scope,
            ScopeKind::Singleton
        );
    }
}
