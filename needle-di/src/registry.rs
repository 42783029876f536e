//! Registry of [TypeDescriptor]s known to an injector. Descriptors generated by `#[injectable]`
//! are discovered automatically, unless static registration is disabled in the
//! [configuration](crate::config::InjectorConfig).

use crate::descriptor::internal::TypeRegisterer;
use crate::descriptor::{Constructible, TypeDescriptor};
use fxhash::FxHashMap;
use std::any::TypeId;
use std::sync::Arc;
use tracing::debug;

pub type TypeDescriptorPtr = Arc<TypeDescriptor>;

#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    descriptors: FxHashMap<TypeId, TypeDescriptorPtr>,
}

impl TypeRegistry {
    /// Creates a registry, optionally populated with all statically registered types.
    pub fn new(register_static_types: bool) -> Self {
        let mut registry = Self::default();
        if register_static_types {
            for registerer in inventory::iter::<TypeRegisterer> {
                registry.register((registerer.register)());
            }
        }

        registry
    }

    /// Adds a descriptor, replacing any previous one for the same type.
    pub fn register(&mut self, descriptor: TypeDescriptor) {
        debug!(type_name = descriptor.key.name, "Registering type descriptor");
        self.descriptors
            .insert(descriptor.key.id, Arc::new(descriptor));
    }

    /// Adds the descriptor of given type, unless already present.
    pub fn register_type<T: Constructible>(&mut self) {
        if !self.is_registered(TypeId::of::<T>()) {
            self.register(T::descriptor());
        }
    }

    #[inline]
    pub fn descriptor(&self, type_id: TypeId) -> Option<&TypeDescriptorPtr> {
        self.descriptors.get(&type_id)
    }

    #[inline]
    pub fn is_registered(&self, type_id: TypeId) -> bool {
        self.descriptors.contains_key(&type_id)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &TypeDescriptorPtr> {
        self.descriptors.values()
    }
}

#[cfg(test)]
mod tests {
    use crate::descriptor::{Constructible, TypeDescriptor};
    use crate::instance::{Injectable, InstanceAnyPtr, InstancePtr};
    use crate::registry::TypeRegistry;
    use crate::scope::ScopeKind;
    use std::any::TypeId;

    struct Sample;

    impl Injectable for Sample {
        fn downcast(instance: InstanceAnyPtr) -> Result<InstancePtr<Self>, InstanceAnyPtr> {
            instance.downcast()
        }

        fn into_any(instance: InstancePtr<Self>) -> InstanceAnyPtr {
            instance
        }
    }

    impl Constructible for Sample {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::new::<Self>(vec![]).with_scope(ScopeKind::Singleton)
        }
    }

    #[test]
    fn should_register_type_once() {
        let mut registry = TypeRegistry::new(false);
        assert!(!registry.is_registered(TypeId::of::<Sample>()));

        registry.register(TypeDescriptor::new::<Sample>(vec![]));
        registry.register_type::<Sample>();

        let descriptor = registry.descriptor(TypeId::of::<Sample>()).unwrap();
        assert!(descriptor.scope.is_none());
        assert_eq!(registry.descriptors().count(), 1);
    }

    #[test]
    fn should_replace_descriptor() {
        let mut registry = TypeRegistry::new(false);
        registry.register(TypeDescriptor::new::<Sample>(vec![]));
        registry.register(Sample::descriptor());

        assert_eq!(
            registry.descriptor(TypeId::of::<Sample>()).unwrap().scope,
            Some(ScopeKind::Singleton)
        );
    }
}
