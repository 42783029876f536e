//! Instance pointers and the traits which let the engine move between typed and type-erased
//! instances.

use crate::aop::InterceptionSurface;
use crate::error::{ConfigurationError, ResolutionError};
use crate::scope::TaskToken;
use std::any::{type_name, Any, TypeId};
use std::error::Error;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub type InstancePtr<T> = Arc<T>;

/// Type-erased instance as stored in scopes. Concrete types are stored directly, while trait
/// objects are stored as `InstancePtr<InstancePtr<dyn Trait>>`.
pub type InstanceAnyPtr = InstancePtr<dyn Any + Send + Sync + 'static>;

/// Freshly constructed value, before post-construction injection and sharing.
pub type InstanceBox = Box<dyn Any + Send + Sync + 'static>;

/// Failure raised by user code: constructors, factories, intercepted methods and weavers.
pub type ErrorPtr = Arc<dyn Error + Send + Sync>;

/// Identity of an injectable type.
#[derive(Clone, Copy)]
pub struct TypeKey {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeKey {
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

impl PartialEq for TypeKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for TypeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Marker and conversion trait for types which can be requested from the injector: concrete
/// types with an `#[injectable]` impl block and `dyn Trait + Send + Sync` surfaces of
/// `#[injectable]`/`#[intercepted]` traits. Typically implemented by generated code.
pub trait Injectable: 'static {
    /// Recovers the typed pointer from a type-erased instance. Returns the instance back on type
    /// mismatch.
    fn downcast(instance: InstanceAnyPtr) -> Result<InstancePtr<Self>, InstanceAnyPtr>;

    /// Erases the type of given instance.
    fn into_any(instance: InstancePtr<Self>) -> InstanceAnyPtr;

    /// Interception surface of this type, if it can be proxied.
    fn surface() -> Option<&'static InterceptionSurface> {
        None
    }
}

/// Conversion of a concrete instance into a trait surface it implements. Generated by
/// `#[implements]`.
pub trait Upcast<I: ?Sized>: Sized {
    fn upcast(instance: InstancePtr<Self>) -> InstancePtr<I>;
}

/// Generic provider for instances.
pub trait InstanceProvider {
    /// Returns an instance of the given type, resolved on behalf of the given task.
    fn instance(&self, task: TaskToken, key: TypeKey) -> Result<InstanceAnyPtr, ResolutionError>;
}

/// Helper trait for [InstanceProvider] providing strongly-typed access.
pub trait TypedInstanceProvider {
    /// Typesafe version of [InstanceProvider::instance].
    fn instance_typed<T: Injectable + ?Sized>(
        &self,
        task: TaskToken,
    ) -> Result<InstancePtr<T>, ResolutionError>;
}

impl<P: InstanceProvider + ?Sized> TypedInstanceProvider for P {
    fn instance_typed<T: Injectable + ?Sized>(
        &self,
        task: TaskToken,
    ) -> Result<InstancePtr<T>, ResolutionError> {
        let key = TypeKey::of::<T>();
        self.instance(task, key).and_then(|instance| {
            T::downcast(instance)
                .map_err(|_| ConfigurationError::IncompatibleInstance(key.name).into())
        })
    }
}
