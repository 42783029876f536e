//! Compile-time metadata describing how to construct a type. Descriptors are usually generated
//! by the `#[injectable]` attribute and registered statically, but can also be written by hand
//! and passed to [InjectorBuilder::with_type_descriptor](crate::injector::InjectorBuilder::with_type_descriptor).
//!
//! ## Declaring constructors
//!
//! Every associated function without a receiver, returning `Self` or `Result<Self, E>`, found in
//! an `#[injectable]` impl block is a constructor candidate. Which candidate gets used is decided
//! by [constructor filters](crate::constructor):
//!
//! ```
//! use needle_di::injectable;
//! use needle_di::instance::InstancePtr;
//!
//! struct Repository;
//!
//! #[injectable(scope = "singleton")]
//! impl Repository {
//!     fn new() -> Self {
//!         Self
//!     }
//! }
//!
//! struct Service {
//!     repository: InstancePtr<Repository>,
//!     retries: u8,
//! }
//!
//! #[injectable]
//! impl Service {
//!     #[default_constructor]
//!     fn new(repository: InstancePtr<Repository>, #[ignore] retries: u8) -> Self {
//!         Self { repository, retries }
//!     }
//!
//!     fn detached() -> Self {
//!         Self::new(InstancePtr::new(Repository), 3)
//!     }
//! }
//! ```
//!
//! ### Supported `#[injectable]` impl block configuration
//!
//! * `scope = "name"` - scope of the implicit self-binding; `prototype` by default
//! * `constructor = "name"` - always use the constructor with the given name
//!
//! ### Supported member attributes
//!
//! * `#[default_constructor]` - prefer this constructor, unless an explicit one is configured
//! * `#[inject]` - call given `&mut self` method after construction with resolved parameters
//! * `#[ignore]` (parameter) - pass `Default::default()`
//! * `#[scope_attr(name = "name")]` (parameter) - cache the value under given name in the global
//! scope; add `task` to use the task-local scope instead

use crate::error::{ConfigurationError, ResolutionError};
use crate::instance::{Injectable, InstanceAnyPtr, InstanceBox, InstancePtr, TypeKey};
use crate::scope::ScopeKind;
use derivative::Derivative;
use std::borrow::Cow;
use std::vec::IntoIter;

/// Value produced for a single parameter by the [parameter chain](crate::parameter).
#[derive(Clone, Debug)]
pub enum ResolvedArgument {
    Value(InstanceAnyPtr),
    Skipped,
}

/// Named scope attribute marker of a parameter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScopeAttribute {
    pub name: Cow<'static, str>,
    /// Use the task-local scope instead of the global one.
    pub task_local: bool,
}

impl ScopeAttribute {
    pub fn new(name: impl Into<Cow<'static, str>>, task_local: bool) -> Self {
        Self {
            name: name.into(),
            task_local,
        }
    }
}

/// Declarative markers attached to a parameter.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParameterMarkers {
    pub ignore: bool,
    pub scope_attribute: Option<ScopeAttribute>,
}

#[derive(Clone, Debug)]
pub struct ParameterDescriptor {
    pub name: &'static str,
    /// Type requested from the injector.
    pub type_key: TypeKey,
    /// Unknown types resolve to `None` instead of failing.
    pub optional: bool,
    pub markers: ParameterMarkers,
}

impl ParameterDescriptor {
    pub fn required<T: Injectable + ?Sized>(name: &'static str) -> Self {
        Self {
            name,
            type_key: TypeKey::of::<T>(),
            optional: false,
            markers: Default::default(),
        }
    }

    pub fn optional<T: Injectable + ?Sized>(name: &'static str) -> Self {
        Self {
            optional: true,
            ..Self::required::<T>(name)
        }
    }

    /// Parameter which always receives `Default::default()`.
    pub fn ignored<T: 'static>(name: &'static str) -> Self {
        Self {
            name,
            type_key: TypeKey::of::<T>(),
            optional: false,
            markers: ParameterMarkers {
                ignore: true,
                scope_attribute: None,
            },
        }
    }

    pub fn with_scope_attribute(mut self, scope_attribute: ScopeAttribute) -> Self {
        self.markers.scope_attribute = Some(scope_attribute);
        self
    }
}

/// Single constructor of a type.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ConstructorDescriptor {
    pub name: &'static str,
    pub parameters: Vec<ParameterDescriptor>,
    /// Carries the default-selection marker.
    pub is_default: bool,
    /// Creates the instance from arguments resolved for `parameters`, in order.
    #[derivative(Debug = "ignore")]
    pub construct: fn(Vec<ResolvedArgument>) -> Result<InstanceBox, ResolutionError>,
}

/// Method called with resolved parameters after construction.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct InjectionMethodDescriptor {
    pub name: &'static str,
    pub parameters: Vec<ParameterDescriptor>,
    #[derivative(Debug = "ignore")]
    pub inject: fn(&mut InstanceBox, Vec<ResolvedArgument>) -> Result<(), ResolutionError>,
}

/// Everything needed to construct a type.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct TypeDescriptor {
    pub key: TypeKey,
    pub constructors: Vec<ConstructorDescriptor>,
    pub injection_methods: Vec<InjectionMethodDescriptor>,
    /// Declared scope, used for the implicit self-binding.
    pub scope: Option<ScopeKind>,
    /// Name of the constructor to always use.
    pub explicit_constructor: Option<&'static str>,
    /// Shares a fully injected instance.
    #[derivative(Debug = "ignore")]
    pub finish: fn(InstanceBox) -> Result<InstanceAnyPtr, InstanceBox>,
}

impl TypeDescriptor {
    pub fn new<T: Injectable>(constructors: Vec<ConstructorDescriptor>) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            constructors,
            injection_methods: vec![],
            scope: None,
            explicit_constructor: None,
            finish: finish::<T>,
        }
    }

    pub fn with_injection_methods(mut self, injection_methods: Vec<InjectionMethodDescriptor>) -> Self {
        self.injection_methods = injection_methods;
        self
    }

    pub fn with_scope(mut self, scope: ScopeKind) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_explicit_constructor(mut self, name: &'static str) -> Self {
        self.explicit_constructor = Some(name);
        self
    }
}

fn finish<T: Injectable>(instance: InstanceBox) -> Result<InstanceAnyPtr, InstanceBox> {
    instance
        .downcast::<T>()
        .map(|instance| T::into_any(InstancePtr::new(*instance)))
}

/// Types which carry a [TypeDescriptor]. Typically generated by `#[injectable]`.
pub trait Constructible: Injectable + Sized {
    fn descriptor() -> TypeDescriptor;
}

/// Parameter types which can be injected.
pub trait Argument: Sized {
    fn descriptor(name: &'static str) -> ParameterDescriptor;

    fn from_resolved(
        owner: TypeKey,
        name: &'static str,
        argument: ResolvedArgument,
    ) -> Result<Self, ResolutionError>;
}

impl<T: Injectable + ?Sized> Argument for InstancePtr<T> {
    fn descriptor(name: &'static str) -> ParameterDescriptor {
        ParameterDescriptor::required::<T>(name)
    }

    fn from_resolved(
        owner: TypeKey,
        name: &'static str,
        argument: ResolvedArgument,
    ) -> Result<Self, ResolutionError> {
        let key = TypeKey::of::<T>();
        match argument {
            ResolvedArgument::Value(instance) => T::downcast(instance)
                .map_err(|_| ConfigurationError::IncompatibleInstance(key.name).into()),
            ResolvedArgument::Skipped => Err(ConfigurationError::UnresolvableParameter {
                type_name: owner.name,
                parameter: name,
                parameter_type: key.name,
            }
            .into()),
        }
    }
}

impl<T: Injectable + ?Sized> Argument for Option<InstancePtr<T>> {
    fn descriptor(name: &'static str) -> ParameterDescriptor {
        ParameterDescriptor::optional::<T>(name)
    }

    fn from_resolved(
        owner: TypeKey,
        name: &'static str,
        argument: ResolvedArgument,
    ) -> Result<Self, ResolutionError> {
        match argument {
            ResolvedArgument::Skipped => Ok(None),
            argument => InstancePtr::<T>::from_resolved(owner, name, argument).map(Some),
        }
    }
}

/// Sequential access to resolved arguments, used by generated constructors and injection methods.
pub struct Arguments {
    owner: TypeKey,
    arguments: IntoIter<ResolvedArgument>,
}

impl Arguments {
    pub fn new(owner: TypeKey, arguments: Vec<ResolvedArgument>) -> Self {
        Self {
            owner,
            arguments: arguments.into_iter(),
        }
    }

    /// Takes the next injected argument.
    pub fn next<A: Argument>(&mut self, name: &'static str) -> Result<A, ResolutionError> {
        let argument = self.take(name, A::descriptor(name).type_key)?;
        A::from_resolved(self.owner, name, argument)
    }

    /// Takes the next ignored argument.
    pub fn ignored<T: Default + 'static>(&mut self, name: &'static str) -> Result<T, ResolutionError> {
        self.take(name, TypeKey::of::<T>()).map(|_| T::default())
    }

    fn take(
        &mut self,
        name: &'static str,
        type_key: TypeKey,
    ) -> Result<ResolvedArgument, ResolutionError> {
        self.arguments.next().ok_or_else(|| {
            ConfigurationError::UnresolvableParameter {
                type_name: self.owner.name,
                parameter: name,
                parameter_type: type_key.name,
            }
            .into()
        })
    }
}

#[doc(hidden)]
pub mod internal {
    use crate::descriptor::TypeDescriptor;
    pub use inventory::submit;

    /// Statically registered [TypeDescriptor] source.
    pub struct TypeRegisterer {
        pub register: fn() -> TypeDescriptor,
    }

    inventory::collect!(TypeRegisterer);
}

#[cfg(test)]
mod tests {
    use crate::descriptor::{Arguments, ResolvedArgument, TypeDescriptor};
    use crate::error::{ConfigurationError, ResolutionError};
    use crate::instance::{Injectable, InstanceAnyPtr, InstanceBox, InstancePtr, TypeKey};

    #[derive(Debug, Default)]
    struct Dependency(u8);

    impl Injectable for Dependency {
        fn downcast(instance: InstanceAnyPtr) -> Result<InstancePtr<Self>, InstanceAnyPtr> {
            instance.downcast()
        }

        fn into_any(instance: InstancePtr<Self>) -> InstanceAnyPtr {
            instance
        }
    }

    struct Owner;

    #[test]
    fn should_read_arguments_in_order() {
        let mut arguments = Arguments::new(
            TypeKey::of::<Owner>(),
            vec![
                ResolvedArgument::Value(InstancePtr::new(Dependency(3)) as InstanceAnyPtr),
                ResolvedArgument::Skipped,
                ResolvedArgument::Skipped,
            ],
        );

        assert_eq!(
            arguments
                .next::<InstancePtr<Dependency>>("first")
                .unwrap()
                .0,
            3
        );
        assert!(arguments
            .next::<Option<InstancePtr<Dependency>>>("second")
            .unwrap()
            .is_none());
        assert_eq!(arguments.ignored::<u32>("third").unwrap(), 0);
    }

    #[test]
    fn should_reject_skipped_required_argument() {
        let mut arguments = Arguments::new(TypeKey::of::<Owner>(), vec![ResolvedArgument::Skipped]);

        assert!(matches!(
            arguments.next::<InstancePtr<Dependency>>("dependency"),
            Err(ResolutionError::Configuration(
                ConfigurationError::UnresolvableParameter {
                    parameter: "dependency",
                    ..
                }
            ))
        ));
    }

    #[test]
    fn should_reject_missing_argument() {
        let mut arguments = Arguments::new(TypeKey::of::<Owner>(), vec![]);
        assert!(arguments.ignored::<u8>("missing").is_err());
    }

    #[test]
    fn should_finish_constructed_instance() {
        let descriptor = TypeDescriptor::new::<Dependency>(vec![]);
        let instance = (descriptor.finish)(Box::new(Dependency(7)) as InstanceBox).unwrap();

        assert_eq!(Dependency::downcast(instance).unwrap().0, 7);
        assert!((descriptor.finish)(Box::new(5u8) as InstanceBox).is_err());
    }
}
