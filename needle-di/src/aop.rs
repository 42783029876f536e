//! Method interception. Instances exposed through an `#[intercepted]` trait can be wrapped in a
//! generated proxy, which routes calls of matched methods through [Weaver]s attached to the
//! concrete type with [AspectDescriptor]s.
//!
//! ```
//! use needle_di::aop::{matcher, AspectDescriptor, JoinPoint, Weaver};
//! use needle_di::instance::ErrorPtr;
//! use needle_di::{implements, injectable, intercepted};
//! use std::sync::Arc;
//!
//! #[intercepted]
//! trait Greeter {
//!     fn greet(&self, name: String) -> Result<String, ErrorPtr>;
//! }
//!
//! struct PoliteGreeter;
//!
//! #[injectable]
//! impl PoliteGreeter {
//!     fn new() -> Self {
//!         Self
//!     }
//! }
//!
//! #[implements]
//! impl Greeter for PoliteGreeter {
//!     fn greet(&self, name: String) -> Result<String, ErrorPtr> {
//!         Ok(format!("Hello, {name}"))
//!     }
//! }
//!
//! struct Shouting;
//!
//! impl Weaver for Shouting {
//!     fn do_before(&self, _point: &mut JoinPoint) {}
//!
//!     fn do_after(&self, point: &mut JoinPoint) {
//!         if let Some(greeting) = point.return_value::<String>().map(|value| value.to_uppercase()) {
//!             point.set_return(greeting);
//!         }
//!     }
//! }
//!
//! let aspect = AspectDescriptor::of::<PoliteGreeter, _>(Arc::new(Shouting), matcher::any_method());
//! ```
//!
//! Dispatch of a single intercepted call:
//!
//! 1. [Weaver::do_before] of every matching weaver, in registration order, until one of them sets
//! a result or a failure
//! 2. the real method, unless short-circuited
//! 3. in reverse order over weavers which took part in step 1: [Weaver::do_exception] when a
//! failure is pending, [Weaver::do_after] otherwise
//!
//! [Weaver::do_destroy] is called once per proxy, when the scope owning it is disposed.

mod plan;
mod runtime;

pub use plan::{InterceptedCallPlan, ProxyFactory};
pub use runtime::ProxyRuntime;

use crate::instance::{ErrorPtr, Injectable, InstanceAnyPtr, InstancePtr, TypeKey};
use derivative::Derivative;
use derive_more::Constructor;
#[cfg(test)]
use mockall::automock;
use std::any::Any;
use std::mem;
use std::sync::Arc;

pub type WeaverPtr = Arc<dyn Weaver + Send + Sync>;

pub type MethodMatcherPtr = Arc<dyn MethodMatcher + Send + Sync>;

/// Type-erased method argument.
pub type ArgumentValue = Box<dyn Any + Send>;

/// Type-erased successful method result.
pub type ResultValue = Box<dyn Any + Send>;

/// Wraps an instance of an `#[intercepted]` trait in its proxy. Returns the instance back if it
/// isn't an instance of the trait.
pub type WrapFn = fn(InstanceAnyPtr, Arc<ProxyRuntime>) -> Result<InstanceAnyPtr, InstanceAnyPtr>;

/// Interceptable method of an `#[intercepted]` trait.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct MethodDescriptor {
    /// Position in [InterceptionSurface::methods].
    pub index: usize,
    pub name: &'static str,
    pub parameters: &'static [&'static str],
    pub return_type: &'static str,
}

/// Methods of a trait, along with the function wrapping trait instances in a generated proxy.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct InterceptionSurface {
    pub name: &'static str,
    pub methods: &'static [MethodDescriptor],
    #[derivative(Debug = "ignore")]
    pub wrap: WrapFn,
}

/// State of a single intercepted call.
#[derive(Debug)]
pub struct JoinPoint {
    method: &'static MethodDescriptor,
    target: InstanceAnyPtr,
    arguments: Vec<ArgumentValue>,
    result: Option<ResultValue>,
    exception: Option<ErrorPtr>,
}

impl JoinPoint {
    pub fn new(
        method: &'static MethodDescriptor,
        target: InstanceAnyPtr,
        arguments: Vec<ArgumentValue>,
    ) -> Self {
        Self {
            method,
            target,
            arguments,
            result: None,
            exception: None,
        }
    }

    #[inline]
    pub fn method(&self) -> &'static MethodDescriptor {
        self.method
    }

    /// The real instance behind the proxy.
    #[inline]
    pub fn target(&self) -> &InstanceAnyPtr {
        &self.target
    }

    /// Typed access to the real instance, e.g. `point.target_as::<dyn Trait + Send + Sync>()`.
    pub fn target_as<T: Injectable + ?Sized>(&self) -> Option<InstancePtr<T>> {
        T::downcast(self.target.clone()).ok()
    }

    /// Call arguments. Empty after the real method has been invoked, since they are moved into it.
    #[inline]
    pub fn arguments(&self) -> &[ArgumentValue] {
        &self.arguments
    }

    pub fn argument<T: 'static>(&self, index: usize) -> Option<&T> {
        self.arguments
            .get(index)
            .and_then(|argument| argument.downcast_ref())
    }

    /// Replaces an argument before the call. Returns `false` if there's no such argument.
    pub fn set_argument<T: Any + Send>(&mut self, index: usize, value: T) -> bool {
        match self.arguments.get_mut(index) {
            Some(argument) => {
                *argument = Box::new(value);
                true
            }
            None => false,
        }
    }

    pub fn return_value<T: 'static>(&self) -> Option<&T> {
        self.result.as_ref().and_then(|result| result.downcast_ref())
    }

    /// Sets the call result. Setting it in [Weaver::do_before] prevents the real method from being
    /// called.
    pub fn set_return<T: Any + Send>(&mut self, value: T) {
        self.result = Some(Box::new(value));
    }

    #[inline]
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    #[inline]
    pub fn exception(&self) -> Option<&ErrorPtr> {
        self.exception.as_ref()
    }

    /// Fails the call. Setting a failure in [Weaver::do_before] prevents the real method from being
    /// called.
    pub fn set_exception(&mut self, exception: ErrorPtr) {
        self.result = None;
        self.exception = Some(exception);
    }

    #[inline]
    pub(crate) fn is_completed(&self) -> bool {
        self.result.is_some() || self.exception.is_some()
    }

    pub(crate) fn clear_exception(&mut self) {
        self.exception = None;
    }

    pub(crate) fn take_arguments(&mut self) -> Vec<ArgumentValue> {
        mem::take(&mut self.arguments)
    }

    pub(crate) fn into_outcome(self) -> (Option<ResultValue>, Option<ErrorPtr>) {
        (self.result, self.exception)
    }
}

/// Strategy intercepting calls of proxied methods. Only [Weaver::do_before] is required - the
/// remaining hooks default to passing the result through, rethrowing failures and doing nothing on
/// destruction.
#[cfg_attr(test, automock)]
pub trait Weaver {
    /// Called before the real method. Can inspect and replace arguments, or set a result or
    /// failure to skip the real method.
    fn do_before(&self, point: &mut JoinPoint);

    /// Called after a successful call. Can replace the result.
    fn do_after(&self, point: &mut JoinPoint) {
        let _ = point;
    }

    /// Called when the call failed. Returning `Ok` suppresses the failure, in which case a
    /// substitute result should be set. Returning `Err` raises the given failure.
    fn do_exception(&self, point: &mut JoinPoint) -> Result<(), ErrorPtr> {
        match point.exception() {
            Some(exception) => Err(exception.clone()),
            None => Ok(()),
        }
    }

    /// Called once, when the proxied instance is disposed by its scope.
    fn do_destroy(&self, target: &InstanceAnyPtr) {
        let _ = target;
    }
}

/// Selects methods to intercept. Evaluated once per type and interception surface.
pub trait MethodMatcher {
    fn matches(&self, target: &TypeKey, method: &MethodDescriptor) -> bool;
}

impl<F: Fn(&TypeKey, &MethodDescriptor) -> bool> MethodMatcher for F {
    #[inline]
    fn matches(&self, target: &TypeKey, method: &MethodDescriptor) -> bool {
        self(target, method)
    }
}

pub mod matcher {
    use crate::aop::{MethodDescriptor, MethodMatcher};
    use crate::instance::TypeKey;

    /// Matches all methods.
    pub fn any_method() -> impl MethodMatcher + Send + Sync + 'static {
        |_: &TypeKey, _: &MethodDescriptor| true
    }

    /// Matches methods with given names.
    pub fn methods_named(
        names: &'static [&'static str],
    ) -> impl MethodMatcher + Send + Sync + 'static {
        move |_: &TypeKey, method: &MethodDescriptor| names.contains(&method.name)
    }
}

/// Attaches a [Weaver] to methods of a concrete type selected by a [MethodMatcher].
#[derive(Derivative, Constructor, Clone)]
#[derivative(Debug)]
pub struct AspectDescriptor {
    pub target: TypeKey,
    #[derivative(Debug = "ignore")]
    pub weaver: WeaverPtr,
    #[derivative(Debug = "ignore")]
    pub matcher: MethodMatcherPtr,
}

impl AspectDescriptor {
    pub fn of<T: ?Sized + 'static, M: MethodMatcher + Send + Sync + 'static>(
        weaver: WeaverPtr,
        matcher: M,
    ) -> Self {
        Self::new(TypeKey::of::<T>(), weaver, Arc::new(matcher))
    }
}

/// Helpers for generated proxies.
#[doc(hidden)]
pub mod internal {
    use crate::aop::ArgumentValue;
    use crate::error::InterceptionError;
    use crate::instance::ErrorPtr;
    use std::sync::Arc;
    use std::vec::IntoIter;

    /// Sequential access to arguments passed to the real method.
    pub struct MethodArguments {
        method: &'static str,
        arguments: IntoIter<ArgumentValue>,
        index: usize,
    }

    impl MethodArguments {
        pub fn new(method: &'static str, arguments: Vec<ArgumentValue>) -> Self {
            Self {
                method,
                arguments: arguments.into_iter(),
                index: 0,
            }
        }

        pub fn next<T: 'static>(&mut self) -> Result<T, ErrorPtr> {
            let index = self.index;
            self.index += 1;

            let argument = self.arguments.next().ok_or_else(|| {
                Arc::new(InterceptionError::MissingArgument {
                    method: self.method,
                    index,
                }) as ErrorPtr
            })?;

            argument.downcast::<T>().map(|argument| *argument).map_err(|_| {
                Arc::new(InterceptionError::ArgumentTypeMismatch {
                    method: self.method,
                    index,
                }) as ErrorPtr
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::aop::internal::MethodArguments;
    use crate::aop::{matcher, ArgumentValue, JoinPoint, MethodDescriptor, MethodMatcher, Weaver};
    use crate::error::InterceptionError;
    use crate::instance::{ErrorPtr, InstanceAnyPtr, InstancePtr, TypeKey};
    use std::sync::Arc;

    static GREET: MethodDescriptor = MethodDescriptor {
        index: 0,
        name: "greet",
        parameters: &["name"],
        return_type: "String",
    };

    static FAREWELL: MethodDescriptor = MethodDescriptor {
        index: 1,
        name: "farewell",
        parameters: &[],
        return_type: "String",
    };

    struct BeforeOnly;

    impl Weaver for BeforeOnly {
        fn do_before(&self, _point: &mut JoinPoint) {}
    }

    fn point() -> JoinPoint {
        JoinPoint::new(
            &GREET,
            InstancePtr::new(()) as InstanceAnyPtr,
            vec![Box::new("world".to_string()) as ArgumentValue],
        )
    }

    #[test]
    fn should_replace_arguments() {
        let mut point = point();
        assert_eq!(point.argument::<String>(0).unwrap(), "world");
        assert!(point.argument::<u8>(0).is_none());

        assert!(point.set_argument(0, "rust".to_string()));
        assert!(!point.set_argument(1, 5u8));
        assert_eq!(point.argument::<String>(0).unwrap(), "rust");
    }

    #[test]
    fn should_clear_result_on_exception() {
        let mut point = point();
        point.set_return(5u8);
        assert_eq!(point.return_value::<u8>(), Some(&5));

        point.set_exception(Arc::new(InterceptionError::MissingResult { method: "greet" }));
        assert!(!point.has_result());
        assert!(point.exception().is_some());
    }

    #[test]
    fn should_provide_before_only_defaults() {
        let weaver = BeforeOnly;
        let mut point = point();
        point.set_return(1u8);

        weaver.do_after(&mut point);
        assert_eq!(point.return_value::<u8>(), Some(&1));
        assert!(weaver.do_exception(&mut point).is_ok());

        let exception: ErrorPtr = Arc::new(InterceptionError::MissingResult { method: "greet" });
        point.set_exception(exception.clone());
        assert!(Arc::ptr_eq(
            &weaver.do_exception(&mut point).unwrap_err(),
            &exception
        ));
    }

    #[test]
    fn should_match_methods() {
        let target = TypeKey::of::<()>();

        assert!(matcher::any_method().matches(&target, &FAREWELL));
        assert!(matcher::methods_named(&["greet"]).matches(&target, &GREET));
        assert!(!matcher::methods_named(&["greet"]).matches(&target, &FAREWELL));
    }

    #[test]
    fn should_read_method_arguments() {
        let mut arguments = MethodArguments::new(
            "greet",
            vec![Box::new(1u8) as ArgumentValue, Box::new(2u16) as ArgumentValue],
        );

        assert_eq!(arguments.next::<u8>().unwrap(), 1);
        assert!(arguments.next::<u8>().is_err());
        assert!(arguments.next::<u8>().is_err());
    }
}
