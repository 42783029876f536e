use crate::aop::{ArgumentValue, InterceptedCallPlan, JoinPoint};
use crate::error::InterceptionError;
use crate::instance::{ErrorPtr, InstanceAnyPtr};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Shared state of a single proxy: the real instance and the plan driving its calls.
pub struct ProxyRuntime {
    plan: Arc<InterceptedCallPlan>,
    target: InstanceAnyPtr,
    destroyed: AtomicBool,
}

impl ProxyRuntime {
    pub fn new(plan: Arc<InterceptedCallPlan>, target: InstanceAnyPtr) -> Self {
        Self {
            plan,
            target,
            destroyed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn plan(&self) -> &InterceptedCallPlan {
        &self.plan
    }

    /// Checks if the method with given index has any interceptors. Calls of other methods should
    /// go directly to the target.
    #[inline]
    pub fn intercepts(&self, method_index: usize) -> bool {
        self.plan.intercepts(method_index)
    }

    /// Dispatches a call through the interceptors of given method. `body` calls the real method
    /// with the (possibly replaced) arguments.
    pub fn invoke<R, F>(
        &self,
        method_index: usize,
        arguments: Vec<ArgumentValue>,
        body: F,
    ) -> Result<R, ErrorPtr>
    where
        R: Any + Send,
        F: FnOnce(Vec<ArgumentValue>) -> Result<R, ErrorPtr>,
    {
        let interceptors = self.plan.interceptors(method_index);
        let Some(method) = self.plan.surface().methods.get(method_index) else {
            return body(arguments);
        };

        let mut point = JoinPoint::new(method, self.target.clone(), arguments);

        let mut entered = 0;
        for weaver in interceptors {
            weaver.do_before(&mut point);
            entered += 1;

            if point.is_completed() {
                trace!(method = method.name, "Call short-circuited before invocation");
                break;
            }
        }

        if !point.is_completed() {
            match body(point.take_arguments()) {
                Ok(result) => point.set_return(result),
                Err(exception) => point.set_exception(exception),
            }
        }

        for weaver in interceptors[..entered].iter().rev() {
            if point.exception().is_some() {
                match weaver.do_exception(&mut point) {
                    Ok(()) => point.clear_exception(),
                    Err(exception) => point.set_exception(exception),
                }
            } else {
                weaver.do_after(&mut point);
            }
        }

        match point.into_outcome() {
            (_, Some(exception)) => Err(exception),
            (Some(result), None) => result.downcast::<R>().map(|result| *result).map_err(|_| {
                Arc::new(InterceptionError::ResultTypeMismatch {
                    method: method.name,
                }) as ErrorPtr
            }),
            (None, None) => Err(Arc::new(InterceptionError::MissingResult {
                method: method.name,
            }) as ErrorPtr),
        }
    }

    /// Notifies all weavers about destruction of the proxied instance. Subsequent calls do nothing.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!(
            type_name = self.plan.target().name,
            "Destroying intercepted instance"
        );

        for weaver in self.plan.weavers() {
            weaver.do_destroy(&self.target);
        }
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}
