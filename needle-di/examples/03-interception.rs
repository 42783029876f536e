// note: this example assumes you've analyzed the previous ones

use needle_di::aop::{matcher, AspectDescriptor, JoinPoint, Weaver};
use needle_di::binding::Binding;
use needle_di::injector::InjectorBuilder;
use needle_di::instance::{ErrorPtr, InstanceAnyPtr, TypedInstanceProvider};
use needle_di::scope::{ScopeKind, TaskToken};
use needle_di::{implements, injectable, intercepted};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("division by zero")]
struct DivisionByZero;

// #[intercepted] traits are injectable like #[injectable] ones, but additionally get a generated
// proxy, which routes calls through weavers
// intercepted methods take &self and return Result<_, ErrorPtr>
#[intercepted]
trait Calculator {
    fn divide(&self, dividend: i64, divisor: i64) -> Result<i64, ErrorPtr>;

    fn name(&self) -> Result<String, ErrorPtr>;
}

struct IntegerCalculator;

#[injectable]
impl IntegerCalculator {
    fn new() -> Self {
        Self
    }
}

#[implements]
impl Calculator for IntegerCalculator {
    fn divide(&self, dividend: i64, divisor: i64) -> Result<i64, ErrorPtr> {
        if divisor == 0 {
            Err(Arc::new(DivisionByZero))
        } else {
            Ok(dividend / divisor)
        }
    }

    fn name(&self) -> Result<String, ErrorPtr> {
        Ok("integer".to_string())
    }
}

// weavers only need to implement do_before - other hooks pass results and failures through
struct Logging;

impl Weaver for Logging {
    fn do_before(&self, point: &mut JoinPoint) {
        println!("Calling {}", point.method().name);
    }

    fn do_after(&self, point: &mut JoinPoint) {
        println!(
            "{} returned {:?}",
            point.method().name,
            point.return_value::<i64>()
        );
    }

    fn do_destroy(&self, _target: &InstanceAnyPtr) {
        println!("Calculator destroyed");
    }
}

// setting a result in do_before skips the real method
struct Shortcut;

impl Weaver for Shortcut {
    fn do_before(&self, point: &mut JoinPoint) {
        if point.argument::<i64>(1) == Some(&1) {
            if let Some(dividend) = point.argument::<i64>(0).copied() {
                point.set_return(dividend);
            }
        }
    }
}

// failures can be suppressed by providing a substitute result
struct Saturating;

impl Weaver for Saturating {
    fn do_before(&self, _point: &mut JoinPoint) {}

    fn do_exception(&self, point: &mut JoinPoint) -> Result<(), ErrorPtr> {
        point.set_return(i64::MAX);
        Ok(())
    }
}

fn main() {
    // aspects attach weavers to methods of a concrete type
    let injector = InjectorBuilder::new()
        .with_binding(
            Binding::bind::<dyn Calculator + Send + Sync>()
                .to::<IntegerCalculator>()
                .in_scope(ScopeKind::Singleton),
        )
        .with_aspect(AspectDescriptor::of::<IntegerCalculator, _>(
            Arc::new(Logging),
            matcher::any_method(),
        ))
        .with_aspect(AspectDescriptor::of::<IntegerCalculator, _>(
            Arc::new(Shortcut),
            matcher::methods_named(&["divide"]),
        ))
        .with_aspect(AspectDescriptor::of::<IntegerCalculator, _>(
            Arc::new(Saturating),
            matcher::methods_named(&["divide"]),
        ))
        .build()
        .expect("error building Injector");

    let calculator = injector
        .instance_typed::<dyn Calculator + Send + Sync>(TaskToken::ROOT)
        .expect("error creating Calculator");

    // prints "5", "7" without calling the real method, and i64::MAX instead of failing
    println!("{:?}", calculator.divide(10, 2));
    println!("{:?}", calculator.divide(7, 1));
    println!("{:?}", calculator.divide(1, 0));
    println!("{:?}", calculator.name());

    // disposing the injector destroys intercepted instances it owns
    // prints "Calculator destroyed"
    injector.dispose();
}
