// note: this example assumes you've analyzed the previous ones

use needle_di::constructor::{ConstructorChoice, ConstructorFilter};
use needle_di::descriptor::TypeDescriptor;
use needle_di::error::{ConfigurationError, ResolutionError};
use needle_di::injector::InjectorBuilder;
use needle_di::instance::{InstancePtr, TypedInstanceProvider};
use needle_di::parameter::{ParameterChain, ParameterHandler, ParameterOutcome, ParameterRequest};
use needle_di::scope::TaskToken;
use needle_di::injectable;
use std::sync::Arc;

struct Greeting(String);

#[injectable]
impl Greeting {
    fn new() -> Self {
        Self("Hello".to_string())
    }
}

struct Mailer {
    greeting: InstancePtr<Greeting>,
    legacy: bool,
}

#[injectable]
impl Mailer {
    fn modern(greeting: InstancePtr<Greeting>) -> Self {
        Self {
            greeting,
            legacy: false,
        }
    }

    fn legacy(greeting: InstancePtr<Greeting>) -> Self {
        Self {
            greeting,
            legacy: true,
        }
    }
}

// constructor filters decide which constructor to use, when no explicit or default constructor is
// declared; returning Deferred passes the decision to the next filter
struct PreferModern;

impl ConstructorFilter for PreferModern {
    fn filter(&self, descriptor: &TypeDescriptor) -> Result<ConstructorChoice, ConfigurationError> {
        Ok(descriptor
            .constructors
            .iter()
            .position(|constructor| constructor.name == "modern")
            .map(ConstructorChoice::Selected)
            .unwrap_or(ConstructorChoice::Deferred))
    }
}

// parameter handlers can provide values for parameters before the injector resolves them
struct LoggingHandler;

impl ParameterHandler for LoggingHandler {
    fn handle(
        &self,
        request: &ParameterRequest<'_>,
        chain: &ParameterChain<'_>,
    ) -> Result<ParameterOutcome, ResolutionError> {
        println!(
            "Resolving '{}' for {}",
            request.parameter.name, request.owner.name
        );

        // the rest of the chain can be asked to produce the value
        chain.proceed(request)
    }
}

fn main() {
    let injector = InjectorBuilder::new()
        .with_constructor_filter(Arc::new(PreferModern))
        .with_parameter_handler(Arc::new(LoggingHandler))
        .build()
        .expect("error building Injector");

    // prints "Resolving 'greeting' for ..." and then "Hello, legacy: false"
    let mailer = injector
        .instance_typed::<Mailer>(TaskToken::ROOT)
        .expect("error creating Mailer");

    println!("{}, legacy: {}", mailer.greeting.0, mailer.legacy);
}
