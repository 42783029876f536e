use needle_di::binding::Binding;
use needle_di::injector::InjectorBuilder;
use needle_di::instance::{InstancePtr, TypedInstanceProvider};
use needle_di::scope::TaskToken;
use needle_di::{implements, injectable};

// this is a trait we would like to use in our type
#[injectable]
trait Greeter {
    fn greet(&self);
}

// this is a dependency which implements the above trait
struct EnglishGreeter;

// every associated function returning Self is a constructor, which the injector can call
#[injectable]
impl EnglishGreeter {
    fn new() -> Self {
        Self
    }
}

// we're telling the framework EnglishGreeter can be used as dyn Greeter
#[implements]
impl Greeter for EnglishGreeter {
    fn greet(&self) {
        println!("Hello world!");
    }
}

// this is another type, but with a dependency
struct Application {
    greeter: InstancePtr<dyn Greeter + Send + Sync>,
}

#[injectable]
impl Application {
    // constructor parameters are resolved by the injector
    fn new(greeter: InstancePtr<dyn Greeter + Send + Sync>) -> Self {
        Self { greeter }
    }

    fn run(&self) {
        self.greeter.greet();
    }
}

// note: for the sake of simplicity, errors are unwrapped, rather than gracefully handled
fn main() {
    // instances are created by an Injector, built by InjectorBuilder
    // types declared with #[injectable] are registered automatically, but traits need an explicit
    // binding telling which implementation to use
    let injector = InjectorBuilder::new()
        .with_binding(Binding::bind::<dyn Greeter + Send + Sync>().to::<EnglishGreeter>())
        .build()
        .expect("error building Injector");

    // every request is made on behalf of a task; ROOT is fine when not using task scopes
    let application = injector
        .instance_typed::<Application>(TaskToken::ROOT)
        .expect("error creating Application");

    // prints "Hello world!"
    application.run();
}
