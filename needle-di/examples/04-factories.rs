// note: this example assumes you've analyzed the previous ones

use needle_di::binding::Binding;
use needle_di::injector::InjectorBuilder;
use needle_di::instance::{InstancePtr, TypedInstanceProvider};
use needle_di::scope::{ScopeKind, TaskToken};
use needle_di::{implements, injectable};

#[injectable]
trait Clock {
    fn now(&self) -> u64;
}

struct FixedClock(u64);

#[implements]
impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

struct Settings {
    timeout: u64,
}

#[injectable]
impl Settings {
    fn new() -> Self {
        Self { timeout: 30 }
    }
}

struct Scheduler {
    deadline: u64,
}

// types without an #[injectable] impl block can still be injected by a factory binding - they
// only need to implement Injectable
impl needle_di::instance::Injectable for Scheduler {
    fn downcast(
        instance: needle_di::instance::InstanceAnyPtr,
    ) -> Result<InstancePtr<Self>, needle_di::instance::InstanceAnyPtr> {
        instance.downcast()
    }

    fn into_any(instance: InstancePtr<Self>) -> needle_di::instance::InstanceAnyPtr {
        instance
    }
}

fn main() {
    let injector = InjectorBuilder::from_environment()
        .expect("error reading configuration")
        // a pre-built instance is always returned as-is
        .with_binding(
            Binding::bind::<dyn Clock + Send + Sync>()
                .to_instance(InstancePtr::new(FixedClock(1000))),
        )
        // factories can resolve other instances, which also takes part in cycle detection
        .with_binding(
            Binding::bind::<Scheduler>()
                .to_factory(|resolver| {
                    let clock = resolver.instance::<dyn Clock + Send + Sync>()?;
                    let settings = resolver.instance::<Settings>()?;

                    Ok(InstancePtr::new(Scheduler {
                        deadline: clock.now() + settings.timeout,
                    }))
                })
                .in_scope(ScopeKind::Singleton),
        )
        .build()
        .expect("error building Injector");

    let scheduler = injector
        .instance_typed::<Scheduler>(TaskToken::ROOT)
        .expect("error creating Scheduler");

    // prints "1030"
    println!("{}", scheduler.deadline);
}
