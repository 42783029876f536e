// note: this example assumes you've analyzed the previous ones

use needle_di::injector::InjectorBuilder;
use needle_di::instance::{InstancePtr, TypedInstanceProvider};
use needle_di::injectable;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

// scopes are containers for instances and decide when to create and when to reuse instances
// built-in scopes:
// * "prototype" - new instance on every request (the default)
// * "singleton" - one instance per injector
// * "task" - one instance per task, until the task ends
// any other name refers to a custom scope, which needs to be declared in the builder
struct RequestContext {
    id: usize,
}

#[injectable(scope = "task")]
impl RequestContext {
    fn new() -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
        }
    }
}

struct Session {
    id: usize,
}

#[injectable(scope = "session")]
impl Session {
    fn new() -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
        }
    }
}

struct Handler {
    context: InstancePtr<RequestContext>,
    session: InstancePtr<Session>,
    // scope attributes are values cached under a name: globally, or per task with "task"
    visits: InstancePtr<VisitCounter>,
}

#[injectable]
impl Handler {
    fn new(
        context: InstancePtr<RequestContext>,
        session: InstancePtr<Session>,
        #[scope_attr(name = "visits")] visits: InstancePtr<VisitCounter>,
    ) -> Self {
        visits.count.fetch_add(1, Ordering::SeqCst);
        Self {
            context,
            session,
            visits,
        }
    }

    fn describe(&self) {
        println!(
            "request {}, session {}, visit {}",
            self.context.id,
            self.session.id,
            self.visits.count.load(Ordering::SeqCst)
        );
    }
}

struct VisitCounter {
    count: AtomicUsize,
}

#[injectable]
impl VisitCounter {
    fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
        }
    }
}

fn main() {
    let injector = InjectorBuilder::new()
        .with_named_scope("session")
        .build()
        .expect("error building Injector");

    // each task gets its own RequestContext
    for _ in 0..2 {
        let task = injector.begin_task();

        let first = injector
            .instance_typed::<Handler>(task)
            .expect("error creating Handler");
        let second = injector
            .instance_typed::<Handler>(task)
            .expect("error creating Handler");

        // both handlers share the same request context and session
        first.describe();
        second.describe();

        // task-scoped instances are dropped when the task ends
        injector.end_task(task);
    }

    // closing a custom scope discards its instances - the next request gets a new session
    injector
        .close_scope("session")
        .expect("error closing session scope");

    let handler = injector
        .instance_typed::<Handler>(injector.begin_task())
        .expect("error creating Handler");
    handler.describe();
}
