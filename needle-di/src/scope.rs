//! Instances are contained in [Scope]s - containers which decide when to reuse or create an
//! instance. There's a global one for singletons, named ones with an application-defined lifetime
//! (e.g. a logical transaction) and private ones for every [TaskToken]. Instances bound in the
//! [prototype](ScopeKind::Prototype) scope are never cached.
//!
//! Note: scope resolution happens at instantiation time, which can lead to unexpected
//! consequences if incompatible scopes are mixed together, e.g. a singleton can depend on a
//! prototype. In such case a new instance of the dependency will be created for the singleton, but
//! then that single instance will live as long as the singleton lives.

use crate::aop::ProxyRuntime;
use crate::error::ResolutionError;
use crate::instance::InstanceAnyPtr;
use derivative::Derivative;
use fxhash::FxHashMap;
#[cfg(test)]
use mockall::automock;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::any::TypeId;
use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub type ScopePtr = Arc<dyn Scope + Send + Sync>;

pub type ScopeFactoryPtr = Box<dyn ScopeFactory + Send + Sync>;

/// Lock serializing first-time construction in shared scopes. One lock is shared by all shared
/// scopes of an injector, so constructions spanning multiple scopes cannot deadlock each other.
/// Re-entrant, since constructing one instance usually means constructing its dependencies.
pub type CreationLock = ReentrantMutex<()>;

/// Name of the [ScopeKind::Singleton] scope.
pub const SINGLETON: &str = "SINGLETON";

/// Name of the [ScopeKind::Prototype] scope.
pub const PROTOTYPE: &str = "PROTOTYPE";

/// Name of the [ScopeKind::Task] scope.
pub const TASK: &str = "TASK";

/// Lifetime of instances created for a binding.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum ScopeKind {
    /// New instance on every request.
    #[default]
    Prototype,
    /// One instance per injector.
    Singleton,
    /// One instance per [TaskToken].
    Task,
    /// One instance per lifetime of a named custom scope.
    Named(String),
}

impl ScopeKind {
    /// Maps a scope name to its kind. Built-in names are case-insensitive, any other name denotes
    /// a custom scope.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case(PROTOTYPE) {
            Self::Prototype
        } else if name.eq_ignore_ascii_case(SINGLETON) {
            Self::Singleton
        } else if name.eq_ignore_ascii_case(TASK) {
            Self::Task
        } else {
            Self::Named(name.to_string())
        }
    }
}

impl Display for ScopeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeKind::Prototype => f.write_str(PROTOTYPE),
            ScopeKind::Singleton => f.write_str(SINGLETON),
            ScopeKind::Task => f.write_str(TASK),
            ScopeKind::Named(name) => f.write_str(name),
        }
    }
}

/// Key of an instance within a scope: either the type it was resolved for, or an attribute name.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ScopeKey {
    Type(TypeId),
    Attribute(Cow<'static, str>),
}

/// Explicit identity of a caller, owning a private task scope. Replaces reliance on ambient thread
/// identity - the token is passed to every request and the scope lives until
/// [Injector::end_task](crate::injector::Injector::end_task).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TaskToken(u64);

impl TaskToken {
    /// Token for callers which don't distinguish between tasks.
    pub const ROOT: TaskToken = TaskToken(0);

    /// Generates a new unique token.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Newly created instance along with the proxy runtime to tear down, if the instance is a proxy.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ScopedInstance {
    pub instance: InstanceAnyPtr,
    #[derivative(Debug = "ignore")]
    pub teardown: Option<Arc<ProxyRuntime>>,
}

impl ScopedInstance {
    #[inline]
    pub fn new(instance: InstanceAnyPtr) -> Self {
        Self {
            instance,
            teardown: None,
        }
    }
}

/// Supplier of instances for [Scope::register_if_absent].
pub type InstanceSupplier<'a> = dyn FnMut() -> Result<ScopedInstance, ResolutionError> + 'a;

/// A scope containing instances. See module documentation for information on scopes.
pub trait Scope {
    /// Gets an instance stored under the given key, if available in this scope.
    fn instance(&self, key: &ScopeKey) -> Option<InstanceAnyPtr>;

    /// Checks if an instance is stored under the given key.
    fn contains(&self, key: &ScopeKey) -> bool {
        self.instance(key).is_some()
    }

    /// Returns the instance stored under the given key, or stores the one created by `supplier`.
    /// Concurrent callers asking for the same missing key must all observe one instance.
    fn register_if_absent(
        &self,
        key: ScopeKey,
        supplier: &mut InstanceSupplier<'_>,
    ) -> Result<InstanceAnyPtr, ResolutionError>;

    /// Ends the lifetime of all stored instances: tears down owned proxies and clears the scope.
    fn dispose(&self);
}

/// Standard [Scope] implementation.
#[derive(Default)]
pub struct InstanceStore {
    instances: RwLock<FxHashMap<ScopeKey, InstanceAnyPtr>>,
    teardowns: Mutex<Vec<Arc<ProxyRuntime>>>,
    creation_lock: Option<Arc<CreationLock>>,
}

impl InstanceStore {
    /// Creates a store for shared use, which serializes first-time construction with given lock.
    pub fn shared(creation_lock: Arc<CreationLock>) -> Self {
        Self {
            creation_lock: Some(creation_lock),
            ..Default::default()
        }
    }

    /// Creates a store owned by a single caller, which needs no construction locking.
    pub fn private() -> Self {
        Self::default()
    }
}

impl Scope for InstanceStore {
    #[inline]
    fn instance(&self, key: &ScopeKey) -> Option<InstanceAnyPtr> {
        self.instances.read().get(key).cloned()
    }

    fn register_if_absent(
        &self,
        key: ScopeKey,
        supplier: &mut InstanceSupplier<'_>,
    ) -> Result<InstanceAnyPtr, ResolutionError> {
        if let Some(instance) = self.instance(&key) {
            return Ok(instance);
        }

        let _creation_guard = self.creation_lock.as_ref().map(|lock| lock.lock());
        if let Some(instance) = self.instance(&key) {
            return Ok(instance);
        }

        let ScopedInstance { instance, teardown } = supplier()?;

        let stored = self
            .instances
            .write()
            .entry(key)
            .or_insert_with(|| instance.clone())
            .clone();

        if let Some(teardown) = teardown {
            if Arc::ptr_eq(&stored, &instance) {
                self.teardowns.lock().push(teardown);
            }
        }

        Ok(stored)
    }

    fn dispose(&self) {
        let teardowns = mem::take(&mut *self.teardowns.lock());
        self.instances.write().clear();

        for teardown in teardowns.iter().rev() {
            teardown.destroy();
        }
    }
}

/// Factory for custom [Scope]s.
#[cfg_attr(test, automock)]
pub trait ScopeFactory {
    fn create_scope(&self) -> ScopePtr;
}

/// Creates [InstanceStore]s sharing a single creation lock.
#[derive(Clone)]
pub struct SharedScopeFactory {
    creation_lock: Arc<CreationLock>,
}

impl SharedScopeFactory {
    pub fn new(creation_lock: Arc<CreationLock>) -> Self {
        Self { creation_lock }
    }
}

impl ScopeFactory for SharedScopeFactory {
    fn create_scope(&self) -> ScopePtr {
        Arc::new(InstanceStore::shared(self.creation_lock.clone()))
    }
}

/// Registry of private task scopes, populated lazily on first use of a given token.
#[derive(Default)]
pub struct TaskScopes {
    scopes: RwLock<FxHashMap<TaskToken, ScopePtr>>,
}

impl TaskScopes {
    /// Returns the scope owned by given task, creating it if needed.
    pub fn scope(&self, task: TaskToken) -> ScopePtr {
        if let Some(scope) = self.scopes.read().get(&task) {
            return scope.clone();
        }

        self.scopes
            .write()
            .entry(task)
            .or_insert_with(|| {
                debug!(task = task.id(), "Creating task scope");
                Arc::new(InstanceStore::private())
            })
            .clone()
    }

    /// Checks if given task currently owns a scope.
    pub fn is_active(&self, task: TaskToken) -> bool {
        self.scopes.read().contains_key(&task)
    }

    /// Removes and disposes the scope of given task.
    pub fn end(&self, task: TaskToken) {
        let scope = self.scopes.write().remove(&task);
        if let Some(scope) = scope {
            debug!(task = task.id(), "Disposing task scope");
            scope.dispose();
        }
    }

    /// Removes and disposes all task scopes.
    pub fn dispose(&self) {
        let scopes = mem::take(&mut *self.scopes.write());
        for scope in scopes.values() {
            scope.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{ConfigurationError, ResolutionError};
    use crate::instance::{InstanceAnyPtr, InstancePtr};
    use crate::scope::{
        CreationLock, InstanceStore, Scope, ScopeFactory, ScopeKey, ScopeKind, ScopedInstance,
        SharedScopeFactory, TaskScopes, TaskToken,
    };
    use std::any::TypeId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn key() -> ScopeKey {
        ScopeKey::Type(TypeId::of::<u8>())
    }

    #[test]
    fn should_store_first_instance() {
        let scope = InstanceStore::private();
        let first = InstancePtr::new(1u8) as InstanceAnyPtr;

        let stored = scope
            .register_if_absent(key(), &mut || Ok(ScopedInstance::new(first.clone())))
            .unwrap();
        assert!(Arc::ptr_eq(&stored, &first));
        assert!(scope.contains(&key()));

        let stored = scope
            .register_if_absent(key(), &mut || {
                Ok(ScopedInstance::new(InstancePtr::new(2u8) as InstanceAnyPtr))
            })
            .unwrap();
        assert!(Arc::ptr_eq(&stored, &first));
    }

    #[test]
    fn should_not_store_failed_instance() {
        let scope = InstanceStore::private();

        assert!(scope
            .register_if_absent(key(), &mut || {
                Err(ConfigurationError::UnknownType("u8").into())
            })
            .is_err());
        assert!(!scope.contains(&key()));
    }

    #[test]
    fn should_clear_on_dispose() {
        let scope = InstanceStore::private();
        scope
            .register_if_absent(key(), &mut || {
                Ok(ScopedInstance::new(InstancePtr::new(1u8) as InstanceAnyPtr))
            })
            .unwrap();

        scope.dispose();
        assert!(scope.instance(&key()).is_none());
    }

    #[test]
    fn should_create_shared_instance_once() {
        let scope = SharedScopeFactory::new(Arc::new(CreationLock::new(()))).create_scope();
        let created = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        let instances: Vec<InstanceAnyPtr> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        scope
                            .register_if_absent(key(), &mut || {
                                created.fetch_add(1, Ordering::SeqCst);
                                Ok(ScopedInstance::new(InstancePtr::new(1u8) as InstanceAnyPtr))
                            })
                            .unwrap()
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(instances
            .iter()
            .all(|instance| Arc::ptr_eq(instance, &instances[0])));
    }

    #[test]
    fn should_allow_nested_registration() {
        let scope = InstanceStore::shared(Arc::new(CreationLock::new(())));
        let inner_key = ScopeKey::Attribute("inner".into());

        scope
            .register_if_absent(key(), &mut || {
                scope.register_if_absent(inner_key.clone(), &mut || {
                    Ok(ScopedInstance::new(InstancePtr::new(2u8) as InstanceAnyPtr))
                })?;
                Ok(ScopedInstance::new(InstancePtr::new(1u8) as InstanceAnyPtr))
            })
            .unwrap();

        assert!(scope.contains(&inner_key));
        assert!(scope.contains(&key()));
    }

    #[test]
    fn should_isolate_tasks() {
        let tasks = TaskScopes::default();
        let first = TaskToken::next();
        let second = TaskToken::next();

        tasks
            .scope(first)
            .register_if_absent(key(), &mut || {
                Ok(ScopedInstance::new(InstancePtr::new(1u8) as InstanceAnyPtr))
            })
            .unwrap();

        assert!(tasks.scope(first).contains(&key()));
        assert!(!tasks.scope(second).contains(&key()));

        tasks.end(first);
        assert!(!tasks.is_active(first));
        assert!(!tasks.scope(first).contains(&key()));
    }

    #[test]
    fn should_map_scope_names() {
        assert_eq!(ScopeKind::from_name("singleton"), ScopeKind::Singleton);
        assert_eq!(ScopeKind::from_name("PROTOTYPE"), ScopeKind::Prototype);
        assert_eq!(ScopeKind::from_name("Task"), ScopeKind::Task);
        assert_eq!(
            ScopeKind::from_name("transaction"),
            ScopeKind::Named("transaction".to_string())
        );
    }

    #[test]
    fn should_propagate_supplier_errors() {
        let scope = InstanceStore::private();
        let error = scope
            .register_if_absent(key(), &mut || {
                Err(ResolutionError::CircularDependency { path: vec!["a"] })
            })
            .unwrap_err();

        assert!(matches!(error, ResolutionError::CircularDependency { .. }));
    }
}
