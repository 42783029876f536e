//! Core functionality for creating instances. The [Injector] uses [bindings](crate::binding),
//! [descriptors](crate::descriptor) and [scopes](crate::scope) to create, store and reuse
//! instances, wrapping them in interception proxies when [aspects](crate::aop) apply.
//!
//! ```
//! use needle_di::injector::InjectorBuilder;
//! use needle_di::instance::{InstancePtr, TypedInstanceProvider};
//! use needle_di::scope::TaskToken;
//! use needle_di::injectable;
//!
//! struct Config {
//!     url: String,
//! }
//!
//! #[injectable(scope = "singleton")]
//! impl Config {
//!     fn new() -> Self {
//!         Self {
//!             url: "localhost".to_string(),
//!         }
//!     }
//! }
//!
//! struct Client {
//!     config: InstancePtr<Config>,
//! }
//!
//! #[injectable]
//! impl Client {
//!     fn new(config: InstancePtr<Config>) -> Self {
//!         Self { config }
//!     }
//! }
//!
//! let injector = InjectorBuilder::new().build().unwrap();
//! let client = injector.instance_typed::<Client>(TaskToken::ROOT).unwrap();
//! assert_eq!(client.config.url, "localhost");
//! ```

use crate::aop::{AspectDescriptor, ProxyFactory, ProxyRuntime};
use crate::binding::{Binding, BindingRegistry, BindingStrategy};
use crate::config::InjectorConfig;
use crate::constructor::{ConstructorFilterPtr, ConstructorSelector};
use crate::descriptor::{Constructible, ParameterDescriptor, ResolvedArgument, TypeDescriptor};
use crate::error::{ConfigurationError, InjectorBuildError, ProxyGenerationError, ResolutionError};
use crate::instance::{Injectable, InstanceAnyPtr, InstanceProvider, InstancePtr, TypeKey};
use crate::parameter::{handler_chain, ParameterChain, ParameterHandlerPtr, ParameterRequest};
use crate::registry::TypeRegistry;
use crate::resolution::ResolutionContext;
use crate::scope::{
    CreationLock, ScopeFactory, ScopeFactoryPtr, ScopeKey, ScopeKind, ScopePtr, ScopedInstance,
    SharedScopeFactory, TaskScopes, TaskToken,
};
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::any::TypeId;
use std::sync::Arc;
use tracing::{debug, trace};
use tracing_subscriber::EnvFilter;

pub type ScopeFactoryRegistry = FxHashMap<String, ScopeFactoryPtr>;

/// Builder for [Injector] with sensible defaults, for easy construction.
pub struct InjectorBuilder {
    config: InjectorConfig,
    bindings: Vec<Binding>,
    types: Vec<TypeDescriptor>,
    aspects: Vec<AspectDescriptor>,
    constructor_filters: Vec<ConstructorFilterPtr>,
    parameter_handlers: Vec<ParameterHandlerPtr>,
    scope_factories: ScopeFactoryRegistry,
    named_scopes: Vec<String>,
}

impl InjectorBuilder {
    /// Creates a new builder with a default configuration.
    pub fn new() -> Self {
        Self {
            config: Default::default(),
            bindings: vec![],
            types: vec![],
            aspects: vec![],
            constructor_filters: vec![],
            parameter_handlers: vec![],
            scope_factories: Default::default(),
            named_scopes: vec![],
        }
    }

    /// Creates a new builder with configuration read from the environment. See
    /// [InjectorConfig::init_from_environment].
    pub fn from_environment() -> Result<Self, InjectorBuildError> {
        Ok(Self::new().with_config(InjectorConfig::init_from_environment()?))
    }

    pub fn with_config(mut self, config: InjectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds an explicit binding.
    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Registers a constructible type, which is useful when static registration is disabled.
    pub fn with_type<T: Constructible>(self) -> Self {
        self.with_type_descriptor(T::descriptor())
    }

    /// Registers a type using a hand-written descriptor.
    pub fn with_type_descriptor(mut self, descriptor: TypeDescriptor) -> Self {
        self.types.push(descriptor);
        self
    }

    pub fn with_aspect(mut self, aspect: AspectDescriptor) -> Self {
        self.aspects.push(aspect);
        self
    }

    /// Adds a constructor filter, which runs after the built-in explicit and default marker
    /// filters, but before the fallback one.
    pub fn with_constructor_filter(mut self, filter: ConstructorFilterPtr) -> Self {
        self.constructor_filters.push(filter);
        self
    }

    /// Adds a parameter handler, which runs after the built-in ignore and scope attribute
    /// handlers, but before the default one.
    pub fn with_parameter_handler(mut self, handler: ParameterHandlerPtr) -> Self {
        self.parameter_handlers.push(handler);
        self
    }

    /// Declares a custom scope backed by the standard store.
    pub fn with_named_scope<T: ToString>(mut self, name: T) -> Self {
        self.named_scopes.push(name.to_string());
        self
    }

    /// Declares a custom scope backed by given factory.
    pub fn with_scope_factory<T: ToString>(mut self, name: T, factory: ScopeFactoryPtr) -> Self {
        self.scope_factories.insert(name.to_string(), factory);
        self
    }

    /// Builds resulting [Injector].
    pub fn build(self) -> Result<Injector, InjectorBuildError> {
        let config = self.config;
        if config.install_tracing_logger {
            // another subscriber might already be installed, which is fine
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .try_init();
        }

        let mut types = TypeRegistry::new(config.register_static_types);
        for descriptor in self.types {
            types.register(descriptor);
        }

        let mut bindings = BindingRegistry::new(config.allow_binding_overriding);
        for binding in self.bindings {
            if let BindingStrategy::Type {
                target,
                descriptor: Some(descriptor),
                ..
            } = &binding.strategy
            {
                if !types.is_registered(target.id) {
                    types.register(descriptor());
                }
            }

            bindings.register(binding)?;
        }

        for descriptor in types.descriptors() {
            bindings.register_implicit(descriptor);
        }

        let shared_scopes = SharedScopeFactory::new(Arc::new(CreationLock::new(())));
        let mut scope_factories = self.scope_factories;
        for name in self.named_scopes {
            scope_factories
                .entry(name)
                .or_insert_with(|| Box::new(shared_scopes.clone()));
        }

        debug!(
            bindings = bindings.bindings().count(),
            types = types.descriptors().count(),
            aspects = self.aspects.len(),
            "Built injector"
        );

        Ok(Injector {
            bindings,
            types,
            selector: ConstructorSelector::new(self.constructor_filters),
            parameter_handlers: handler_chain(self.parameter_handlers),
            proxies: ProxyFactory::new(self.aspects),
            global: shared_scopes.create_scope(),
            scope_factories,
            named: Default::default(),
            tasks: Default::default(),
        })
    }
}

impl Default for InjectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates instances according to configured bindings. Can be shared between threads - each
/// request carries its own [ResolutionContext].
pub struct Injector {
    bindings: BindingRegistry,
    types: TypeRegistry,
    selector: ConstructorSelector,
    parameter_handlers: Vec<ParameterHandlerPtr>,
    proxies: ProxyFactory,
    global: ScopePtr,
    scope_factories: ScopeFactoryRegistry,
    named: RwLock<FxHashMap<String, ScopePtr>>,
    tasks: TaskScopes,
}

impl Injector {
    /// Checks if given type has a binding.
    #[inline]
    pub fn can_resolve(&self, type_id: TypeId) -> bool {
        self.bindings.is_bound(type_id)
    }

    /// Resolves an instance within an existing resolution call. Useful for custom
    /// [ParameterHandler](crate::parameter::ParameterHandler)s.
    pub fn resolve(
        &self,
        key: TypeKey,
        context: &ResolutionContext,
    ) -> Result<InstanceAnyPtr, ResolutionError> {
        self.resolve_scoped(key, context)
            .map(|resolved| resolved.instance)
    }

    /// Like [Injector::resolve], but additionally returns the proxy runtime of an instance which is
    /// not owned by any scope, i.e. a new prototype. Whoever keeps such instance becomes
    /// responsible for its teardown.
    pub fn resolve_scoped(
        &self,
        key: TypeKey,
        context: &ResolutionContext,
    ) -> Result<ScopedInstance, ResolutionError> {
        let binding = self
            .bindings
            .binding(key.id)
            .ok_or(ConfigurationError::UnknownType(key.name))?;

        if let BindingStrategy::Instance(instance) = &binding.strategy {
            return Ok(ScopedInstance::new(instance.clone()));
        }

        let Some(scope) = self.scope(&binding.scope, context)? else {
            let _guard = context.enter(key)?;
            return self.create(binding, context);
        };

        let scope_key = ScopeKey::Type(key.id);
        if let Some(instance) = scope.instance(&scope_key) {
            trace!(type_name = key.name, scope = %binding.scope, "Using cached instance");
            return Ok(ScopedInstance::new(instance));
        }

        let _guard = context.enter(key)?;
        scope
            .register_if_absent(scope_key, &mut || self.create(binding, context))
            .map(ScopedInstance::new)
    }

    /// Returns a new unique task identity. Instances in the task scope are kept until
    /// [Injector::end_task] is called.
    pub fn begin_task(&self) -> TaskToken {
        TaskToken::next()
    }

    /// Disposes the task scope of given task.
    pub fn end_task(&self, task: TaskToken) {
        self.tasks.end(task);
    }

    /// Disposes the current instance store of a named scope. The next request will open a fresh
    /// one.
    pub fn close_scope(&self, name: &str) -> Result<(), ConfigurationError> {
        if !self.scope_factories.contains_key(name) {
            return Err(ConfigurationError::UnrecognizedScope(name.to_string()));
        }

        let scope = self.named.write().remove(name);
        if let Some(scope) = scope {
            debug!(scope = name, "Closing scope");
            scope.dispose();
        }

        Ok(())
    }

    /// Disposes all scopes, destroying intercepted instances they own.
    pub fn dispose(&self) {
        self.global.dispose();

        let named = std::mem::take(&mut *self.named.write());
        for scope in named.values() {
            scope.dispose();
        }

        self.tasks.dispose();
    }

    /// Scope which holds attributes for given request.
    pub fn attribute_scope(&self, task_local: bool, context: &ResolutionContext) -> ScopePtr {
        if task_local {
            self.tasks.scope(context.task())
        } else {
            self.global.clone()
        }
    }

    fn scope(
        &self,
        kind: &ScopeKind,
        context: &ResolutionContext,
    ) -> Result<Option<ScopePtr>, ConfigurationError> {
        match kind {
            ScopeKind::Prototype => Ok(None),
            ScopeKind::Singleton => Ok(Some(self.global.clone())),
            ScopeKind::Task => Ok(Some(self.tasks.scope(context.task()))),
            ScopeKind::Named(name) => self.named_scope(name).map(Some),
        }
    }

    fn named_scope(&self, name: &str) -> Result<ScopePtr, ConfigurationError> {
        if let Some(scope) = self.named.read().get(name) {
            return Ok(scope.clone());
        }

        let factory = self
            .scope_factories
            .get(name)
            .ok_or_else(|| ConfigurationError::UnrecognizedScope(name.to_string()))?;

        Ok(self
            .named
            .write()
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(scope = name, "Opening scope");
                factory.create_scope()
            })
            .clone())
    }

    fn create(
        &self,
        binding: &Binding,
        context: &ResolutionContext,
    ) -> Result<ScopedInstance, ResolutionError> {
        let instance = match &binding.strategy {
            BindingStrategy::Type { target, upcast, .. } => {
                let instance = self.construct(*target, context)?;
                upcast(instance)
                    .map_err(|_| ConfigurationError::IncompatibleInstance(binding.key.name))?
            }
            BindingStrategy::Factory(factory) => {
                debug!(type_name = binding.key.name, "Calling factory");
                factory(&Resolver::new(self, context))?
            }
            BindingStrategy::Instance(instance) => {
                return Ok(ScopedInstance::new(instance.clone()));
            }
        };

        self.weave(binding, instance)
    }

    fn construct(
        &self,
        target: TypeKey,
        context: &ResolutionContext,
    ) -> Result<InstanceAnyPtr, ResolutionError> {
        let descriptor = self
            .types
            .descriptor(target.id)
            .ok_or(ConfigurationError::UnknownType(target.name))?;

        let constructor = self.selector.select(descriptor)?;
        debug!(
            type_name = target.name,
            constructor = constructor.name,
            "Constructing instance"
        );

        let arguments = self.resolve_parameters(target, &constructor.parameters, context)?;
        let mut instance = (constructor.construct)(arguments)?;

        for method in &descriptor.injection_methods {
            trace!(
                type_name = target.name,
                method = method.name,
                "Calling injection method"
            );

            let arguments = self.resolve_parameters(target, &method.parameters, context)?;
            (method.inject)(&mut instance, arguments)?;
        }

        (descriptor.finish)(instance)
            .map_err(|_| ConfigurationError::IncompatibleInstance(target.name).into())
    }

    fn resolve_parameters(
        &self,
        owner: TypeKey,
        parameters: &[ParameterDescriptor],
        context: &ResolutionContext,
    ) -> Result<Vec<ResolvedArgument>, ResolutionError> {
        let chain = ParameterChain::new(&self.parameter_handlers, self, context);
        parameters
            .iter()
            .map(|parameter| chain.resolve(&ParameterRequest { owner, parameter }))
            .collect()
    }

    fn weave(
        &self,
        binding: &Binding,
        instance: InstanceAnyPtr,
    ) -> Result<ScopedInstance, ResolutionError> {
        let target = binding.target();
        let Some(plan) = self.proxies.plan(target, binding.key, binding.surface)? else {
            return Ok(ScopedInstance::new(instance));
        };

        let surface = plan.surface();
        let runtime = Arc::new(ProxyRuntime::new(plan, instance.clone()));
        let proxy = (surface.wrap)(instance, runtime.clone()).map_err(|_| {
            ProxyGenerationError::IncompatibleSurface {
                type_name: target.name,
                surface: surface.name,
            }
        })?;

        debug!(
            type_name = target.name,
            surface = surface.name,
            "Wrapped instance in interception proxy"
        );

        Ok(ScopedInstance {
            instance: proxy,
            teardown: Some(runtime),
        })
    }
}

impl InstanceProvider for Injector {
    fn instance(&self, task: TaskToken, key: TypeKey) -> Result<InstanceAnyPtr, ResolutionError> {
        let context = ResolutionContext::new(task);
        self.resolve(key, &context)
    }
}

impl Drop for Injector {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Access to the injector for factory bindings, bound to the current resolution call.
pub struct Resolver<'a> {
    injector: &'a Injector,
    context: &'a ResolutionContext,
}

impl<'a> Resolver<'a> {
    pub fn new(injector: &'a Injector, context: &'a ResolutionContext) -> Self {
        Self { injector, context }
    }

    /// Resolves a dependency of the instance being created.
    pub fn instance<T: Injectable + ?Sized>(&self) -> Result<InstancePtr<T>, ResolutionError> {
        let key = TypeKey::of::<T>();
        self.injector.resolve(key, self.context).and_then(|instance| {
            T::downcast(instance)
                .map_err(|_| ConfigurationError::IncompatibleInstance(key.name).into())
        })
    }

    /// Task on whose behalf the instance is created.
    #[inline]
    pub fn task(&self) -> TaskToken {
        self.context.task()
    }

    #[inline]
    pub fn injector(&self) -> &'a Injector {
        self.injector
    }
}

#[cfg(test)]
mod tests {
    use crate::binding::Binding;
    use crate::config::InjectorConfig;
    use crate::descriptor::{
        Arguments, ConstructorDescriptor, Constructible, ResolvedArgument, TypeDescriptor,
    };
    use crate::error::{ConfigurationError, InjectorBuildError, ResolutionError};
    use crate::injector::InjectorBuilder;
    use crate::instance::{
        Injectable, InstanceAnyPtr, InstanceBox, InstancePtr, TypeKey, TypedInstanceProvider,
    };
    use crate::scope::{MockScopeFactory, InstanceStore, ScopeKind, ScopePtr, TaskToken};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config() -> InjectorConfig {
        InjectorConfig::default().with_register_static_types(false)
    }

    #[derive(Debug)]
    struct Leaf;

    impl Injectable for Leaf {
        fn downcast(instance: InstanceAnyPtr) -> Result<InstancePtr<Self>, InstanceAnyPtr> {
            instance.downcast()
        }

        fn into_any(instance: InstancePtr<Self>) -> InstanceAnyPtr {
            instance
        }
    }

    impl Constructible for Leaf {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::new::<Self>(vec![ConstructorDescriptor {
                name: "new",
                parameters: vec![],
                is_default: false,
                construct: |_| Ok(Box::new(Leaf) as InstanceBox),
            }])
        }
    }

    #[derive(Debug)]
    struct Branch {
        leaf: InstancePtr<Leaf>,
    }

    impl Injectable for Branch {
        fn downcast(instance: InstanceAnyPtr) -> Result<InstancePtr<Self>, InstanceAnyPtr> {
            instance.downcast()
        }

        fn into_any(instance: InstancePtr<Self>) -> InstanceAnyPtr {
            instance
        }
    }

    fn construct_branch(arguments: Vec<ResolvedArgument>) -> Result<InstanceBox, ResolutionError> {
        let mut arguments = Arguments::new(TypeKey::of::<Branch>(), arguments);
        Ok(Box::new(Branch {
            leaf: arguments.next("leaf")?,
        }))
    }

    impl Constructible for Branch {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::new::<Self>(vec![ConstructorDescriptor {
                name: "new",
                parameters: vec![crate::descriptor::ParameterDescriptor::required::<Leaf>(
                    "leaf",
                )],
                is_default: false,
                construct: construct_branch,
            }])
        }
    }

    #[test]
    fn should_resolve_dependencies() {
        let injector = InjectorBuilder::new()
            .with_config(config())
            .with_type::<Leaf>()
            .with_type::<Branch>()
            .build()
            .unwrap();

        let branch = injector.instance_typed::<Branch>(TaskToken::ROOT).unwrap();
        let other = injector.instance_typed::<Branch>(TaskToken::ROOT).unwrap();

        assert!(!Arc::ptr_eq(&branch, &other));
        assert!(!Arc::ptr_eq(&branch.leaf, &other.leaf));
    }

    #[test]
    fn should_reuse_singletons() {
        let injector = InjectorBuilder::new()
            .with_config(config())
            .with_type::<Branch>()
            .with_binding(Binding::bind::<Leaf>().to_self().in_scope(ScopeKind::Singleton))
            .build()
            .unwrap();

        let first = injector.instance_typed::<Branch>(TaskToken::ROOT).unwrap();
        let second = injector.instance_typed::<Branch>(TaskToken::ROOT).unwrap();

        assert!(Arc::ptr_eq(&first.leaf, &second.leaf));
    }

    #[test]
    fn should_fail_on_unknown_type() {
        let injector = InjectorBuilder::new()
            .with_config(config())
            .build()
            .unwrap();

        assert!(matches!(
            injector.instance_typed::<Leaf>(TaskToken::ROOT),
            Err(ResolutionError::Configuration(
                ConfigurationError::UnknownType(_)
            ))
        ));
    }

    #[test]
    fn should_report_unresolvable_parameter() {
        let injector = InjectorBuilder::new()
            .with_config(config())
            .with_type::<Branch>()
            .build()
            .unwrap();

        assert!(matches!(
            injector.instance_typed::<Branch>(TaskToken::ROOT),
            Err(ResolutionError::Configuration(
                ConfigurationError::UnresolvableParameter {
                    parameter: "leaf",
                    ..
                }
            ))
        ));
    }

    #[test]
    fn should_reject_duplicate_binding() {
        let result = InjectorBuilder::new()
            .with_config(config())
            .with_binding(Binding::bind::<Leaf>().to_self())
            .with_binding(Binding::bind::<Leaf>().to_instance(InstancePtr::new(Leaf)))
            .build();

        assert!(matches!(result, Err(InjectorBuildError::Binding(_))));
    }

    #[test]
    fn should_call_factory() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let injector = InjectorBuilder::new()
            .with_config(config())
            .with_type::<Leaf>()
            .with_binding(
                Binding::bind::<Branch>()
                    .to_factory(move |resolver| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(InstancePtr::new(Branch {
                            leaf: resolver.instance()?,
                        }))
                    })
                    .in_scope(ScopeKind::Task),
            )
            .build()
            .unwrap();

        let task = injector.begin_task();
        let first = injector.instance_typed::<Branch>(task).unwrap();
        let second = injector.instance_typed::<Branch>(task).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        injector.end_task(task);
        let third = injector.instance_typed::<Branch>(task).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn should_detect_factory_cycle() {
        let injector = InjectorBuilder::new()
            .with_config(config())
            .with_binding(Binding::bind::<Leaf>().to_factory(|resolver| resolver.instance()))
            .build()
            .unwrap();

        match injector.instance_typed::<Leaf>(TaskToken::ROOT) {
            Err(ResolutionError::CircularDependency { path }) => {
                assert_eq!(path, vec![TypeKey::of::<Leaf>().name; 2])
            }
            result => panic!("unexpected result: {result:?}"),
        }
    }

    #[test]
    fn should_fail_on_undeclared_named_scope() {
        let injector = InjectorBuilder::new()
            .with_config(config())
            .with_binding(
                Binding::bind::<Leaf>()
                    .to_self()
                    .in_scope(ScopeKind::Named("request".to_string())),
            )
            .build()
            .unwrap();

        assert!(matches!(
            injector.instance_typed::<Leaf>(TaskToken::ROOT),
            Err(ResolutionError::Configuration(
                ConfigurationError::UnrecognizedScope(_)
            ))
        ));
    }

    #[test]
    fn should_reopen_closed_named_scope() {
        let injector = InjectorBuilder::new()
            .with_config(config())
            .with_named_scope("request")
            .with_binding(
                Binding::bind::<Leaf>()
                    .to_self()
                    .in_scope(ScopeKind::from_name("request")),
            )
            .build()
            .unwrap();

        let first = injector.instance_typed::<Leaf>(TaskToken::ROOT).unwrap();
        let second = injector.instance_typed::<Leaf>(TaskToken::next()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        injector.close_scope("request").unwrap();

        let third = injector.instance_typed::<Leaf>(TaskToken::ROOT).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(injector.close_scope("unknown").is_err());
    }

    #[test]
    fn should_use_custom_scope_factory() {
        let mut factory = MockScopeFactory::new();
        factory
            .expect_create_scope()
            .times(1)
            .returning(|| Arc::new(InstanceStore::private()) as ScopePtr);

        let injector = InjectorBuilder::new()
            .with_config(config())
            .with_scope_factory("custom", Box::new(factory))
            .with_binding(
                Binding::bind::<Leaf>()
                    .to_self()
                    .in_scope(ScopeKind::from_name("custom")),
            )
            .build()
            .unwrap();

        let first = injector.instance_typed::<Leaf>(TaskToken::ROOT).unwrap();
        let second = injector.instance_typed::<Leaf>(TaskToken::ROOT).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn should_return_fixed_instance() {
        let leaf = InstancePtr::new(Leaf);
        let injector = InjectorBuilder::new()
            .with_config(config())
            .with_binding(Binding::bind::<Leaf>().to_instance(leaf.clone()))
            .build()
            .unwrap();

        assert!(Arc::ptr_eq(
            &injector.instance_typed::<Leaf>(TaskToken::ROOT).unwrap(),
            &leaf
        ));
    }
}
