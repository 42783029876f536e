#[cfg(feature = "derive")]
mod injection_test {
    use needle_di::binding::Binding;
    use needle_di::error::{ConfigurationError, ResolutionError};
    use needle_di::injector::InjectorBuilder;
    use needle_di::instance::{InstancePtr, TypeKey, TypedInstanceProvider};
    use needle_di::scope::{ScopeKind, TaskToken};
    use needle_di::{implements, injectable};
    use std::sync::Arc;
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("invalid port")]
    struct InvalidPort;

    #[injectable]
    trait Named {
        fn name(&self) -> &'static str;
    }

    struct Dependency;

    #[injectable(scope = "singleton")]
    impl Dependency {
        fn new() -> Self {
            Self
        }
    }

    struct Missing;

    struct MultipleConstructors {
        selected: &'static str,
    }

    #[injectable]
    impl MultipleConstructors {
        fn empty() -> Self {
            Self { selected: "empty" }
        }

        #[default_constructor]
        fn with_dependency(_dependency: InstancePtr<Dependency>) -> Self {
            Self {
                selected: "with_dependency",
            }
        }

        fn with_other(_dependency: InstancePtr<Dependency>, #[ignore] _count: u8) -> Self {
            Self {
                selected: "with_other",
            }
        }
    }

    struct ExplicitConstructor {
        selected: &'static str,
    }

    #[injectable(constructor = "second")]
    impl ExplicitConstructor {
        #[default_constructor]
        fn first() -> Self {
            Self { selected: "first" }
        }

        fn second() -> Self {
            Self { selected: "second" }
        }
    }

    struct Ambiguous;

    #[injectable]
    impl Ambiguous {
        fn left(_dependency: InstancePtr<Dependency>) -> Self {
            Self
        }

        fn right(_dependency: InstancePtr<Dependency>) -> Self {
            Self
        }
    }

    struct WithOptional {
        dependency: Option<InstancePtr<Dependency>>,
        missing: Option<InstancePtr<Missing>>,
        retries: u32,
    }

    #[injectable]
    impl WithOptional {
        fn new(
            dependency: Option<InstancePtr<Dependency>>,
            missing: Option<InstancePtr<Missing>>,
            #[ignore] retries: u32,
        ) -> Self {
            Self {
                dependency,
                missing,
                retries,
            }
        }
    }

    impl needle_di::instance::Injectable for Missing {
        fn downcast(
            instance: needle_di::instance::InstanceAnyPtr,
        ) -> Result<InstancePtr<Self>, needle_di::instance::InstanceAnyPtr> {
            instance.downcast()
        }

        fn into_any(instance: InstancePtr<Self>) -> needle_di::instance::InstanceAnyPtr {
            instance
        }
    }

    struct Server {
        port: u16,
    }

    #[injectable]
    impl Server {
        fn new(#[ignore] port: u16) -> Result<Self, InvalidPort> {
            if port == 0 {
                Err(InvalidPort)
            } else {
                Ok(Self { port })
            }
        }
    }

    struct Injected {
        dependency: Option<InstancePtr<Dependency>>,
        named: Option<InstancePtr<dyn Named + Send + Sync>>,
    }

    #[injectable]
    impl Injected {
        fn new() -> Self {
            Self {
                dependency: None,
                named: None,
            }
        }

        #[inject]
        fn set_dependencies(
            &mut self,
            dependency: InstancePtr<Dependency>,
            named: InstancePtr<dyn Named + Send + Sync>,
        ) {
            self.dependency = Some(dependency);
            self.named = Some(named);
        }
    }

    struct English;

    #[injectable]
    impl English {
        fn new() -> Self {
            Self
        }
    }

    #[implements]
    impl Named for English {
        fn name(&self) -> &'static str {
            "english"
        }
    }

    struct Polish;

    #[injectable]
    impl Polish {
        fn new() -> Self {
            Self
        }
    }

    #[implements]
    impl Named for Polish {
        fn name(&self) -> &'static str {
            "polish"
        }
    }

    struct CycleA;

    #[injectable]
    impl CycleA {
        fn new(_b: InstancePtr<CycleB>) -> Self {
            Self
        }
    }

    struct CycleB;

    #[injectable]
    impl CycleB {
        fn new(_a: InstancePtr<CycleA>) -> Self {
            Self
        }
    }

    fn named_binding() -> Binding {
        Binding::bind::<dyn Named + Send + Sync>()
            .to::<English>()
            .in_scope(ScopeKind::Singleton)
    }

    #[test]
    fn should_prefer_default_constructor() {
        let injector = InjectorBuilder::new().build().unwrap();
        let instance = injector
            .instance_typed::<MultipleConstructors>(TaskToken::ROOT)
            .unwrap();

        assert_eq!(instance.selected, "with_dependency");
    }

    #[test]
    fn should_prefer_explicit_constructor() {
        let injector = InjectorBuilder::new().build().unwrap();
        let instance = injector
            .instance_typed::<ExplicitConstructor>(TaskToken::ROOT)
            .unwrap();

        assert_eq!(instance.selected, "second");
    }

    #[test]
    fn should_report_ambiguous_constructors() {
        let injector = InjectorBuilder::new().build().unwrap();

        match injector.instance_typed::<Ambiguous>(TaskToken::ROOT) {
            Err(ResolutionError::Configuration(ConfigurationError::AmbiguousConstructor {
                candidates,
                ..
            })) => assert_eq!(candidates, vec!["left", "right"]),
            result => panic!("unexpected result: {:?}", result.map(|_| ())),
        }
    }

    #[test]
    fn should_resolve_optional_and_ignored_parameters() {
        let injector = InjectorBuilder::new().build().unwrap();
        let instance = injector
            .instance_typed::<WithOptional>(TaskToken::ROOT)
            .unwrap();

        assert!(instance.dependency.is_some());
        assert!(instance.missing.is_none());
        assert_eq!(instance.retries, 0);
    }

    #[test]
    fn should_wrap_constructor_failure() {
        let injector = InjectorBuilder::new().build().unwrap();

        match injector.instance_typed::<Server>(TaskToken::ROOT) {
            Err(ResolutionError::ConstructionFailed { type_name, source }) => {
                assert_eq!(type_name, TypeKey::of::<Server>().name);
                assert_eq!(source.to_string(), "invalid port");
            }
            result => panic!("unexpected result: {:?}", result.map(|server| server.port)),
        }
    }

    #[test]
    fn should_call_injection_methods() {
        let injector = InjectorBuilder::new()
            .with_binding(named_binding())
            .build()
            .unwrap();

        let instance = injector.instance_typed::<Injected>(TaskToken::ROOT).unwrap();
        let dependency = injector
            .instance_typed::<Dependency>(TaskToken::ROOT)
            .unwrap();

        assert!(Arc::ptr_eq(instance.dependency.as_ref().unwrap(), &dependency));
        assert_eq!(instance.named.as_ref().unwrap().name(), "english");
    }

    #[test]
    fn should_resolve_trait_bindings() {
        let injector = InjectorBuilder::new()
            .with_binding(
                Binding::bind::<dyn Named + Send + Sync>()
                    .to::<Polish>()
                    .in_scope(ScopeKind::Singleton),
            )
            .build()
            .unwrap();

        let first = injector
            .instance_typed::<dyn Named + Send + Sync>(TaskToken::ROOT)
            .unwrap();
        let second = injector
            .instance_typed::<dyn Named + Send + Sync>(TaskToken::ROOT)
            .unwrap();

        assert_eq!(first.name(), "polish");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn should_fail_on_unbound_trait() {
        let injector = InjectorBuilder::new().build().unwrap();

        assert!(matches!(
            injector.instance_typed::<dyn Named + Send + Sync>(TaskToken::ROOT),
            Err(ResolutionError::Configuration(
                ConfigurationError::UnknownType(_)
            ))
        ));
    }

    #[test]
    fn should_detect_constructor_cycle() {
        let injector = InjectorBuilder::new().build().unwrap();

        match injector.instance_typed::<CycleA>(TaskToken::ROOT) {
            Err(ResolutionError::CircularDependency { path }) => assert_eq!(
                path,
                vec![
                    TypeKey::of::<CycleA>().name,
                    TypeKey::of::<CycleB>().name,
                    TypeKey::of::<CycleA>().name
                ]
            ),
            result => panic!("unexpected result: {:?}", result.map(|_| ())),
        }
    }

    #[test]
    fn should_recover_after_failed_resolution() {
        let injector = InjectorBuilder::new().build().unwrap();

        assert!(injector.instance_typed::<CycleA>(TaskToken::ROOT).is_err());
        assert!(injector
            .instance_typed::<MultipleConstructors>(TaskToken::ROOT)
            .is_ok());
    }
}
