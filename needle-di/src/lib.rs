//! Dependency injection container with constructor autowiring, lifetime [scopes](scope) and
//! method interception ([aop]).
//!
//! Types become injectable by annotating an inherent impl block with `#[injectable]`, which
//! declares constructors and registers the type statically. Traits become injectable with
//! `#[injectable]` or, when their methods should be interceptable, `#[intercepted]`. Trait
//! implementations are tied to concrete types with `#[implements]` and bound with
//! [Binding](binding::Binding)s.
//!
//! ```
//! use needle_di::binding::Binding;
//! use needle_di::injector::InjectorBuilder;
//! use needle_di::instance::{InstancePtr, TypedInstanceProvider};
//! use needle_di::scope::{ScopeKind, TaskToken};
//! use needle_di::{implements, injectable};
//!
//! #[injectable]
//! trait Storage {
//!     fn load(&self) -> String;
//! }
//!
//! struct MemoryStorage;
//!
//! #[injectable]
//! impl MemoryStorage {
//!     fn new() -> Self {
//!         Self
//!     }
//! }
//!
//! #[implements]
//! impl Storage for MemoryStorage {
//!     fn load(&self) -> String {
//!         "data".to_string()
//!     }
//! }
//!
//! struct Service {
//!     storage: InstancePtr<dyn Storage + Send + Sync>,
//! }
//!
//! #[injectable]
//! impl Service {
//!     fn new(storage: InstancePtr<dyn Storage + Send + Sync>) -> Self {
//!         Self { storage }
//!     }
//! }
//!
//! let injector = InjectorBuilder::new()
//!     .with_binding(
//!         Binding::bind::<dyn Storage + Send + Sync>()
//!             .to::<MemoryStorage>()
//!             .in_scope(ScopeKind::Singleton),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let service = injector.instance_typed::<Service>(TaskToken::ROOT).unwrap();
//! assert_eq!(service.storage.load(), "data");
//! ```

pub mod aop;
pub mod binding;
pub mod config;
pub mod constructor;
pub mod descriptor;
pub mod error;
pub mod injector;
pub mod instance;
pub mod parameter;
pub mod registry;
pub mod resolution;
pub mod scope;

#[cfg(feature = "derive")]
pub use needle_di_derive::{implements, injectable, intercepted};
