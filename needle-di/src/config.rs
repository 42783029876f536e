//! Injector configuration. By default, the config is created with conservative default values,
//! which can be overwritten by a `needle.json` file or environment variables prefixed with
//! `NEEDLE_`, when using [InjectorConfig::init_from_environment].

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const CONFIG_ENV_PREFIX: &str = "NEEDLE";

/// Name of the default config file.
pub const CONFIG_FILE: &str = "needle.json";

#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InjectorConfig {
    /// Allow explicit bindings to replace previous bindings for the same type.
    pub allow_binding_overriding: bool,
    /// Discover types declared with `#[injectable]` automatically.
    pub register_static_types: bool,
    /// Should a default tracing logger be installed when the injector is built.
    pub install_tracing_logger: bool,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            allow_binding_overriding: false,
            register_static_types: true,
            install_tracing_logger: false,
        }
    }
}

impl From<OptionalInjectorConfig> for InjectorConfig {
    fn from(value: OptionalInjectorConfig) -> Self {
        let default = Self::default();
        Self {
            allow_binding_overriding: value
                .allow_binding_overriding
                .unwrap_or(default.allow_binding_overriding),
            register_static_types: value
                .register_static_types
                .unwrap_or(default.register_static_types),
            install_tracing_logger: value
                .install_tracing_logger
                .unwrap_or(default.install_tracing_logger),
        }
    }
}

impl InjectorConfig {
    /// Loads the configuration from [CONFIG_FILE] and the environment, falling back to defaults.
    pub fn init_from_environment() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(CONFIG_ENV_PREFIX))
            .build()
            .and_then(|config| config.try_deserialize::<OptionalInjectorConfig>())
            .map(|config| config.into())
    }

    pub fn with_allow_binding_overriding(mut self, allow_binding_overriding: bool) -> Self {
        self.allow_binding_overriding = allow_binding_overriding;
        self
    }

    pub fn with_register_static_types(mut self, register_static_types: bool) -> Self {
        self.register_static_types = register_static_types;
        self
    }

    pub fn with_install_tracing_logger(mut self, install_tracing_logger: bool) -> Self {
        self.install_tracing_logger = install_tracing_logger;
        self
    }
}

#[derive(Deserialize)]
struct OptionalInjectorConfig {
    allow_binding_overriding: Option<bool>,
    register_static_types: Option<bool>,
    install_tracing_logger: Option<bool>,
}
