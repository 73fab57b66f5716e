pub mod config;

pub use config::{
    CacheSection, ConfigError, ConfigOverrides, DatabaseSection, HealthSection,
    ObservabilitySection, RegistryConfig, ServerSection,
};
