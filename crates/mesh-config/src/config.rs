use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError as BuilderError, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG_DIR: &str = "config";

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub health: HealthSection,
    pub cache: CacheSection,
    pub observability: ObservabilitySection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl ServerSection {
    pub fn bind_address(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthSection {
    /// Seconds of silence before a healthy agent is swept to unhealthy.
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,
    /// Tighter threshold used once, at process startup, to reconcile agents
    /// inherited from a prior registry process.
    #[serde(default = "default_startup_threshold")]
    pub startup_threshold_secs: u64,
    /// Interval between background sweep ticks.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_heartbeat_timeout() -> u64 {
    30
}

fn default_startup_threshold() -> u64 {
    15
}

fn default_sweep_interval() -> u64 {
    10
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            startup_threshold_secs: default_startup_threshold(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

fn default_cache_ttl() -> u64 {
    5
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilitySection {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

impl Default for ObservabilitySection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub profile: Option<String>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Builder(#[from] BuilderError),
}

pub fn load(overrides: ConfigOverrides) -> std::result::Result<RegistryConfig, ConfigError> {
    let mut builder = Config::builder();
    builder = builder.add_source(required_file(DEFAULT_CONFIG_DIR, "default.toml"));

    if let Some(profile) = overrides.profile.as_deref() {
        let profile_file = format!("{profile}.toml");
        builder = builder.add_source(optional_file(DEFAULT_CONFIG_DIR, &profile_file));
    }

    if let Some(path) = overrides.config_path {
        builder = builder.add_source(File::from(path));
    }

    builder = builder.add_source(Environment::with_prefix("REGISTRY").separator("__"));

    if let Some(host) = overrides.server_host {
        builder = builder.set_override("server.host", host)?;
    }
    if let Some(port) = overrides.server_port {
        builder = builder.set_override("server.port", port as i64)?;
    }
    if let Some(url) = overrides.database_url {
        builder = builder.set_override("database.url", url)?;
    }
    if let Some(log_level) = overrides.log_level {
        builder = builder.set_override("observability.log_level", log_level)?;
    }
    if let Some(log_format) = overrides.log_format {
        builder = builder.set_override("observability.log_format", log_format)?;
    }

    let config = builder.build()?;
    Ok(config.try_deserialize()?)
}

fn required_file(dir: &str, name: &str) -> File<config::FileSourceFile, FileFormat> {
    File::from(Path::new(dir).join(name)).format(FileFormat::Toml)
}

fn optional_file(dir: &str, name: &str) -> File<config::FileSourceFile, FileFormat> {
    File::from(Path::new(dir).join(name))
        .required(false)
        .format(FileFormat::Toml)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_carry_through_to_builder_state() {
        let mut overrides = ConfigOverrides::default();
        overrides.server_port = Some(9090);
        overrides.log_level = Some("debug".into());
        assert_eq!(overrides.server_port, Some(9090));
        assert_eq!(overrides.log_level.as_deref(), Some("debug"));
    }
}
