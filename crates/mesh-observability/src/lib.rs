use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Supported log formats for the registry binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(anyhow::anyhow!("unsupported log format: {other}")),
        }
    }
}

/// Configuration driving tracing initialisation.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub service_name: String,
    pub log_format: LogFormat,
    pub log_level: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "mesh-registry".into(),
            log_format: LogFormat::Pretty,
            log_level: "info".into(),
        }
    }
}

/// Install the tracing subscriber with the configured layers.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_new(config.log_level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.log_format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true))
            .try_init(),
    }
    .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}

/// Prometheus exporter wrapper returning rendered metrics text.
#[derive(Clone)]
pub struct MetricsExporter {
    handle: PrometheusHandle,
}

impl MetricsExporter {
    pub fn install_with_defaults() -> Result<Self> {
        Self::install(PrometheusBuilder::new())
    }

    pub fn install(builder: PrometheusBuilder) -> Result<Self> {
        let handle = builder
            .install_recorder()
            .context("failed to install Prometheus recorder")?;
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_format_variants() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("??".parse::<LogFormat>().is_err());
    }
}
