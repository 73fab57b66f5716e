//! `mesh-registryd`: CLI entrypoint. Loads layered configuration, installs
//! tracing and the Prometheus exporter, connects to Postgres, and serves
//! the HTTP surface with graceful shutdown — the same shape as the
//! gateway's own `main`, generalized to this binary's config/store types.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mesh_registry::cache::ResponseCache;
use mesh_registry::health::HealthMonitor;
use mesh_registry::http::{router, RegistryApp};
use mesh_registry::store_pg::PgRegistryStore;
use mesh_registry_config::{load, ConfigOverrides};
use mesh_registry_observability::{init_tracing, LogFormat, MetricsExporter, TracingConfig};
use tokio::signal;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "mesh-registryd", about = "Service-mesh registry")]
struct Cli {
    #[arg(long)]
    config: Option<std::path::PathBuf>,
    #[arg(long)]
    profile: Option<String>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    log_level: Option<String>,
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load(ConfigOverrides {
        config_path: cli.config,
        profile: cli.profile,
        server_host: cli.host,
        server_port: cli.port,
        database_url: cli.database_url,
        log_level: cli.log_level,
        log_format: cli.log_format,
    })
    .context("failed to load configuration")?;

    let log_format: LogFormat = config
        .observability
        .log_format
        .parse()
        .unwrap_or(LogFormat::Pretty);
    init_tracing(&TracingConfig {
        service_name: "mesh-registry".to_string(),
        log_format,
        log_level: config.observability.log_level.clone(),
    })
    .context("failed to install tracing subscriber")?;

    info!(bind = %config.server.bind_address()?, "starting mesh-registryd");

    let store = Arc::new(
        PgRegistryStore::connect(&config.database.url, config.database.max_connections)
            .await
            .context("failed to connect to database")?,
    );

    let cache = ResponseCache::new(config.cache.enabled, config.cache.ttl_secs);
    let mut app = RegistryApp::with_cache(store.clone(), cache);
    match MetricsExporter::install_with_defaults() {
        Ok(exporter) => app = app.with_metrics(exporter),
        Err(err) => tracing::warn!(?err, "failed to install Prometheus recorder, /metrics disabled"),
    }
    let app = Arc::new(app);

    let health_monitor = Arc::new(HealthMonitor::new(
        store,
        config.health.heartbeat_timeout_secs,
        config.health.startup_threshold_secs,
    ));
    health_monitor.run_startup_reconciliation().await;
    let _sweep_handle =
        health_monitor.spawn_periodic_sweep(Duration::from_secs(config.health.sweep_interval_secs));

    let addr: SocketAddr = config.server.bind_address()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "mesh-registryd listening");
    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, draining connections");
}
