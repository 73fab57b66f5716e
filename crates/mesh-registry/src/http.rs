//! HTTP surface: the six endpoints of the design's §6, wired the way the
//! gateway wires its own router — a single `Arc<RegistryApp>` in
//! `State`, one handler per route, `TraceLayer` for request logging.

use std::sync::Arc;

use axum::extract::{Path, Query, RawQuery, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, head, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use mesh_registry_observability::MetricsExporter;

use crate::cache::ResponseCache;
use crate::error::RegistryError;
use crate::heartbeat::HeartbeatService;
use crate::query::{AgentQuery, QueryService};
use crate::registration::RegistrationService;
use crate::spec::{HeartbeatRequest, RegisterRequest, RegistrationResponse};
use crate::store::RegistryStore;

pub struct RegistryApp<S: RegistryStore> {
    pub registration: RegistrationService<S>,
    pub heartbeat: HeartbeatService<S>,
    pub query: QueryService<S>,
    pub cache: ResponseCache,
    pub metrics: Option<MetricsExporter>,
}

impl<S: RegistryStore> RegistryApp<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_cache(store, ResponseCache::disabled())
    }

    pub fn with_cache(store: Arc<S>, cache: ResponseCache) -> Self {
        Self {
            registration: RegistrationService::new(store.clone()),
            heartbeat: HeartbeatService::new(store.clone()),
            query: QueryService::new(store),
            cache,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsExporter) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

pub fn router<S: RegistryStore + 'static>(app: Arc<RegistryApp<S>>) -> Router {
    Router::new()
        .route("/agents/register", post(register::<S>))
        .route("/heartbeat", post(heartbeat::<S>))
        .route("/heartbeat/:agent_id", head(heartbeat_probe::<S>))
        .route("/agents/:agent_id", delete(unregister::<S>))
        .route("/agents", get(list_agents::<S>))
        .route("/health", get(health::<S>))
        .route("/metrics", get(metrics_handler::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

async fn register<S: RegistryStore>(
    State(app): State<Arc<RegistryApp<S>>>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, RegistryError> {
    let response = app.registration.register(request).await?;
    app.cache.invalidate_all();
    metrics::counter!("mesh_registry_registrations_total").increment(1);
    Ok((StatusCode::CREATED, Json(response)))
}

/// Unknown-agent-without-metadata is reported in-band (§7(ii)): the caller
/// gets a 200 with `status: "error"` rather than an HTTP 404, since a
/// heartbeat from a process the registry has simply never seen (e.g. after
/// a registry restart) is an expected steady-state event, not a client bug.
async fn heartbeat<S: RegistryStore>(
    State(app): State<Arc<RegistryApp<S>>>,
    Json(request): Json<HeartbeatRequest>,
) -> Result<impl IntoResponse, RegistryError> {
    match app.heartbeat.heartbeat(request).await {
        Ok(response) => {
            metrics::counter!("mesh_registry_heartbeats_total").increment(1);
            Ok((StatusCode::OK, Json(response)))
        }
        Err(RegistryError::UnknownAgent(id)) => Ok((
            StatusCode::OK,
            Json(RegistrationResponse {
                status: "error".to_string(),
                agent_id: id,
                timestamp: Utc::now(),
                message: "agent not registered".to_string(),
                dependencies_resolved: Default::default(),
                llm_tools: Default::default(),
                llm_providers: Default::default(),
            }),
        )),
        Err(other) => Err(other),
    }
}

async fn heartbeat_probe<S: RegistryStore>(
    State(app): State<Arc<RegistryApp<S>>>,
    Path(agent_id): Path<String>,
) -> Result<StatusCode, RegistryError> {
    app.heartbeat.probe(&agent_id).await?;
    Ok(StatusCode::OK)
}

async fn unregister<S: RegistryStore>(
    State(app): State<Arc<RegistryApp<S>>>,
    Path(agent_id): Path<String>,
) -> Result<impl IntoResponse, RegistryError> {
    app.registration.unregister(&agent_id).await?;
    app.cache.invalidate_all();
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "status": "success", "agent_id": agent_id })),
    ))
}

#[derive(Debug, Deserialize)]
struct ListAgentsParams {
    namespace: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    /// Comma-separated, matching the wire's `capabilities[]` semantics
    /// (kept over a repeated-key array since axum's `Query` extractor
    /// doesn't parse repeated keys into a `Vec` without a serde_qs layer
    /// the rest of the stack doesn't otherwise need).
    capabilities: Option<String>,
    #[serde(default)]
    fuzzy: bool,
}

async fn list_agents<S: RegistryStore>(
    State(app): State<Arc<RegistryApp<S>>>,
    RawQuery(raw_query): RawQuery,
    Query(params): Query<ListAgentsParams>,
) -> Result<impl IntoResponse, RegistryError> {
    // `timestamp` on a cache hit reflects when the entry was built, not
    // "now" — acceptable for a cache whose whole purpose is staleness
    // bounded by `ttl_secs`.
    let cache_key = raw_query.unwrap_or_default();
    if let Some(cached) = app.cache.get(&cache_key) {
        return Ok(Json(cached));
    }

    let capabilities = params
        .capabilities
        .map(|raw| raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let query = AgentQuery {
        namespace: params.namespace,
        kind: params.kind,
        capabilities,
        fuzzy: params.fuzzy,
    };
    let agents = app.query.list_agents(&query).await?;
    let count = agents.len();
    let body = serde_json::json!({
        "agents": agents,
        "count": count,
        "timestamp": Utc::now(),
    });
    app.cache.put(cache_key, body.clone());
    Ok(Json(body))
}

async fn health<S: RegistryStore>(State(app): State<Arc<RegistryApp<S>>>) -> impl IntoResponse {
    let stats = app.query.list_agents(&AgentQuery::default()).await.ok();
    let agent_count = stats.as_ref().map(|agents| agents.len()).unwrap_or(0);
    Json(serde_json::json!({
        "status": "ok",
        "service": "mesh-registry",
        "database_type": "postgres",
        "cache_enabled": app.cache.is_enabled(),
        "stats": { "registered_agents": agent_count },
    }))
}

async fn metrics_handler<S: RegistryStore>(
    State(app): State<Arc<RegistryApp<S>>>,
) -> Result<String, StatusCode> {
    match &app.metrics {
        Some(exporter) => Ok(exporter.render()),
        None => Err(StatusCode::NOT_FOUND),
    }
}
