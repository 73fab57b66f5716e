//! Core data model: agents, capabilities, resolution rows, events.
//!
//! These types are the "normalized form" referenced throughout the design —
//! loosely-typed wire payloads are converted into these before any
//! resolution logic runs (see [`crate::spec`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness state of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Healthy => "healthy",
            AgentStatus::Unhealthy => "unhealthy",
            AgentStatus::Unknown => "unknown",
        }
    }
}

/// Outcome of resolving one dependency/LLM-tool/LLM-provider position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    Available,
    Unresolved,
    Unavailable,
}

impl ResolutionStatus {
    pub fn as_str_for_storage(&self) -> &'static str {
        match self {
            ResolutionStatus::Available => "available",
            ResolutionStatus::Unresolved => "unresolved",
            ResolutionStatus::Unavailable => "unavailable",
        }
    }
}

/// Audit log entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Register,
    Unregister,
    Heartbeat,
    Unhealthy,
}

/// A self-identifying process that registers capabilities with the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub kind: String,
    pub runtime: String,
    pub version: String,
    pub http_host: Option<String>,
    pub http_port: Option<u16>,
    pub status: AgentStatus,
    pub updated_at: DateTime<Utc>,
    pub last_full_refresh: Option<DateTime<Utc>>,
    pub total_dependencies: i64,
    pub dependencies_resolved: i64,
}

impl AgentRecord {
    /// `http://host:port` when both are present, else `stdio://<agent-id>`.
    pub fn endpoint(&self) -> String {
        match (&self.http_host, self.http_port) {
            (Some(host), Some(port)) if !host.is_empty() => format!("http://{host}:{port}"),
            _ => format!("stdio://{}", self.id),
        }
    }

    pub fn is_kind_api(&self) -> bool {
        self.kind == "api"
    }
}

/// One advertised operation of an agent. Unique per (agent, function_name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityRecord {
    pub agent_id: String,
    pub function_name: String,
    pub capability: String,
    pub version: String,
    pub tags: Vec<String>,
    pub description: String,
    pub input_schema: Option<serde_json::Value>,
    pub llm_filter: Option<serde_json::Value>,
    pub llm_provider: Option<serde_json::Value>,
    pub kwargs: Option<serde_json::Value>,
}

/// A candidate provider joined with the capability row under consideration.
#[derive(Debug, Clone)]
pub struct ProviderCandidate {
    pub agent: AgentRecord,
    pub capability: CapabilityRecord,
}

/// One dependency-resolution row: (consumer agent, consumer function, position).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyResolutionRow {
    pub consumer_agent_id: String,
    pub consumer_function_name: String,
    pub position: i32,
    pub required_capability: String,
    pub required_tags: Vec<String>,
    pub required_tag_alternatives: Vec<Vec<String>>,
    pub required_version: Option<String>,
    pub required_namespace: Option<String>,
    pub status: ResolutionStatus,
    pub provider_agent_id: Option<String>,
    pub provider_function_name: Option<String>,
    pub endpoint: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Same shape as [`DependencyResolutionRow`], driven by `llm_filter` — one
/// row per matched tool rather than one winner.
pub type LlmToolResolutionRow = DependencyResolutionRow;

/// Same shape as [`DependencyResolutionRow`], driven by `llm_provider`.
pub type LlmProviderResolutionRow = DependencyResolutionRow;

/// Append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub agent_id: String,
    pub data: serde_json::Value,
}

impl RegistryEvent {
    pub fn status_change(
        agent_id: &str,
        old_status: AgentStatus,
        new_status: AgentStatus,
        source: &str,
    ) -> Self {
        let event_type = match new_status {
            AgentStatus::Healthy => EventType::Register,
            AgentStatus::Unhealthy => EventType::Unhealthy,
            AgentStatus::Unknown => EventType::Register,
        };
        Self {
            timestamp: Utc::now(),
            event_type,
            agent_id: agent_id.to_string(),
            data: serde_json::json!({
                "old_status": old_status.as_str(),
                "new_status": new_status.as_str(),
                "source": source,
            }),
        }
    }
}
