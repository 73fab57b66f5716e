//! Storage seam: everything the registration/resolution/health algorithms
//! need from "a relational store supporting transactions, conditional
//! `UPDATE … WHERE` and JSON-typed columns" (§1). [`PgRegistryStore`] is the
//! production implementation; [`crate::store_memory::InMemoryRegistryStore`]
//! backs unit and scenario tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{
    AgentRecord, AgentStatus, CapabilityRecord, DependencyResolutionRow, LlmProviderResolutionRow,
    LlmToolResolutionRow, ProviderCandidate, RegistryEvent,
};

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("database busy: {0}")]
    Contention(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Input to the single atomic registration transaction (§4.1 steps 2-4).
#[derive(Debug, Clone)]
pub struct RegisterTxnInput {
    pub agent_id: String,
    pub name: String,
    pub namespace: String,
    pub kind: String,
    pub runtime: String,
    pub version: String,
    pub http_host: Option<String>,
    pub http_port: Option<u16>,
    pub capabilities: Vec<CapabilityRecord>,
}

#[derive(Debug, Clone)]
pub struct RegisterTxnOutcome {
    pub agent: AgentRecord,
    pub first_insert: bool,
}

/// Read-side filters pushed down to the query (namespace/kind); capability
/// filtering (exact or fuzzy) is applied in-process by the Query Service.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub namespace: Option<String>,
    pub kind: Option<String>,
}

#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Atomically upsert the agent row and replace its capability set.
    /// Emits a `register` event inline when this was a first-time insert
    /// and the agent's kind is not `api`.
    async fn register_agent_txn(
        &self,
        input: RegisterTxnInput,
    ) -> Result<RegisterTxnOutcome, StoreError>;

    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, StoreError>;

    async fn list_agents(&self, filter: &AgentFilter) -> Result<Vec<AgentRecord>, StoreError>;

    /// Metadata-free heartbeat: bump `updated_at`/`last_full_refresh` only.
    /// Errors with `NotFound` if the agent has never registered.
    async fn touch_heartbeat(&self, agent_id: &str, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Optimistic conditional status update with an atomic status-change
    /// event emission (§4.5). `Ok(true)` iff the row actually transitioned;
    /// `Ok(false)` means a concurrent writer won the race and no rows were
    /// touched — callers must not retry this as contention.
    async fn set_status_with_hook(
        &self,
        agent_id: &str,
        expected_updated_at: DateTime<Utc>,
        expected_status: AgentStatus,
        new_status: AgentStatus,
        preserve_updated_at: bool,
        source: &str,
    ) -> Result<bool, StoreError>;

    /// Graceful unregister: emit `unregister` event (suppressed for `api`
    /// kind) and set status `unhealthy` with `updated_at = now`, atomically.
    /// Idempotent over a missing agent.
    async fn unregister_agent(&self, agent_id: &str) -> Result<(), StoreError>;

    async fn replace_capabilities(
        &self,
        agent_id: &str,
        capabilities: Vec<CapabilityRecord>,
    ) -> Result<(), StoreError>;

    async fn list_capabilities(&self, agent_id: &str) -> Result<Vec<CapabilityRecord>, StoreError>;

    /// All capability rows (any agent, any status) whose `capability` field
    /// matches, each joined with its owning agent.
    async fn list_providers_for_capability(
        &self,
        capability: &str,
    ) -> Result<Vec<ProviderCandidate>, StoreError>;

    /// All tool rows belonging to any agent other than `excluding_agent_id`
    /// — the universe the LLM-tool filter enumerates over.
    async fn list_other_tools(
        &self,
        excluding_agent_id: &str,
    ) -> Result<Vec<ProviderCandidate>, StoreError>;

    async fn replace_dependency_resolutions(
        &self,
        agent_id: &str,
        rows: Vec<DependencyResolutionRow>,
    ) -> Result<(), StoreError>;

    async fn replace_llm_tool_resolutions(
        &self,
        agent_id: &str,
        rows: Vec<LlmToolResolutionRow>,
    ) -> Result<(), StoreError>;

    async fn replace_llm_provider_resolutions(
        &self,
        agent_id: &str,
        rows: Vec<LlmProviderResolutionRow>,
    ) -> Result<(), StoreError>;

    async fn list_dependency_resolutions(
        &self,
        agent_id: &str,
    ) -> Result<Vec<DependencyResolutionRow>, StoreError>;

    async fn list_llm_tool_resolutions(
        &self,
        agent_id: &str,
    ) -> Result<Vec<LlmToolResolutionRow>, StoreError>;

    async fn list_llm_provider_resolutions(
        &self,
        agent_id: &str,
    ) -> Result<Vec<LlmProviderResolutionRow>, StoreError>;

    async fn update_counters(
        &self,
        agent_id: &str,
        total_dependencies: i64,
        dependencies_resolved: i64,
        last_full_refresh: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Soft-reference maintenance (§9): flip `available` rows referencing
    /// `agent_id` as provider to `unavailable` once it goes offline.
    async fn update_dependency_status_on_agent_offline(
        &self,
        agent_id: &str,
    ) -> Result<(), StoreError>;

    async fn append_event(&self, event: RegistryEvent) -> Result<(), StoreError>;

    async fn list_events(&self, agent_id: &str) -> Result<Vec<RegistryEvent>, StoreError>;
}
