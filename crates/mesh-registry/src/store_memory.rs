//! In-memory [`RegistryStore`] backing unit tests and scenario tests.
//! Grounded in the pack's own agent-registry prototype
//! (`Arc<RwLock<HashMap<Uuid, Agent>>>`) and the gateway's
//! `AtomicBool`-backed readiness state — a plain lock-guarded map is the
//! idiomatic stand-in for a database in this codebase's tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{
    AgentRecord, AgentStatus, CapabilityRecord, DependencyResolutionRow, LlmProviderResolutionRow,
    LlmToolResolutionRow, ProviderCandidate, RegistryEvent,
};
use crate::store::{AgentFilter, RegisterTxnInput, RegisterTxnOutcome, RegistryStore, StoreError};

#[derive(Default)]
struct Tables {
    agents: HashMap<String, AgentRecord>,
    capabilities: HashMap<String, Vec<CapabilityRecord>>,
    dependency_resolutions: HashMap<String, Vec<DependencyResolutionRow>>,
    llm_tool_resolutions: HashMap<String, Vec<LlmToolResolutionRow>>,
    llm_provider_resolutions: HashMap<String, Vec<LlmProviderResolutionRow>>,
    events: Vec<RegistryEvent>,
}

pub struct InMemoryRegistryStore {
    tables: Arc<RwLock<Tables>>,
}

impl Default for InMemoryRegistryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    async fn register_agent_txn(
        &self,
        input: RegisterTxnInput,
    ) -> Result<RegisterTxnOutcome, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let previous_status = tables.agents.get(&input.agent_id).map(|a| a.status);
        let first_insert = previous_status.is_none();

        let agent = tables
            .agents
            .entry(input.agent_id.clone())
            .and_modify(|a| {
                a.name = input.name.clone();
                a.namespace = input.namespace.clone();
                a.kind = input.kind.clone();
                a.runtime = input.runtime.clone();
                a.version = input.version.clone();
                a.http_host = input.http_host.clone();
                a.http_port = input.http_port;
                a.status = AgentStatus::Healthy;
                a.updated_at = now;
            })
            .or_insert_with(|| AgentRecord {
                id: input.agent_id.clone(),
                name: input.name.clone(),
                namespace: input.namespace.clone(),
                kind: input.kind.clone(),
                runtime: input.runtime.clone(),
                version: input.version.clone(),
                http_host: input.http_host.clone(),
                http_port: input.http_port,
                status: AgentStatus::Healthy,
                updated_at: now,
                last_full_refresh: None,
                total_dependencies: 0,
                dependencies_resolved: 0,
            })
            .clone();

        tables
            .capabilities
            .insert(input.agent_id.clone(), input.capabilities);

        if first_insert {
            if agent.kind != "api" {
                tables.events.push(RegistryEvent {
                    timestamp: now,
                    event_type: crate::domain::EventType::Register,
                    agent_id: input.agent_id.clone(),
                    data: serde_json::json!({ "source": "register" }),
                });
            }
        } else if let Some(previous) = previous_status {
            // A metadata-bearing heartbeat/registration can recover an
            // unhealthy agent; that status transition needs its own event,
            // same as the `set_status_with_hook` path (§3: exactly one event
            // row per transition).
            if previous != AgentStatus::Healthy && agent.kind != "api" {
                tables.events.push(RegistryEvent::status_change(
                    &input.agent_id,
                    previous,
                    AgentStatus::Healthy,
                    "via heartbeat",
                ));
            }
        }

        Ok(RegisterTxnOutcome {
            agent,
            first_insert,
        })
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.agents.get(agent_id).cloned())
    }

    async fn list_agents(&self, filter: &AgentFilter) -> Result<Vec<AgentRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .agents
            .values()
            .filter(|a| {
                filter
                    .namespace
                    .as_ref()
                    .map_or(true, |ns| &a.namespace == ns)
                    && filter.kind.as_ref().map_or(true, |k| &a.kind == k)
            })
            .cloned()
            .collect())
    }

    async fn touch_heartbeat(&self, agent_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.agents.get_mut(agent_id) {
            Some(agent) => {
                agent.updated_at = now;
                agent.last_full_refresh = Some(now);
                Ok(())
            }
            None => Err(StoreError::NotFound(agent_id.to_string())),
        }
    }

    async fn set_status_with_hook(
        &self,
        agent_id: &str,
        expected_updated_at: DateTime<Utc>,
        expected_status: AgentStatus,
        new_status: AgentStatus,
        preserve_updated_at: bool,
        source: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(agent) = tables.agents.get_mut(agent_id) else {
            return Ok(false);
        };
        if agent.updated_at != expected_updated_at || agent.status != expected_status {
            return Ok(false);
        }
        let old_status = agent.status;
        agent.status = new_status;
        if !preserve_updated_at {
            agent.updated_at = Utc::now();
        }
        let is_api = agent.kind == "api";
        if old_status != new_status && !is_api {
            tables
                .events
                .push(RegistryEvent::status_change(agent_id, old_status, new_status, source));
        }
        Ok(true)
    }

    async fn unregister_agent(&self, agent_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let Some(agent) = tables.agents.get_mut(agent_id) else {
            return Ok(());
        };
        let is_api = agent.kind == "api";
        if !is_api {
            tables.events.push(RegistryEvent {
                timestamp: Utc::now(),
                event_type: crate::domain::EventType::Unregister,
                agent_id: agent_id.to_string(),
                data: serde_json::json!({}),
            });
        }
        agent.status = AgentStatus::Unhealthy;
        agent.updated_at = Utc::now();
        Ok(())
    }

    async fn replace_capabilities(
        &self,
        agent_id: &str,
        capabilities: Vec<CapabilityRecord>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .capabilities
            .insert(agent_id.to_string(), capabilities);
        Ok(())
    }

    async fn list_capabilities(&self, agent_id: &str) -> Result<Vec<CapabilityRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .capabilities
            .get(agent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_providers_for_capability(
        &self,
        capability: &str,
    ) -> Result<Vec<ProviderCandidate>, StoreError> {
        let tables = self.tables.read().await;
        let mut out = Vec::new();
        for (agent_id, caps) in &tables.capabilities {
            let Some(agent) = tables.agents.get(agent_id) else {
                continue;
            };
            for cap in caps {
                if cap.capability == capability {
                    out.push(ProviderCandidate {
                        agent: agent.clone(),
                        capability: cap.clone(),
                    });
                }
            }
        }
        Ok(out)
    }

    async fn list_other_tools(
        &self,
        excluding_agent_id: &str,
    ) -> Result<Vec<ProviderCandidate>, StoreError> {
        let tables = self.tables.read().await;
        let mut out = Vec::new();
        for (agent_id, caps) in &tables.capabilities {
            if agent_id == excluding_agent_id {
                continue;
            }
            let Some(agent) = tables.agents.get(agent_id) else {
                continue;
            };
            for cap in caps {
                out.push(ProviderCandidate {
                    agent: agent.clone(),
                    capability: cap.clone(),
                });
            }
        }
        Ok(out)
    }

    async fn replace_dependency_resolutions(
        &self,
        agent_id: &str,
        rows: Vec<DependencyResolutionRow>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .dependency_resolutions
            .insert(agent_id.to_string(), rows);
        Ok(())
    }

    async fn replace_llm_tool_resolutions(
        &self,
        agent_id: &str,
        rows: Vec<LlmToolResolutionRow>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .llm_tool_resolutions
            .insert(agent_id.to_string(), rows);
        Ok(())
    }

    async fn replace_llm_provider_resolutions(
        &self,
        agent_id: &str,
        rows: Vec<LlmProviderResolutionRow>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .llm_provider_resolutions
            .insert(agent_id.to_string(), rows);
        Ok(())
    }

    async fn list_dependency_resolutions(
        &self,
        agent_id: &str,
    ) -> Result<Vec<DependencyResolutionRow>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .dependency_resolutions
            .get(agent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_llm_tool_resolutions(
        &self,
        agent_id: &str,
    ) -> Result<Vec<LlmToolResolutionRow>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .llm_tool_resolutions
            .get(agent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_llm_provider_resolutions(
        &self,
        agent_id: &str,
    ) -> Result<Vec<LlmProviderResolutionRow>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .llm_provider_resolutions
            .get(agent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_counters(
        &self,
        agent_id: &str,
        total_dependencies: i64,
        dependencies_resolved: i64,
        last_full_refresh: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.agents.get_mut(agent_id) {
            Some(agent) => {
                agent.total_dependencies = total_dependencies;
                agent.dependencies_resolved = dependencies_resolved;
                agent.last_full_refresh = Some(last_full_refresh);
                Ok(())
            }
            None => Err(StoreError::NotFound(agent_id.to_string())),
        }
    }

    async fn update_dependency_status_on_agent_offline(
        &self,
        agent_id: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        for rows in tables.dependency_resolutions.values_mut() {
            for row in rows.iter_mut() {
                if row.provider_agent_id.as_deref() == Some(agent_id)
                    && row.status == crate::domain::ResolutionStatus::Available
                {
                    row.status = crate::domain::ResolutionStatus::Unavailable;
                }
            }
        }
        Ok(())
    }

    async fn append_event(&self, event: RegistryEvent) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.events.push(event);
        Ok(())
    }

    async fn list_events(&self, agent_id: &str) -> Result<Vec<RegistryEvent>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .filter(|e| e.agent_id == agent_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input(agent_id: &str) -> RegisterTxnInput {
        RegisterTxnInput {
            agent_id: agent_id.to_string(),
            name: agent_id.to_string(),
            namespace: "default".to_string(),
            kind: "mcp_agent".to_string(),
            runtime: "python".to_string(),
            version: "1.0.0".to_string(),
            http_host: None,
            http_port: None,
            capabilities: vec![],
        }
    }

    #[tokio::test]
    async fn first_registration_emits_register_event() {
        let store = InMemoryRegistryStore::new();
        let outcome = store
            .register_agent_txn(sample_input("agent-1"))
            .await
            .unwrap();
        assert!(outcome.first_insert);
        let events = store.list_events("agent-1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, crate::domain::EventType::Register);
    }

    #[tokio::test]
    async fn second_registration_does_not_duplicate_register_event() {
        let store = InMemoryRegistryStore::new();
        store
            .register_agent_txn(sample_input("agent-1"))
            .await
            .unwrap();
        let outcome = store
            .register_agent_txn(sample_input("agent-1"))
            .await
            .unwrap();
        assert!(!outcome.first_insert);
        let events = store.list_events("agent-1").await.unwrap();
        assert_eq!(events.len(), 1);
    }

    /// A re-registration (e.g. a metadata-bearing heartbeat) that finds the
    /// agent unhealthy must emit its own event for the recovery, not silently
    /// flip the status.
    #[tokio::test]
    async fn re_registration_of_unhealthy_agent_emits_recovery_event() {
        let store = InMemoryRegistryStore::new();
        store
            .register_agent_txn(sample_input("agent-1"))
            .await
            .unwrap();
        let agent = store.get_agent("agent-1").await.unwrap().unwrap();
        store
            .set_status_with_hook(
                "agent-1",
                agent.updated_at,
                AgentStatus::Healthy,
                AgentStatus::Unhealthy,
                true,
                "health_sweep",
            )
            .await
            .unwrap();

        let outcome = store
            .register_agent_txn(sample_input("agent-1"))
            .await
            .unwrap();
        assert!(!outcome.first_insert);
        assert_eq!(outcome.agent.status, AgentStatus::Healthy);

        let events = store.list_events("agent-1").await.unwrap();
        assert_eq!(events.len(), 2, "the original register event plus the recovery event");
        let recovery = events.last().unwrap();
        assert_eq!(recovery.event_type, crate::domain::EventType::Register);
        assert_eq!(recovery.data["old_status"], "unhealthy");
        assert_eq!(recovery.data["source"], "via heartbeat");
    }

    #[tokio::test]
    async fn conditional_status_update_rejects_stale_read() {
        let store = InMemoryRegistryStore::new();
        store
            .register_agent_txn(sample_input("agent-1"))
            .await
            .unwrap();
        let agent = store.get_agent("agent-1").await.unwrap().unwrap();

        // Simulate a concurrent writer mutating updated_at first.
        store.touch_heartbeat("agent-1", Utc::now()).await.unwrap();

        let applied = store
            .set_status_with_hook(
                "agent-1",
                agent.updated_at,
                AgentStatus::Healthy,
                AgentStatus::Unhealthy,
                true,
                "health_sweep",
            )
            .await
            .unwrap();
        assert!(!applied, "stale optimistic read must not overwrite");
    }
}
