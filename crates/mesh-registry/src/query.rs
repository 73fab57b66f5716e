//! Query Service: `GET /agents` assembly — each agent eager-loaded with its
//! capabilities and all three resolution tables, with in-process capability
//! filtering layered on top of the namespace/kind pushdown filters the
//! store already applies.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::{AgentRecord, CapabilityRecord, DependencyResolutionRow};
use crate::error::RegistryError;
use crate::store::{AgentFilter, RegistryStore};

#[derive(Debug, Clone, Default)]
pub struct AgentQuery {
    pub namespace: Option<String>,
    pub kind: Option<String>,
    /// `capabilities[]` from the wire (§6): an agent is kept if it advertises
    /// at least one of these. Empty means "no capability filter".
    pub capabilities: Vec<String>,
    /// When set, `capabilities` match case-insensitive substrings rather
    /// than exact names.
    pub fuzzy: bool,
}

#[derive(Debug, Serialize)]
pub struct AgentView {
    #[serde(flatten)]
    pub agent: AgentRecord,
    pub capabilities: Vec<CapabilityRecord>,
    pub dependency_resolutions: Vec<DependencyResolutionRow>,
    pub llm_tool_resolutions: Vec<DependencyResolutionRow>,
    pub llm_provider_resolutions: Vec<DependencyResolutionRow>,
}

pub struct QueryService<S: RegistryStore> {
    store: Arc<S>,
}

impl<S: RegistryStore> QueryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn list_agents(&self, query: &AgentQuery) -> Result<Vec<AgentView>, RegistryError> {
        let filter = AgentFilter {
            namespace: query.namespace.clone(),
            kind: query.kind.clone(),
        };
        let agents = self
            .store
            .list_agents(&filter)
            .await
            .map_err(RegistryError::Transaction)?;

        let mut views = Vec::with_capacity(agents.len());
        for agent in agents {
            let capabilities = self
                .store
                .list_capabilities(&agent.id)
                .await
                .map_err(RegistryError::Transaction)?;

            if !query.capabilities.is_empty() {
                let matches = query
                    .capabilities
                    .iter()
                    .any(|wanted| capabilities.iter().any(|c| capability_matches(c, wanted, !query.fuzzy)));
                if !matches {
                    continue;
                }
            }

            let dependency_resolutions = self
                .store
                .list_dependency_resolutions(&agent.id)
                .await
                .map_err(RegistryError::Transaction)?;
            let llm_tool_resolutions = self
                .store
                .list_llm_tool_resolutions(&agent.id)
                .await
                .map_err(RegistryError::Transaction)?;
            let llm_provider_resolutions = self
                .store
                .list_llm_provider_resolutions(&agent.id)
                .await
                .map_err(RegistryError::Transaction)?;

            views.push(AgentView {
                agent,
                capabilities,
                dependency_resolutions,
                llm_tool_resolutions,
                llm_provider_resolutions,
            });
        }
        Ok(views)
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentView>, RegistryError> {
        let Some(agent) = self.store.get_agent(agent_id).await.map_err(RegistryError::Transaction)? else {
            return Ok(None);
        };
        let capabilities = self
            .store
            .list_capabilities(agent_id)
            .await
            .map_err(RegistryError::Transaction)?;
        let dependency_resolutions = self
            .store
            .list_dependency_resolutions(agent_id)
            .await
            .map_err(RegistryError::Transaction)?;
        let llm_tool_resolutions = self
            .store
            .list_llm_tool_resolutions(agent_id)
            .await
            .map_err(RegistryError::Transaction)?;
        let llm_provider_resolutions = self
            .store
            .list_llm_provider_resolutions(agent_id)
            .await
            .map_err(RegistryError::Transaction)?;
        Ok(Some(AgentView {
            agent,
            capabilities,
            dependency_resolutions,
            llm_tool_resolutions,
            llm_provider_resolutions,
        }))
    }
}

fn capability_matches(record: &CapabilityRecord, wanted: &str, exact: bool) -> bool {
    if exact {
        record.capability == wanted
    } else {
        record.capability.to_lowercase().contains(&wanted.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RegisterTxnInput;
    use crate::store_memory::InMemoryRegistryStore;

    async fn seed(store: &InMemoryRegistryStore, agent_id: &str, capability: &str) {
        store
            .register_agent_txn(RegisterTxnInput {
                agent_id: agent_id.to_string(),
                name: agent_id.to_string(),
                namespace: "default".to_string(),
                kind: "mcp_agent".to_string(),
                runtime: "python".to_string(),
                version: "1.0.0".to_string(),
                http_host: None,
                http_port: None,
                capabilities: vec![CapabilityRecord {
                    agent_id: agent_id.to_string(),
                    function_name: "f".to_string(),
                    capability: capability.to_string(),
                    version: "1.0.0".to_string(),
                    tags: vec![],
                    description: String::new(),
                    input_schema: None,
                    llm_filter: None,
                    llm_provider: None,
                    kwargs: None,
                }],
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fuzzy_capability_filter_is_case_insensitive_substring() {
        let store = Arc::new(InMemoryRegistryStore::new());
        seed(&store, "a1", "Math.Add").await;
        seed(&store, "a2", "vision.detect").await;

        let service = QueryService::new(store);
        let results = service
            .list_agents(&AgentQuery {
                namespace: None,
                kind: None,
                capabilities: vec!["math".to_string()],
                fuzzy: true,
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].agent.id, "a1");
    }

    #[tokio::test]
    async fn exact_capability_filter_requires_full_match() {
        let store = Arc::new(InMemoryRegistryStore::new());
        seed(&store, "a1", "math.add").await;

        let service = QueryService::new(store);
        let results = service
            .list_agents(&AgentQuery {
                namespace: None,
                kind: None,
                capabilities: vec!["math".to_string()],
                fuzzy: false,
            })
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn multiple_capabilities_are_unioned() {
        let store = Arc::new(InMemoryRegistryStore::new());
        seed(&store, "a1", "math.add").await;
        seed(&store, "a2", "vision.detect").await;
        seed(&store, "a3", "audio.transcribe").await;

        let service = QueryService::new(store);
        let results = service
            .list_agents(&AgentQuery {
                namespace: None,
                kind: None,
                capabilities: vec!["math.add".to_string(), "vision.detect".to_string()],
                fuzzy: false,
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }
}
