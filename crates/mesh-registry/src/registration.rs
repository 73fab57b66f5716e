//! Registration Service: the orchestration described in the design's §4.1 —
//! validate, transactionally upsert the agent and its capabilities, resolve
//! every declared dependency/llm_filter/llm_provider against the current
//! fleet outside the transaction, persist the resolution tables, update the
//! rollup counters, and assemble the response. Grounded in the gateway's
//! `register_service` handler, which runs the same validate → persist →
//! fan-out-to-dependencies → respond shape.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use crate::backoff::retry_on_contention;
use crate::domain::{CapabilityRecord, DependencyResolutionRow, ResolutionStatus};
use crate::error::RegistryError;
use crate::resolver::{resolve_llm_filter, resolve_llm_provider, resolve_position};
use crate::spec::{
    AgentMetadata, DependencyPosition, DependencySpec, RegisterRequest, RegistrationResponse,
    ResolvedProvider,
};
use crate::store::{RegisterTxnInput, RegistryStore};
use crate::validate::{validate_agent_id, validate_metadata};

const WRITE_MAX_RETRIES: u32 = 5;

pub struct RegistrationService<S: RegistryStore> {
    store: Arc<S>,
}

impl<S: RegistryStore> RegistrationService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, request), fields(agent_id = %request.agent_id))]
    pub async fn register(&self, request: RegisterRequest) -> Result<RegistrationResponse, RegistryError> {
        validate_agent_id(&request.agent_id)?;
        validate_metadata(&request.metadata)?;

        let capabilities = capability_rows(&request.agent_id, &request.metadata);
        let agent_id = request.agent_id.clone();
        let metadata = request.metadata.clone();

        let outcome = retry_on_contention(WRITE_MAX_RETRIES, "register_agent_txn", {
            let store = self.store.clone();
            let agent_id = agent_id.clone();
            let metadata = metadata.clone();
            let capabilities = capabilities.clone();
            move || {
                let store = store.clone();
                let agent_id = agent_id.clone();
                let metadata = metadata.clone();
                let capabilities = capabilities.clone();
                async move {
                    store
                        .register_agent_txn(RegisterTxnInput {
                            agent_id: agent_id.clone(),
                            name: metadata.resolved_name(&agent_id),
                            namespace: metadata.namespace.clone(),
                            kind: metadata.agent_type.clone(),
                            runtime: metadata.agent_type.clone(),
                            version: metadata.version.clone(),
                            http_host: metadata.http_host.clone(),
                            http_port: metadata.resolved_port(),
                            capabilities,
                        })
                        .await
                }
            }
        })
        .await?;

        info!(
            agent_id = %outcome.agent.id,
            first_insert = outcome.first_insert,
            "agent registered"
        );

        let mut response = RegistrationResponse {
            status: "success".to_string(),
            agent_id: agent_id.clone(),
            timestamp: Utc::now(),
            message: if outcome.first_insert {
                "agent registered".to_string()
            } else {
                "agent metadata refreshed".to_string()
            },
            dependencies_resolved: HashMap::new(),
            llm_tools: HashMap::new(),
            llm_providers: HashMap::new(),
        };

        let mut total_dependencies = 0i64;
        let mut dependencies_resolved = 0i64;
        let mut all_dependency_rows = Vec::new();
        let mut all_llm_tool_rows = Vec::new();
        let mut all_llm_provider_rows = Vec::new();

        for tool in &metadata.tools {
            let positions = tool.dependency_positions();
            if !positions.is_empty() {
                let mut resolved_providers = Vec::new();
                for (index, position) in positions.iter().enumerate() {
                    total_dependencies += 1;
                    let candidates = self.candidates_for(position).await?;
                    let resolution = resolve_position(position, &candidates);
                    if resolution.status == ResolutionStatus::Available {
                        dependencies_resolved += 1;
                    }
                    all_dependency_rows.push(resolution_row(
                        &agent_id,
                        &tool.function_name,
                        index as i32,
                        position,
                        &resolution,
                    ));
                    if let Some(provider) = resolution.provider {
                        resolved_providers.push(provider);
                    }
                }
                response
                    .dependencies_resolved
                    .insert(tool.function_name.clone(), resolved_providers);
            }

            if let Some(filter) = &tool.llm_filter {
                let entries: Vec<_> = filter.filter.iter().map(|e| e.normalize()).collect();
                let and_mode = filter.filter_mode.as_deref() == Some("and");
                let other_tools = self
                    .store
                    .list_other_tools(&agent_id)
                    .await
                    .map_err(RegistryError::Transaction)?;
                let matches = resolve_llm_filter(&entries, and_mode, &other_tools);
                all_llm_tool_rows.extend(llm_tool_rows(&agent_id, &tool.function_name, &entries, &matches));
                response.llm_tools.insert(tool.function_name.clone(), matches);
            }

            if let Some(provider_spec) = &tool.llm_provider {
                let spec = DependencySpec::from_wire(provider_spec);
                let candidates = self
                    .store
                    .list_providers_for_capability(&spec.capability)
                    .await
                    .map_err(RegistryError::Transaction)?;
                let winner = resolve_llm_provider(&spec, &candidates);
                all_llm_provider_rows.push(llm_provider_row(&agent_id, &tool.function_name, &spec, &winner));
                response
                    .llm_providers
                    .insert(tool.function_name.clone(), winner);
            }
        }

        // Rewrite each resolution table once, for the whole agent — not once
        // per tool, which would let a later tool's rows clobber an earlier
        // tool's (every write deletes the agent's full row set for that
        // table; see `replace_dependency_resolutions` et al.).
        self.store
            .replace_dependency_resolutions(&agent_id, all_dependency_rows)
            .await
            .map_err(RegistryError::Transaction)?;
        self.store
            .replace_llm_tool_resolutions(&agent_id, all_llm_tool_rows)
            .await
            .map_err(RegistryError::Transaction)?;
        self.store
            .replace_llm_provider_resolutions(&agent_id, all_llm_provider_rows)
            .await
            .map_err(RegistryError::Transaction)?;

        self.store
            .update_counters(&agent_id, total_dependencies, dependencies_resolved, Utc::now())
            .await
            .map_err(RegistryError::Transaction)?;

        Ok(response)
    }

    /// `DELETE /agents/{agent_id}` (§4.6): mark the agent unhealthy, emit
    /// the `unregister` event, and flip any dependency rows that referenced
    /// it as provider to `unavailable`.
    pub async fn unregister(&self, agent_id: &str) -> Result<(), RegistryError> {
        self.store
            .unregister_agent(agent_id)
            .await
            .map_err(RegistryError::Transaction)?;
        self.store
            .update_dependency_status_on_agent_offline(agent_id)
            .await
            .map_err(RegistryError::Transaction)?;
        Ok(())
    }

    async fn candidates_for(
        &self,
        position: &DependencyPosition,
    ) -> Result<Vec<crate::domain::ProviderCandidate>, RegistryError> {
        let mut all = Vec::new();
        for spec in position.alternatives() {
            let mut rows = self
                .store
                .list_providers_for_capability(&spec.capability)
                .await
                .map_err(RegistryError::Transaction)?;
            all.append(&mut rows);
        }
        Ok(all)
    }
}

fn capability_rows(agent_id: &str, metadata: &AgentMetadata) -> Vec<CapabilityRecord> {
    metadata
        .tools
        .iter()
        .map(|tool| CapabilityRecord {
            agent_id: agent_id.to_string(),
            function_name: tool.function_name.clone(),
            capability: tool.capability.clone(),
            version: tool.version.clone(),
            tags: tool.normalized_tags(),
            description: tool.description.clone().unwrap_or_default(),
            input_schema: tool.input_schema.clone(),
            llm_filter: tool.llm_filter.as_ref().and_then(|f| serde_json::to_value(f).ok()),
            llm_provider: tool.llm_provider.as_ref().and_then(|p| serde_json::to_value(p).ok()),
            kwargs: tool.kwargs.clone(),
        })
        .collect()
}

/// Build the persisted row for one `dependencies[]` position. When the
/// position is an OR-alternative list, the first (primary) alternative's
/// spec is what gets recorded in the `required_*` diagnostic columns,
/// mirroring the "preserves the first alternative's spec" rule the design
/// calls out for the unresolved case — the same columns apply whether or not
/// that particular alternative is the one that actually won.
fn resolution_row(
    agent_id: &str,
    function_name: &str,
    position_index: i32,
    position: &DependencyPosition,
    resolution: &crate::resolver::PositionResolution,
) -> DependencyResolutionRow {
    let alternatives = position.alternatives();
    let primary = alternatives.first().copied();
    let (capability, tags, version, namespace) = match primary {
        Some(spec) => (
            spec.capability.clone(),
            spec.raw_tags(),
            spec.version.clone(),
            spec.namespace.clone(),
        ),
        None => (String::new(), Vec::new(), None, None),
    };
    let tag_alternatives = if alternatives.len() > 1 {
        alternatives.iter().map(|spec| spec.raw_tags()).collect()
    } else {
        Vec::new()
    };
    let provider: Option<&ResolvedProvider> = resolution.provider.as_ref();
    DependencyResolutionRow {
        consumer_agent_id: agent_id.to_string(),
        consumer_function_name: function_name.to_string(),
        position: position_index,
        required_capability: capability,
        required_tags: tags,
        required_tag_alternatives: tag_alternatives,
        required_version: version,
        required_namespace: namespace,
        status: resolution.status,
        provider_agent_id: provider.map(|p| p.agent_id.clone()),
        provider_function_name: provider.map(|p| p.function_name.clone()),
        endpoint: provider.map(|p| p.endpoint.clone()),
        resolved_at: provider.map(|_| Utc::now()),
    }
}

/// Rows for an `llm_filter`: one per matched tool (the multi-match result),
/// positionally ordered. When nothing matches, a single sentinel row at
/// position 0 keeps the function's filter visible to queries with status
/// `unresolved`, mirroring how an unresolved dependency position still
/// produces a row.
fn llm_tool_rows(
    agent_id: &str,
    function_name: &str,
    entries: &[DependencySpec],
    matches: &[ResolvedProvider],
) -> Vec<DependencyResolutionRow> {
    if matches.is_empty() {
        let capability = entries.first().map(|e| e.capability.clone()).unwrap_or_default();
        return vec![DependencyResolutionRow {
            consumer_agent_id: agent_id.to_string(),
            consumer_function_name: function_name.to_string(),
            position: 0,
            required_capability: capability,
            required_tags: Vec::new(),
            required_tag_alternatives: entries.iter().map(DependencySpec::raw_tags).collect(),
            required_version: None,
            required_namespace: None,
            status: ResolutionStatus::Unresolved,
            provider_agent_id: None,
            provider_function_name: None,
            endpoint: None,
            resolved_at: None,
        }];
    }
    matches
        .iter()
        .enumerate()
        .map(|(index, provider)| DependencyResolutionRow {
            consumer_agent_id: agent_id.to_string(),
            consumer_function_name: function_name.to_string(),
            position: index as i32,
            required_capability: provider.capability.clone(),
            required_tags: Vec::new(),
            required_tag_alternatives: Vec::new(),
            required_version: None,
            required_namespace: None,
            status: ResolutionStatus::Available,
            provider_agent_id: Some(provider.agent_id.clone()),
            provider_function_name: Some(provider.function_name.clone()),
            endpoint: Some(provider.endpoint.clone()),
            resolved_at: Some(Utc::now()),
        })
        .collect()
}

/// Row for an `llm_provider`: single-match, same shape as a dependency
/// position with exactly one alternative.
fn llm_provider_row(
    agent_id: &str,
    function_name: &str,
    spec: &DependencySpec,
    winner: &Option<ResolvedProvider>,
) -> DependencyResolutionRow {
    DependencyResolutionRow {
        consumer_agent_id: agent_id.to_string(),
        consumer_function_name: function_name.to_string(),
        position: 0,
        required_capability: spec.capability.clone(),
        required_tags: spec.raw_tags(),
        required_tag_alternatives: Vec::new(),
        required_version: spec.version.clone(),
        required_namespace: spec.namespace.clone(),
        status: if winner.is_some() {
            ResolutionStatus::Available
        } else {
            ResolutionStatus::Unresolved
        },
        provider_agent_id: winner.as_ref().map(|p| p.agent_id.clone()),
        provider_function_name: winner.as_ref().map(|p| p.function_name.clone()),
        endpoint: winner.as_ref().map(|p| p.endpoint.clone()),
        resolved_at: winner.as_ref().map(|_| Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_memory::InMemoryRegistryStore;

    fn register_request(json: &str) -> RegisterRequest {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn registering_provider_then_consumer_resolves_dependency() {
        let store = Arc::new(InMemoryRegistryStore::new());
        let service = RegistrationService::new(store);

        let provider = register_request(
            r#"{"agent_id":"math-agent","metadata":{"agent_type":"mcp_agent","http_host":"10.0.0.1","http_port":9000,"tools":[{"function_name":"add","capability":"math.add","version":"1.0.0"}]}}"#,
        );
        service.register(provider).await.unwrap();

        let consumer = register_request(
            r#"{"agent_id":"caller-agent","metadata":{"agent_type":"mcp_agent","tools":[{"function_name":"compute","capability":"util","dependencies":[{"capability":"math.add"}]}]}}"#,
        );
        let response = service.register(consumer).await.unwrap();

        let resolved = response.dependencies_resolved.get("compute").unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].agent_id, "math-agent");
    }

    #[tokio::test]
    async fn unresolved_dependency_yields_empty_provider_list() {
        let store = Arc::new(InMemoryRegistryStore::new());
        let service = RegistrationService::new(store);

        let consumer = register_request(
            r#"{"agent_id":"caller-agent","metadata":{"agent_type":"mcp_agent","tools":[{"function_name":"compute","capability":"util","dependencies":[{"capability":"missing.capability"}]}]}}"#,
        );
        let response = service.register(consumer).await.unwrap();
        assert!(response.dependencies_resolved.get("compute").unwrap().is_empty());
    }

    /// Regression: a consumer with two functions, each declaring its own
    /// dependency, used to lose the first function's resolution rows when
    /// the second function's rows were persisted (every resolution-table
    /// write replaced the agent's entire row set).
    #[tokio::test]
    async fn multiple_functions_each_keep_their_own_resolution_rows() {
        let store = Arc::new(InMemoryRegistryStore::new());
        let service = RegistrationService::new(store.clone());

        service
            .register(register_request(
                r#"{"agent_id":"math-agent","metadata":{"agent_type":"mcp_agent","tools":[{"function_name":"add","capability":"math.add"},{"function_name":"sub","capability":"math.sub"}]}}"#,
            ))
            .await
            .unwrap();

        service
            .register(register_request(
                r#"{"agent_id":"caller-agent","metadata":{"agent_type":"mcp_agent","tools":[
                    {"function_name":"compute_add","capability":"util","dependencies":[{"capability":"math.add"}]},
                    {"function_name":"compute_sub","capability":"util","dependencies":[{"capability":"math.sub"}]}
                ]}}"#,
            ))
            .await
            .unwrap();

        let rows = store.list_dependency_resolutions("caller-agent").await.unwrap();
        assert_eq!(rows.len(), 2, "both functions' rows must survive, not just the last one");
        let functions: std::collections::HashSet<_> =
            rows.iter().map(|r| r.consumer_function_name.clone()).collect();
        assert!(functions.contains("compute_add"));
        assert!(functions.contains("compute_sub"));
    }

    #[tokio::test]
    async fn llm_filter_and_provider_rows_are_persisted() {
        let store = Arc::new(InMemoryRegistryStore::new());
        let service = RegistrationService::new(store.clone());

        service
            .register(register_request(
                r#"{"agent_id":"llm-agent","metadata":{"agent_type":"mcp_agent","http_host":"10.0.0.2","http_port":7000,"tools":[{"function_name":"chat","capability":"llm","version":"1.0.0","tags":["gpt"]}]}}"#,
            ))
            .await
            .unwrap();

        let response = service
            .register(register_request(
                r#"{"agent_id":"caller-agent","metadata":{"agent_type":"mcp_agent","tools":[{
                    "function_name":"ask",
                    "capability":"util",
                    "llm_filter":{"filter":[{"capability":"llm","tags":["gpt"]}]},
                    "llm_provider":{"capability":"llm","tags":["gpt"]}
                }]}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.llm_tools.get("ask").unwrap().len(), 1);
        assert!(response.llm_providers.get("ask").unwrap().is_some());

        let tool_rows = store.list_llm_tool_resolutions("caller-agent").await.unwrap();
        assert_eq!(tool_rows.len(), 1);
        assert_eq!(tool_rows[0].status, crate::domain::ResolutionStatus::Available);

        let provider_rows = store.list_llm_provider_resolutions("caller-agent").await.unwrap();
        assert_eq!(provider_rows.len(), 1);
        assert_eq!(provider_rows[0].provider_agent_id.as_deref(), Some("llm-agent"));
    }

    /// Scenario 1 from the testable-properties section: positions must map
    /// to distinct provider functions, not all collapse onto the first.
    #[tokio::test]
    async fn positional_dependencies_resolve_to_distinct_provider_functions() {
        let store = Arc::new(InMemoryRegistryStore::new());
        let service = RegistrationService::new(store);

        service
            .register(register_request(
                r#"{"agent_id":"math-agent","metadata":{"agent_type":"mcp_agent","tools":[
                    {"function_name":"add","capability":"math_operations","tags":["addition"]},
                    {"function_name":"subtract","capability":"math_operations","tags":["subtraction"]},
                    {"function_name":"multiply","capability":"math_operations","tags":["multiplication"]},
                    {"function_name":"divide","capability":"math_operations","tags":["division"]}
                ]}}"#,
            ))
            .await
            .unwrap();

        let response = service
            .register(register_request(
                r#"{"agent_id":"caller-agent","metadata":{"agent_type":"mcp_agent","tools":[{
                    "function_name":"calc",
                    "capability":"util",
                    "dependencies":[
                        {"capability":"math_operations","tags":["addition"]},
                        {"capability":"math_operations","tags":["subtraction"]},
                        {"capability":"math_operations","tags":["multiplication"]},
                        {"capability":"math_operations","tags":["division"]}
                    ]
                }]}}"#,
            ))
            .await
            .unwrap();

        let resolved = response.dependencies_resolved.get("calc").unwrap();
        assert_eq!(resolved.len(), 4);
        assert_eq!(resolved[0].function_name, "add");
        assert_eq!(resolved[1].function_name, "subtract");
        assert_eq!(resolved[2].function_name, "multiply");
        assert_eq!(resolved[3].function_name, "divide");
    }
}
