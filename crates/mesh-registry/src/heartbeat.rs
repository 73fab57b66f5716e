//! Heartbeat Path (§4.3): three distinct shapes depending on what the
//! caller sends. Grounded in the client runtime's `send_heartbeat`, which
//! drives exactly these three server-side branches from the caller's side.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use crate::backoff::retry_on_contention;
use crate::domain::AgentStatus;
use crate::error::RegistryError;
use crate::registration::RegistrationService;
use crate::spec::{HeartbeatRequest, RegisterRequest, RegistrationResponse};
use crate::store::RegistryStore;
use crate::validate::validate_agent_id;

const WRITE_MAX_RETRIES: u32 = 5;

pub struct HeartbeatService<S: RegistryStore> {
    store: Arc<S>,
    registration: RegistrationService<S>,
}

impl<S: RegistryStore> HeartbeatService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            registration: RegistrationService::new(store.clone()),
            store,
        }
    }

    /// `POST /heartbeat`. Three branches:
    /// - agent known, no `metadata` → touch only.
    /// - agent known, `metadata` present → re-run the full registration
    ///   pipeline (a heartbeat can refresh capabilities).
    /// - agent unknown, `metadata` present → register as new, sourced
    ///   "via heartbeat" in the audit trail.
    #[instrument(skip(self, request), fields(agent_id = %request.agent_id))]
    pub async fn heartbeat(&self, request: HeartbeatRequest) -> Result<RegistrationResponse, RegistryError> {
        validate_agent_id(&request.agent_id)?;

        let existing = self
            .store
            .get_agent(&request.agent_id)
            .await
            .map_err(RegistryError::Transaction)?;

        match (existing, request.metadata) {
            (Some(_), None) => {
                let agent_id = request.agent_id.clone();
                retry_on_contention(WRITE_MAX_RETRIES, "touch_heartbeat", {
                    let store = self.store.clone();
                    let agent_id = agent_id.clone();
                    move || {
                        let store = store.clone();
                        let agent_id = agent_id.clone();
                        async move { store.touch_heartbeat(&agent_id, Utc::now()).await }
                    }
                })
                .await
                .map_err(RegistryError::Transaction)?;

                info!(agent_id = %agent_id, "heartbeat touched");
                Ok(RegistrationResponse {
                    status: "success".to_string(),
                    agent_id,
                    timestamp: Utc::now(),
                    message: "heartbeat received".to_string(),
                    dependencies_resolved: Default::default(),
                    llm_tools: Default::default(),
                    llm_providers: Default::default(),
                })
            }
            (Some(_), Some(metadata)) | (None, Some(metadata)) => {
                let register_request = RegisterRequest {
                    agent_id: request.agent_id,
                    timestamp: None,
                    metadata,
                };
                self.registration.register(register_request).await
            }
            (None, None) => Err(RegistryError::UnknownAgent(request.agent_id)),
        }
    }

    /// `HEAD /heartbeat/{agent_id}`: a liveness probe used by a recovering
    /// agent to confirm the registry still considers it registered, and to
    /// flip a previously `unhealthy` row back to `healthy` (§4.3, §9).
    pub async fn probe(&self, agent_id: &str) -> Result<AgentStatus, RegistryError> {
        let agent = self
            .store
            .get_agent(agent_id)
            .await
            .map_err(RegistryError::Transaction)?
            .ok_or_else(|| RegistryError::UnknownAgent(agent_id.to_string()))?;

        if agent.status != AgentStatus::Healthy {
            self.store
                .set_status_with_hook(
                    agent_id,
                    agent.updated_at,
                    agent.status,
                    AgentStatus::Healthy,
                    false,
                    "heartbeat_probe",
                )
                .await
                .map_err(RegistryError::Transaction)?;
            return Ok(AgentStatus::Healthy);
        }
        Ok(agent.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_memory::InMemoryRegistryStore;

    fn heartbeat_request(json: &str) -> HeartbeatRequest {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn heartbeat_for_unknown_agent_without_metadata_errors() {
        let store = Arc::new(InMemoryRegistryStore::new());
        let service = HeartbeatService::new(store);
        let request = heartbeat_request(r#"{"agent_id":"ghost"}"#);
        assert!(matches!(
            service.heartbeat(request).await,
            Err(RegistryError::UnknownAgent(_))
        ));
    }

    #[tokio::test]
    async fn heartbeat_with_metadata_registers_unknown_agent() {
        let store = Arc::new(InMemoryRegistryStore::new());
        let service = HeartbeatService::new(store);
        let request = heartbeat_request(
            r#"{"agent_id":"new-agent","metadata":{"agent_type":"mcp_agent"}}"#,
        );
        let response = service.heartbeat(request).await.unwrap();
        assert_eq!(response.agent_id, "new-agent");
    }

    #[tokio::test]
    async fn probe_recovers_unhealthy_agent() {
        let store = Arc::new(InMemoryRegistryStore::new());
        let service = HeartbeatService::new(store.clone());
        let request = heartbeat_request(
            r#"{"agent_id":"flaky-agent","metadata":{"agent_type":"mcp_agent"}}"#,
        );
        service.heartbeat(request).await.unwrap();

        let agent = store.get_agent("flaky-agent").await.unwrap().unwrap();
        store
            .set_status_with_hook(
                "flaky-agent",
                agent.updated_at,
                AgentStatus::Healthy,
                AgentStatus::Unhealthy,
                true,
                "health_sweep",
            )
            .await
            .unwrap();

        let status = service.probe("flaky-agent").await.unwrap();
        assert_eq!(status, AgentStatus::Healthy);
    }
}
