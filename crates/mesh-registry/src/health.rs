//! Health Monitor: periodic sweep marking stale agents `unhealthy`, plus a
//! tighter-threshold startup reconciliation pass run once at boot.
//! Grounded in the gateway's readiness-polling background task
//! (`tokio::time::interval` + `tokio::spawn`).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::AgentStatus;
use crate::store::{AgentFilter, RegistryStore};

pub struct HealthMonitor<S: RegistryStore> {
    store: Arc<S>,
    heartbeat_timeout_secs: i64,
    startup_threshold_secs: i64,
}

impl<S: RegistryStore> HealthMonitor<S> {
    pub fn new(store: Arc<S>, heartbeat_timeout_secs: u64, startup_threshold_secs: u64) -> Self {
        Self {
            store,
            heartbeat_timeout_secs: heartbeat_timeout_secs as i64,
            startup_threshold_secs: startup_threshold_secs as i64,
        }
    }

    /// Runs once, immediately, with the tighter `startup_threshold_secs`
    /// window — agents that went silent during a registry restart should
    /// not get the full grace period before being marked unhealthy.
    pub async fn run_startup_reconciliation(&self) {
        info!("running startup health reconciliation");
        self.sweep_once(self.startup_threshold_secs).await;
    }

    /// Spawns the recurring sweep on `sweep_interval`. Call once at boot and
    /// let it run for the process lifetime; dropping the returned handle
    /// aborts it.
    pub fn spawn_periodic_sweep(self: &Arc<Self>, sweep_interval: Duration) -> tokio::task::JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                ticker.tick().await;
                monitor.sweep_once(monitor.heartbeat_timeout_secs).await;
            }
        })
    }

    async fn sweep_once(&self, threshold_secs: i64) {
        let agents = match self.store.list_agents(&AgentFilter::default()).await {
            Ok(agents) => agents,
            Err(err) => {
                warn!(error = %err, "health sweep failed to list agents");
                return;
            }
        };

        let now = Utc::now();
        let mut marked_unhealthy = 0;

        for agent in agents {
            if agent.status != AgentStatus::Healthy {
                continue;
            }
            let staleness = now.signed_duration_since(agent.updated_at).num_seconds();
            if staleness <= threshold_secs {
                continue;
            }
            match self
                .store
                .set_status_with_hook(
                    &agent.id,
                    agent.updated_at,
                    AgentStatus::Healthy,
                    AgentStatus::Unhealthy,
                    true,
                    "health_sweep",
                )
                .await
            {
                Ok(true) => {
                    marked_unhealthy += 1;
                    if let Err(err) = self.store.update_dependency_status_on_agent_offline(&agent.id).await {
                        warn!(agent_id = %agent.id, error = %err, "failed to flip dependent resolutions offline");
                    }
                }
                Ok(false) => {
                    debug!(agent_id = %agent.id, "lost race to a concurrent heartbeat, skipping");
                }
                Err(err) => {
                    warn!(agent_id = %agent.id, error = %err, "health sweep status update failed");
                }
            }
        }

        if marked_unhealthy > 0 {
            info!(marked_unhealthy, "health sweep marked agents unhealthy");
        }
    }
}
