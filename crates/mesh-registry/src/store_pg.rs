//! Postgres-backed [`RegistryStore`], the production implementation.
//! Grounded in the gateway's `PgPool` wiring (`PgPoolOptions::connect_lazy_with`)
//! and its pattern of mapping `sqlx::Error` into a domain error at the store
//! boundary rather than leaking it upward.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::domain::{
    AgentRecord, AgentStatus, CapabilityRecord, DependencyResolutionRow, LlmProviderResolutionRow,
    LlmToolResolutionRow, ProviderCandidate, RegistryEvent, ResolutionStatus,
};
use crate::store::{AgentFilter, RegisterTxnInput, RegisterTxnOutcome, RegistryStore, StoreError};

pub struct PgRegistryStore {
    pool: PgPool,
}

impl PgRegistryStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Non-blocking variant for startup paths that must not fail if the
    /// database is briefly unreachable — mirrors the gateway's own
    /// `connect_lazy_with` bootstrap.
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(database_url)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_sqlx_err(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("40001") => {
            StoreError::Contention(err.to_string())
        }
        sqlx::Error::PoolTimedOut => StoreError::Contention(err.to_string()),
        _ => StoreError::Backend(err.to_string()),
    }
}

fn agent_from_row(row: &PgRow) -> Result<AgentRecord, StoreError> {
    let status: String = row.try_get("status").map_err(map_sqlx_err)?;
    Ok(AgentRecord {
        id: row.try_get("id").map_err(map_sqlx_err)?,
        name: row.try_get("name").map_err(map_sqlx_err)?,
        namespace: row.try_get("namespace").map_err(map_sqlx_err)?,
        kind: row.try_get("kind").map_err(map_sqlx_err)?,
        runtime: row.try_get("runtime").map_err(map_sqlx_err)?,
        version: row.try_get("version").map_err(map_sqlx_err)?,
        http_host: row.try_get("http_host").map_err(map_sqlx_err)?,
        http_port: row
            .try_get::<Option<i32>, _>("http_port")
            .map_err(map_sqlx_err)?
            .map(|p| p as u16),
        status: parse_status(&status),
        updated_at: row.try_get("updated_at").map_err(map_sqlx_err)?,
        last_full_refresh: row.try_get("last_full_refresh").map_err(map_sqlx_err)?,
        total_dependencies: row.try_get("total_dependencies").map_err(map_sqlx_err)?,
        dependencies_resolved: row.try_get("dependencies_resolved").map_err(map_sqlx_err)?,
    })
}

fn parse_status(raw: &str) -> AgentStatus {
    match raw {
        "healthy" => AgentStatus::Healthy,
        "unhealthy" => AgentStatus::Unhealthy,
        _ => AgentStatus::Unknown,
    }
}

fn capability_from_row(row: &PgRow) -> Result<CapabilityRecord, StoreError> {
    Ok(CapabilityRecord {
        agent_id: row.try_get("agent_id").map_err(map_sqlx_err)?,
        function_name: row.try_get("function_name").map_err(map_sqlx_err)?,
        capability: row.try_get("capability").map_err(map_sqlx_err)?,
        version: row.try_get("version").map_err(map_sqlx_err)?,
        tags: row.try_get("tags").map_err(map_sqlx_err)?,
        description: row.try_get("description").map_err(map_sqlx_err)?,
        input_schema: row.try_get("input_schema").map_err(map_sqlx_err)?,
        llm_filter: row.try_get("llm_filter").map_err(map_sqlx_err)?,
        llm_provider: row.try_get("llm_provider").map_err(map_sqlx_err)?,
        kwargs: row.try_get("kwargs").map_err(map_sqlx_err)?,
    })
}

fn resolution_from_row(row: &PgRow) -> Result<DependencyResolutionRow, StoreError> {
    let status: String = row.try_get("status").map_err(map_sqlx_err)?;
    Ok(DependencyResolutionRow {
        consumer_agent_id: row.try_get("consumer_agent_id").map_err(map_sqlx_err)?,
        consumer_function_name: row.try_get("consumer_function_name").map_err(map_sqlx_err)?,
        position: row.try_get("position").map_err(map_sqlx_err)?,
        required_capability: row.try_get("required_capability").map_err(map_sqlx_err)?,
        required_tags: row.try_get("required_tags").map_err(map_sqlx_err)?,
        required_tag_alternatives: row
            .try_get::<sqlx::types::Json<Vec<Vec<String>>>, _>("required_tag_alternatives")
            .map_err(map_sqlx_err)?
            .0,
        required_version: row.try_get("required_version").map_err(map_sqlx_err)?,
        required_namespace: row.try_get("required_namespace").map_err(map_sqlx_err)?,
        status: match status.as_str() {
            "available" => ResolutionStatus::Available,
            "unavailable" => ResolutionStatus::Unavailable,
            _ => ResolutionStatus::Unresolved,
        },
        provider_agent_id: row.try_get("provider_agent_id").map_err(map_sqlx_err)?,
        provider_function_name: row.try_get("provider_function_name").map_err(map_sqlx_err)?,
        endpoint: row.try_get("endpoint").map_err(map_sqlx_err)?,
        resolved_at: row.try_get("resolved_at").map_err(map_sqlx_err)?,
    })
}

#[async_trait]
impl RegistryStore for PgRegistryStore {
    async fn register_agent_txn(
        &self,
        input: RegisterTxnInput,
    ) -> Result<RegisterTxnOutcome, StoreError> {
        let mut txn = self.pool.begin().await.map_err(map_sqlx_err)?;

        let previous_status: Option<String> = sqlx::query_scalar("SELECT status FROM agents WHERE id = $1")
            .bind(&input.agent_id)
            .fetch_optional(&mut *txn)
            .await
            .map_err(map_sqlx_err)?;

        let row = sqlx::query(
            r#"
            INSERT INTO agents (id, name, namespace, kind, runtime, version, http_host, http_port, status, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'healthy', now())
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                namespace = excluded.namespace,
                kind = excluded.kind,
                runtime = excluded.runtime,
                version = excluded.version,
                http_host = excluded.http_host,
                http_port = excluded.http_port,
                status = 'healthy',
                updated_at = now()
            RETURNING *, (xmax = 0) AS first_insert
            "#,
        )
        .bind(&input.agent_id)
        .bind(&input.name)
        .bind(&input.namespace)
        .bind(&input.kind)
        .bind(&input.runtime)
        .bind(&input.version)
        .bind(&input.http_host)
        .bind(input.http_port.map(|p| p as i32))
        .fetch_one(&mut *txn)
        .await
        .map_err(map_sqlx_err)?;

        let first_insert: bool = row.try_get("first_insert").map_err(map_sqlx_err)?;
        let agent = agent_from_row(&row)?;

        sqlx::query("DELETE FROM capabilities WHERE agent_id = $1")
            .bind(&input.agent_id)
            .execute(&mut *txn)
            .await
            .map_err(map_sqlx_err)?;

        for cap in &input.capabilities {
            sqlx::query(
                r#"
                INSERT INTO capabilities
                    (agent_id, function_name, capability, version, tags, description, input_schema, llm_filter, llm_provider, kwargs)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(&cap.agent_id)
            .bind(&cap.function_name)
            .bind(&cap.capability)
            .bind(&cap.version)
            .bind(&cap.tags)
            .bind(&cap.description)
            .bind(&cap.input_schema)
            .bind(&cap.llm_filter)
            .bind(&cap.llm_provider)
            .bind(&cap.kwargs)
            .execute(&mut *txn)
            .await
            .map_err(map_sqlx_err)?;
        }

        if first_insert {
            if agent.kind != "api" {
                sqlx::query(
                    "INSERT INTO registry_events (timestamp, event_type, agent_id, data) VALUES (now(), 'register', $1, $2)",
                )
                .bind(&input.agent_id)
                .bind(serde_json::json!({ "source": "register" }))
                .execute(&mut *txn)
                .await
                .map_err(map_sqlx_err)?;
            }
        } else if let Some(previous) = previous_status.as_deref().map(parse_status) {
            // A metadata-bearing heartbeat/registration can recover an
            // unhealthy agent; that status transition needs its own event,
            // same as the `set_status_with_hook` path (§3: exactly one event
            // row per transition).
            if previous != AgentStatus::Healthy && agent.kind != "api" {
                let event = RegistryEvent::status_change(&input.agent_id, previous, AgentStatus::Healthy, "via heartbeat");
                sqlx::query(
                    "INSERT INTO registry_events (timestamp, event_type, agent_id, data) VALUES ($1, $2, $3, $4)",
                )
                .bind(event.timestamp)
                .bind(format!("{:?}", event.event_type).to_lowercase())
                .bind(&event.agent_id)
                .bind(&event.data)
                .execute(&mut *txn)
                .await
                .map_err(map_sqlx_err)?;
            }
        }

        txn.commit().await.map_err(map_sqlx_err)?;
        Ok(RegisterTxnOutcome { agent, first_insert })
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = $1")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        row.as_ref().map(agent_from_row).transpose()
    }

    async fn list_agents(&self, filter: &AgentFilter) -> Result<Vec<AgentRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM agents WHERE ($1::text IS NULL OR namespace = $1) AND ($2::text IS NULL OR kind = $2)",
        )
        .bind(&filter.namespace)
        .bind(&filter.kind)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        rows.iter().map(agent_from_row).collect()
    }

    async fn touch_heartbeat(&self, agent_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE agents SET updated_at = $2, last_full_refresh = $2 WHERE id = $1",
        )
        .bind(agent_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(agent_id.to_string()));
        }
        Ok(())
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
        let mut txn = self.pool.begin().await.map_err(map_sqlx_err)?;

        let row = sqlx::query(
            r#"
            UPDATE agents
            SET status = $4,
                updated_at = CASE WHEN $5 THEN updated_at ELSE now() END
            WHERE id = $1 AND updated_at = $2 AND status = $3
            RETURNING kind
            "#,
        )
        .bind(agent_id)
        .bind(expected_updated_at)
        .bind(expected_status.as_str())
        .bind(new_status.as_str())
        .bind(preserve_updated_at)
        .fetch_optional(&mut *txn)
        .await
        .map_err(map_sqlx_err)?;

        let Some(row) = row else {
            txn.rollback().await.map_err(map_sqlx_err)?;
            return Ok(false);
        };

        let kind: String = row.try_get("kind").map_err(map_sqlx_err)?;
        if kind != "api" && expected_status != new_status {
            let event = RegistryEvent::status_change(agent_id, expected_status, new_status, source);
            sqlx::query(
                "INSERT INTO registry_events (timestamp, event_type, agent_id, data) VALUES ($1, $2, $3, $4)",
            )
            .bind(event.timestamp)
            .bind(format!("{:?}", event.event_type).to_lowercase())
            .bind(&event.agent_id)
            .bind(&event.data)
            .execute(&mut *txn)
            .await
            .map_err(map_sqlx_err)?;
        }

        txn.commit().await.map_err(map_sqlx_err)?;
        Ok(true)
    }

    async fn unregister_agent(&self, agent_id: &str) -> Result<(), StoreError> {
        let mut txn = self.pool.begin().await.map_err(map_sqlx_err)?;

        let row = sqlx::query("SELECT kind FROM agents WHERE id = $1")
            .bind(agent_id)
            .fetch_optional(&mut *txn)
            .await
            .map_err(map_sqlx_err)?;
        let Some(row) = row else {
            txn.rollback().await.map_err(map_sqlx_err)?;
            return Ok(());
        };
        let kind: String = row.try_get("kind").map_err(map_sqlx_err)?;

        sqlx::query("UPDATE agents SET status = 'unhealthy', updated_at = now() WHERE id = $1")
            .bind(agent_id)
            .execute(&mut *txn)
            .await
            .map_err(map_sqlx_err)?;

        if kind != "api" {
            sqlx::query(
                "INSERT INTO registry_events (timestamp, event_type, agent_id, data) VALUES (now(), 'unregister', $1, $2)",
            )
            .bind(agent_id)
            .bind(serde_json::json!({}))
            .execute(&mut *txn)
            .await
            .map_err(map_sqlx_err)?;
        }

        txn.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn replace_capabilities(
        &self,
        agent_id: &str,
        capabilities: Vec<CapabilityRecord>,
    ) -> Result<(), StoreError> {
        let mut txn = self.pool.begin().await.map_err(map_sqlx_err)?;
        sqlx::query("DELETE FROM capabilities WHERE agent_id = $1")
            .bind(agent_id)
            .execute(&mut *txn)
            .await
            .map_err(map_sqlx_err)?;
        for cap in &capabilities {
            sqlx::query(
                r#"
                INSERT INTO capabilities
                    (agent_id, function_name, capability, version, tags, description, input_schema, llm_filter, llm_provider, kwargs)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(&cap.agent_id)
            .bind(&cap.function_name)
            .bind(&cap.capability)
            .bind(&cap.version)
            .bind(&cap.tags)
            .bind(&cap.description)
            .bind(&cap.input_schema)
            .bind(&cap.llm_filter)
            .bind(&cap.llm_provider)
            .bind(&cap.kwargs)
            .execute(&mut *txn)
            .await
            .map_err(map_sqlx_err)?;
        }
        txn.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn list_capabilities(&self, agent_id: &str) -> Result<Vec<CapabilityRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM capabilities WHERE agent_id = $1")
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        rows.iter().map(capability_from_row).collect()
    }

    async fn list_providers_for_capability(
        &self,
        capability: &str,
    ) -> Result<Vec<ProviderCandidate>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT a.*, c.agent_id AS cap_agent_id, c.function_name, c.capability, c.version AS cap_version,
                   c.tags, c.description, c.input_schema, c.llm_filter, c.llm_provider, c.kwargs
            FROM capabilities c
            JOIN agents a ON a.id = c.agent_id
            WHERE c.capability = $1
            "#,
        )
        .bind(capability)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        rows.iter()
            .map(|row| {
                Ok(ProviderCandidate {
                    agent: agent_from_row(row)?,
                    capability: CapabilityRecord {
                        agent_id: row.try_get("cap_agent_id").map_err(map_sqlx_err)?,
                        function_name: row.try_get("function_name").map_err(map_sqlx_err)?,
                        capability: row.try_get("capability").map_err(map_sqlx_err)?,
                        version: row.try_get("cap_version").map_err(map_sqlx_err)?,
                        tags: row.try_get("tags").map_err(map_sqlx_err)?,
                        description: row.try_get("description").map_err(map_sqlx_err)?,
                        input_schema: row.try_get("input_schema").map_err(map_sqlx_err)?,
                        llm_filter: row.try_get("llm_filter").map_err(map_sqlx_err)?,
                        llm_provider: row.try_get("llm_provider").map_err(map_sqlx_err)?,
                        kwargs: row.try_get("kwargs").map_err(map_sqlx_err)?,
                    },
                })
            })
            .collect()
    }

    async fn list_other_tools(
        &self,
        excluding_agent_id: &str,
    ) -> Result<Vec<ProviderCandidate>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT a.*, c.agent_id AS cap_agent_id, c.function_name, c.capability, c.version AS cap_version,
                   c.tags, c.description, c.input_schema, c.llm_filter, c.llm_provider, c.kwargs
            FROM capabilities c
            JOIN agents a ON a.id = c.agent_id
            WHERE c.agent_id != $1
            "#,
        )
        .bind(excluding_agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        rows.iter()
            .map(|row| {
                Ok(ProviderCandidate {
                    agent: agent_from_row(row)?,
                    capability: CapabilityRecord {
                        agent_id: row.try_get("cap_agent_id").map_err(map_sqlx_err)?,
                        function_name: row.try_get("function_name").map_err(map_sqlx_err)?,
                        capability: row.try_get("capability").map_err(map_sqlx_err)?,
                        version: row.try_get("cap_version").map_err(map_sqlx_err)?,
                        tags: row.try_get("tags").map_err(map_sqlx_err)?,
                        description: row.try_get("description").map_err(map_sqlx_err)?,
                        input_schema: row.try_get("input_schema").map_err(map_sqlx_err)?,
                        llm_filter: row.try_get("llm_filter").map_err(map_sqlx_err)?,
                        llm_provider: row.try_get("llm_provider").map_err(map_sqlx_err)?,
                        kwargs: row.try_get("kwargs").map_err(map_sqlx_err)?,
                    },
                })
            })
            .collect()
    }

    async fn replace_dependency_resolutions(
        &self,
        agent_id: &str,
        rows: Vec<DependencyResolutionRow>,
    ) -> Result<(), StoreError> {
        replace_resolution_rows(&self.pool, "dependency_resolutions", agent_id, &rows).await
    }

    async fn replace_llm_tool_resolutions(
        &self,
        agent_id: &str,
        rows: Vec<LlmToolResolutionRow>,
    ) -> Result<(), StoreError> {
        replace_resolution_rows(&self.pool, "llm_tool_resolutions", agent_id, &rows).await
    }

    async fn replace_llm_provider_resolutions(
        &self,
        agent_id: &str,
        rows: Vec<LlmProviderResolutionRow>,
    ) -> Result<(), StoreError> {
        replace_resolution_rows(&self.pool, "llm_provider_resolutions", agent_id, &rows).await
    }

    async fn list_dependency_resolutions(
        &self,
        agent_id: &str,
    ) -> Result<Vec<DependencyResolutionRow>, StoreError> {
        list_resolution_rows(&self.pool, "dependency_resolutions", agent_id).await
    }

    async fn list_llm_tool_resolutions(
        &self,
        agent_id: &str,
    ) -> Result<Vec<LlmToolResolutionRow>, StoreError> {
        list_resolution_rows(&self.pool, "llm_tool_resolutions", agent_id).await
    }

    async fn list_llm_provider_resolutions(
        &self,
        agent_id: &str,
    ) -> Result<Vec<LlmProviderResolutionRow>, StoreError> {
        list_resolution_rows(&self.pool, "llm_provider_resolutions", agent_id).await
    }

    async fn update_counters(
        &self,
        agent_id: &str,
        total_dependencies: i64,
        dependencies_resolved: i64,
        last_full_refresh: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE agents SET total_dependencies = $2, dependencies_resolved = $3, last_full_refresh = $4 WHERE id = $1",
        )
        .bind(agent_id)
        .bind(total_dependencies)
        .bind(dependencies_resolved)
        .bind(last_full_refresh)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(agent_id.to_string()));
        }
        Ok(())
    }

    async fn update_dependency_status_on_agent_offline(
        &self,
        agent_id: &str,
    ) -> Result<(), StoreError> {
        for table in ["dependency_resolutions", "llm_tool_resolutions", "llm_provider_resolutions"] {
            let query = format!(
                "UPDATE {table} SET status = 'unavailable' WHERE provider_agent_id = $1 AND status = 'available'"
            );
            sqlx::query(&query)
                .bind(agent_id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        }
        Ok(())
    }

    async fn append_event(&self, event: RegistryEvent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO registry_events (timestamp, event_type, agent_id, data) VALUES ($1, $2, $3, $4)",
        )
        .bind(event.timestamp)
        .bind(format!("{:?}", event.event_type).to_lowercase())
        .bind(&event.agent_id)
        .bind(&event.data)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn list_events(&self, agent_id: &str) -> Result<Vec<RegistryEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT timestamp, event_type, agent_id, data FROM registry_events WHERE agent_id = $1 ORDER BY timestamp",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        rows.iter()
            .map(|row| {
                let event_type: String = row.try_get("event_type").map_err(map_sqlx_err)?;
                Ok(RegistryEvent {
                    timestamp: row.try_get("timestamp").map_err(map_sqlx_err)?,
                    event_type: match event_type.as_str() {
                        "register" => crate::domain::EventType::Register,
                        "unregister" => crate::domain::EventType::Unregister,
                        "heartbeat" => crate::domain::EventType::Heartbeat,
                        _ => crate::domain::EventType::Unhealthy,
                    },
                    agent_id: row.try_get("agent_id").map_err(map_sqlx_err)?,
                    data: row.try_get("data").map_err(map_sqlx_err)?,
                })
            })
            .collect()
    }
}

async fn replace_resolution_rows(
    pool: &PgPool,
    table: &str,
    agent_id: &str,
    rows: &[DependencyResolutionRow],
) -> Result<(), StoreError> {
    let mut txn = pool.begin().await.map_err(map_sqlx_err)?;
    let delete_sql = format!("DELETE FROM {table} WHERE consumer_agent_id = $1");
    sqlx::query(&delete_sql)
        .bind(agent_id)
        .execute(&mut *txn)
        .await
        .map_err(map_sqlx_err)?;

    let insert_sql = format!(
        r#"
        INSERT INTO {table}
            (consumer_agent_id, consumer_function_name, position, required_capability, required_tags,
             required_tag_alternatives, required_version, required_namespace, status,
             provider_agent_id, provider_function_name, endpoint, resolved_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#
    );
    for row in rows {
        sqlx::query(&insert_sql)
            .bind(&row.consumer_agent_id)
            .bind(&row.consumer_function_name)
            .bind(row.position)
            .bind(&row.required_capability)
            .bind(&row.required_tags)
            .bind(sqlx::types::Json(&row.required_tag_alternatives))
            .bind(&row.required_version)
            .bind(&row.required_namespace)
            .bind(row.status.as_str_for_storage())
            .bind(&row.provider_agent_id)
            .bind(&row.provider_function_name)
            .bind(&row.endpoint)
            .bind(row.resolved_at)
            .execute(&mut *txn)
            .await
            .map_err(map_sqlx_err)?;
    }
    txn.commit().await.map_err(map_sqlx_err)?;
    Ok(())
}

async fn list_resolution_rows(
    pool: &PgPool,
    table: &str,
    agent_id: &str,
) -> Result<Vec<DependencyResolutionRow>, StoreError> {
    let sql = format!("SELECT * FROM {table} WHERE consumer_agent_id = $1 ORDER BY position");
    let rows = sqlx::query(&sql)
        .bind(agent_id)
        .fetch_all(pool)
        .await
        .map_err(map_sqlx_err)?;
    rows.iter().map(resolution_from_row).collect()
}
