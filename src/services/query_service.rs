// Query execution pipeline
//
// compile -> (cache lookup) -> execute -> mask. The registry snapshot is
// taken once per request; executors and cache providers are keyed by
// database id and cache id.

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{QueryError, Result};
use crate::models::{
    CallerContext, ExecuteMode, QueryDefinition, QueryPlan, QueryResult, QueryResultMeta, Row,
};
use crate::services::access::mask_rows;
use crate::services::compiler::{compile_query, CompiledQuery};
use crate::services::generator::SqlGenerator;
use crate::services::providers::{CacheProvider, DbExecutor};
use crate::services::registry::Registry;

/// Outcome of one liveness check
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub executors: BTreeMap<String, HealthStatus>,
    pub cache_providers: BTreeMap<String, HealthStatus>,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.executors
            .values()
            .chain(self.cache_providers.values())
            .all(|s| s.healthy)
    }
}

pub struct QueryService {
    registry: Arc<Registry>,
    generator: SqlGenerator,
    executors: HashMap<String, Arc<dyn DbExecutor>>,
    caches: HashMap<String, Arc<dyn CacheProvider>>,
}

impl QueryService {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            generator: SqlGenerator::new(),
            executors: HashMap::new(),
            caches: HashMap::new(),
        }
    }

    /// Register the executor for a database id (`trino` for Trino plans)
    pub fn register_executor(&mut self, database: impl Into<String>, executor: Arc<dyn DbExecutor>) {
        self.executors.insert(database.into(), executor);
    }

    pub fn register_cache(&mut self, cache_id: impl Into<String>, provider: Arc<dyn CacheProvider>) {
        self.caches.insert(cache_id.into(), provider);
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Compile without touching any database
    pub async fn compile(
        &self,
        definition: &QueryDefinition,
        context: &CallerContext,
    ) -> Result<CompiledQuery> {
        let query_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("query", id = %query_id, from = %definition.from);
        let snapshot = self.registry.snapshot().await;

        let _entered = span.enter();
        compile_query(definition, context, &snapshot, &self.generator, &query_id)
    }

    /// Compile and, unless the definition asks for SQL only, run the query
    ///
    /// # Errors
    /// Compilation errors as returned by `compile`, `ExecutorNotFound` when
    /// no executor serves the target database, and `Execution` when it fails.
    /// Cache provider failures degrade to the SQL path.
    pub async fn execute(
        &self,
        definition: &QueryDefinition,
        context: &CallerContext,
    ) -> Result<QueryResult> {
        let compiled = self.compile(definition, context).await?;
        let span = tracing::info_span!("execute", id = %compiled.meta.query_id);
        self.execute_compiled(compiled).instrument(span).await
    }

    async fn execute_compiled(&self, compiled: CompiledQuery) -> Result<QueryResult> {
        if compiled.execute_mode == ExecuteMode::SqlOnly {
            return Ok(QueryResult::Sql {
                sql: compiled.generated.sql,
                params: compiled.generated.params,
                meta: compiled.meta,
            });
        }

        let started = Instant::now();

        if let QueryPlan::Cache { .. } = compiled.plan {
            if let Some(rows) = self.read_from_cache(&compiled).await {
                let data = mask_rows(&rows, &compiled.column_access, &compiled.aggregation_aliases)
                    .into_owned();
                let meta = finish_meta(compiled.meta, started);
                return Ok(QueryResult::Data { data, meta });
            }
        }

        let rows = self.run_sql(&compiled).await?;

        if compiled.execute_mode == ExecuteMode::Count {
            let count = extract_count(&rows)?;
            let meta = finish_meta(compiled.meta, started);
            return Ok(QueryResult::Count { count, meta });
        }

        let data = mask_rows(&rows, &compiled.column_access, &compiled.aggregation_aliases)
            .into_owned();
        let meta = finish_meta(compiled.meta, started);
        tracing::info!("Returned {} rows", data.len());
        Ok(QueryResult::Data { data, meta })
    }

    async fn run_sql(&self, compiled: &CompiledQuery) -> Result<Vec<Row>> {
        let database = compiled.plan.target_database();
        let executor = self
            .executors
            .get(database)
            .ok_or_else(|| QueryError::ExecutorNotFound {
                database: database.to_string(),
            })?;

        tracing::debug!(
            "Executing {} SQL on {} with {} parameters",
            compiled.generated.dialect.as_str(),
            database,
            compiled.generated.params.len()
        );

        executor
            .execute(&compiled.generated.sql, &compiled.generated.params)
            .await
            .map_err(|e| QueryError::Execution {
                database: database.to_string(),
                message: e.to_string(),
            })
    }

    /// Rows for every requested id, or `None` to fall back to SQL
    async fn read_from_cache(&self, compiled: &CompiledQuery) -> Option<Vec<Row>> {
        let (cache_id, key_pattern) = match &compiled.plan {
            QueryPlan::Cache {
                cache_id,
                key_pattern,
                ..
            } => (cache_id, key_pattern),
            _ => return None,
        };
        let ids = compiled.by_ids.as_ref()?;

        let provider = match self.caches.get(cache_id) {
            Some(provider) => provider,
            None => {
                tracing::warn!("No cache provider registered for {}", cache_id);
                return None;
            }
        };

        let keys: Vec<String> = ids.iter().map(|id| cache_key(key_pattern, id)).collect();
        let found = match provider.get_many(&keys).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Cache {} failed, falling back to SQL: {}", cache_id, e);
                return None;
            }
        };

        let mut rows = Vec::with_capacity(keys.len());
        for key in &keys {
            let cached = found.get(key).cloned().flatten();
            match cached.and_then(|row| project(row, &compiled.output_columns)) {
                Some(row) => rows.push(row),
                None => {
                    tracing::debug!("Cache miss on {} of {} keys", cache_id, keys.len());
                    return None;
                }
            }
        }

        tracing::debug!("Cache hit on {} for {} keys", cache_id, keys.len());
        Some(rows)
    }

    /// Ping every executor and cache provider concurrently
    pub async fn health_check(&self) -> HealthReport {
        let executors = join_all(self.executors.iter().map(|(id, executor)| async move {
            let started = Instant::now();
            let outcome = executor.ping().await;
            (id.clone(), health_status(outcome, started))
        }));
        let caches = join_all(self.caches.iter().map(|(id, provider)| async move {
            let started = Instant::now();
            let outcome = provider.ping().await;
            (id.clone(), health_status(outcome, started))
        }));

        let (executors, caches) = futures::join!(executors, caches);
        HealthReport {
            executors: executors.into_iter().collect(),
            cache_providers: caches.into_iter().collect(),
        }
    }

    /// Close every executor and cache provider
    ///
    /// All are attempted; the first failure is reported.
    pub async fn close(&self) -> Result<()> {
        let executors = join_all(self.executors.iter().map(|(id, executor)| async move {
            executor.close().await.map_err(|e| QueryError::Execution {
                database: id.clone(),
                message: e.to_string(),
            })
        }));
        let caches = join_all(self.caches.iter().map(|(id, provider)| async move {
            provider.close().await.map_err(|e| QueryError::Cache {
                cache: id.clone(),
                message: e.to_string(),
            })
        }));

        let (executors, caches) = futures::join!(executors, caches);
        tracing::info!(
            "Closed {} executors and {} cache providers",
            executors.len(),
            caches.len()
        );
        executors.into_iter().chain(caches).collect::<Result<Vec<_>>>()?;
        Ok(())
    }
}

fn health_status(outcome: anyhow::Result<()>, started: Instant) -> HealthStatus {
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    match outcome {
        Ok(()) => HealthStatus {
            healthy: true,
            latency_ms,
            error: None,
        },
        Err(e) => HealthStatus {
            healthy: false,
            latency_ms,
            error: Some(e.to_string()),
        },
    }
}

fn finish_meta(mut meta: QueryResultMeta, started: Instant) -> QueryResultMeta {
    meta.timing.execution_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
    meta.executed_at = Some(Utc::now());
    meta
}

/// Substitute `{id}` in a key pattern
pub fn cache_key(pattern: &str, id: &Value) -> String {
    let id = match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    pattern.replace("{id}", &id)
}

/// Keep only the requested columns; `None` if any is missing from the row
fn project(mut row: Row, columns: &[String]) -> Option<Row> {
    let mut out = Row::new();
    for column in columns {
        out.insert(column.clone(), row.remove(column)?);
    }
    Some(out)
}

fn extract_count(rows: &[Row]) -> Result<u64> {
    let value = rows
        .first()
        .and_then(|row| row.values().next())
        .ok_or_else(|| QueryError::Internal("Count query returned no rows".to_string()))?;

    let count = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    count.ok_or_else(|| {
        QueryError::Internal(format!("Count query returned a non-numeric value: {}", value))
    })
}
