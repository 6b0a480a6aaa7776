// Execution strategy selection
//
// Strategies are tried in a fixed order: cache, direct, materialized,
// Trino. The first applicable one wins.

use std::collections::BTreeMap;

use crate::error::{QueryError, Result};
use crate::models::{DialectName, Freshness, QueryPlan, TableSchema};
use crate::services::registry::RegistrySnapshot;

use super::graph::{candidate_order, evaluate_candidate, is_fresh_enough, CandidateDatabase};

/// Choose how to serve a query over `tables`
///
/// # Arguments
/// * `tables` - Every table the query touches, root first
/// * `snapshot` - Registry generation for this request
/// * `freshness` - Caller's lag tolerance, `None` for any
/// * `by_ids` - Whether the query is a primary-key lookup
///
/// # Errors
/// `FreshnessUnsatisfiable` when an executable replicated path exists but
/// lags too much, `NoViableDatabase` when nothing can serve the table set.
pub fn plan_query(
    tables: &[&TableSchema],
    snapshot: &RegistrySnapshot,
    freshness: Option<Freshness>,
    by_ids: bool,
) -> Result<QueryPlan> {
    let root = tables
        .first()
        .ok_or_else(|| QueryError::Validation("Query references no tables".to_string()))?;

    if let Some(plan) = try_cache(tables, snapshot, freshness, by_ids) {
        tracing::debug!("Planned cache strategy for {}", root.id);
        return Ok(plan);
    }

    if tables.iter().all(|t| t.database == root.database) {
        if let Some(dialect) = native_dialect(&root.database, snapshot) {
            tracing::debug!("Planned direct strategy on {}", root.database);
            return Ok(QueryPlan::Direct {
                database: root.database.clone(),
                dialect,
            });
        }
    }

    // First candidate rejected for lag alone
    let mut stale: Option<CandidateDatabase> = None;
    for db in candidate_order(tables, snapshot) {
        let dialect = match native_dialect(db, snapshot) {
            Some(d) => d,
            None => continue,
        };
        let candidate = match evaluate_candidate(db, tables, snapshot) {
            Some(c) if !c.overrides.is_empty() => c,
            _ => continue,
        };
        if !is_fresh_enough(freshness, candidate.worst_lag) {
            stale.get_or_insert(candidate);
            continue;
        }

        tracing::debug!(
            "Planned materialized strategy on {} ({} overrides, worst lag {})",
            db,
            candidate.overrides.len(),
            candidate.worst_lag.as_str()
        );
        return Ok(QueryPlan::Materialized {
            database: candidate.database,
            dialect,
            table_overrides: candidate.overrides,
        });
    }

    if let Some(catalogs) = trino_catalogs(tables, snapshot) {
        tracing::debug!("Planned trino strategy across {} catalogs", catalogs.len());
        return Ok(QueryPlan::Trino { catalogs });
    }

    match stale {
        Some(candidate) => Err(QueryError::FreshnessUnsatisfiable {
            required: freshness.map_or("any", |f| f.as_str()).to_string(),
            worst_lag: candidate.worst_lag.as_str().to_string(),
            database: candidate.database,
        }),
        None => Err(QueryError::NoViableDatabase {
            tables: tables.iter().map(|t| t.id.clone()).collect(),
        }),
    }
}

fn try_cache(
    tables: &[&TableSchema],
    snapshot: &RegistrySnapshot,
    freshness: Option<Freshness>,
    by_ids: bool,
) -> Option<QueryPlan> {
    // Cached rows carry no lag guarantee
    if !by_ids || tables.len() != 1 || freshness == Some(Freshness::Realtime) {
        return None;
    }

    let table = tables[0];
    let entry = snapshot.cache_for(&table.id)?;
    let fallback_dialect = native_dialect(&table.database, snapshot)?;

    Some(QueryPlan::Cache {
        cache_id: entry.cache_id.clone(),
        table_id: table.id.clone(),
        key_pattern: entry.table.key_pattern.clone(),
        fallback_database: table.database.clone(),
        fallback_dialect,
    })
}

fn native_dialect(database: &str, snapshot: &RegistrySnapshot) -> Option<DialectName> {
    snapshot
        .database(database)
        .and_then(|db| DialectName::for_engine(db.engine))
}

/// Catalog per involved database, if Trino can reach all of them
fn trino_catalogs(
    tables: &[&TableSchema],
    snapshot: &RegistrySnapshot,
) -> Option<BTreeMap<String, String>> {
    if !snapshot.trino_enabled() {
        return None;
    }

    let mut catalogs = BTreeMap::new();
    for table in tables {
        let catalog = snapshot.database(&table.database)?.trino_catalog.clone()?;
        catalogs.insert(table.database.clone(), catalog);
    }
    Some(catalogs)
}
