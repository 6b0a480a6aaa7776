use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::metadata::{DatabaseEngine, LagClass};

/// SQL dialects the generator can emit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DialectName {
    Postgres,
    ClickHouse,
    Trino,
}

impl DialectName {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectName::Postgres => "postgres",
            DialectName::ClickHouse => "clickhouse",
            DialectName::Trino => "trino",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(DialectName::Postgres),
            "clickhouse" | "ch" => Some(DialectName::ClickHouse),
            "trino" => Some(DialectName::Trino),
            _ => None,
        }
    }

    /// Native dialect of an engine; Iceberg has none and is only reachable through Trino
    pub fn for_engine(engine: DatabaseEngine) -> Option<Self> {
        match engine {
            DatabaseEngine::Postgres => Some(DialectName::Postgres),
            DatabaseEngine::Clickhouse => Some(DialectName::ClickHouse),
            DatabaseEngine::Iceberg => None,
        }
    }
}

/// Caller tolerance for replication lag
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Only the authoritative copy is acceptable
    Realtime,
    Seconds,
    Minutes,
    Hours,
}

impl Freshness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Freshness::Realtime => "realtime",
            Freshness::Seconds => "seconds",
            Freshness::Minutes => "minutes",
            Freshness::Hours => "hours",
        }
    }

    /// Lag bucket this tolerance admits, `None` for realtime
    pub fn as_lag(&self) -> Option<LagClass> {
        match self {
            Freshness::Realtime => None,
            Freshness::Seconds => Some(LagClass::Seconds),
            Freshness::Minutes => Some(LagClass::Minutes),
            Freshness::Hours => Some(LagClass::Hours),
        }
    }
}

/// Chosen execution strategy for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum QueryPlan {
    Direct {
        database: String,
        dialect: DialectName,
    },
    #[serde(rename_all = "camelCase")]
    Materialized {
        database: String,
        dialect: DialectName,
        /// Table id -> physical name of the replicated copy
        table_overrides: BTreeMap<String, String>,
    },
    Trino {
        /// Database id -> Trino catalog
        catalogs: BTreeMap<String, String>,
    },
    #[serde(rename_all = "camelCase")]
    Cache {
        cache_id: String,
        table_id: String,
        key_pattern: String,
        fallback_database: String,
        fallback_dialect: DialectName,
    },
}

impl QueryPlan {
    pub fn strategy(&self) -> &'static str {
        match self {
            QueryPlan::Direct { .. } => "direct",
            QueryPlan::Materialized { .. } => "materialized",
            QueryPlan::Trino { .. } => "trino",
            QueryPlan::Cache { .. } => "cache",
        }
    }

    /// Dialect the generator must emit for this plan
    pub fn dialect(&self) -> DialectName {
        match self {
            QueryPlan::Direct { dialect, .. } | QueryPlan::Materialized { dialect, .. } => *dialect,
            QueryPlan::Trino { .. } => DialectName::Trino,
            QueryPlan::Cache {
                fallback_dialect, ..
            } => *fallback_dialect,
        }
    }

    /// Executor key the generated SQL runs on
    pub fn target_database(&self) -> &str {
        match self {
            QueryPlan::Direct { database, .. } | QueryPlan::Materialized { database, .. } => {
                database
            }
            QueryPlan::Trino { .. } => "trino",
            QueryPlan::Cache {
                fallback_database, ..
            } => fallback_database,
        }
    }

    pub fn table_override(&self, table_id: &str) -> Option<&str> {
        match self {
            QueryPlan::Materialized {
                table_overrides, ..
            } => table_overrides.get(table_id).map(String::as_str),
            _ => None,
        }
    }

    pub fn catalog_for(&self, database: &str) -> Option<&str> {
        match self {
            QueryPlan::Trino { catalogs } => catalogs.get(database).map(String::as_str),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_for_each_strategy() {
        let direct = QueryPlan::Direct {
            database: "ch-analytics".to_string(),
            dialect: DialectName::ClickHouse,
        };
        assert_eq!(direct.dialect(), DialectName::ClickHouse);
        assert_eq!(direct.target_database(), "ch-analytics");

        let trino = QueryPlan::Trino {
            catalogs: BTreeMap::new(),
        };
        assert_eq!(trino.dialect(), DialectName::Trino);
        assert_eq!(trino.target_database(), "trino");

        let cache = QueryPlan::Cache {
            cache_id: "redis-main".to_string(),
            table_id: "users".to_string(),
            key_pattern: "users:{id}".to_string(),
            fallback_database: "pg-main".to_string(),
            fallback_dialect: DialectName::Postgres,
        };
        assert_eq!(cache.dialect(), DialectName::Postgres);
        assert_eq!(cache.strategy(), "cache");
    }

    #[test]
    fn test_materialized_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert("orders".to_string(), "default.orders_replica".to_string());
        let plan = QueryPlan::Materialized {
            database: "ch-analytics".to_string(),
            dialect: DialectName::ClickHouse,
            table_overrides: overrides,
        };
        assert_eq!(plan.table_override("orders"), Some("default.orders_replica"));
        assert_eq!(plan.table_override("events"), None);
    }

    #[test]
    fn test_dialect_parsing() {
        assert_eq!(DialectName::from_str("PostgreSQL"), Some(DialectName::Postgres));
        assert_eq!(DialectName::from_str("ch"), Some(DialectName::ClickHouse));
        assert_eq!(DialectName::from_str("mysql"), None);
        assert_eq!(DialectName::for_engine(DatabaseEngine::Iceberg), None);
    }
}
