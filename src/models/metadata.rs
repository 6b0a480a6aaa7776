use serde::{Deserialize, Serialize};
use std::fmt;

use super::access::MaskingFn;

/// Engine behind a physical database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    Postgres,
    Clickhouse,
    /// Only reachable through Trino
    Iceberg,
}

impl DatabaseEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseEngine::Postgres => "postgres",
            DatabaseEngine::Clickhouse => "clickhouse",
            DatabaseEngine::Iceberg => "iceberg",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseMeta {
    pub id: String,
    pub engine: DatabaseEngine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trino_catalog: Option<String>,
}

/// Scalar element type of a column
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Int,
    Decimal,
    Boolean,
    Uuid,
    Date,
    Timestamp,
}

impl ScalarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Int => "int",
            ScalarType::Decimal => "decimal",
            ScalarType::Boolean => "boolean",
            ScalarType::Uuid => "uuid",
            ScalarType::Date => "date",
            ScalarType::Timestamp => "timestamp",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "string" => Some(ScalarType::String),
            "int" => Some(ScalarType::Int),
            "decimal" => Some(ScalarType::Decimal),
            "boolean" => Some(ScalarType::Boolean),
            "uuid" => Some(ScalarType::Uuid),
            "date" => Some(ScalarType::Date),
            "timestamp" => Some(ScalarType::Timestamp),
            _ => None,
        }
    }
}

/// Column type: a scalar or an array of scalars (`"string"` / `"string[]"` on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Scalar(ScalarType),
    Array(ScalarType),
}

impl ColumnType {
    pub fn scalar(&self) -> ScalarType {
        match self {
            ColumnType::Scalar(t) | ColumnType::Array(t) => *t,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ColumnType::Array(_))
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.strip_suffix("[]") {
            Some(inner) => ScalarType::from_str(inner).map(ColumnType::Array),
            None => ScalarType::from_str(s).map(ColumnType::Scalar),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Scalar(t) => write!(f, "{}", t.as_str()),
            ColumnType::Array(t) => write!(f, "{}[]", t.as_str()),
        }
    }
}

impl Serialize for ColumnType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ColumnType::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown column type: {}", raw)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub api_name: String,
    pub physical_name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masking_fn: Option<MaskingFn>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    ManyToOne,
    OneToMany,
    OneToOne,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationTarget {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationSchema {
    pub column: String,
    pub references: RelationTarget,
    #[serde(rename = "type")]
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub id: String,
    pub api_name: String,
    pub database: String,
    /// Schema-qualified physical name, e.g. `public.orders`
    pub physical_name: String,
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub relations: Vec<RelationSchema>,
}

impl TableSchema {
    pub fn column(&self, api_name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.api_name == api_name)
    }
}

/// Replication delay bucket of a sync path
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LagClass {
    Seconds,
    Minutes,
    Hours,
}

impl LagClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LagClass::Seconds => "seconds",
            LagClass::Minutes => "minutes",
            LagClass::Hours => "hours",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "seconds" => Some(LagClass::Seconds),
            "minutes" => Some(LagClass::Minutes),
            "hours" => Some(LagClass::Hours),
            _ => None,
        }
    }

    /// Numeric rank, 1 for the freshest bucket
    pub fn level(&self) -> u8 {
        match self {
            LagClass::Seconds => 1,
            LagClass::Minutes => 2,
            LagClass::Hours => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncMethod {
    Debezium,
}

/// A change-data-capture path replicating a table into another database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossDbSync {
    pub source_table: String,
    pub target_database: String,
    pub target_physical_name: String,
    pub method: SyncMethod,
    pub estimated_lag: LagClass,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedTableMeta {
    pub table_id: String,
    /// Key template, `{id}` is replaced by each requested primary key
    pub key_pattern: String,
    /// API columns stored per cached row, all of them when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub id: String,
    pub tables: Vec<CachedTableMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrinoSettings {
    pub enabled: bool,
}

/// Complete schema and topology configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataConfig {
    pub databases: Vec<DatabaseMeta>,
    pub tables: Vec<TableSchema>,
    #[serde(default)]
    pub caches: Vec<CacheMeta>,
    #[serde(default)]
    pub external_syncs: Vec<CrossDbSync>,
    #[serde(default)]
    pub trino: TrinoSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_parsing() {
        assert_eq!(
            ColumnType::parse("uuid"),
            Some(ColumnType::Scalar(ScalarType::Uuid))
        );
        assert_eq!(
            ColumnType::parse("int[]"),
            Some(ColumnType::Array(ScalarType::Int))
        );
        assert_eq!(ColumnType::parse("varchar"), None);
        assert_eq!(ColumnType::Array(ScalarType::Date).to_string(), "date[]");
    }

    #[test]
    fn test_lag_ordering() {
        assert!(LagClass::Seconds < LagClass::Minutes);
        assert!(LagClass::Minutes < LagClass::Hours);
        assert_eq!(LagClass::Hours.max(LagClass::Seconds), LagClass::Hours);
    }

    #[test]
    fn test_table_deserialization() {
        let table: TableSchema = serde_json::from_value(serde_json::json!({
            "id": "orders",
            "apiName": "orders",
            "database": "pg-main",
            "physicalName": "public.orders",
            "columns": [
                { "apiName": "id", "physicalName": "id", "type": "uuid", "nullable": false },
                { "apiName": "tags", "physicalName": "tags", "type": "string[]", "nullable": true },
                { "apiName": "email", "physicalName": "customer_email", "type": "string",
                  "nullable": false, "maskingFn": "email" }
            ],
            "primaryKey": ["id"],
            "relations": [
                { "column": "customerId", "references": { "table": "customers", "column": "id" },
                  "type": "many-to-one" }
            ]
        }))
        .unwrap();

        assert_eq!(table.columns.len(), 3);
        assert!(table.column("tags").unwrap().column_type.is_array());
        assert_eq!(table.column("email").unwrap().masking_fn, Some(MaskingFn::Email));
        assert_eq!(table.relations[0].cardinality, Cardinality::ManyToOne);
    }
}
