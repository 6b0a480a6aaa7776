use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ir::{CompareOp, Logic, SortDirection};
use super::metadata::ColumnType;
use super::plan::{DialectName, Freshness};

/// One result row keyed by output column name
pub type Row = serde_json::Map<String, Value>;

/// Abstract, dialect-agnostic query request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDefinition {
    /// API name of the root table
    pub from: String,
    /// Defaults to every column the caller may see
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub filters: Vec<QueryFilterNode>,
    #[serde(default)]
    pub joins: Vec<QueryJoin>,
    #[serde(default)]
    pub group_by: Vec<QueryColumnRef>,
    #[serde(default)]
    pub aggregations: Vec<QueryAggregation>,
    #[serde(default)]
    pub having: Vec<HavingFilterNode>,
    #[serde(default)]
    pub order_by: Vec<QueryOrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness: Option<Freshness>,
    /// Primary-key lookup; enables the cache strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_ids: Option<Vec<Value>>,
    #[serde(default)]
    pub execute_mode: ExecuteMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecuteMode {
    SqlOnly,
    #[default]
    Execute,
    Count,
}

/// Column reference, optionally qualified by a joined table's API name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryColumnRef {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryJoin {
    pub table: String,
    #[serde(default, rename = "type")]
    pub join_type: JoinType,
    /// Columns of the joined table to select, none by default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    /// Filters whose unqualified columns belong to the joined table
    #[serde(default)]
    pub filters: Vec<QueryFilterNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAggregation {
    /// Column API name or `*`
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(rename = "fn")]
    pub function: AggregateFn,
    pub alias: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOrderBy {
    /// Column API name or aggregation alias
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default = "default_direction")]
    pub direction: SortDirection,
}

fn default_direction() -> SortDirection {
    SortDirection::Asc
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "notIn")]
    NotIn,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "notLike")]
    NotLike,
    #[serde(rename = "ilike")]
    Ilike,
    #[serde(rename = "notIlike")]
    NotIlike,
    #[serde(rename = "isNull")]
    IsNull,
    #[serde(rename = "isNotNull")]
    IsNotNull,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "notBetween")]
    NotBetween,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "icontains")]
    Icontains,
    #[serde(rename = "notContains")]
    NotContains,
    #[serde(rename = "notIcontains")]
    NotIcontains,
    #[serde(rename = "startsWith")]
    StartsWith,
    #[serde(rename = "istartsWith")]
    IstartsWith,
    #[serde(rename = "endsWith")]
    EndsWith,
    #[serde(rename = "iendsWith")]
    IendsWith,
    /// Value is `{ "text": ..., "maxDistance": n }`
    #[serde(rename = "levenshteinLte")]
    LevenshteinLte,
    #[serde(rename = "arrayContains")]
    ArrayContains,
    #[serde(rename = "arrayContainsAll")]
    ArrayContainsAll,
    #[serde(rename = "arrayContainsAny")]
    ArrayContainsAny,
    #[serde(rename = "arrayIsEmpty")]
    ArrayIsEmpty,
    #[serde(rename = "arrayIsNotEmpty")]
    ArrayIsNotEmpty,
}

impl FilterOperator {
    /// The plain comparison this operator denotes, if any
    pub fn as_compare(&self) -> Option<CompareOp> {
        match self {
            FilterOperator::Eq => Some(CompareOp::Eq),
            FilterOperator::NotEq => Some(CompareOp::NotEq),
            FilterOperator::Gt => Some(CompareOp::Gt),
            FilterOperator::Lt => Some(CompareOp::Lt),
            FilterOperator::Gte => Some(CompareOp::Gte),
            FilterOperator::Lte => Some(CompareOp::Lte),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryFilter {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub operator: FilterOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryColumnFilter {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub operator: CompareOp,
    pub ref_column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_table: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryFilterGroup {
    pub logic: Logic,
    #[serde(default)]
    pub not: bool,
    pub conditions: Vec<QueryFilterNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountCondition {
    pub operator: CompareOp,
    pub value: u64,
}

/// Correlated filter over a related table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryExistsFilter {
    #[serde(default = "default_exists")]
    pub exists: bool,
    pub table: String,
    #[serde(default)]
    pub filters: Vec<QueryFilterNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<CountCondition>,
}

fn default_exists() -> bool {
    true
}

/// Filter tree node; the variant is inferred from the fields present
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryFilterNode {
    Group(QueryFilterGroup),
    ColumnCompare(QueryColumnFilter),
    Filter(QueryFilter),
    Exists(QueryExistsFilter),
}

/// HAVING condition on an aggregation alias
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HavingFilter {
    /// Aggregation alias
    pub column: String,
    pub operator: FilterOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HavingFilterGroup {
    pub logic: Logic,
    #[serde(default)]
    pub not: bool,
    pub conditions: Vec<HavingFilterNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HavingFilterNode {
    Group(HavingFilterGroup),
    Filter(HavingFilter),
}

/// Where a table's rows were read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableSource {
    Original,
    Materialized,
    Cache,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableUsage {
    pub table_id: String,
    pub source: TableSource,
    pub database: String,
    pub physical_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMeta {
    pub api_name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub nullable: bool,
    pub from_table: String,
    pub masked: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTiming {
    pub planning_ms: u64,
    pub generation_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultMeta {
    pub query_id: String,
    pub strategy: String,
    pub target_database: String,
    pub dialect: DialectName,
    pub tables_used: Vec<TableUsage>,
    pub columns: Vec<ColumnMeta>,
    pub timing: QueryTiming,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum QueryResult {
    Sql {
        sql: String,
        params: Vec<Value>,
        meta: QueryResultMeta,
    },
    Data {
        data: Vec<Row>,
        meta: QueryResultMeta,
    },
    Count {
        count: u64,
        meta: QueryResultMeta,
    },
}

impl QueryResult {
    pub fn meta(&self) -> &QueryResultMeta {
        match self {
            QueryResult::Sql { meta, .. }
            | QueryResult::Data { meta, .. }
            | QueryResult::Count { meta, .. } => meta,
        }
    }
}
