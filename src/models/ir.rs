// Structural SQL representation
//
// Dialect-agnostic description of one SELECT. Every literal lives in the
// caller-supplied parameter array; nodes only carry 0-based indexes into it.

use serde::{Deserialize, Serialize};

use super::metadata::{ColumnType, ScalarType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRef {
    pub table_alias: String,
    pub column_name: String,
}

impl ColumnRef {
    pub fn new(table_alias: impl Into<String>, column_name: impl Into<String>) -> Self {
        Self {
            table_alias: table_alias.into(),
            column_name: column_name.into(),
        }
    }
}

/// A select-list entry, optionally renamed in the output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectItem {
    pub column: ColumnRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn aliased(column: ColumnRef, alias: impl Into<String>) -> Self {
        Self {
            column,
            alias: Some(alias.into()),
        }
    }
}

impl From<ColumnRef> for SelectItem {
    fn from(column: ColumnRef) -> Self {
        Self {
            column,
            alias: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    /// Possibly schema-qualified, e.g. `public.orders`
    pub physical_name: String,
    pub alias: String,
    /// Only rendered by dialects with catalog support
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
}

impl TableRef {
    pub fn new(physical_name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            physical_name: physical_name.into(),
            alias: alias.into(),
            catalog: None,
        }
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: TableRef,
    pub left_column: ColumnRef,
    pub right_column: ColumnRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
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
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Gte => ">=",
            CompareOp::Lte => "<=",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "=" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::NotEq),
            ">" => Some(CompareOp::Gt),
            "<" => Some(CompareOp::Lt),
            ">=" => Some(CompareOp::Gte),
            "<=" => Some(CompareOp::Lte),
            _ => None,
        }
    }
}

/// Operators of a single-column condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WhereOperator {
    Compare(CompareOp),
    In,
    NotIn,
    Like,
    NotLike,
    Ilike,
    NotIlike,
    IsNull,
    IsNotNull,
    Contains,
    Icontains,
    NotContains,
    NotIcontains,
    StartsWith,
    IstartsWith,
    EndsWith,
    IendsWith,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhereCondition {
    pub column: ColumnRef,
    pub operator: WhereOperator,
    /// Absent for `IsNull` / `IsNotNull`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_index: Option<usize>,
    /// Drives array casts for `In` / `NotIn`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<ColumnType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhereColumnCondition {
    pub left_column: ColumnRef,
    pub operator: CompareOp,
    pub right_column: ColumnRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhereBetween {
    pub column: ColumnRef,
    #[serde(default)]
    pub not: bool,
    pub from_param_index: usize,
    pub to_param_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArrayOperator {
    Contains,
    ContainsAll,
    ContainsAny,
    IsEmpty,
    IsNotEmpty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhereArrayCondition {
    pub column: ColumnRef,
    pub operator: ArrayOperator,
    #[serde(default)]
    pub param_indexes: Vec<usize>,
    pub element_type: ScalarType,
}

/// `fn(column, param) <op> param`, e.g. an edit-distance bound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhereFunction {
    /// Caller-influenced; checked against the allow-list before rendering
    pub function: String,
    pub column: ColumnRef,
    pub fn_param_index: usize,
    pub operator: CompareOp,
    pub compare_param_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    And,
    Or,
}

impl Logic {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhereGroup {
    pub logic: Logic,
    #[serde(default)]
    pub not: bool,
    pub conditions: Vec<WhereNode>,
}

/// Outer-to-inner column equality that correlates a subquery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correlation {
    pub left_column: ColumnRef,
    pub right_column: ColumnRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelatedSubquery {
    pub from: TableRef,
    pub join: Correlation,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Box<WhereNode>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereExists {
    /// `false` renders NOT EXISTS
    pub exists: bool,
    pub subquery: CorrelatedSubquery,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhereCountedSubquery {
    pub subquery: CorrelatedSubquery,
    pub operator: CompareOp,
    pub count_param_index: usize,
}

/// WHERE predicate tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WhereNode {
    Condition(WhereCondition),
    ColumnCompare(WhereColumnCondition),
    Between(WhereBetween),
    Array(WhereArrayCondition),
    Function(WhereFunction),
    Group(WhereGroup),
    Exists(WhereExists),
    CountedSubquery(WhereCountedSubquery),
}

/// HAVING predicate tree; columns name aggregation aliases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HavingNode {
    #[serde(rename_all = "camelCase")]
    Condition {
        alias: String,
        operator: CompareOp,
        param_index: usize,
    },
    #[serde(rename_all = "camelCase")]
    Between {
        alias: String,
        #[serde(default)]
        not: bool,
        from_param_index: usize,
        to_param_index: usize,
    },
    Group {
        logic: Logic,
        #[serde(default)]
        not: bool,
        conditions: Vec<HavingNode>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregationTarget {
    Star,
    Column(ColumnRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    /// Raw function name; anything outside the safe set renders as COUNT
    pub function: String,
    pub target: AggregationTarget,
    pub alias: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderTarget {
    Column(ColumnRef),
    Alias(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub target: OrderTarget,
    pub direction: SortDirection,
}

/// A full SELECT in structural form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlParts {
    pub select: Vec<SelectItem>,
    #[serde(default)]
    pub distinct: bool,
    /// Emit `COUNT(*)` and ignore `select` / `distinct`
    #[serde(default)]
    pub count_mode: bool,
    pub from: TableRef,
    #[serde(default)]
    pub joins: Vec<JoinClause>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<WhereNode>,
    #[serde(default)]
    pub group_by: Vec<ColumnRef>,
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having: Option<HavingNode>,
    #[serde(default)]
    pub order_by: Vec<OrderByItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl SqlParts {
    pub fn new(from: TableRef) -> Self {
        Self {
            select: Vec::new(),
            distinct: false,
            count_mode: false,
            from,
            joins: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            aggregations: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}
