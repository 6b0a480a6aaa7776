// SQL generation
//
// Turns the structural IR into SQL text and ordered parameters for the
// dialect a plan selects. Dialects are stateless strategies keyed by name.

pub mod builder;
pub mod clickhouse;
pub mod dialect;
pub mod fragments;
pub mod postgres;
pub mod trino;

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{QueryError, Result};
use crate::models::{DialectName, QueryPlan, SqlParts};

pub use builder::SqlBuilder;
pub use clickhouse::ClickHouseDialect;
pub use dialect::{ParamSink, SqlDialect};
pub use fragments::{safe_agg_fn, safe_where_fn};
pub use postgres::PostgresDialect;
pub use trino::TrinoDialect;

/// Generated statement ready for an executor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedSql {
    pub sql: String,
    pub params: Vec<Value>,
    pub dialect: DialectName,
}

/// Registry of dialect implementations
///
/// # Example
/// ```rust,ignore
/// let generator = SqlGenerator::new();
/// let generated = generator.generate(&plan, &parts, &params)?;
/// println!("{} ({} params)", generated.sql, generated.params.len());
/// ```
pub struct SqlGenerator {
    dialects: HashMap<DialectName, Arc<dyn SqlDialect>>,
}

impl SqlGenerator {
    /// Generator with the built-in Postgres, ClickHouse and Trino dialects
    pub fn new() -> Self {
        let mut dialects: HashMap<DialectName, Arc<dyn SqlDialect>> = HashMap::new();
        dialects.insert(DialectName::Postgres, Arc::new(PostgresDialect::new()));
        dialects.insert(DialectName::ClickHouse, Arc::new(ClickHouseDialect::new()));
        dialects.insert(DialectName::Trino, Arc::new(TrinoDialect::new()));
        Self { dialects }
    }

    /// Generate SQL for the dialect selected by `plan`
    ///
    /// # Arguments
    /// * `plan` - Chosen strategy; decides the dialect
    /// * `parts` - Structural query
    /// * `params` - Inputs referenced by 0-based IR indexes
    ///
    /// # Errors
    /// `UnsupportedFunction` for a disallowed predicate function and
    /// `MissingParameter` for an index past the end of `params`. No SQL is
    /// produced in either case.
    pub fn generate(&self, plan: &QueryPlan, parts: &SqlParts, params: &[Value]) -> Result<GeneratedSql> {
        let dialect = plan.dialect();
        let implementation = self.dialects.get(&dialect).ok_or_else(|| {
            QueryError::Internal(format!("No dialect registered for {}", dialect.as_str()))
        })?;

        let (sql, params) = SqlBuilder::new(implementation.as_ref(), params).build(parts)?;
        tracing::debug!(
            "Generated {} SQL with {} parameters",
            dialect.as_str(),
            params.len()
        );

        Ok(GeneratedSql {
            sql,
            params,
            dialect,
        })
    }
}

impl Default for SqlGenerator {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{base, col, cond, render};
    use super::*;
    use crate::models::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn direct(dialect: DialectName) -> QueryPlan {
        QueryPlan::Direct {
            database: "db".to_string(),
            dialect,
        }
    }

    fn all_plans() -> Vec<QueryPlan> {
        vec![
            direct(DialectName::Postgres),
            direct(DialectName::ClickHouse),
            QueryPlan::Trino {
                catalogs: BTreeMap::new(),
            },
        ]
    }

    fn generate(plan: &QueryPlan, parts: &SqlParts, params: &[Value]) -> Result<GeneratedSql> {
        SqlGenerator::new().generate(plan, parts, params)
    }

    #[test]
    fn test_dialect_follows_plan() {
        let generator = SqlGenerator::new();
        let parts = base("public");
        let cache = QueryPlan::Cache {
            cache_id: "redis".to_string(),
            table_id: "users".to_string(),
            key_pattern: "users:{id}".to_string(),
            fallback_database: "ch".to_string(),
            fallback_dialect: DialectName::ClickHouse,
        };
        assert_eq!(generator.generate(&cache, &parts, &[]).unwrap().dialect, DialectName::ClickHouse);

        let materialized = QueryPlan::Materialized {
            database: "pg".to_string(),
            dialect: DialectName::Postgres,
            table_overrides: BTreeMap::new(),
        };
        assert_eq!(generate(&materialized, &parts, &[]).unwrap().dialect, DialectName::Postgres);
    }

    #[test]
    fn test_single_equality_round_trip() {
        let expected = ["$1", "{p1:String}", "?"];
        for (plan, placeholder) in all_plans().iter().zip(expected) {
            let mut parts = base("public");
            parts.where_clause = Some(cond("name", WhereOperator::Compare(CompareOp::Eq), 0, None));
            let generated = generate(plan, &parts, &[json!("alice")]).unwrap();

            assert_eq!(generated.sql.matches(placeholder).count(), 1, "{}", generated.sql);
            assert_eq!(generated.params, vec![json!("alice")]);
        }
    }

    #[test]
    fn test_disallowed_function_aborts_generation() {
        for name in ["concat", "levenshtein; DROP TABLE users"] {
            let mut parts = base("public");
            parts.where_clause = Some(WhereNode::Function(WhereFunction {
                function: name.to_string(),
                column: col("t0", "name"),
                fn_param_index: 0,
                operator: CompareOp::Lte,
                compare_param_index: 1,
            }));
            for plan in all_plans() {
                let err = generate(&plan, &parts, &[json!("x"), json!(1)]).unwrap_err();
                assert!(matches!(err, QueryError::UnsupportedFunction { .. }));
            }
        }
    }

    #[test]
    fn test_missing_parameter() {
        let mut parts = base("public");
        parts.where_clause = Some(cond("name", WhereOperator::Compare(CompareOp::Eq), 3, None));
        let err = generate(&direct(DialectName::Postgres), &parts, &[json!("x")]).unwrap_err();
        assert!(matches!(err, QueryError::MissingParameter { index: 3 }));
    }

    #[test]
    fn test_numbering_follows_emission_order() {
        let mut parts = base("public");
        parts.where_clause = Some(WhereNode::Group(WhereGroup {
            logic: Logic::And,
            not: false,
            conditions: vec![
                cond("name", WhereOperator::Compare(CompareOp::Eq), 2, None),
                cond("id", WhereOperator::Compare(CompareOp::Gt), 0, None),
            ],
        }));
        let (sql, params) = render(&PostgresDialect, &parts, &[json!(1), json!("unused"), json!("bob")]);
        assert!(sql.contains("(\"t0\".\"name\" = $1 AND \"t0\".\"id\" > $2)"));
        assert_eq!(params, vec![json!("bob"), json!(1)]);
    }

    #[test]
    fn test_between_and_column_compare() {
        let mut parts = base("public");
        parts.where_clause = Some(WhereNode::Group(WhereGroup {
            logic: Logic::Or,
            not: true,
            conditions: vec![
                WhereNode::Between(WhereBetween {
                    column: col("t0", "age"),
                    not: true,
                    from_param_index: 0,
                    to_param_index: 1,
                }),
                WhereNode::ColumnCompare(WhereColumnCondition {
                    left_column: col("t0", "created_at"),
                    operator: CompareOp::Lt,
                    right_column: col("t0", "updated_at"),
                }),
            ],
        }));
        let (sql, _) = render(&PostgresDialect, &parts, &[json!(18), json!(65)]);
        assert!(sql.contains(
            "WHERE NOT (NOT (\"t0\".\"age\" BETWEEN $1 AND $2) OR \"t0\".\"created_at\" < \"t0\".\"updated_at\")"
        ));
    }

    #[test]
    fn test_empty_groups() {
        let mut parts = base("public");
        parts.where_clause = Some(WhereNode::Group(WhereGroup {
            logic: Logic::Or,
            not: false,
            conditions: vec![],
        }));
        let (sql, _) = render(&PostgresDialect, &parts, &[]);
        assert!(sql.ends_with("WHERE (1 = 0)"));
    }

    fn orders_subquery(inner: Option<WhereNode>) -> CorrelatedSubquery {
        CorrelatedSubquery {
            from: TableRef::new("public.orders", "s0"),
            join: Correlation {
                left_column: col("t0", "id"),
                right_column: col("s0", "user_id"),
            },
            where_clause: inner.map(Box::new),
        }
    }

    #[test]
    fn test_exists_subquery() {
        let inner = WhereNode::Condition(WhereCondition {
            column: col("s0", "status"),
            operator: WhereOperator::Compare(CompareOp::Eq),
            param_index: Some(0),
            column_type: None,
        });
        let mut parts = base("public");
        parts.where_clause = Some(WhereNode::Exists(WhereExists {
            exists: false,
            subquery: orders_subquery(Some(inner)),
        }));
        let (sql, params) = render(&PostgresDialect, &parts, &[json!("paid")]);
        assert!(sql.contains(
            "WHERE NOT EXISTS (SELECT 1 FROM \"public\".\"orders\" AS \"s0\" \
             WHERE \"t0\".\"id\" = \"s0\".\"user_id\" AND \"s0\".\"status\" = $1)"
        ));
        assert_eq!(params, vec![json!("paid")]);
    }

    #[test]
    fn test_counted_subquery() {
        let mut parts = base("default");
        parts.where_clause = Some(WhereNode::CountedSubquery(WhereCountedSubquery {
            subquery: orders_subquery(None),
            operator: CompareOp::Gte,
            count_param_index: 0,
        }));
        let (sql, _) = render(&ClickHouseDialect, &parts, &[json!(3)]);
        assert!(sql.contains(
            "WHERE (SELECT COUNT(*) FROM `public`.`orders` AS `s0` \
             WHERE `t0`.`id` = `s0`.`user_id`) >= {p1:Int32}"
        ));
    }

    #[test]
    fn test_aggregation_pipeline() {
        let mut parts = base("public");
        parts.select = vec![SelectItem::aliased(col("t0", "status"), "status")];
        parts.distinct = true;
        parts.group_by = vec![col("t0", "status")];
        parts.aggregations = vec![
            Aggregation {
                function: "count".to_string(),
                target: AggregationTarget::Star,
                alias: "cnt".to_string(),
            },
            Aggregation {
                function: "sum); DROP TABLE x;--".to_string(),
                target: AggregationTarget::Column(col("t0", "total")),
                alias: "total".to_string(),
            },
        ];
        parts.having = Some(HavingNode::Condition {
            alias: "cnt".to_string(),
            operator: CompareOp::Gt,
            param_index: 0,
        });
        parts.order_by = vec![OrderByItem {
            target: OrderTarget::Alias("cnt".to_string()),
            direction: SortDirection::Desc,
        }];

        let (sql, params) = render(&PostgresDialect, &parts, &[json!(5)]);
        assert_eq!(
            sql,
            "SELECT DISTINCT \"t0\".\"status\" AS \"status\", COUNT(*) AS \"cnt\", \
             COUNT(\"t0\".\"total\") AS \"total\" FROM \"public\".\"users\" AS \"t0\" \
             GROUP BY \"t0\".\"status\" HAVING \"cnt\" > $1 ORDER BY \"cnt\" DESC"
        );
        assert_eq!(params, vec![json!(5)]);
    }

    #[test]
    fn test_having_group_and_between() {
        let mut parts = base("public");
        parts.having = Some(HavingNode::Group {
            logic: Logic::And,
            not: false,
            conditions: vec![
                HavingNode::Between {
                    alias: "total".to_string(),
                    not: false,
                    from_param_index: 0,
                    to_param_index: 1,
                },
                HavingNode::Condition {
                    alias: "cnt".to_string(),
                    operator: CompareOp::NotEq,
                    param_index: 2,
                },
            ],
        });
        let (sql, _) = render(&TrinoDialect, &parts, &[json!(1), json!(9), json!(0)]);
        assert!(sql.ends_with("HAVING (\"total\" BETWEEN ? AND ? AND \"cnt\" != ?)"));
    }

    #[test]
    fn test_identifier_injection_is_escaped() {
        let mut parts = base("public");
        parts.select = vec![col("t0", "x\"; DROP TABLE users;--").into()];
        let (sql, _) = render(&PostgresDialect, &parts, &[]);
        assert!(sql.starts_with("SELECT \"t0\".\"x\"\"; DROP TABLE users;--\""));
    }
}
