// Trino dialect
//
// Plain `?` placeholders, catalog-qualified tables, IN lists expanded one
// placeholder per element. No ILIKE: case-insensitive matching lowers
// both sides.

use serde_json::Value;

use crate::models::{ArrayOperator, DialectName, ScalarType};

use super::dialect::{ParamSink, SqlDialect};

pub struct TrinoDialect;

impl TrinoDialect {
    pub fn new() -> Self {
        Self
    }

    fn expand(params: &mut ParamSink, values: Vec<Value>) -> String {
        values
            .into_iter()
            .map(|v| {
                params.push(v);
                "?"
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for TrinoDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for TrinoDialect {
    fn name(&self) -> DialectName {
        DialectName::Trino
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn supports_catalog(&self) -> bool {
        true
    }

    fn placeholder(&self, params: &mut ParamSink, value: Value) -> String {
        params.push(value);
        "?".to_string()
    }

    fn int_placeholder(&self, params: &mut ParamSink, value: Value) -> String {
        params.push(value);
        "CAST(? AS INTEGER)".to_string()
    }

    fn render_in(
        &self,
        params: &mut ParamSink,
        column: &str,
        values: Vec<Value>,
        _element: Option<ScalarType>,
        negated: bool,
    ) -> String {
        if values.is_empty() {
            let identity = if negated { "1 = 1" } else { "1 = 0" };
            return identity.to_string();
        }

        let keyword = if negated { "NOT IN" } else { "IN" };
        format!("{} {} ({})", column, keyword, Self::expand(params, values))
    }

    fn render_ilike(&self, column: &str, placeholder: &str, negated: bool) -> String {
        let keyword = if negated { "NOT LIKE" } else { "LIKE" };
        format!("lower({}) {} lower({})", column, keyword, placeholder)
    }

    fn render_starts_with(&self, column: &str, placeholder: &str) -> String {
        format!("starts_with({}, {})", column, placeholder)
    }

    fn render_ends_with(&self, column: &str, placeholder: &str) -> String {
        format!("{} LIKE concat('%', {})", column, placeholder)
    }

    fn render_array(
        &self,
        params: &mut ParamSink,
        column: &str,
        operator: ArrayOperator,
        values: Vec<Value>,
        _element: ScalarType,
    ) -> String {
        match operator {
            ArrayOperator::Contains => {
                let value = values.into_iter().next().unwrap_or(Value::Null);
                params.push(value);
                format!("contains({}, ?)", column)
            }
            ArrayOperator::ContainsAll => format!(
                "cardinality(array_except(ARRAY[{}], {})) = 0",
                Self::expand(params, values),
                column
            ),
            ArrayOperator::ContainsAny => format!(
                "arrays_overlap({}, ARRAY[{}])",
                column,
                Self::expand(params, values)
            ),
            ArrayOperator::IsEmpty => format!("cardinality({}) = 0", column),
            ArrayOperator::IsNotEmpty => format!("cardinality({}) > 0", column),
        }
    }

    fn fuzzy_function(&self) -> &'static str {
        "levenshtein_distance"
    }

    fn render_pagination(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, None) => None,
            (Some(l), None) => Some(format!("LIMIT {}", l)),
            (None, Some(o)) => Some(format!("OFFSET {}", o)),
            (Some(l), Some(o)) => Some(format!("OFFSET {} LIMIT {}", o, l)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use crate::services::generator::test_support::{array, base, col, cond, render};
    use serde_json::json;

    const TRINO: TrinoDialect = TrinoDialect;

    #[test]
    fn test_catalog_qualified_tables() {
        let mut parts = base("public");
        parts.from = TableRef::new("public.users", "t0").with_catalog("pg_main");
        parts.joins.push(JoinClause {
            kind: JoinKind::Inner,
            table: TableRef::new("public.orders", "t1").with_catalog("pg_main"),
            left_column: col("t0", "id"),
            right_column: col("t1", "user_id"),
        });
        let (sql, _) = render(&TRINO, &parts, &[]);
        assert!(sql.contains("FROM \"pg_main\".\"public\".\"users\" AS \"t0\""));
        assert!(sql.contains(
            "INNER JOIN \"pg_main\".\"public\".\"orders\" AS \"t1\" ON \"t0\".\"id\" = \"t1\".\"user_id\""
        ));
    }

    #[test]
    fn test_in_expansion() {
        let mut parts = base("public");
        parts.where_clause = Some(cond("id", WhereOperator::In, 0, Some(ColumnType::Scalar(ScalarType::Uuid))));
        let (sql, params) = render(&TRINO, &parts, &[json!(["id1", "id2", "id3"])]);
        assert!(sql.contains("\"t0\".\"id\" IN (?, ?, ?)"));
        assert_eq!(params, vec![json!("id1"), json!("id2"), json!("id3")]);

        let mut parts = base("public");
        parts.where_clause = Some(cond("name", WhereOperator::NotIn, 0, None));
        let (sql, params) = render(&TRINO, &parts, &[json!(["a", "b"])]);
        assert!(sql.contains("\"t0\".\"name\" NOT IN (?, ?)"));
        assert_eq!(params, vec![json!("a"), json!("b")]);

        let (sql, params) = render(&TRINO, &parts, &[json!("only")]);
        assert!(sql.contains("NOT IN (?)"));
        assert_eq!(params, vec![json!("only")]);
    }

    #[test]
    fn test_case_insensitive_match() {
        let mut parts = base("public");
        parts.where_clause = Some(cond("name", WhereOperator::IstartsWith, 0, None));
        let (sql, params) = render(&TRINO, &parts, &[json!("Al")]);
        assert!(sql.contains("WHERE lower(\"t0\".\"name\") LIKE lower(?)"));
        assert_eq!(params, vec![json!("Al%")]);
    }

    #[test]
    fn test_array_operators() {
        let cases = [
            (ArrayOperator::Contains, vec![0], "contains(\"t0\".\"tags\", ?)"),
            (
                ArrayOperator::ContainsAll,
                vec![0, 1],
                "cardinality(array_except(ARRAY[?, ?], \"t0\".\"tags\")) = 0",
            ),
            (ArrayOperator::ContainsAny, vec![0, 1], "arrays_overlap(\"t0\".\"tags\", ARRAY[?, ?])"),
            (ArrayOperator::IsEmpty, vec![], "cardinality(\"t0\".\"tags\") = 0"),
            (ArrayOperator::IsNotEmpty, vec![], "cardinality(\"t0\".\"tags\") > 0"),
        ];
        for (operator, indexes, expected) in cases {
            let mut parts = base("public");
            parts.where_clause = Some(array("tags", operator, indexes, ScalarType::String));
            let (sql, _) = render(&TRINO, &parts, &[json!("a"), json!("b")]);
            assert!(sql.contains(expected), "{} missing from {}", expected, sql);
        }
    }

    #[test]
    fn test_fuzzy_and_pagination() {
        let mut parts = base("public");
        parts.where_clause = Some(WhereNode::Function(WhereFunction {
            function: "levenshtein".to_string(),
            column: col("t0", "name"),
            fn_param_index: 0,
            operator: CompareOp::Lte,
            compare_param_index: 1,
        }));
        parts.limit = Some(10);
        parts.offset = Some(30);
        let (sql, params) = render(&TRINO, &parts, &[json!("jon"), json!(1)]);
        assert!(sql.contains("WHERE levenshtein_distance(\"t0\".\"name\", ?) <= CAST(? AS INTEGER)"));
        assert!(sql.ends_with("OFFSET 30 LIMIT 10"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_output_parses() {
        use sqlparser::dialect::GenericDialect;
        use sqlparser::parser::Parser;

        let mut parts = base("public");
        parts.from = TableRef::new("public.users", "t0").with_catalog("pg_main");
        parts.where_clause = Some(WhereNode::Group(WhereGroup {
            logic: Logic::And,
            not: false,
            conditions: vec![
                cond("id", WhereOperator::In, 0, None),
                cond("name", WhereOperator::Icontains, 1, None),
            ],
        }));
        parts.limit = Some(5);
        let (sql, _) = render(&TRINO, &parts, &[json!([1, 2]), json!("x")]);
        assert!(Parser::parse_sql(&GenericDialect {}, &sql).is_ok(), "{}", sql);
    }
}
