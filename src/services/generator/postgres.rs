// PostgreSQL dialect
//
// `$n` placeholders, double-quoted identifiers, list predicates bound as a
// single typed array parameter.

use serde_json::Value;

use crate::models::{ArrayOperator, DialectName, ScalarType};

use super::dialect::{ParamSink, SqlDialect};

pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }

    /// Element type used in `::T[]` casts
    fn cast(element: ScalarType) -> &'static str {
        match element {
            ScalarType::Uuid => "uuid",
            ScalarType::String => "text",
            ScalarType::Int => "integer",
            ScalarType::Decimal => "numeric",
            ScalarType::Boolean => "bool",
            ScalarType::Date => "date",
            ScalarType::Timestamp => "timestamp",
        }
    }
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for PostgresDialect {
    fn name(&self) -> DialectName {
        DialectName::Postgres
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn placeholder(&self, params: &mut ParamSink, value: Value) -> String {
        format!("${}", params.push(value))
    }

    fn int_placeholder(&self, params: &mut ParamSink, value: Value) -> String {
        format!("${}::integer", params.push(value))
    }

    fn render_in(
        &self,
        params: &mut ParamSink,
        column: &str,
        values: Vec<Value>,
        element: Option<ScalarType>,
        negated: bool,
    ) -> String {
        let cast = Self::cast(element.unwrap_or(ScalarType::String));
        let n = params.push(Value::Array(values));
        if negated {
            format!("{} <> ALL(${}::{}[])", column, n, cast)
        } else {
            format!("{} = ANY(${}::{}[])", column, n, cast)
        }
    }

    fn render_ilike(&self, column: &str, placeholder: &str, negated: bool) -> String {
        if negated {
            format!("{} NOT ILIKE {}", column, placeholder)
        } else {
            format!("{} ILIKE {}", column, placeholder)
        }
    }

    fn render_starts_with(&self, column: &str, placeholder: &str) -> String {
        format!("starts_with({}, {})", column, placeholder)
    }

    fn render_ends_with(&self, column: &str, placeholder: &str) -> String {
        format!("{} LIKE '%' || {}", column, placeholder)
    }

    fn render_array(
        &self,
        params: &mut ParamSink,
        column: &str,
        operator: ArrayOperator,
        values: Vec<Value>,
        element: ScalarType,
    ) -> String {
        let cast = Self::cast(element);
        match operator {
            ArrayOperator::Contains => {
                let value = values.into_iter().next().unwrap_or(Value::Null);
                format!("${}::{} = ANY({})", params.push(value), cast, column)
            }
            ArrayOperator::ContainsAll => {
                let n = params.push(Value::Array(values));
                format!("{} @> ${}::{}[]", column, n, cast)
            }
            ArrayOperator::ContainsAny => {
                let n = params.push(Value::Array(values));
                format!("{} && ${}::{}[]", column, n, cast)
            }
            ArrayOperator::IsEmpty => format!("cardinality({}) = 0", column),
            ArrayOperator::IsNotEmpty => format!("cardinality({}) > 0", column),
        }
    }

    fn fuzzy_function(&self) -> &'static str {
        "levenshtein"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use crate::services::generator::test_support::{array, base, col, cond, render};
    use serde_json::json;

    const PG: PostgresDialect = PostgresDialect;

    #[test]
    fn test_basic_select() {
        let (sql, params) = render(&PG, &base("public"), &[]);
        assert_eq!(
            sql,
            "SELECT \"t0\".\"id\", \"t0\".\"name\" FROM \"public\".\"users\" AS \"t0\""
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_in_with_uuid_type() {
        let mut parts = base("public");
        parts.where_clause = Some(cond("id", WhereOperator::In, 0, Some(ColumnType::Scalar(ScalarType::Uuid))));
        let (sql, params) = render(&PG, &parts, &[json!(["id1", "id2"])]);
        assert!(sql.contains("WHERE \"t0\".\"id\" = ANY($1::uuid[])"));
        assert_eq!(params, vec![json!(["id1", "id2"])]);
    }

    #[test]
    fn test_not_in_with_string_type() {
        let mut parts = base("public");
        parts.where_clause = Some(cond("name", WhereOperator::NotIn, 0, Some(ColumnType::Scalar(ScalarType::String))));
        let (sql, _) = render(&PG, &parts, &[json!(["a", "b"])]);
        assert!(sql.contains("WHERE \"t0\".\"name\" <> ALL($1::text[])"));
    }

    #[test]
    fn test_in_casts() {
        let cases = [
            (Some(ScalarType::Int), "$1::integer[]"),
            (Some(ScalarType::Decimal), "$1::numeric[]"),
            (Some(ScalarType::Boolean), "$1::bool[]"),
            (Some(ScalarType::Date), "$1::date[]"),
            (Some(ScalarType::Timestamp), "$1::timestamp[]"),
            (None, "$1::text[]"),
        ];
        for (element, expected) in cases {
            let mut parts = base("public");
            parts.where_clause = Some(cond("x", WhereOperator::In, 0, element.map(ColumnType::Scalar)));
            let (sql, _) = render(&PG, &parts, &[json!([1])]);
            assert!(sql.contains(expected), "{} missing from {}", expected, sql);
        }
    }

    #[test]
    fn test_string_matching() {
        let mut parts = base("public");
        parts.where_clause = Some(WhereNode::Group(WhereGroup {
            logic: Logic::And,
            not: false,
            conditions: vec![
                cond("name", WhereOperator::Icontains, 0, None),
                cond("name", WhereOperator::StartsWith, 1, None),
                cond("name", WhereOperator::EndsWith, 2, None),
                cond("name", WhereOperator::NotIlike, 3, None),
            ],
        }));
        let (sql, params) = render(&PG, &parts, &[json!("li"), json!("A"), json!("e"), json!("bob")]);
        assert!(sql.contains(
            "WHERE (\"t0\".\"name\" ILIKE $1 AND starts_with(\"t0\".\"name\", $2) \
             AND \"t0\".\"name\" LIKE '%' || $3 AND \"t0\".\"name\" NOT ILIKE $4)"
        ));
        assert_eq!(params, vec![json!("%li%"), json!("A"), json!("e"), json!("bob")]);
    }

    #[test]
    fn test_array_operators() {
        let cases = [
            (ArrayOperator::Contains, vec![0], "$1::text = ANY(\"t0\".\"tags\")"),
            (ArrayOperator::ContainsAll, vec![0, 1], "\"t0\".\"tags\" @> $1::text[]"),
            (ArrayOperator::ContainsAny, vec![0, 1], "\"t0\".\"tags\" && $1::text[]"),
            (ArrayOperator::IsEmpty, vec![], "cardinality(\"t0\".\"tags\") = 0"),
            (ArrayOperator::IsNotEmpty, vec![], "cardinality(\"t0\".\"tags\") > 0"),
        ];
        for (operator, indexes, expected) in cases {
            let mut parts = base("public");
            parts.where_clause = Some(array("tags", operator, indexes, ScalarType::String));
            let (sql, _) = render(&PG, &parts, &[json!("a"), json!("b")]);
            assert!(sql.contains(expected), "{} missing from {}", expected, sql);
        }

        let mut parts = base("public");
        parts.where_clause = Some(array("tags", ArrayOperator::ContainsAll, vec![0, 1], ScalarType::String));
        let (_, params) = render(&PG, &parts, &[json!("a"), json!("b")]);
        assert_eq!(params, vec![json!(["a", "b"])]);
    }

    #[test]
    fn test_fuzzy_function() {
        let mut parts = base("public");
        parts.where_clause = Some(WhereNode::Function(WhereFunction {
            function: "levenshtein".to_string(),
            column: col("t0", "name"),
            fn_param_index: 0,
            operator: CompareOp::Lte,
            compare_param_index: 1,
        }));
        let (sql, params) = render(&PG, &parts, &[json!("jon"), json!(2)]);
        assert!(sql.contains("WHERE levenshtein(\"t0\".\"name\", $1) <= $2::integer"));
        assert_eq!(params, vec![json!("jon"), json!(2)]);
    }

    #[test]
    fn test_pagination() {
        let mut parts = base("public");
        parts.limit = Some(10);
        parts.offset = Some(20);
        let (sql, _) = render(&PG, &parts, &[]);
        assert!(sql.ends_with("LIMIT 10 OFFSET 20"));
    }

    #[test]
    fn test_output_parses() {
        use sqlparser::dialect::PostgreSqlDialect;
        use sqlparser::parser::Parser;

        let mut parts = base("public");
        parts.where_clause = Some(WhereNode::Group(WhereGroup {
            logic: Logic::Or,
            not: true,
            conditions: vec![
                cond("id", WhereOperator::Compare(CompareOp::Eq), 0, None),
                cond("name", WhereOperator::Ilike, 1, None),
                cond("name", WhereOperator::IsNull, 0, None),
            ],
        }));
        parts.order_by = vec![OrderByItem {
            target: OrderTarget::Column(col("t0", "name")),
            direction: SortDirection::Desc,
        }];
        parts.limit = Some(5);
        let (sql, _) = render(&PG, &parts, &[json!(1), json!("a%")]);
        assert!(Parser::parse_sql(&PostgreSqlDialect {}, &sql).is_ok(), "{}", sql);
    }
}
