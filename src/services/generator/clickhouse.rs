// ClickHouse dialect
//
// Named, typed placeholders (`{p1:String}`), backtick identifiers, native
// array functions and per-element IN tuples.

use serde_json::Value;

use crate::models::{ArrayOperator, DialectName, ScalarType};

use super::dialect::{ParamSink, SqlDialect};

pub struct ClickHouseDialect;

impl ClickHouseDialect {
    pub fn new() -> Self {
        Self
    }

    /// Parameter type for a declared column type
    fn declared_type(element: ScalarType) -> &'static str {
        match element {
            ScalarType::Uuid => "UUID",
            ScalarType::String => "String",
            ScalarType::Int => "Int32",
            ScalarType::Decimal => "Decimal",
            ScalarType::Boolean => "Bool",
            ScalarType::Date => "Date",
            ScalarType::Timestamp => "DateTime",
        }
    }

    /// Parameter type inferred from a bound value
    fn value_type(value: &Value) -> String {
        match value {
            Value::Null => "Nullable(String)".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i32::try_from(i).is_ok() {
                        "Int32".to_string()
                    } else {
                        "Int64".to_string()
                    }
                } else if n.is_u64() {
                    "UInt64".to_string()
                } else {
                    "Float64".to_string()
                }
            }
            Value::Array(items) => {
                let inner = items
                    .first()
                    .map_or_else(|| "String".to_string(), Self::value_type);
                format!("Array({})", inner)
            }
            Value::String(_) | Value::Object(_) => "String".to_string(),
        }
    }

    fn typed(params: &mut ParamSink, value: Value, ty: &str) -> String {
        format!("{{p{}:{}}}", params.push(value), ty)
    }
}

impl Default for ClickHouseDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for ClickHouseDialect {
    fn name(&self) -> DialectName {
        DialectName::ClickHouse
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn placeholder(&self, params: &mut ParamSink, value: Value) -> String {
        let ty = Self::value_type(&value);
        Self::typed(params, value, &ty)
    }

    fn int_placeholder(&self, params: &mut ParamSink, value: Value) -> String {
        Self::typed(params, value, "UInt32")
    }

    fn render_in(
        &self,
        params: &mut ParamSink,
        column: &str,
        values: Vec<Value>,
        element: Option<ScalarType>,
        negated: bool,
    ) -> String {
        if values.is_empty() {
            let identity = if negated { "1 = 1" } else { "1 = 0" };
            return identity.to_string();
        }

        let ty = Self::declared_type(element.unwrap_or(ScalarType::String));
        let items: Vec<String> = values
            .into_iter()
            .map(|v| Self::typed(params, v, ty))
            .collect();
        let keyword = if negated { "NOT IN" } else { "IN" };
        format!("{} {} tuple({})", column, keyword, items.join(", "))
    }

    fn render_ilike(&self, column: &str, placeholder: &str, negated: bool) -> String {
        if negated {
            format!("NOT ilike({}, {})", column, placeholder)
        } else {
            format!("ilike({}, {})", column, placeholder)
        }
    }

    fn render_starts_with(&self, column: &str, placeholder: &str) -> String {
        format!("startsWith({}, {})", column, placeholder)
    }

    fn render_ends_with(&self, column: &str, placeholder: &str) -> String {
        format!("endsWith({}, {})", column, placeholder)
    }

    fn render_array(
        &self,
        params: &mut ParamSink,
        column: &str,
        operator: ArrayOperator,
        values: Vec<Value>,
        element: ScalarType,
    ) -> String {
        let ty = Self::declared_type(element);
        match operator {
            ArrayOperator::Contains => {
                let value = values.into_iter().next().unwrap_or(Value::Null);
                format!("has({}, {})", column, Self::typed(params, value, ty))
            }
            ArrayOperator::ContainsAll => {
                let ph = Self::typed(params, Value::Array(values), &format!("Array({})", ty));
                format!("hasAll({}, {})", column, ph)
            }
            ArrayOperator::ContainsAny => {
                let ph = Self::typed(params, Value::Array(values), &format!("Array({})", ty));
                format!("hasAny({}, {})", column, ph)
            }
            ArrayOperator::IsEmpty => format!("empty({})", column),
            ArrayOperator::IsNotEmpty => format!("notEmpty({})", column),
        }
    }

    fn fuzzy_function(&self) -> &'static str {
        "editDistance"
    }
}
