// Dialect capabilities
//
// Everything that differs between engines sits behind `SqlDialect`. The
// shared builder walks the IR and asks the dialect only for lexical forms.

use serde_json::Value;

use crate::models::{ArrayOperator, DialectName, ScalarType};

/// Ordered output parameters; positions are 1-based
#[derive(Debug, Default)]
pub struct ParamSink {
    values: Vec<Value>,
}

impl ParamSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value and return its 1-based position
    pub fn push(&mut self, value: Value) -> usize {
        self.values.push(value);
        self.values.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Lexical conventions of one SQL engine
///
/// Implementations must be stateless; one instance serves every request.
pub trait SqlDialect: Send + Sync {
    fn name(&self) -> DialectName;

    /// Identifier quote character
    fn quote_char(&self) -> char;

    /// Whether table references may carry a catalog prefix
    fn supports_catalog(&self) -> bool {
        false
    }

    /// Bind a value and return its placeholder
    fn placeholder(&self, params: &mut ParamSink, value: Value) -> String;

    /// Bind a value compared as an integer (edit-distance bounds)
    fn int_placeholder(&self, params: &mut ParamSink, value: Value) -> String;

    /// `column IN (...)` / `column NOT IN (...)` over a list of values
    ///
    /// # Arguments
    /// * `column` - Already-rendered column reference
    /// * `values` - List elements, in order
    /// * `element` - Declared scalar type of the column, if known
    /// * `negated` - Render NOT IN
    fn render_in(
        &self,
        params: &mut ParamSink,
        column: &str,
        values: Vec<Value>,
        element: Option<ScalarType>,
        negated: bool,
    ) -> String;

    /// Case-insensitive pattern match
    fn render_ilike(&self, column: &str, placeholder: &str, negated: bool) -> String;

    /// Case-sensitive prefix match on a raw value
    fn render_starts_with(&self, column: &str, placeholder: &str) -> String;

    /// Case-sensitive suffix match on a raw value
    fn render_ends_with(&self, column: &str, placeholder: &str) -> String;

    /// Array membership operators; `values` is empty for the emptiness checks
    fn render_array(
        &self,
        params: &mut ParamSink,
        column: &str,
        operator: ArrayOperator,
        values: Vec<Value>,
        element: ScalarType,
    ) -> String;

    /// Native edit-distance function
    fn fuzzy_function(&self) -> &'static str;

    /// Trailing LIMIT / OFFSET clause
    fn render_pagination(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, None) => None,
            (Some(l), None) => Some(format!("LIMIT {}", l)),
            (None, Some(o)) => Some(format!("OFFSET {}", o)),
            (Some(l), Some(o)) => Some(format!("LIMIT {} OFFSET {}", l, o)),
        }
    }
}

/// Treat a non-array value as a one-element list
pub fn into_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_param_sink_positions() {
        let mut sink = ParamSink::new();
        assert!(sink.is_empty());
        assert_eq!(sink.push(json!("a")), 1);
        assert_eq!(sink.push(json!(2)), 2);
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.into_values(), vec![json!("a"), json!(2)]);
    }

    #[test]
    fn test_into_list() {
        assert_eq!(into_list(json!([1, 2])), vec![json!(1), json!(2)]);
        assert_eq!(into_list(json!("x")), vec![json!("x")]);
    }
}
