// Shared SQL fragments
//
// Identifier escaping and the allow-lists guarding every function name that
// reaches generated text.

use crate::error::{QueryError, Result};

const AGG_FUNCTIONS: [&str; 5] = ["COUNT", "SUM", "AVG", "MIN", "MAX"];

const WHERE_FUNCTIONS: [&str; 3] = ["levenshtein", "levenshtein_distance", "editdistance"];

/// Double every occurrence of `quote` inside `name`
pub fn escape_ident(name: &str, quote: char) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch == quote {
            out.push(quote);
        }
        out.push(ch);
    }
    out
}

/// Escape and wrap a single identifier part
pub fn quote_ident(name: &str, quote: char) -> String {
    format!("{}{}{}", quote, escape_ident(name, quote), quote)
}

/// Quote each dot-separated part of a qualified name individually
pub fn quote_qualified(name: &str, quote: char) -> String {
    name.split('.')
        .map(|part| quote_ident(part, quote))
        .collect::<Vec<_>>()
        .join(".")
}

/// Upper-cased aggregate name; anything outside the safe set becomes COUNT
pub fn safe_agg_fn(name: &str) -> &'static str {
    let upper = name.to_uppercase();
    AGG_FUNCTIONS
        .iter()
        .copied()
        .find(|f| *f == upper)
        .unwrap_or("COUNT")
}

/// Validate a caller-influenced predicate function name
///
/// # Errors
/// `UnsupportedFunction` for any name outside the fuzzy-distance family.
pub fn safe_where_fn(name: &str) -> Result<&str> {
    let lower = name.to_lowercase();
    if WHERE_FUNCTIONS.contains(&lower.as_str()) {
        Ok(name)
    } else {
        Err(QueryError::UnsupportedFunction {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_ident() {
        assert_eq!(escape_ident("hello", '"'), "hello");
        assert_eq!(escape_ident("x\"; DROP TABLE t;--", '"'), "x\"\"; DROP TABLE t;--");
        assert_eq!(escape_ident("x`; DROP TABLE t;--", '`'), "x``; DROP TABLE t;--");
        assert_eq!(escape_ident("a\"b", '`'), "a\"b");
    }

    #[test]
    fn test_quote_qualified() {
        assert_eq!(quote_qualified("public.users", '"'), "\"public\".\"users\"");
        assert_eq!(quote_qualified("events", '`'), "`events`");
    }

    #[test]
    fn test_safe_agg_fn() {
        assert_eq!(safe_agg_fn("count"), "COUNT");
        assert_eq!(safe_agg_fn("SUM"), "SUM");
        assert_eq!(safe_agg_fn("avg"), "AVG");
        assert_eq!(safe_agg_fn("Min"), "MIN");
        assert_eq!(safe_agg_fn("MAX"), "MAX");
        assert_eq!(safe_agg_fn("concat"), "COUNT");
        assert_eq!(safe_agg_fn("sum); DROP TABLE orders;--"), "COUNT");
    }

    #[test]
    fn test_safe_where_fn() {
        assert_eq!(safe_where_fn("levenshtein").unwrap(), "levenshtein");
        assert_eq!(safe_where_fn("levenshtein_distance").unwrap(), "levenshtein_distance");
        assert_eq!(safe_where_fn("editDistance").unwrap(), "editDistance");
        assert_eq!(safe_where_fn("LEVENSHTEIN").unwrap(), "LEVENSHTEIN");

        let err = safe_where_fn("concat").unwrap_err();
        assert_eq!(err.to_string(), "Unsupported where function: concat");
        assert!(safe_where_fn("levenshtein); DROP TABLE orders;--").is_err());
    }
}
