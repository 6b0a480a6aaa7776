use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Query compilation and execution errors
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("No database can serve tables: {}", tables.join(", "))]
    NoViableDatabase { tables: Vec<String> },

    #[error("Freshness '{required}' cannot be met: best candidate {database} lags by {worst_lag}")]
    FreshnessUnsatisfiable {
        required: String,
        worst_lag: String,
        database: String,
    },

    #[error("Unsupported where function: {name}")]
    UnsupportedFunction { name: String },

    #[error("Access denied to {}", describe_target(table, column.as_deref()))]
    AccessDenied {
        table: String,
        column: Option<String>,
    },

    #[error("Parameter at index {index} was not supplied")]
    MissingParameter { index: usize },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No executor registered for database {database}")]
    ExecutorNotFound { database: String },

    #[error("Execution failed on {database}: {message}")]
    Execution { database: String, message: String },

    #[error("Cache provider {cache} failed: {message}")]
    Cache { cache: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn describe_target(table: &str, column: Option<&str>) -> String {
    match column {
        Some(column) => format!("column {}.{}", table, column),
        None => format!("table {}", table),
    }
}

impl QueryError {
    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::NoViableDatabase { .. } => "NO_VIABLE_DATABASE",
            QueryError::FreshnessUnsatisfiable { .. } => "FRESHNESS_UNSATISFIABLE",
            QueryError::UnsupportedFunction { .. } => "UNSUPPORTED_FUNCTION",
            QueryError::AccessDenied { .. } => "ACCESS_DENIED",
            QueryError::MissingParameter { .. } => "MISSING_PARAMETER",
            QueryError::Validation(_) => "VALIDATION_ERROR",
            QueryError::ExecutorNotFound { .. } => "EXECUTOR_NOT_FOUND",
            QueryError::Execution { .. } => "EXECUTION_ERROR",
            QueryError::Cache { .. } => "CACHE_ERROR",
            QueryError::Config(_) => "CONFIG_ERROR",
            QueryError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Render as a serializable error body
    pub fn to_detail(&self) -> ErrorDetail {
        let detail = ErrorDetail::new(self.code(), self.to_string());
        match self {
            QueryError::NoViableDatabase { .. } => detail.with_details(
                "No single database holds or replicates every table; enable Trino or add a sync.",
            ),
            QueryError::FreshnessUnsatisfiable { .. } => detail.with_details(
                "Relax the freshness requirement or query the tables on their home database.",
            ),
            _ => detail,
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<QueryError> for ErrorResponse {
    fn from(err: QueryError) -> Self {
        ErrorResponse {
            error: err.to_detail(),
        }
    }
}

/// Convert anyhow::Error to QueryError
impl From<anyhow::Error> for QueryError {
    fn from(err: anyhow::Error) -> Self {
        QueryError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Validation(format!("Malformed JSON: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = QueryError::UnsupportedFunction {
            name: "concat".to_string(),
        };
        assert_eq!(err.code(), "UNSUPPORTED_FUNCTION");
        assert_eq!(err.to_string(), "Unsupported where function: concat");
    }

    #[test]
    fn test_access_denied_message() {
        let table_err = QueryError::AccessDenied {
            table: "orders".to_string(),
            column: None,
        };
        assert_eq!(table_err.to_string(), "Access denied to table orders");

        let column_err = QueryError::AccessDenied {
            table: "users".to_string(),
            column: Some("email".to_string()),
        };
        assert_eq!(column_err.to_string(), "Access denied to column users.email");
    }

    #[test]
    fn test_error_detail_creation() {
        let detail = ErrorDetail::new("TEST_CODE", "Test message");
        assert_eq!(detail.code, "TEST_CODE");
        assert_eq!(detail.message, "Test message");
        assert!(detail.details.is_none());
    }

    #[test]
    fn test_error_response_carries_hint() {
        let response: ErrorResponse = QueryError::NoViableDatabase {
            tables: vec!["orders".to_string(), "events".to_string()],
        }
        .into();
        assert_eq!(response.error.code, "NO_VIABLE_DATABASE");
        assert!(response.error.message.contains("orders, events"));
        assert!(response.error.details.is_some());
    }
}
