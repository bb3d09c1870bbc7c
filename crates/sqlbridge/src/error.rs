//! Error types for sqlbridge
//!
//! Everything here is a recoverable runtime condition. Misuse of the fluent
//! builder (calling a clause from the wrong state) is not represented: it
//! panics at the call site instead.

use std::fmt;
use thiserror::Error;

/// Result type alias for sqlbridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Native error details reported by the database client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Five-character SQLSTATE, when the driver reports one.
    pub sqlstate: Option<String>,
    /// Driver-specific error code.
    pub code: Option<String>,
    /// Human readable message.
    pub message: String,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            sqlstate: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.sqlstate, &self.code) {
            (Some(state), Some(code)) => write!(f, "[{state}] ({code}) {}", self.message),
            (Some(state), None) => write!(f, "[{state}] {}", self.message),
            (None, Some(code)) => write!(f, "({code}) {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

/// Error types for database operations
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Invalid or incomplete data source configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure while opening or releasing the native connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// Prepare/execute failure reported by the database
    #[error("Query error: {info} (sql: {sql})")]
    Execution { sql: String, info: ErrorInfo },

    /// Transaction control failure
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A bound value matched an injection signature
    #[error("Possible SQL injection in bound value {value:?} (matched {pattern})")]
    SuspectedInjection { value: String, pattern: &'static str },

    /// A value could not be bound with the requested parameter type
    #[error("Bind error: {0}")]
    Bind(String),

    /// Row decode error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// The service was closed and no longer owns a handle
    #[error("Service is closed")]
    Closed,

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl BridgeError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an execution error for `sql`
    pub fn execution(sql: impl Into<String>, info: ErrorInfo) -> Self {
        Self::Execution {
            sql: sql.into(),
            info,
        }
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }

    pub fn is_injection(&self) -> bool {
        matches!(self, Self::SuspectedInjection { .. })
    }

    /// Native error details, if this error came from the database.
    pub fn info(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Execution { info, .. } => Some(info),
            _ => None,
        }
    }
}

#[cfg(feature = "mysql")]
impl From<sqlx::Error> for BridgeError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(e) => Self::Config(e.to_string()),
            sqlx::Error::Io(e) => Self::Connection(e.to_string()),
            sqlx::Error::Tls(e) => Self::Connection(e.to_string()),
            sqlx::Error::PoolTimedOut => Self::Connection("pool timed out".to_string()),
            sqlx::Error::PoolClosed => Self::Connection("pool closed".to_string()),
            sqlx::Error::ColumnDecode { index, source } => Self::decode(index, source.to_string()),
            other => Self::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_info_display_includes_sqlstate_and_code() {
        let info = ErrorInfo::new("Table 'app.nope' doesn't exist")
            .with_sqlstate("42S02")
            .with_code("1146");
        assert_eq!(
            info.to_string(),
            "[42S02] (1146) Table 'app.nope' doesn't exist"
        );
        assert_eq!(ErrorInfo::new("boom").to_string(), "boom");
    }

    #[test]
    fn execution_error_exposes_info() {
        let err = BridgeError::execution("SELECT 1", ErrorInfo::new("gone"));
        assert!(err.is_execution());
        assert_eq!(err.info().map(|i| i.message.as_str()), Some("gone"));
        assert!(BridgeError::config("x").info().is_none());
    }
}
