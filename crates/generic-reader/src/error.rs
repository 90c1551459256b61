//! Error types for the generic reader.

use std::fmt;

use thiserror::Error;

/// Oracle vendor code for a closed connection.
pub const VENDOR_CONNECTION_CLOSED: i32 = 17008;

/// SQLSTATE for a connection failure.
pub const SQLSTATE_CONNECTION_FAILURE: &str = "08006";

/// Failure reported by a database driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct DbError {
    pub vendor_code: Option<i32>,
    pub sql_state: Option<String>,
    pub message: String,
}

impl DbError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            vendor_code: None,
            sql_state: None,
            message: message.into(),
        }
    }

    pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
        self.sql_state = Some(sql_state.into());
        self
    }

    pub fn with_vendor_code(mut self, code: i32) -> Self {
        self.vendor_code = Some(code);
        self
    }

    /// Whether the failure means the connection itself is gone.
    pub fn is_connection_lost(&self) -> bool {
        self.vendor_code == Some(VENDOR_CONNECTION_CLOSED)
            || self.sql_state.as_deref() == Some(SQLSTATE_CONNECTION_FAILURE)
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(state) = &self.sql_state {
            write!(f, " (SQLSTATE {})", state)?;
        }
        if let Some(code) = self.vendor_code {
            write!(f, " (vendor code {})", code)?;
        }
        Ok(())
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                let mut error = DbError::new(db.message());
                if let Some(code) = db.code() {
                    error = error.with_sql_state(code.as_ref());
                }
                error
            }
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                DbError::new(err.to_string()).with_sql_state(SQLSTATE_CONNECTION_FAILURE)
            }
            _ => DbError::new(err.to_string()),
        }
    }
}

/// Errors that can occur while reading metadata.
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Metadata I/O error: {message}")]
    MetadataIo { message: String, retryable: bool },
}

impl ReaderError {
    /// The whole request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReaderError::MetadataIo { retryable: true, .. })
    }

    /// OWS exception code for service responses.
    pub fn exception_code(&self) -> &'static str {
        match self {
            ReaderError::IllegalArgument(_) => "InvalidParameterValue",
            _ => "NoApplicableCode",
        }
    }
}

impl From<std::io::Error> for ReaderError {
    fn from(err: std::io::Error) -> Self {
        ReaderError::Configuration(err.to_string())
    }
}

impl From<serde_yaml::Error> for ReaderError {
    fn from(err: serde_yaml::Error) -> Self {
        ReaderError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for ReaderError {
    fn from(err: serde_json::Error) -> Self {
        ReaderError::Configuration(err.to_string())
    }
}

/// Result type for reader operations.
pub type Result<T> = std::result::Result<T, ReaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_lost_detection() {
        assert!(DbError::new("closed").with_vendor_code(17008).is_connection_lost());
        assert!(DbError::new("broken").with_sql_state("08006").is_connection_lost());
        assert!(!DbError::new("syntax").with_sql_state("42601").is_connection_lost());
        assert!(!DbError::new("other").is_connection_lost());
    }

    #[test]
    fn test_display_includes_diagnostics() {
        let err = DbError::new("relation missing").with_sql_state("42P01");
        assert_eq!(err.to_string(), "relation missing (SQLSTATE 42P01)");
    }

    #[test]
    fn test_retryable() {
        let err = ReaderError::MetadataIo {
            message: "reconnecting".to_string(),
            retryable: true,
        };
        assert!(err.is_retryable());
        assert!(!ReaderError::IllegalArgument("x".to_string()).is_retryable());
    }
}
