//! Error types for the SOS observation services.

use thiserror::Error;

/// Result type alias using SosError.
pub type SosResult<T> = Result<T, SosError>;

/// OGC locator of the temporal filter parameter.
pub const EVENT_TIME_LOCATOR: &str = "eventTime";

/// Primary error type for observation filtering and indexing.
#[derive(Debug, Error)]
pub enum SosError {
    // === Request Errors ===
    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Invalid time specification: {0}")]
    InvalidTime(String),

    #[error("Temporal operator {relation} is not supported for a time {shape}")]
    UnsupportedTemporalShape {
        relation: String,
        shape: &'static str,
        locator: &'static str,
    },

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    // === Query Errors ===
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Query has more than {limit} clauses in one group")]
    TooManyClauses { limit: usize },

    // === Index Errors ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Index build failed: {0}")]
    IndexBuildFailure(String),

    #[error("Failed to read index: {0}")]
    IndexRead(String),

    // === Infrastructure Errors ===
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl SosError {
    /// Build an `InvalidParameter` error.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        SosError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Get the OWS exception code for this error.
    pub fn exception_code(&self) -> &'static str {
        match self {
            SosError::InvalidParameter { .. }
            | SosError::InvalidTime(_)
            | SosError::UnsupportedTemporalShape { .. }
            | SosError::IllegalArgument(_) => "InvalidParameterValue",
            _ => "NoApplicableCode",
        }
    }

    /// Get the OWS exception locator, when the error is tied to a request parameter.
    pub fn locator(&self) -> Option<&str> {
        match self {
            SosError::InvalidParameter { param, .. } => Some(param),
            SosError::InvalidTime(_) => Some(EVENT_TIME_LOCATOR),
            SosError::UnsupportedTemporalShape { locator, .. } => Some(locator),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SosError {
    fn from(err: std::io::Error) -> Self {
        SosError::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for SosError {
    fn from(err: serde_json::Error) -> Self {
        SosError::InternalError(format!("JSON error: {}", err))
    }
}
