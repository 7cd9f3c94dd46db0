// Error types for the restaurant search client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Request failed after {attempts} attempts: {source}")]
    RequestFailed {
        attempts: u32,
        #[source]
        source: Box<SearchError>,
    },

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Daily quota exceeded")]
    QuotaExceeded,

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl SearchError {
    // Client errors (bad request, forbidden, ...) and caller-side conditions are
    // never worth another attempt. 429 is the one 4xx that is.
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::ApiError { status, .. } => {
                *status == 429 || !(400..500).contains(status)
            }
            SearchError::Network(_) | SearchError::Timeout(_) => true,
            SearchError::RequestFailed { .. }
            | SearchError::InvalidParameter(_)
            | SearchError::Cancelled(_)
            | SearchError::QuotaExceeded
            | SearchError::NotConfigured(_)
            | SearchError::Decode(_)
            | SearchError::NotFound(_) => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SearchError::Cancelled(_))
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(e: serde_json::Error) -> Self {
        SearchError::Decode(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Other(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location unavailable: {0}")]
    PositionUnavailable(String),

    #[error("Location request timed out after {0}ms")]
    Timeout(u64),
}
