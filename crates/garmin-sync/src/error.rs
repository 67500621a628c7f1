use thiserror::Error;

/// Main error type for garmin-sync
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authentication required. Please provision tokens for this profile first.")]
    NotAuthenticated,

    #[error("Rate limited. Please wait before retrying.")]
    RateLimited,

    #[error("No data fetched: {0}")]
    NoData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid date format: {0}. Expected YYYY-MM-DD")]
    InvalidDateFormat(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Create an authentication error from a message
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a configuration error from a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid response error from a message
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create a store error from a message
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Whether the error should abort the whole run.
    /// Only authentication-class failures are fatal; everything else is
    /// recovered at the section, day, or sink level.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::NotAuthenticated)
    }
}
