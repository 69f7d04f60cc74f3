//! Error types for the lead harvester

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV write failed: {0}")]
    CsvError(#[from] csv::Error),
}

impl HarvestError {
    /// True if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            HarvestError::Transient(_) => true,
            HarvestError::HttpError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// True if the session/credentials were rejected. Aborts the affected
    /// stream and is surfaced upward, never retried.
    pub fn is_auth(&self) -> bool {
        matches!(self, HarvestError::Auth(_))
    }

    /// True if the response shape did not match expectations. Treated as
    /// end-of-stream for the collector, never retried.
    pub fn is_malformed(&self) -> bool {
        matches!(self, HarvestError::Malformed(_))
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
