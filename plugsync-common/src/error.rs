use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PlugsyncError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("TOML Parsing Error: {0}")]
    Toml(#[from] Arc<toml::de::Error>),

    #[error("Archive Error: {0}")]
    Zip(#[from] Arc<zip::result::ZipError>),

    #[error("Configuration Error: {0}")]
    Config(String),

    /// Network, timeout, HTTP status, size floor or declared-hash failures.
    /// Nothing was changed; the next cycle retries.
    #[error("FetchError: Failed to fetch '{0}' from '{1}': {2}")]
    Fetch(String, String, String),

    /// The downloaded artifact is malformed or incomplete.
    #[error("Validation Error: {0}")]
    Validation(String),

    /// Filesystem failure during backup or install; rollback was attempted.
    #[error("Swap Error: {0}")]
    Swap(String),

    /// The rollback after a failed install also failed. The slot is empty.
    #[error("Restore failed for '{0}': {1}")]
    RestoreFailed(String, String),

    /// The swapped file is in place but the ledger could not be written.
    #[error("Ledger persist failed: {0}")]
    LedgerPersist(String),

    #[error("Ledger corrupt and could not be set aside: {0}")]
    LedgerCorrupt(String),

    #[error("Failed to execute command: {0}")]
    CommandExecError(String),

    #[error("IoError: {0}")]
    IoError(String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl PlugsyncError {
    /// Conditions that must stop the process and wait for the operator.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PlugsyncError::RestoreFailed(..) | PlugsyncError::LedgerCorrupt(_)
        )
    }
}

impl From<std::io::Error> for PlugsyncError {
    fn from(err: std::io::Error) -> Self {
        PlugsyncError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for PlugsyncError {
    fn from(err: reqwest::Error) -> Self {
        PlugsyncError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for PlugsyncError {
    fn from(err: serde_json::Error) -> Self {
        PlugsyncError::Json(Arc::new(err))
    }
}

impl From<toml::de::Error> for PlugsyncError {
    fn from(err: toml::de::Error) -> Self {
        PlugsyncError::Toml(Arc::new(err))
    }
}

impl From<zip::result::ZipError> for PlugsyncError {
    fn from(err: zip::result::ZipError) -> Self {
        PlugsyncError::Zip(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PlugsyncError>;
