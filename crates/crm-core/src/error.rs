use thiserror::Error;

/// Top-level error type for the CRM assistant.
///
/// Subsystem crates define their own error types and convert into
/// `CrmError` where they cross a crate boundary, so `?` works throughout.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CrmError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for CrmError {
    fn from(err: toml::de::Error) -> Self {
        CrmError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CrmError {
    fn from(err: toml::ser::Error) -> Self {
        CrmError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CrmError {
    fn from(err: serde_json::Error) -> Self {
        CrmError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for CRM operations.
pub type Result<T> = std::result::Result<T, CrmError>;
