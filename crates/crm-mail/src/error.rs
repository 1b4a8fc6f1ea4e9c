use crm_core::error::CrmError;
use thiserror::Error;

/// Errors from building or delivering an email.
#[derive(Error, Debug)]
pub enum MailError {
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("failed to read attachment {path}: {source}")]
    Attachment {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("delivery timed out after {0}s")]
    Timeout(u64),
    #[error("mail config error: {0}")]
    Config(String),
}

impl From<MailError> for CrmError {
    fn from(err: MailError) -> Self {
        match err {
            MailError::Config(msg) => CrmError::Config(msg),
            other => CrmError::Api(other.to_string()),
        }
    }
}
