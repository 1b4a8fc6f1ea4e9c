//! Error types for the conversational layer.

use crm_core::error::CrmError;

/// Errors from a language model backend.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("model is not configured: {0}")]
    NotConfigured(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("model returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("model returned no text")]
    EmptyResponse,
    #[error("no scripted response left")]
    Exhausted,
}

/// Errors from turning a model response into a classifier result or draft.
///
/// Every variant is a classifier failure: the router answers with a generic
/// apology and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("model call timed out after {0}s")]
    Timeout(u64),
    #[error("no JSON object in model output")]
    NoJson,
    #[error("unbalanced JSON object in model output")]
    Unbalanced,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("missing or non-string \"type\" field")]
    MissingType,
    #[error("malformed {tag} payload: {reason}")]
    Shape { tag: String, reason: String },
}

impl ClassifierError {
    pub(crate) fn shape(tag: &str, reason: impl Into<String>) -> Self {
        ClassifierError::Shape {
            tag: tag.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors from the chat router that abort the request.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("lead directory error: {0}")]
    Directory(String),
}

impl ChatError {
    /// Whether the caller sent a bad request, as opposed to a server fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ChatError::EmptyMessage | ChatError::MessageTooLong(_))
    }

    pub(crate) fn directory(err: CrmError) -> Self {
        ChatError::Directory(err.to_string())
    }
}

impl From<CrmError> for ChatError {
    fn from(err: CrmError) -> Self {
        ChatError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(ChatError::EmptyMessage.to_string(), "message cannot be empty");
        assert_eq!(
            ChatError::MessageTooLong(2000).to_string(),
            "message exceeds maximum length of 2000 characters"
        );
        assert_eq!(
            ChatError::Directory("Query error: unsupported operator: $where".into()).to_string(),
            "lead directory error: Query error: unsupported operator: $where"
        );
    }

    #[test]
    fn test_client_errors() {
        assert!(ChatError::EmptyMessage.is_client_error());
        assert!(ChatError::MessageTooLong(1).is_client_error());
        assert!(!ChatError::Storage("disk full".into()).is_client_error());
    }

    #[test]
    fn test_chat_error_from_crm_error() {
        let err: ChatError = CrmError::Storage("locked".into()).into();
        assert!(matches!(err, ChatError::Storage(_)));
        assert!(err.to_string().contains("locked"));

        let err = ChatError::directory(CrmError::Query("bad filter".into()));
        assert!(matches!(err, ChatError::Directory(_)));
    }

    #[test]
    fn test_classifier_error_from_llm() {
        let err: ClassifierError = LlmError::Http {
            status: 429,
            message: "RESOURCE_EXHAUSTED".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "LLM error: model returned HTTP 429: RESOURCE_EXHAUSTED"
        );
    }

    #[test]
    fn test_shape_error_display() {
        let err = ClassifierError::shape("query", "mongoQuery must be an object");
        assert_eq!(
            err.to_string(),
            "malformed query payload: mongoQuery must be an object"
        );
    }
}
