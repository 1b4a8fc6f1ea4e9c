//! CRM chat crate - the conversational layer of the assistant.
//!
//! Routes each incoming message through the pending-email confirmation
//! state or, failing that, the LLM intent classifier, then into the query,
//! smalltalk, or email flow. Session state is loaded and persisted through a
//! [`crm_storage::SessionStore`] on every request.

pub mod classifier;
pub mod composer;
pub mod error;
pub mod gemini;
pub mod labeled;
pub mod llm;
pub mod patterns;
pub mod projection;
pub mod prompt;
pub mod recipient;
pub mod router;
pub mod types;

pub use classifier::IntentClassifier;
pub use composer::{ComposedDraft, EmailComposer};
pub use error::{ChatError, ClassifierError, LlmError};
pub use gemini::GeminiClient;
pub use labeled::{ClassifierOutcome, ClassifierResult};
pub use llm::{LanguageModel, LlmRequest, ScriptedModel};
pub use recipient::RecipientResolver;
pub use router::ChatRouter;
pub use types::{ChatReply, DraftView, QueryResultSet};
