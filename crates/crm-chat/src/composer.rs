//! Email composition through the language model.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crm_core::config::LlmConfig;

use crate::error::ClassifierError;
use crate::labeled::{from_object, parse_object};
use crate::llm::{LanguageModel, LlmRequest};
use crate::patterns::is_email_address;
use crate::prompt::{compose_prompt, COMPOSE_INSTRUCTIONS};

const COMPOSE_TEMPERATURE: f32 = 0.4;
const COMPOSE_MAX_TOKENS: u32 = 400;

/// A complete draft produced by the composer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComposedDraft {
    pub intent: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl ComposedDraft {
    /// Trim fields, drop recipients that are not addresses, and reject the
    /// draft if anything required is left empty.
    fn validated(mut self) -> Result<Self, ClassifierError> {
        self.intent = self.intent.trim().to_string();
        self.subject = self.subject.trim().to_string();
        self.recipients = self
            .recipients
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| is_email_address(r))
            .collect();

        let missing: Vec<&str> = [
            ("intent", self.intent.is_empty()),
            ("subject", self.subject.is_empty()),
            ("body", self.body.trim().is_empty()),
            ("recipients", self.recipients.is_empty()),
        ]
        .into_iter()
        .filter_map(|(field, empty)| empty.then_some(field))
        .collect();

        if missing.is_empty() {
            Ok(self)
        } else {
            Err(ClassifierError::shape(
                "compose",
                format!("incomplete draft, missing {}", missing.join(", ")),
            ))
        }
    }
}

/// Drafts an email from a request that already names the recipient.
pub struct EmailComposer {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl EmailComposer {
    pub fn new(model: Arc<dyn LanguageModel>, config: &LlmConfig) -> Self {
        Self {
            model,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub async fn compose(&self, request: &str) -> Result<ComposedDraft, ClassifierError> {
        let llm_request = LlmRequest {
            system: Some(COMPOSE_INSTRUCTIONS.to_string()),
            prompt: compose_prompt(request),
            temperature: COMPOSE_TEMPERATURE,
            max_output_tokens: COMPOSE_MAX_TOKENS,
        };

        let raw = tokio::time::timeout(self.timeout, self.model.generate(&llm_request))
            .await
            .map_err(|_| ClassifierError::Timeout(self.timeout.as_secs()))??;

        let draft = parse_object(&raw)
            .and_then(|map| from_object::<ComposedDraft>("compose", map))
            .and_then(ComposedDraft::validated);
        if let Err(e) = &draft {
            warn!(error = %e, raw = %raw, "Composer output rejected");
        }
        draft
    }
}
