//! Intent classification through the language model.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crm_core::config::LlmConfig;
use crm_core::types::Message;

use crate::error::ClassifierError;
use crate::labeled::{parse_classifier_output, ClassifierOutcome};
use crate::llm::{LanguageModel, LlmRequest};
use crate::prompt::{classifier_prompt, CLASSIFIER_INSTRUCTIONS, PROMPT_VERSION};

/// Labels a message as smalltalk, email, or query.
pub struct IntentClassifier {
    model: Arc<dyn LanguageModel>,
    temperature: f32,
    max_output_tokens: u32,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(model: Arc<dyn LanguageModel>, config: &LlmConfig) -> Self {
        Self {
            model,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Classify `message` given the preceding conversation.
    pub async fn classify(
        &self,
        message: &str,
        history: &[Message],
    ) -> Result<ClassifierOutcome, ClassifierError> {
        let request = LlmRequest {
            system: Some(CLASSIFIER_INSTRUCTIONS.to_string()),
            prompt: classifier_prompt(message, history, Utc::now()),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        };

        let raw = tokio::time::timeout(self.timeout, self.model.generate(&request))
            .await
            .map_err(|_| ClassifierError::Timeout(self.timeout.as_secs()))??;

        let outcome = parse_classifier_output(&raw);
        match &outcome {
            Ok(result) => debug!(
                model = self.model.model_name(),
                prompt_version = PROMPT_VERSION,
                outcome = ?result,
                "Message classified"
            ),
            Err(e) => warn!(
                model = self.model.model_name(),
                prompt_version = PROMPT_VERSION,
                error = %e,
                raw = %raw,
                "Classifier output rejected"
            ),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::labeled::ClassifierResult;
    use crate::llm::ScriptedModel;
    use async_trait::async_trait;

    fn classifier(model: Arc<dyn LanguageModel>) -> IntentClassifier {
        IntentClassifier::new(model, &LlmConfig::default())
    }

    #[tokio::test]
    async fn test_classify_sends_instructions_and_context() {
        let model = Arc::new(ScriptedModel::new());
        model.push_response(r#"{"type": "smalltalk", "reply": "Hi!"}"#);

        let history = vec![Message::user("earlier question")];
        let outcome = classifier(model.clone()).classify("hello", &history).await.unwrap();
        assert!(matches!(
            outcome,
            ClassifierOutcome::Recognized(ClassifierResult::Smalltalk(_))
        ));

        let request = &model.requests()[0];
        assert_eq!(request.system.as_deref(), Some(CLASSIFIER_INSTRUCTIONS));
        assert!(request.prompt.contains("user: earlier question"));
        assert!(request.prompt.contains("User message: \"hello\""));
        assert!((request.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_classify_propagates_model_failure() {
        let model = Arc::new(ScriptedModel::new());
        model.push_error(LlmError::Request("connection refused".into()));
        let err = classifier(model).classify("hello", &[]).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Llm(_)));
    }

    #[tokio::test]
    async fn test_classify_rejects_prose() {
        let model = Arc::new(ScriptedModel::new());
        model.push_response("I'm not sure what you mean.");
        let err = classifier(model).classify("hmm", &[]).await.unwrap_err();
        assert!(matches!(err, ClassifierError::NoJson));
    }

    struct SlowModel;

    #[async_trait]
    impl LanguageModel for SlowModel {
        async fn generate(&self, _request: &LlmRequest) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok("{}".into())
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_classify_times_out() {
        let err = classifier(Arc::new(SlowModel))
            .classify("hello", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifierError::Timeout(30)));
    }
}
