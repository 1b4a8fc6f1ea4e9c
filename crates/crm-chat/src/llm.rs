//! Language model abstraction.
//!
//! The classifier and the email composer talk to a [`LanguageModel`]; the
//! Gemini REST client is the production implementation and
//! [`ScriptedModel`] replays canned responses.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::LlmError;

/// One text-generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    /// System instructions, sent separately from the prompt when the
    /// backend supports it.
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// A text-in, text-out model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, request: &LlmRequest) -> Result<String, LlmError>;

    fn model_name(&self) -> &str;
}

/// Replays queued responses in order and records every request.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn push_response(&self, text: impl Into<String>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(Ok(text.into()));
        }
    }

    /// Queue a failure.
    pub fn push_error(&self, err: LlmError) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(Err(err));
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, request: &LlmRequest) -> Result<String, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.responses
            .lock()
            .map_err(|e| LlmError::Request(format!("script lock poisoned: {}", e)))?
            .pop_front()
            .unwrap_or(Err(LlmError::Exhausted))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> LlmRequest {
        LlmRequest {
            system: None,
            prompt: prompt.into(),
            temperature: 0.1,
            max_output_tokens: 100,
        }
    }

    #[tokio::test]
    async fn test_scripted_model_replays_in_order() {
        let model = ScriptedModel::new();
        model.push_response("first");
        model.push_error(LlmError::EmptyResponse);

        assert_eq!(model.generate(&request("a")).await.unwrap(), "first");
        assert!(matches!(
            model.generate(&request("b")).await,
            Err(LlmError::EmptyResponse)
        ));
        assert!(matches!(
            model.generate(&request("c")).await,
            Err(LlmError::Exhausted)
        ));

        assert_eq!(model.call_count(), 3);
        assert_eq!(model.requests()[1].prompt, "b");
    }
}
