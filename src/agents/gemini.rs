//! Production reasoning agent backed by the Gemini adapter.

use async_trait::async_trait;

use crate::agents::ReasoningAgent;
use crate::llm::{LLMProviderConfig, LLM};
use crate::types::{AppResult, LLMMessage, LLMRequest};

pub struct GeminiReasoningAgent {
    llm: LLM,
    model: String,
}

impl GeminiReasoningAgent {
    pub fn new(api_key: &str, model: &str) -> AppResult<Self> {
        let llm = LLM::new(LLMProviderConfig {
            name: "google".to_string(),
            api_key: api_key.to_string(),
        })?;
        Ok(Self {
            llm,
            model: model.to_string(),
        })
    }

    async fn complete(&self, payload: &str) -> AppResult<String> {
        let request = LLMRequest {
            model: self.model.clone(),
            messages: vec![LLMMessage::user(payload)],
            max_tokens: Some(2048),
            temperature: Some(0.0),
            system_instruction: None,
        };
        let response = self.llm.create_chat_completion(&request).await?;
        Ok(response.content)
    }
}

#[async_trait]
impl ReasoningAgent for GeminiReasoningAgent {
    async fn invoke(&self, payload: &str) -> AppResult<String> {
        self.complete(payload).await
    }

    /// The REST backend has no separate stdout channel; its verbose stream is
    /// the full response text, which carries the interleaved step markers the
    /// system instructions mandate.
    async fn invoke_verbose(&self, payload: &str) -> AppResult<String> {
        self.complete(payload).await
    }
}
