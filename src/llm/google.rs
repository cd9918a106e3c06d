//! Google Gemini adapter.
//!
//! Talks to the Gemini REST API directly. Besides chat completions this
//! adapter carries the two session-gating calls: API key validation and the
//! generation-capable model listing.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm::provider::LLMAdapter;
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, TokenUsage};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GENERATE_METHOD: &str = "generateContent";

pub struct GoogleAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GoogleAdapter {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_url(api_key: &str, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.into(),
        }
    }

    /// Validate the API key by listing models.
    ///
    /// A rejected key yields `Ok(false)`; only transport-level failures are
    /// surfaced as errors.
    pub async fn validate_key(&self) -> AppResult<bool> {
        let url = format!("{}/models?key={}", self.base_url, self.api_key);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::LLMApi(format!("Gemini API request failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(status = %response.status(), "Gemini rejected the supplied API key");
                Ok(false)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::LLMApi(format!(
                    "Gemini API error ({}): {}",
                    status, body
                )))
            }
        }
    }

    /// List model identifiers that support content generation.
    ///
    /// Failures are swallowed into an empty list with a diagnostic; callers
    /// never see an error from this path.
    pub async fn list_generation_models(&self) -> Vec<String> {
        let url = format!("{}/models?key={}", self.base_url, self.api_key);
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Failed to reach Gemini model listing");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "Gemini model listing failed");
            return Vec::new();
        }

        let listing: ModelListing = match response.json().await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(error = %e, "Failed to parse Gemini model listing");
                return Vec::new();
            }
        };

        listing
            .models
            .into_iter()
            .filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == GENERATE_METHOD)
            })
            .map(|m| m.name.trim_start_matches("models/").to_string())
            .collect()
    }
}

#[async_trait]
impl LLMAdapter for GoogleAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let model = request.model.trim_start_matches("models/");
        let url = format!(
            "{}/models/{}:{}?key={}",
            self.base_url, model, GENERATE_METHOD, self.api_key
        );

        let contents = request
            .messages
            .iter()
            .map(|m| Content {
                role: match m.role.as_str() {
                    "assistant" => "model".to_string(),
                    _ => "user".to_string(),
                },
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
            .collect();

        let body = GenerateContentRequest {
            contents,
            system_instruction: request.system_instruction.as_ref().map(|text| {
                SystemInstruction {
                    parts: vec![Part { text: text.clone() }],
                }
            }),
            generation_config: Some(GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            }),
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LLMApi(format!("Gemini API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LLMApi(format!(
                "Gemini API error ({}): {}",
                status, body
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMApi(format!("Failed to parse Gemini response: {}", e)))?;

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LLMApi("Gemini returned no candidates".to_string()))?;

        let content = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        let usage = parsed.usage_metadata.unwrap_or_default();

        Ok(LLMResponse {
            content,
            finish_reason: candidate.finish_reason.unwrap_or_else(|| "STOP".to_string()),
            usage: TokenUsage {
                prompt_tokens: usage.prompt_token_count,
                completion_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
            },
        })
    }
}

// Wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ModelListing {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LLMMessage;

    #[tokio::test]
    async fn test_validate_key_accepts_valid_key() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/models")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"models":[]}"#)
            .create_async()
            .await;

        let adapter = GoogleAdapter::with_base_url("good-key", server.url());
        assert!(adapter.validate_key().await.unwrap());
    }

    #[tokio::test]
    async fn test_validate_key_rejects_invalid_key() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/models")
            .match_query(mockito::Matcher::Any)
            .with_status(403)
            .with_body(r#"{"error":{"message":"permission denied"}}"#)
            .create_async()
            .await;

        let adapter = GoogleAdapter::with_base_url("bad-key", server.url());
        assert!(!adapter.validate_key().await.unwrap());
    }

    #[tokio::test]
    async fn test_list_generation_models_filters_by_method() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/models")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"models":[
                    {"name":"models/gemini-1.5-flash-latest","supportedGenerationMethods":["generateContent","countTokens"]},
                    {"name":"models/embedding-001","supportedGenerationMethods":["embedContent"]}
                ]}"#,
            )
            .create_async()
            .await;

        let adapter = GoogleAdapter::with_base_url("key", server.url());
        let models = adapter.list_generation_models().await;
        assert_eq!(models, vec!["gemini-1.5-flash-latest"]);
    }

    #[tokio::test]
    async fn test_list_generation_models_swallows_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/models")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let adapter = GoogleAdapter::with_base_url("key", server.url());
        assert!(adapter.list_generation_models().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_chat_completion_parses_candidate() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/gemini-1.5-flash-latest:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{
                    "candidates":[{"content":{"role":"model","parts":[{"text":"Final Answer: tudo certo"}]},"finishReason":"STOP"}],
                    "usageMetadata":{"promptTokenCount":10,"candidatesTokenCount":5,"totalTokenCount":15}
                }"#,
            )
            .create_async()
            .await;

        let adapter = GoogleAdapter::with_base_url("key", server.url());
        let response = adapter
            .create_chat_completion(&LLMRequest {
                model: "models/gemini-1.5-flash-latest".to_string(),
                messages: vec![LLMMessage::user("oi")],
                max_tokens: Some(256),
                temperature: Some(0.0),
                system_instruction: Some("seja breve".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(response.content, "Final Answer: tudo certo");
        assert_eq!(response.finish_reason, "STOP");
        assert_eq!(response.usage.total_tokens, 15);
    }

    #[tokio::test]
    async fn test_create_chat_completion_surfaces_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/gemini-1.5-flash-latest:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(429)
            .with_body(r#"{"error":{"message":"quota exceeded"}}"#)
            .create_async()
            .await;

        let adapter = GoogleAdapter::with_base_url("key", server.url());
        let err = adapter
            .create_chat_completion(&LLMRequest {
                model: "gemini-1.5-flash-latest".to_string(),
                messages: vec![LLMMessage::user("oi")],
                max_tokens: None,
                temperature: None,
                system_instruction: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::LLMApi(_)));
        assert!(err.to_string().contains("429"));
    }
}
