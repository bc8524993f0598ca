//! Google (Gemini) adapter.
//!
//! Uses the generative language REST API: `generateContent` for one-shot
//! calls and `streamGenerateContent?alt=sse` for streaming. Roles map to
//! user/model, system text rides in `systemInstruction`, and thought
//! parts carry the reasoning trace for 2.5-series models.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::{ProviderKeys, RequestConfig};
use crate::error::{ProviderError, ProviderResult};

use super::{
    assemble_response, CallOptions, MessageRole, ModelCapabilities, ModelConfig, ModelLimits,
    ModelMessage, ModelPricing, ModelProvider, ModelResponse, StreamChunk, TokenUsage,
};

/// Google provider adapter.
pub struct GoogleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout_ms: u64,
    health_timeout_ms: u64,
    models: Vec<ModelConfig>,
}

impl GoogleProvider {
    /// Registry name for this provider.
    pub const NAME: &'static str = "google";

    /// Create the adapter from configuration.
    pub fn new(keys: &ProviderKeys, request: &RequestConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request.timeout_ms))
            .build()
            .map_err(ProviderError::Http)?;

        let base_url = keys.base_url.trim_end_matches('/').to_string();
        info!(base_url = %base_url, "Google provider initialized");

        Ok(Self {
            client,
            base_url,
            api_key: keys.api_key.clone(),
            timeout_ms: request.timeout_ms,
            health_timeout_ms: request.health_check_timeout_ms,
            models: catalog(),
        })
    }

    fn api_key(&self) -> ProviderResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: Self::NAME.to_string(),
            })
    }

    fn map_send_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout {
                provider: Self::NAME.to_string(),
                timeout_ms: self.timeout_ms,
            }
        } else {
            ProviderError::Http(e)
        }
    }

    fn build_request(
        &self,
        messages: &[ModelMessage],
        model: &ModelConfig,
        options: &CallOptions,
    ) -> GenerateContentRequest {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| matches!(m.role, MessageRole::System | MessageRole::Context))
            .map(|m| m.content.as_str())
            .collect();

        let contents: Vec<Content> = messages
            .iter()
            .filter_map(|m| {
                let role = match m.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant => "model",
                    _ => return None,
                };
                Some(Content {
                    role: Some(role.to_string()),
                    parts: vec![Part {
                        text: m.content.clone(),
                        thought: None,
                    }],
                })
            })
            .collect();

        GenerateContentRequest {
            system_instruction: (!system.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part {
                    text: system.join("\n\n"),
                    thought: None,
                }],
            }),
            contents,
            generation_config: Some(GenerationConfig {
                max_output_tokens: options.max_tokens,
                temperature: options.temperature,
                thinking_config: model.capabilities.reasoning.then(|| ThinkingConfig {
                    include_thoughts: true,
                }),
            }),
        }
    }

    async fn send(
        &self,
        url: &str,
        request: &GenerateContentRequest,
    ) -> ProviderResult<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key()?)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: Self::NAME.to_string(),
                status: status.as_u16(),
                message: error_body,
            });
        }

        Ok(response)
    }

    fn collect_parts(
        candidate: Option<Candidate>,
        content: &mut String,
        reasoning: &mut String,
    ) {
        let Some(candidate) = candidate else { return };
        let Some(body) = candidate.content else { return };
        for part in body.parts {
            if part.thought.unwrap_or(false) {
                reasoning.push_str(&part.text);
            } else {
                content.push_str(&part.text);
            }
        }
    }

    async fn probe(&self) -> bool {
        let Ok(key) = self.api_key() else {
            return false;
        };
        let url = format!("{}/v1beta/models", self.base_url);
        let result = self
            .client
            .get(&url)
            .header("x-goog-api-key", key)
            .timeout(Duration::from_millis(self.health_timeout_ms))
            .send()
            .await;
        matches!(result, Ok(resp) if resp.status().is_success())
    }
}

#[async_trait]
impl ModelProvider for GoogleProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn models(&self) -> &[ModelConfig] {
        &self.models
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn call_model(
        &self,
        messages: &[ModelMessage],
        model: &ModelConfig,
        options: &CallOptions,
    ) -> ProviderResult<ModelResponse> {
        let start = Instant::now();
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model.id);
        let request = self.build_request(messages, model, options);

        debug!(model = %model.id, messages = messages.len(), "Calling Gemini generateContent");

        let response = self.send(&url, &request).await?;
        let body: GenerateContentResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: Self::NAME.to_string(),
                    message: format!("Failed to parse response: {}", e),
                })?;

        let mut content = String::new();
        let mut reasoning = String::new();
        Self::collect_parts(
            body.candidates.into_iter().next(),
            &mut content,
            &mut reasoning,
        );

        let usage = body
            .usage_metadata
            .map(TokenUsage::from)
            .unwrap_or_default();

        Ok(assemble_response(
            content,
            (!reasoning.is_empty()).then_some(reasoning),
            usage,
            start.elapsed(),
            model,
        ))
    }

    async fn call_model_stream(
        &self,
        messages: &[ModelMessage],
        model: &ModelConfig,
        options: &CallOptions,
        tx: mpsc::Sender<StreamChunk>,
    ) -> ProviderResult<ModelResponse> {
        let start = Instant::now();
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model.id
        );
        let request = self.build_request(messages, model, options);

        debug!(model = %model.id, "Streaming Gemini streamGenerateContent");

        let response = self.send(&url, &request).await?;
        let mut body = response.bytes_stream();
        let mut buffer = String::new();
        let mut content = String::new();
        let mut reasoning = String::new();
        let mut usage = TokenUsage::default();

        // No end sentinel on this wire; the stream simply closes after
        // the chunk carrying usageMetadata.
        while let Some(item) = body.next().await {
            let bytes = item.map_err(|e| ProviderError::Stream {
                provider: Self::NAME.to_string(),
                message: e.to_string(),
            })?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim_end_matches('\r').to_string();
                buffer.drain(..=pos);

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };

                let chunk: GenerateContentResponse = match serde_json::from_str(data) {
                    Ok(c) => c,
                    Err(e) => {
                        return Err(ProviderError::Stream {
                            provider: Self::NAME.to_string(),
                            message: format!("Malformed stream event: {}", e),
                        });
                    }
                };

                if let Some(meta) = chunk.usage_metadata {
                    usage = TokenUsage::from(meta);
                }

                let before_content = content.len();
                let before_reasoning = reasoning.len();
                Self::collect_parts(
                    chunk.candidates.into_iter().next(),
                    &mut content,
                    &mut reasoning,
                );

                if reasoning.len() > before_reasoning {
                    let delta = reasoning[before_reasoning..].to_string();
                    let _ = tx.send(StreamChunk::Reasoning(delta)).await;
                }
                if content.len() > before_content {
                    let delta = content[before_content..].to_string();
                    let _ = tx.send(StreamChunk::Text(delta)).await;
                }
            }
        }

        Ok(assemble_response(
            content,
            (!reasoning.is_empty()).then_some(reasoning),
            usage,
            start.elapsed(),
            model,
        ))
    }

    async fn health_check(&self) -> bool {
        for attempt in 0..2 {
            if attempt > 0 {
                debug!(provider = Self::NAME, "Retrying health check");
            }
            if self.probe().await {
                return true;
            }
        }
        false
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    include_thoughts: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    thoughts_token_count: Option<u32>,
}

impl From<UsageMetadata> for TokenUsage {
    fn from(meta: UsageMetadata) -> Self {
        Self {
            input: meta.prompt_token_count,
            output: meta.candidates_token_count,
            reasoning: meta.thoughts_token_count.filter(|t| *t > 0),
        }
    }
}

fn catalog() -> Vec<ModelConfig> {
    fn gemini(
        id: &str,
        name: &str,
        input: f64,
        output: f64,
        reasoning: bool,
        max_tokens: u32,
    ) -> ModelConfig {
        ModelConfig {
            id: id.to_string(),
            name: name.to_string(),
            provider: GoogleProvider::NAME.to_string(),
            capabilities: ModelCapabilities {
                reasoning,
                multimodal: true,
                function_calling: true,
                streaming: true,
            },
            pricing: ModelPricing {
                input_per_million: input,
                output_per_million: output,
                reasoning_per_million: None,
            },
            limits: ModelLimits {
                max_tokens,
                context_window: 1_048_576,
            },
        }
    }

    vec![
        gemini("gemini-2.5-pro", "Gemini 2.5 Pro", 1.25, 10.0, true, 65_536),
        gemini(
            "gemini-2.5-flash",
            "Gemini 2.5 Flash",
            0.3,
            2.5,
            true,
            65_536,
        ),
        gemini(
            "gemini-2.0-flash",
            "Gemini 2.0 Flash",
            0.1,
            0.4,
            false,
            8_192,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider() -> GoogleProvider {
        let keys = ProviderKeys {
            api_key: Some("test_key".to_string()),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
        };
        GoogleProvider::new(&keys, &RequestConfig::default()).unwrap()
    }

    #[test]
    fn test_roles_map_to_user_and_model() {
        let provider = test_provider();
        let model = &catalog()[2];
        let messages = vec![
            ModelMessage::system("short answers"),
            ModelMessage::user("hello"),
            ModelMessage::assistant("hi"),
            ModelMessage::user("again"),
        ];

        let request = provider.build_request(&messages, model, &CallOptions::new());
        assert!(request.system_instruction.is_some());
        assert_eq!(request.contents.len(), 3);
        assert_eq!(request.contents[0].role.as_deref(), Some("user"));
        assert_eq!(request.contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn test_thought_parts_split_from_text() {
        let data = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"pondering","thought":true},{"text":"answer"}]}}],"usageMetadata":{"promptTokenCount":5,"candidatesTokenCount":7,"thoughtsTokenCount":3}}"#;
        let body: GenerateContentResponse = serde_json::from_str(data).unwrap();

        let mut content = String::new();
        let mut reasoning = String::new();
        GoogleProvider::collect_parts(
            body.candidates.into_iter().next(),
            &mut content,
            &mut reasoning,
        );

        assert_eq!(content, "answer");
        assert_eq!(reasoning, "pondering");

        let usage = TokenUsage::from(body.usage_metadata.unwrap());
        assert_eq!(usage.input, 5);
        assert_eq!(usage.output, 7);
        assert_eq!(usage.reasoning, Some(3));
    }

    #[test]
    fn test_catalog_provider_names_match() {
        for model in catalog() {
            assert_eq!(model.provider, GoogleProvider::NAME);
        }
    }
}
