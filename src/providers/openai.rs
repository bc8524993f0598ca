//! OpenAI adapter and the shared OpenAI-compatible chat-completions wire.
//!
//! DeepSeek, OpenRouter, and xAI speak the same `/chat/completions`
//! protocol with different hosts and catalogs; their adapters reuse
//! [`ChatCompletionsClient`] from this module.

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

/// Assembled output of one chat-completions call.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Final answer text
    pub content: String,
    /// Reasoning trace, when the vendor returns one (`reasoning_content`)
    pub reasoning: Option<String>,
    /// Token usage reported by the vendor
    pub usage: TokenUsage,
}

/// Client for OpenAI-compatible chat-completions APIs.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    provider: &'static str,
    base_url: String,
    api_key: Option<String>,
    timeout_ms: u64,
    health_timeout_ms: u64,
}

impl ChatCompletionsClient {
    /// Create a client for the named provider.
    pub fn new(
        provider: &'static str,
        keys: &ProviderKeys,
        request: &RequestConfig,
    ) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request.timeout_ms))
            .build()
            .map_err(ProviderError::Http)?;

        Ok(Self {
            client,
            provider,
            base_url: keys.base_url.trim_end_matches('/').to_string(),
            api_key: keys.api_key.clone(),
            timeout_ms: request.timeout_ms,
            health_timeout_ms: request.health_check_timeout_ms,
        })
    }

    /// Whether an API key is present.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn bearer(&self) -> ProviderResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: self.provider.to_string(),
            })
    }

    fn map_send_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout {
                provider: self.provider.to_string(),
                timeout_ms: self.timeout_ms,
            }
        } else {
            ProviderError::Http(e)
        }
    }

    fn build_request<'a>(
        &self,
        messages: &'a [ModelMessage],
        model_id: &'a str,
        options: &CallOptions,
        reasoning_model: bool,
        stream: bool,
    ) -> ChatRequest<'a> {
        // Reasoning models on the OpenAI wire take max_completion_tokens
        // and reject explicit temperature.
        let (max_tokens, max_completion_tokens) = if reasoning_model {
            (None, options.max_tokens)
        } else {
            (options.max_tokens, None)
        };

        ChatRequest {
            model: model_id,
            messages: messages.iter().map(WireMessage::from).collect(),
            max_tokens,
            max_completion_tokens,
            temperature: if reasoning_model {
                None
            } else {
                options.temperature
            },
            stream,
            stream_options: stream.then(|| StreamOptions {
                include_usage: true,
            }),
        }
    }

    /// Call the chat-completions endpoint and wait for the full response.
    pub async fn call(
        &self,
        messages: &[ModelMessage],
        model_id: &str,
        options: &CallOptions,
        reasoning_model: bool,
    ) -> ProviderResult<ChatOutcome> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.build_request(messages, model_id, options, reasoning_model, false);

        debug!(
            provider = self.provider,
            model = model_id,
            messages = messages.len(),
            "Calling chat completions API"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.bearer()?))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: self.provider.to_string(),
                status: status.as_u16(),
                message: error_body,
            });
        }

        let chat: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: self.provider.to_string(),
                    message: format!("Failed to parse response: {}", e),
                })?;

        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: self.provider.to_string(),
                message: "Response contained no choices".to_string(),
            })?;

        Ok(ChatOutcome {
            content: choice.message.content.unwrap_or_default(),
            reasoning: choice.message.reasoning_content.filter(|r| !r.is_empty()),
            usage: chat.usage.map(TokenUsage::from).unwrap_or_default(),
        })
    }

    /// Call the chat-completions endpoint in streaming mode, forwarding
    /// deltas through `tx`, and return the assembled outcome.
    pub async fn stream(
        &self,
        messages: &[ModelMessage],
        model_id: &str,
        options: &CallOptions,
        reasoning_model: bool,
        tx: &mpsc::Sender<StreamChunk>,
    ) -> ProviderResult<ChatOutcome> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.build_request(messages, model_id, options, reasoning_model, true);

        debug!(
            provider = self.provider,
            model = model_id,
            "Streaming chat completions API"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.bearer()?))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: self.provider.to_string(),
                status: status.as_u16(),
                message: error_body,
            });
        }

        let mut body = response.bytes_stream();
        let mut buffer = String::new();
        let mut content = String::new();
        let mut reasoning = String::new();
        let mut usage = TokenUsage::default();
        let mut done = false;

        while let Some(item) = body.next().await {
            let bytes = item.map_err(|e| ProviderError::Stream {
                provider: self.provider.to_string(),
                message: e.to_string(),
            })?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            // Drain complete lines; SSE events can split across reads
            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim_end_matches('\r').to_string();
                buffer.drain(..=pos);

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    done = true;
                    continue;
                }

                let chunk: ChatStreamResponse = match serde_json::from_str(data) {
                    Ok(c) => c,
                    Err(e) => {
                        return Err(ProviderError::Stream {
                            provider: self.provider.to_string(),
                            message: format!("Malformed stream event: {}", e),
                        });
                    }
                };

                if let Some(wire_usage) = chunk.usage {
                    usage = TokenUsage::from(wire_usage);
                }
                for choice in chunk.choices {
                    if let Some(delta) = choice.delta.reasoning_content {
                        if !delta.is_empty() {
                            reasoning.push_str(&delta);
                            let _ = tx.send(StreamChunk::Reasoning(delta)).await;
                        }
                    }
                    if let Some(delta) = choice.delta.content {
                        if !delta.is_empty() {
                            content.push_str(&delta);
                            let _ = tx.send(StreamChunk::Text(delta)).await;
                        }
                    }
                }
            }

            if done {
                break;
            }
        }

        if !done {
            return Err(ProviderError::Stream {
                provider: self.provider.to_string(),
                message: "Stream ended before [DONE]".to_string(),
            });
        }

        Ok(ChatOutcome {
            content,
            reasoning: (!reasoning.is_empty()).then_some(reasoning),
            usage,
        })
    }

    /// Probe the provider's model-list endpoint, retrying once.
    pub async fn health_check(&self) -> bool {
        for attempt in 0..2 {
            if attempt > 0 {
                debug!(provider = self.provider, "Retrying health check");
            }
            if self.probe().await {
                return true;
            }
        }
        false
    }

    async fn probe(&self) -> bool {
        let Ok(key) = self.bearer() else {
            return false;
        };
        let url = format!("{}/models", self.base_url);
        let result = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", key))
            .timeout(Duration::from_millis(self.health_timeout_ms))
            .send()
            .await;
        matches!(result, Ok(resp) if resp.status().is_success())
    }
}

fn wire_role(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System | MessageRole::Context => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a ModelMessage> for WireMessage<'a> {
    fn from(msg: &'a ModelMessage) -> Self {
        Self {
            role: wire_role(msg.role),
            content: &msg.content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamResponse {
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChoice {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct CompletionTokensDetails {
    reasoning_tokens: Option<u32>,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        Self {
            input: usage.prompt_tokens,
            output: usage.completion_tokens,
            reasoning: usage
                .completion_tokens_details
                .and_then(|d| d.reasoning_tokens)
                .filter(|t| *t > 0),
        }
    }
}

/// OpenAI provider adapter.
pub struct OpenAiProvider {
    wire: ChatCompletionsClient,
    models: Vec<ModelConfig>,
}

impl OpenAiProvider {
    /// Registry name for this provider.
    pub const NAME: &'static str = "openai";

    /// Create the adapter from configuration.
    pub fn new(keys: &ProviderKeys, request: &RequestConfig) -> ProviderResult<Self> {
        let wire = ChatCompletionsClient::new(Self::NAME, keys, request)?;
        info!(base_url = %wire.base_url(), "OpenAI provider initialized");
        Ok(Self {
            wire,
            models: catalog(),
        })
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn models(&self) -> &[ModelConfig] {
        &self.models
    }

    fn is_configured(&self) -> bool {
        self.wire.is_configured()
    }

    async fn call_model(
        &self,
        messages: &[ModelMessage],
        model: &ModelConfig,
        options: &CallOptions,
    ) -> ProviderResult<ModelResponse> {
        let start = Instant::now();
        let outcome = self
            .wire
            .call(messages, &model.id, options, model.capabilities.reasoning)
            .await?;
        Ok(assemble_response(
            outcome.content,
            outcome.reasoning,
            outcome.usage,
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
        let outcome = self
            .wire
            .stream(
                messages,
                &model.id,
                options,
                model.capabilities.reasoning,
                &tx,
            )
            .await?;
        Ok(assemble_response(
            outcome.content,
            outcome.reasoning,
            outcome.usage,
            start.elapsed(),
            model,
        ))
    }

    async fn health_check(&self) -> bool {
        self.wire.health_check().await
    }
}

fn catalog() -> Vec<ModelConfig> {
    fn chat(id: &str, name: &str, input: f64, output: f64, limits: ModelLimits) -> ModelConfig {
        ModelConfig {
            id: id.to_string(),
            name: name.to_string(),
            provider: OpenAiProvider::NAME.to_string(),
            capabilities: ModelCapabilities {
                reasoning: false,
                multimodal: true,
                function_calling: true,
                streaming: true,
            },
            pricing: ModelPricing {
                input_per_million: input,
                output_per_million: output,
                reasoning_per_million: None,
            },
            limits,
        }
    }

    fn reasoner(id: &str, name: &str, input: f64, output: f64, limits: ModelLimits) -> ModelConfig {
        ModelConfig {
            capabilities: ModelCapabilities {
                reasoning: true,
                multimodal: true,
                function_calling: true,
                streaming: true,
            },
            ..chat(id, name, input, output, limits)
        }
    }

    vec![
        chat(
            "gpt-4o",
            "GPT-4o",
            2.5,
            10.0,
            ModelLimits {
                max_tokens: 16_384,
                context_window: 128_000,
            },
        ),
        chat(
            "gpt-4o-mini",
            "GPT-4o mini",
            0.15,
            0.6,
            ModelLimits {
                max_tokens: 16_384,
                context_window: 128_000,
            },
        ),
        chat(
            "gpt-4.1",
            "GPT-4.1",
            2.0,
            8.0,
            ModelLimits {
                max_tokens: 32_768,
                context_window: 1_047_576,
            },
        ),
        chat(
            "gpt-4.1-mini",
            "GPT-4.1 mini",
            0.4,
            1.6,
            ModelLimits {
                max_tokens: 32_768,
                context_window: 1_047_576,
            },
        ),
        reasoner(
            "o3",
            "o3",
            2.0,
            8.0,
            ModelLimits {
                max_tokens: 100_000,
                context_window: 200_000,
            },
        ),
        reasoner(
            "o4-mini",
            "o4-mini",
            1.1,
            4.4,
            ModelLimits {
                max_tokens: 100_000,
                context_window: 200_000,
            },
        ),
    ]
}
