//! Anthropic (Claude) adapter.
//!
//! Speaks the messages API: `x-api-key` + `anthropic-version` headers,
//! content blocks in responses, system text in a top-level field, and
//! extended-thinking blocks for reasoning-capable models.

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

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic provider adapter.
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout_ms: u64,
    health_timeout_ms: u64,
    models: Vec<ModelConfig>,
}

impl AnthropicProvider {
    /// Registry name for this provider.
    pub const NAME: &'static str = "anthropic";

    /// Create the adapter from configuration.
    pub fn new(keys: &ProviderKeys, request: &RequestConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request.timeout_ms))
            .build()
            .map_err(ProviderError::Http)?;

        let base_url = keys.base_url.trim_end_matches('/').to_string();
        info!(base_url = %base_url, "Anthropic provider initialized");

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

    fn build_request<'a>(
        &self,
        messages: &'a [ModelMessage],
        model: &'a ModelConfig,
        options: &CallOptions,
        stream: bool,
    ) -> MessagesRequest<'a> {
        // System and context roles go in the top-level system field
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| matches!(m.role, MessageRole::System | MessageRole::Context))
            .map(|m| m.content.as_str())
            .collect();

        let turns: Vec<WireMessage<'a>> = messages
            .iter()
            .filter_map(|m| match m.role {
                MessageRole::User => Some(WireMessage {
                    role: "user",
                    content: &m.content,
                }),
                MessageRole::Assistant => Some(WireMessage {
                    role: "assistant",
                    content: &m.content,
                }),
                _ => None,
            })
            .collect();

        // max_tokens is mandatory on this wire
        let max_tokens = options.max_tokens.unwrap_or(model.limits.max_tokens);

        let thinking = model.capabilities.reasoning.then(|| Thinking {
            r#type: "enabled",
            budget_tokens: (max_tokens / 2).max(1_024),
        });

        MessagesRequest {
            model: &model.id,
            max_tokens,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: turns,
            // Thinking requests reject explicit temperature
            temperature: if thinking.is_some() {
                None
            } else {
                options.temperature
            },
            thinking,
            stream,
        }
    }

    async fn send(
        &self,
        request: &MessagesRequest<'_>,
    ) -> ProviderResult<reqwest::Response> {
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key()?)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
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
        let request = self.build_request(messages, model, options, false);

        debug!(model = %model.id, messages = messages.len(), "Calling Anthropic messages API");

        let response = self.send(&request).await?;
        let body: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: Self::NAME.to_string(),
                    message: format!("Failed to parse response: {}", e),
                })?;

        let mut content = String::new();
        let mut reasoning = String::new();
        for block in body.content {
            match block {
                ContentBlock::Text { text } => content.push_str(&text),
                ContentBlock::Thinking { thinking } => reasoning.push_str(&thinking),
                ContentBlock::Other => {}
            }
        }

        let usage = TokenUsage {
            input: body.usage.input_tokens,
            output: body.usage.output_tokens,
            reasoning: None,
        };

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
        let request = self.build_request(messages, model, options, true);

        debug!(model = %model.id, "Streaming Anthropic messages API");

        let response = self.send(&request).await?;
        let mut body = response.bytes_stream();
        let mut buffer = String::new();
        let mut content = String::new();
        let mut reasoning = String::new();
        let mut usage = TokenUsage::default();
        let mut done = false;

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

                let event: StreamEvent = match serde_json::from_str(data) {
                    Ok(e) => e,
                    Err(e) => {
                        return Err(ProviderError::Stream {
                            provider: Self::NAME.to_string(),
                            message: format!("Malformed stream event: {}", e),
                        });
                    }
                };

                match event {
                    StreamEvent::MessageStart { message } => {
                        usage.input = message.usage.input_tokens;
                    }
                    StreamEvent::ContentBlockDelta { delta } => match delta {
                        BlockDelta::TextDelta { text } => {
                            if !text.is_empty() {
                                content.push_str(&text);
                                let _ = tx.send(StreamChunk::Text(text)).await;
                            }
                        }
                        BlockDelta::ThinkingDelta { thinking } => {
                            if !thinking.is_empty() {
                                reasoning.push_str(&thinking);
                                let _ = tx.send(StreamChunk::Reasoning(thinking)).await;
                            }
                        }
                        BlockDelta::Other => {}
                    },
                    StreamEvent::MessageDelta { usage: delta_usage } => {
                        if let Some(u) = delta_usage {
                            usage.output = u.output_tokens;
                        }
                    }
                    StreamEvent::MessageStop => {
                        done = true;
                    }
                    StreamEvent::Other => {}
                }
            }

            if done {
                break;
            }
        }

        if !done {
            return Err(ProviderError::Stream {
                provider: Self::NAME.to_string(),
                message: "Stream ended before message_stop".to_string(),
            });
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

impl AnthropicProvider {
    async fn probe(&self) -> bool {
        let Ok(key) = self.api_key() else {
            return false;
        };
        let url = format!("{}/v1/models", self.base_url);
        let result = self
            .client
            .get(&url)
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(Duration::from_millis(self.health_timeout_ms))
            .send()
            .await;
        matches!(result, Ok(resp) if resp.status().is_success())
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<Thinking>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Thinking {
    r#type: &'static str,
    budget_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Thinking { thinking: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart { message: MessageStartBody },
    ContentBlockDelta { delta: BlockDelta },
    MessageDelta { usage: Option<WireUsage> },
    MessageStop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageStartBody {
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    #[serde(other)]
    Other,
}

fn catalog() -> Vec<ModelConfig> {
    fn claude(
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
            provider: AnthropicProvider::NAME.to_string(),
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
                context_window: 200_000,
            },
        }
    }

    vec![
        claude(
            "claude-sonnet-4-20250514",
            "Claude Sonnet 4",
            3.0,
            15.0,
            true,
            64_000,
        ),
        claude(
            "claude-opus-4-20250514",
            "Claude Opus 4",
            15.0,
            75.0,
            true,
            32_000,
        ),
        claude(
            "claude-3-5-haiku-20241022",
            "Claude 3.5 Haiku",
            0.8,
            4.0,
            false,
            8_192,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider() -> AnthropicProvider {
        let keys = ProviderKeys {
            api_key: Some("test_key".to_string()),
            base_url: "https://api.anthropic.com".to_string(),
        };
        AnthropicProvider::new(&keys, &RequestConfig::default()).unwrap()
    }

    #[test]
    fn test_system_and_context_fold_into_system_field() {
        let provider = test_provider();
        let model = &catalog()[2]; // haiku, no thinking
        let messages = vec![
            ModelMessage::system("be brief"),
            ModelMessage::context("prior debate turns"),
            ModelMessage::user("go"),
        ];

        let request = provider.build_request(&messages, model, &CallOptions::new(), false);
        assert_eq!(
            request.system.as_deref(),
            Some("be brief\n\nprior debate turns")
        );
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");
    }

    #[test]
    fn test_thinking_enabled_for_reasoning_models() {
        let provider = test_provider();
        let model = &catalog()[0]; // sonnet, reasoning
        let messages = vec![ModelMessage::user("go")];
        let options = CallOptions::new().with_temperature(0.5);

        let request = provider.build_request(&messages, model, &options, false);
        assert!(request.thinking.is_some());
        assert_eq!(request.temperature, None);
        assert_eq!(request.max_tokens, model.limits.max_tokens);
    }

    #[test]
    fn test_content_block_parsing() {
        let data = r#"{"content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"hi"}],"usage":{"input_tokens":3,"output_tokens":2}}"#;
        let body: MessagesResponse = serde_json::from_str(data).unwrap();
        assert_eq!(body.content.len(), 2);
        assert!(matches!(&body.content[0], ContentBlock::Thinking { thinking } if thinking == "hmm"));
        assert!(matches!(&body.content[1], ContentBlock::Text { text } if text == "hi"));
    }

    #[test]
    fn test_stream_event_parsing() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#;
        let event: StreamEvent = serde_json::from_str(data).unwrap();
        assert!(matches!(
            event,
            StreamEvent::ContentBlockDelta {
                delta: BlockDelta::TextDelta { .. }
            }
        ));

        // Unknown event types are tolerated
        let data = r#"{"type":"ping"}"#;
        let event: StreamEvent = serde_json::from_str(data).unwrap();
        assert!(matches!(event, StreamEvent::Other));
    }

    #[test]
    fn test_catalog_provider_names_match() {
        for model in catalog() {
            assert_eq!(model.provider, AnthropicProvider::NAME);
        }
    }
}
