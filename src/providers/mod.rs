//! Provider abstraction layer.
//!
//! Shared message/response types, per-model configuration (capabilities,
//! pricing, limits), the [`ModelProvider`] trait implemented by each vendor
//! adapter, and the circuit-breaker-guarded [`ProviderRegistry`] that
//! dispatches calls to the owning provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderResult;

pub mod anthropic;
pub mod breaker;
pub mod deepseek;
pub mod google;
pub mod openai;
pub mod openrouter;
pub mod registry;
pub mod xai;

pub use breaker::{CircuitBreaker, CircuitState};
pub use registry::ProviderRegistry;

/// Role of a chat message.
///
/// `Context` carries background material (battle history, debate
/// transcripts); adapters map it onto the closest vendor equivalent,
/// which is a system-level message on every current wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Context,
}

impl MessageRole {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Context => "context",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single chat message sent to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ModelMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a context message.
    pub fn context(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Context,
            content: content.into(),
        }
    }
}

/// Capability flags for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCapabilities {
    pub reasoning: bool,
    pub multimodal: bool,
    pub function_calling: bool,
    pub streaming: bool,
}

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_per_million: Option<f64>,
}

/// Token and context limits for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelLimits {
    pub max_tokens: u32,
    pub context_window: u32,
}

/// Static configuration for a single model.
///
/// Loaded once per provider at construction from literal catalog arrays;
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub capabilities: ModelCapabilities,
    pub pricing: ModelPricing,
    pub limits: ModelLimits,
}

/// Token counts reported by a provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<u32>,
}

/// Dollar cost of one call, derived from token usage and catalog pricing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cost {
    pub input: f64,
    pub output: f64,
    pub reasoning: f64,
    pub total: f64,
}

impl Cost {
    /// Compute cost from token usage and per-million pricing.
    ///
    /// Reasoning tokens bill at the reasoning rate when the model declares
    /// one, otherwise at the output rate (how vendors actually invoice them).
    pub fn from_usage(usage: &TokenUsage, pricing: &ModelPricing) -> Self {
        let input = usage.input as f64 / 1_000_000.0 * pricing.input_per_million;
        let output = usage.output as f64 / 1_000_000.0 * pricing.output_per_million;
        let reasoning = match usage.reasoning {
            Some(tokens) => {
                let rate = pricing
                    .reasoning_per_million
                    .unwrap_or(pricing.output_per_million);
                tokens as f64 / 1_000_000.0 * rate
            }
            None => 0.0,
        };
        Self {
            input,
            output,
            reasoning,
            total: input + output + reasoning,
        }
    }

    /// Zero cost, for models missing from the pricing catalog.
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Response from a single model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub response_time_ms: u64,
    pub token_usage: TokenUsage,
    pub cost: Cost,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_config: Option<ModelConfig>,
}

/// Per-call options forwarded to the provider.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CallOptions {
    /// Create options with all fields unset (provider defaults apply).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the max output token budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Incremental output delta produced during a streaming call.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Reasoning/thinking trace delta
    Reasoning(String),
    /// Answer text delta
    Text(String),
}

/// Build a [`ModelResponse`] from raw wire output, pricing the token
/// usage against the model's catalog entry.
pub(crate) fn assemble_response(
    content: String,
    reasoning: Option<String>,
    usage: TokenUsage,
    elapsed: std::time::Duration,
    model: &ModelConfig,
) -> ModelResponse {
    ModelResponse {
        content,
        reasoning: reasoning.filter(|r| !r.is_empty()),
        response_time_ms: elapsed.as_millis() as u64,
        token_usage: usage,
        cost: Cost::from_usage(&usage, &model.pricing),
        model_config: Some(model.clone()),
    }
}

/// A vendor adapter: owns a model catalog and knows how to call its API.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name, matching the `provider` field of its catalog entries.
    fn name(&self) -> &str;

    /// The provider's static model catalog.
    fn models(&self) -> &[ModelConfig];

    /// Whether an API key is present for this provider.
    fn is_configured(&self) -> bool;

    /// Look up a catalog entry by model id.
    fn find_model(&self, model_id: &str) -> Option<&ModelConfig> {
        self.models().iter().find(|m| m.id == model_id)
    }

    /// Call the model and wait for the complete response.
    async fn call_model(
        &self,
        messages: &[ModelMessage],
        model: &ModelConfig,
        options: &CallOptions,
    ) -> ProviderResult<ModelResponse>;

    /// Call the model, forwarding output deltas through `tx` as they
    /// arrive, and return the assembled response.
    ///
    /// The default implementation satisfies the contract for adapters (or
    /// models) without native streaming: one-shot call relayed as a single
    /// text chunk.
    async fn call_model_stream(
        &self,
        messages: &[ModelMessage],
        model: &ModelConfig,
        options: &CallOptions,
        tx: mpsc::Sender<StreamChunk>,
    ) -> ProviderResult<ModelResponse> {
        let response = self.call_model(messages, model, options).await?;
        if let Some(reasoning) = &response.reasoning {
            let _ = tx.send(StreamChunk::Reasoning(reasoning.clone())).await;
        }
        let _ = tx.send(StreamChunk::Text(response.content.clone())).await;
        Ok(response)
    }

    /// Cheap reachability probe against the provider's API.
    ///
    /// Bounded by the health-check timeout; retries once before reporting
    /// the provider down.
    async fn health_check(&self) -> bool;
}

impl std::fmt::Debug for dyn ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelProvider")
            .field("name", &self.name())
            .finish()
    }
}
