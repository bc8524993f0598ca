//! DeepSeek adapter.
//!
//! Rides the OpenAI-compatible wire; `deepseek-reasoner` interleaves a
//! `reasoning_content` trace with the answer, which the shared client
//! already surfaces.

use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::{ProviderKeys, RequestConfig};
use crate::error::ProviderResult;

use super::openai::ChatCompletionsClient;
use super::{
    assemble_response, CallOptions, ModelCapabilities, ModelConfig, ModelLimits, ModelMessage,
    ModelPricing, ModelProvider, ModelResponse, StreamChunk,
};

/// DeepSeek provider adapter.
pub struct DeepSeekProvider {
    wire: ChatCompletionsClient,
    models: Vec<ModelConfig>,
}

impl DeepSeekProvider {
    /// Registry name for this provider.
    pub const NAME: &'static str = "deepseek";

    /// Create the adapter from configuration.
    pub fn new(keys: &ProviderKeys, request: &RequestConfig) -> ProviderResult<Self> {
        let wire = ChatCompletionsClient::new(Self::NAME, keys, request)?;
        info!(base_url = %wire.base_url(), "DeepSeek provider initialized");
        Ok(Self {
            wire,
            models: catalog(),
        })
    }
}

#[async_trait]
impl ModelProvider for DeepSeekProvider {
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
        // DeepSeek takes standard sampling params even for its reasoner
        let outcome = self.wire.call(messages, &model.id, options, false).await?;
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
            .stream(messages, &model.id, options, false, &tx)
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
    vec![
        ModelConfig {
            id: "deepseek-chat".to_string(),
            name: "DeepSeek-V3".to_string(),
            provider: DeepSeekProvider::NAME.to_string(),
            capabilities: ModelCapabilities {
                reasoning: false,
                multimodal: false,
                function_calling: true,
                streaming: true,
            },
            pricing: ModelPricing {
                input_per_million: 0.27,
                output_per_million: 1.1,
                reasoning_per_million: None,
            },
            limits: ModelLimits {
                max_tokens: 8_192,
                context_window: 65_536,
            },
        },
        ModelConfig {
            id: "deepseek-reasoner".to_string(),
            name: "DeepSeek-R1".to_string(),
            provider: DeepSeekProvider::NAME.to_string(),
            capabilities: ModelCapabilities {
                reasoning: true,
                multimodal: false,
                function_calling: false,
                streaming: true,
            },
            pricing: ModelPricing {
                input_per_million: 0.55,
                output_per_million: 2.19,
                reasoning_per_million: None,
            },
            limits: ModelLimits {
                max_tokens: 8_192,
                context_window: 65_536,
            },
        },
    ]
}
