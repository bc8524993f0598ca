//! xAI (Grok) adapter.
//!
//! Legacy adapter kept for installed bases still selecting bare `grok-*`
//! ids; new multi-vendor selection goes through OpenRouter. OpenAI-
//! compatible wire, `grok-3-mini` reports a `reasoning_content` trace.

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

/// xAI provider adapter.
pub struct XaiProvider {
    wire: ChatCompletionsClient,
    models: Vec<ModelConfig>,
}

impl XaiProvider {
    /// Registry name for this provider.
    pub const NAME: &'static str = "xai";

    /// Create the adapter from configuration.
    pub fn new(keys: &ProviderKeys, request: &RequestConfig) -> ProviderResult<Self> {
        let wire = ChatCompletionsClient::new(Self::NAME, keys, request)?;
        info!(base_url = %wire.base_url(), "xAI provider initialized");
        Ok(Self {
            wire,
            models: catalog(),
        })
    }
}

#[async_trait]
impl ModelProvider for XaiProvider {
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
    fn grok(
        id: &str,
        name: &str,
        input: f64,
        output: f64,
        reasoning: bool,
    ) -> ModelConfig {
        ModelConfig {
            id: id.to_string(),
            name: name.to_string(),
            provider: XaiProvider::NAME.to_string(),
            capabilities: ModelCapabilities {
                reasoning,
                multimodal: false,
                function_calling: true,
                streaming: true,
            },
            pricing: ModelPricing {
                input_per_million: input,
                output_per_million: output,
                reasoning_per_million: None,
            },
            limits: ModelLimits {
                max_tokens: 16_384,
                context_window: 131_072,
            },
        }
    }

    vec![
        grok("grok-3", "Grok 3", 3.0, 15.0, false),
        grok("grok-3-mini", "Grok 3 Mini", 0.3, 0.5, true),
        grok("grok-2-1212", "Grok 2", 2.0, 10.0, false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_provider_names_match() {
        for model in catalog() {
            assert_eq!(model.provider, XaiProvider::NAME);
        }
    }
}
