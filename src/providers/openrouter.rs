//! OpenRouter adapter.
//!
//! One key, many vendors: the catalog carries a curated slice of
//! OpenRouter's marketplace with provider-prefixed model ids.

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

/// OpenRouter provider adapter.
pub struct OpenRouterProvider {
    wire: ChatCompletionsClient,
    models: Vec<ModelConfig>,
}

impl OpenRouterProvider {
    /// Registry name for this provider.
    pub const NAME: &'static str = "openrouter";

    /// Create the adapter from configuration.
    pub fn new(keys: &ProviderKeys, request: &RequestConfig) -> ProviderResult<Self> {
        let wire = ChatCompletionsClient::new(Self::NAME, keys, request)?;
        info!(base_url = %wire.base_url(), "OpenRouter provider initialized");
        Ok(Self {
            wire,
            models: catalog(),
        })
    }
}

#[async_trait]
impl ModelProvider for OpenRouterProvider {
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
    fn entry(
        id: &str,
        name: &str,
        input: f64,
        output: f64,
        reasoning: bool,
        function_calling: bool,
    ) -> ModelConfig {
        ModelConfig {
            id: id.to_string(),
            name: name.to_string(),
            provider: OpenRouterProvider::NAME.to_string(),
            capabilities: ModelCapabilities {
                reasoning,
                multimodal: false,
                function_calling,
                streaming: true,
            },
            pricing: ModelPricing {
                input_per_million: input,
                output_per_million: output,
                reasoning_per_million: None,
            },
            limits: ModelLimits {
                max_tokens: 8_192,
                context_window: 131_072,
            },
        }
    }

    vec![
        entry(
            "meta-llama/llama-3.3-70b-instruct",
            "Llama 3.3 70B Instruct",
            0.12,
            0.3,
            false,
            true,
        ),
        entry(
            "mistralai/mistral-large-2411",
            "Mistral Large 2411",
            2.0,
            6.0,
            false,
            true,
        ),
        entry(
            "qwen/qwen-2.5-72b-instruct",
            "Qwen2.5 72B Instruct",
            0.23,
            0.4,
            false,
            true,
        ),
        entry(
            "deepseek/deepseek-r1",
            "DeepSeek R1 (OpenRouter)",
            0.55,
            2.19,
            true,
            false,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_provider_names_match() {
        for model in catalog() {
            assert_eq!(model.provider, OpenRouterProvider::NAME);
        }
    }

    #[test]
    fn test_ids_are_vendor_prefixed() {
        for model in catalog() {
            assert!(
                model.id.contains('/'),
                "OpenRouter id {} should be vendor-prefixed",
                model.id
            );
        }
    }
}
