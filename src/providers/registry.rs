//! Provider registry: resolves model ids to their owning provider and
//! routes calls through that provider's circuit breaker.
//!
//! Built once at startup from configuration and handed to the server
//! state; no global singletons. Dispatch only - no retries, no load
//! balancing, no cross-provider fallback.

use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{BreakerConfig, Config};
use crate::error::{ProviderError, ProviderResult};

use super::anthropic::AnthropicProvider;
use super::breaker::{BreakerSummary, SharedBreaker};
use super::deepseek::DeepSeekProvider;
use super::google::GoogleProvider;
use super::openai::OpenAiProvider;
use super::openrouter::OpenRouterProvider;
use super::xai::XaiProvider;
use super::{CallOptions, ModelConfig, ModelMessage, ModelProvider, ModelResponse, StreamChunk};

struct Entry {
    provider: Arc<dyn ModelProvider>,
    breaker: SharedBreaker,
}

/// Registry of provider adapters with per-provider circuit breakers.
pub struct ProviderRegistry {
    entries: Vec<Entry>,
}

/// Per-provider status reported by the health endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub provider: String,
    pub configured: bool,
    pub model_count: usize,
    pub breaker: BreakerSummary,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build the registry with every known adapter from configuration.
    ///
    /// Unconfigured providers are still registered so their catalogs
    /// resolve; calling them fails fast with a not-configured error.
    pub fn from_config(config: &Config) -> ProviderResult<Self> {
        let mut registry = Self::new();
        let request = &config.request;
        let breaker = &config.breaker;

        registry.register(
            Arc::new(OpenAiProvider::new(&config.providers.openai, request)?),
            breaker.clone(),
        );
        registry.register(
            Arc::new(AnthropicProvider::new(&config.providers.anthropic, request)?),
            breaker.clone(),
        );
        registry.register(
            Arc::new(GoogleProvider::new(&config.providers.google, request)?),
            breaker.clone(),
        );
        registry.register(
            Arc::new(DeepSeekProvider::new(&config.providers.deepseek, request)?),
            breaker.clone(),
        );
        registry.register(
            Arc::new(OpenRouterProvider::new(
                &config.providers.openrouter,
                request,
            )?),
            breaker.clone(),
        );
        registry.register(
            Arc::new(XaiProvider::new(&config.providers.xai, request)?),
            breaker.clone(),
        );

        let configured: Vec<&str> = registry
            .entries
            .iter()
            .filter(|e| e.provider.is_configured())
            .map(|e| e.provider.name())
            .collect();
        if configured.is_empty() {
            warn!("No provider API keys configured - all model calls will fail");
        } else {
            info!(providers = ?configured, "Provider registry initialized");
        }

        Ok(registry)
    }

    /// Register a provider with its own circuit breaker.
    pub fn register(&mut self, provider: Arc<dyn ModelProvider>, config: BreakerConfig) {
        let breaker = SharedBreaker::new(provider.name().to_string(), config);
        self.entries.push(Entry { provider, breaker });
    }

    fn resolve(&self, model_id: &str) -> ProviderResult<(&Entry, &ModelConfig)> {
        for entry in &self.entries {
            if let Some(model) = entry.provider.find_model(model_id) {
                return Ok((entry, model));
            }
        }
        Err(ProviderError::ModelNotFound {
            model_id: model_id.to_string(),
        })
    }

    /// Look up a model's catalog entry across all providers.
    pub fn get_model_by_id(&self, model_id: &str) -> Option<&ModelConfig> {
        self.entries
            .iter()
            .find_map(|e| e.provider.find_model(model_id))
    }

    /// Resolve the provider that owns a model id.
    pub fn get_provider_for_model(
        &self,
        model_id: &str,
    ) -> ProviderResult<&Arc<dyn ModelProvider>> {
        self.resolve(model_id).map(|(entry, _)| &entry.provider)
    }

    /// All catalog entries from configured providers.
    pub fn all_models(&self) -> Vec<ModelConfig> {
        self.entries
            .iter()
            .filter(|e| e.provider.is_configured())
            .flat_map(|e| e.provider.models().iter().cloned())
            .collect()
    }

    /// Call a model through its provider's circuit breaker.
    pub async fn call_model(
        &self,
        messages: &[ModelMessage],
        model_id: &str,
        options: &CallOptions,
    ) -> ProviderResult<ModelResponse> {
        let (entry, model) = self.resolve(model_id)?;

        // Config errors must not trip the breaker
        if !entry.provider.is_configured() {
            return Err(ProviderError::NotConfigured {
                provider: entry.provider.name().to_string(),
            });
        }

        info!(
            provider = entry.provider.name(),
            model = model_id,
            "Dispatching model call"
        );

        entry
            .breaker
            .execute(|| entry.provider.call_model(messages, model, options))
            .await
    }

    /// Call a model in streaming mode through its circuit breaker.
    ///
    /// Admission is checked before the upstream call; the outcome is
    /// recorded when the stream finishes.
    pub async fn call_model_stream(
        &self,
        messages: &[ModelMessage],
        model_id: &str,
        options: &CallOptions,
        tx: mpsc::Sender<StreamChunk>,
    ) -> ProviderResult<ModelResponse> {
        let (entry, model) = self.resolve(model_id)?;

        if !entry.provider.is_configured() {
            return Err(ProviderError::NotConfigured {
                provider: entry.provider.name().to_string(),
            });
        }

        info!(
            provider = entry.provider.name(),
            model = model_id,
            "Dispatching streaming model call"
        );

        entry.breaker.try_acquire().await?;

        match entry
            .provider
            .call_model_stream(messages, model, options, tx)
            .await
        {
            Ok(response) => {
                entry.breaker.record_success().await;
                Ok(response)
            }
            Err(e) => {
                entry.breaker.record_failure().await;
                Err(e)
            }
        }
    }

    /// Per-provider breaker snapshots for the health endpoint.
    pub async fn statuses(&self) -> Vec<ProviderStatus> {
        let mut statuses = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            statuses.push(ProviderStatus {
                provider: entry.provider.name().to_string(),
                configured: entry.provider.is_configured(),
                model_count: entry.provider.models().len(),
                breaker: entry.breaker.summary().await,
            });
        }
        statuses
    }

    /// Probe every configured provider's API in parallel.
    pub async fn probe_all(&self) -> Vec<(String, bool)> {
        let probes = self
            .entries
            .iter()
            .filter(|e| e.provider.is_configured())
            .map(|e| {
                let name = e.provider.name().to_string();
                let provider = Arc::clone(&e.provider);
                async move { (name, provider.health_check().await) }
            });
        join_all(probes).await
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::super::{Cost, ModelCapabilities, ModelLimits, ModelPricing, TokenUsage};
    use super::*;

    struct FakeProvider {
        name: &'static str,
        models: Vec<ModelConfig>,
        configured: bool,
        fail: AtomicBool,
        calls: AtomicU32,
    }

    impl FakeProvider {
        fn new(name: &'static str, model_ids: &[&str], configured: bool) -> Self {
            let models = model_ids
                .iter()
                .map(|id| ModelConfig {
                    id: id.to_string(),
                    name: id.to_string(),
                    provider: name.to_string(),
                    capabilities: ModelCapabilities {
                        reasoning: false,
                        multimodal: false,
                        function_calling: false,
                        streaming: true,
                    },
                    pricing: ModelPricing {
                        input_per_million: 1.0,
                        output_per_million: 2.0,
                        reasoning_per_million: None,
                    },
                    limits: ModelLimits {
                        max_tokens: 1024,
                        context_window: 8192,
                    },
                })
                .collect();
            Self {
                name,
                models,
                configured,
                fail: AtomicBool::new(false),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn models(&self) -> &[ModelConfig] {
            &self.models
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn call_model(
            &self,
            _messages: &[ModelMessage],
            model: &ModelConfig,
            _options: &CallOptions,
        ) -> ProviderResult<ModelResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProviderError::Api {
                    provider: self.name.to_string(),
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(ModelResponse {
                content: "ok".to_string(),
                reasoning: None,
                response_time_ms: 1,
                token_usage: TokenUsage::default(),
                cost: Cost::zero(),
                model_config: Some(model.clone()),
            })
        }

        async fn health_check(&self) -> bool {
            self.configured
        }
    }

    fn breaker_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 2,
            recovery_timeout_ms: 60_000,
            monitoring_period_ms: 120_000,
        }
    }

    fn registry_with(provider: Arc<FakeProvider>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(provider, breaker_config());
        registry
    }

    #[test]
    fn test_model_resolution() {
        let registry = registry_with(Arc::new(FakeProvider::new("fake", &["m1", "m2"], true)));

        assert!(registry.get_model_by_id("m1").is_some());
        assert!(registry.get_model_by_id("nope").is_none());

        let provider = registry.get_provider_for_model("m2").unwrap();
        assert_eq!(provider.name(), "fake");

        let err = registry.get_provider_for_model("nope").unwrap_err();
        assert!(matches!(err, ProviderError::ModelNotFound { .. }));
    }

    #[test]
    fn test_catalog_provider_agreement() {
        let mut registry = ProviderRegistry::new();
        registry.register(
            Arc::new(FakeProvider::new("alpha", &["a1"], true)),
            breaker_config(),
        );
        registry.register(
            Arc::new(FakeProvider::new("beta", &["b1", "b2"], true)),
            breaker_config(),
        );

        for model in registry.all_models() {
            let provider = registry.get_provider_for_model(&model.id).unwrap();
            assert_eq!(provider.name(), model.provider);
        }
    }

    #[test]
    fn test_all_models_skips_unconfigured() {
        let mut registry = ProviderRegistry::new();
        registry.register(
            Arc::new(FakeProvider::new("alpha", &["a1"], true)),
            breaker_config(),
        );
        registry.register(
            Arc::new(FakeProvider::new("beta", &["b1"], false)),
            breaker_config(),
        );

        let ids: Vec<String> = registry.all_models().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["a1".to_string()]);

        // Unconfigured catalogs still resolve for lookups
        assert!(registry.get_model_by_id("b1").is_some());
    }

    #[tokio::test]
    async fn test_call_dispatches_to_owner() {
        let provider = Arc::new(FakeProvider::new("fake", &["m1"], true));
        let registry = registry_with(Arc::clone(&provider));

        let response = registry
            .call_model(&[ModelMessage::user("hi")], "m1", &CallOptions::new())
            .await
            .unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_provider_fails_without_tripping_breaker() {
        let provider = Arc::new(FakeProvider::new("fake", &["m1"], false));
        let registry = registry_with(Arc::clone(&provider));

        let err = registry
            .call_model(&[ModelMessage::user("hi")], "m1", &CallOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        let statuses = registry.statuses().await;
        assert_eq!(statuses[0].breaker.failure_count, 0);
    }

    #[tokio::test]
    async fn test_breaker_opens_and_rejects_without_calling_provider() {
        let provider = Arc::new(FakeProvider::new("fake", &["m1"], true));
        let registry = registry_with(Arc::clone(&provider));
        provider.fail.store(true, Ordering::SeqCst);

        for _ in 0..2 {
            let err = registry
                .call_model(&[ModelMessage::user("hi")], "m1", &CallOptions::new())
                .await
                .unwrap_err();
            assert!(matches!(err, ProviderError::Api { .. }));
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        // Breaker is open now: rejected before the provider is invoked
        let err = registry
            .call_model(&[ModelMessage::user("hi")], "m1", &CallOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::CircuitOpen { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
