//! HTTP server: shared state, router assembly, and error mapping.
//!
//! This module provides:
//! - Shared application state management
//! - The `/api` router and its handlers
//! - `AppError` to HTTP status translation
//! - Graceful shutdown on Ctrl+C / SIGTERM

mod events;
mod routes;

pub use events::StreamEvent;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::{GoogleAuthClient, SessionStore};
use crate::billing::StripeClient;
use crate::config::Config;
use crate::error::{
    AppError, AppResult, AuthError, BillingError, ProviderError, StorageError, TemplateError,
};
use crate::providers::ProviderRegistry;
use crate::sessions::DebateLedger;
use crate::storage::Storage;
use crate::templates::TemplateCatalog;

/// Application state shared across handlers.
///
/// Holds every long-lived resource: the provider registry with its
/// circuit breakers, the persistence backend, the loaded template
/// catalog, and the billing/auth clients.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Provider registry, one circuit breaker per provider.
    pub registry: ProviderRegistry,
    /// Persistence backend (memory or SQLite).
    pub storage: Arc<dyn Storage>,
    /// Prompt templates loaded at startup.
    pub templates: TemplateCatalog,
    /// Stripe billing client.
    pub stripe: StripeClient,
    /// Google OAuth client.
    pub auth: GoogleAuthClient,
    /// Login sessions and pending OAuth state tokens.
    pub auth_sessions: SessionStore,
    /// Live debate ledgers, keyed by session id.
    ///
    /// A ledger is created on debate init and rebuilt from the stored
    /// snapshot when a stream request arrives for a session this
    /// process has not seen.
    pub ledgers: RwLock<HashMap<String, DebateLedger>>,
}

impl AppState {
    /// Create new application state.
    ///
    /// The Stripe and Google clients are built here from config; both
    /// come up in an unconfigured state when their keys are absent and
    /// reject calls with a 503 rather than failing startup.
    pub fn new(
        config: Config,
        registry: ProviderRegistry,
        storage: Arc<dyn Storage>,
        templates: TemplateCatalog,
    ) -> AppResult<Self> {
        let stripe = StripeClient::new(&config.stripe, &config.request)?;
        let auth = GoogleAuthClient::new(&config.auth, &config.request)?;

        info!(
            models = registry.all_models().len(),
            templates = templates.len(),
            stripe_configured = stripe.is_configured(),
            auth_configured = auth.is_configured(),
            "AppState initialized"
        );

        Ok(Self {
            config,
            registry,
            storage,
            templates,
            stripe,
            auth,
            auth_sessions: SessionStore::new(),
            ledgers: RwLock::new(HashMap::new()),
        })
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;

/// HTTP status for an application error.
fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::Provider(provider) => match provider {
            ProviderError::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            ProviderError::CircuitOpen { .. } | ProviderError::NotConfigured { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProviderError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProviderError::Api { .. }
            | ProviderError::InvalidResponse { .. }
            | ProviderError::Stream { .. }
            | ProviderError::Http(_) => StatusCode::BAD_GATEWAY,
        },
        AppError::Template(template) => match template {
            TemplateError::NotFound { .. } => StatusCode::NOT_FOUND,
            TemplateError::UnresolvedVariable { .. } | TemplateError::Validation { .. } => {
                StatusCode::BAD_REQUEST
            }
            TemplateError::Parse { .. } | TemplateError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        AppError::Storage(storage) => match storage {
            StorageError::ComparisonNotFound { .. }
            | StorageError::SessionNotFound { .. }
            | StorageError::RunNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        AppError::Auth(auth) => match auth {
            AuthError::NotAuthenticated | AuthError::InvalidState => StatusCode::UNAUTHORIZED,
            AuthError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::ExchangeFailed { .. } | AuthError::Http(_) => StatusCode::BAD_GATEWAY,
        },
        AppError::Billing(billing) => match billing {
            BillingError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            BillingError::UnknownPackage { .. } => StatusCode::BAD_REQUEST,
            BillingError::Stripe { .. } | BillingError::Http(_) => StatusCode::BAD_GATEWAY,
        },
        AppError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
        AppError::Config { .. } | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let message = self.to_string();
        if status.is_server_error() {
            error!(status = %status.as_u16(), error = %message, "Request failed");
        } else {
            warn!(status = %status.as_u16(), error = %message, "Request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Assemble the `/api` router over the shared state.
pub fn build_router(state: SharedState) -> Router {
    let api = Router::new()
        .route("/health", get(routes::health))
        .route("/models", get(routes::models))
        .route("/compare", post(routes::compare))
        .route("/battle/start", post(routes::battle_start))
        .route("/battle/continue", post(routes::battle_continue))
        .route("/debate", post(routes::debate_init))
        .route("/debate/:id", get(routes::debate_snapshot))
        .route("/debate/:id/stream", get(routes::debate_stream))
        .route("/debate/:id/complete", post(routes::debate_complete))
        .route("/debate/:id/export", get(routes::export_debate))
        .route("/debates", get(routes::list_debates))
        .route("/comparisons", get(routes::list_comparisons))
        .route("/comparisons/:id", get(routes::get_comparison))
        .route("/comparisons/:id/export", get(routes::export_comparison))
        .route("/vixra/section", post(routes::vixra_section))
        .route("/vixra", get(routes::list_vixra))
        .route("/vixra/:id", get(routes::vixra_snapshot))
        .route("/vixra/:id/export", get(routes::export_vixra))
        .route("/stripe/packages", get(routes::stripe_packages))
        .route(
            "/stripe/create-payment-intent",
            post(routes::create_payment_intent),
        )
        .route("/auth/google", get(routes::auth_google))
        .route("/auth/google/callback", get(routes::auth_google_callback))
        .route("/auth/logout", post(routes::auth_logout))
        .route("/auth/user", get(routes::auth_user))
        .route("/arc/runs", post(routes::create_arc_run))
        .route(
            "/arc/runs/:id",
            get(routes::get_arc_run).patch(routes::update_arc_run),
        )
        .route("/arc/runs/:id/messages", post(routes::add_arc_message))
        .route("/arc/runs/:id/artifacts", post(routes::add_arc_artifact));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind the configured address and serve until shutdown.
pub async fn serve(state: SharedState) -> AppResult<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse()
        .map_err(|e| AppError::Config {
            message: format!("Invalid listen address: {e}"),
        })?;

    let router = build_router(state);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Config {
            message: format!("Failed to bind {addr}: {e}"),
        })?;

    info!(%addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Server error: {e}"),
        })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::config::{
        AuthConfig, BreakerConfig, DatabaseConfig, LogFormat, LoggingConfig, ProviderKeys,
        ProvidersConfig, RequestConfig, ServerConfig, StorageBackend, StripeConfig,
        TemplateConfig, TemplatePolicy,
    };
    use crate::storage::MemoryStorage;

    use super::*;

    fn keys(base_url: &str) -> ProviderKeys {
        ProviderKeys {
            api_key: None,
            base_url: base_url.to_string(),
        }
    }

    fn create_test_config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            providers: ProvidersConfig {
                openai: keys("https://api.openai.com/v1"),
                anthropic: keys("https://api.anthropic.com"),
                google: keys("https://generativelanguage.googleapis.com"),
                deepseek: keys("https://api.deepseek.com/v1"),
                openrouter: keys("https://openrouter.ai/api/v1"),
                xai: keys("https://api.x.ai/v1"),
            },
            breaker: BreakerConfig::default(),
            request: RequestConfig::default(),
            database: DatabaseConfig {
                backend: StorageBackend::Memory,
                path: PathBuf::from(":memory:"),
                max_connections: 1,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
            templates: TemplateConfig {
                prompts_dir: PathBuf::from("./prompts"),
                policy: TemplatePolicy::Warn,
            },
            stripe: StripeConfig {
                secret_key: None,
                base_url: "https://api.stripe.com".to_string(),
            },
            auth: AuthConfig {
                google_client_id: None,
                google_client_secret: None,
                redirect_url: "http://localhost:5000/api/auth/google/callback".to_string(),
                auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                userinfo_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
            },
        }
    }

    fn create_test_state() -> SharedState {
        let config = create_test_config();
        let registry = ProviderRegistry::from_config(&config).unwrap();
        let templates = TemplateCatalog::load(&config.templates).unwrap();
        let storage = Arc::new(MemoryStorage::new());
        Arc::new(AppState::new(config, registry, storage, templates).unwrap())
    }

    #[tokio::test]
    async fn test_app_state_new() {
        let state = create_test_state();

        // No API keys: no models advertised, billing and auth offline
        assert!(state.registry.all_models().is_empty());
        assert!(!state.stripe.is_configured());
        assert!(!state.auth.is_configured());
        assert!(state.ledgers.read().await.is_empty());
        assert!(!state.templates.is_empty());
    }

    #[tokio::test]
    async fn test_build_router_smoke() {
        let state = create_test_state();
        let _router = build_router(state);
    }

    #[test]
    fn test_status_for_provider_errors() {
        let not_found: AppError = ProviderError::ModelNotFound {
            model_id: "gpt-99".to_string(),
        }
        .into();
        assert_eq!(status_for(&not_found), StatusCode::NOT_FOUND);

        let open: AppError = ProviderError::CircuitOpen {
            provider: "openai".to_string(),
            failure_count: 5,
        }
        .into();
        assert_eq!(status_for(&open), StatusCode::SERVICE_UNAVAILABLE);

        let timeout: AppError = ProviderError::Timeout {
            provider: "google".to_string(),
            timeout_ms: 1000,
        }
        .into();
        assert_eq!(status_for(&timeout), StatusCode::GATEWAY_TIMEOUT);

        let api: AppError = ProviderError::Api {
            provider: "anthropic".to_string(),
            status: 429,
            message: "rate limited".to_string(),
        }
        .into();
        assert_eq!(status_for(&api), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_status_for_template_errors() {
        let missing: AppError = TemplateError::NotFound {
            mode: "debate".to_string(),
            template_id: "nope".to_string(),
        }
        .into();
        assert_eq!(status_for(&missing), StatusCode::NOT_FOUND);

        let unresolved: AppError = TemplateError::UnresolvedVariable {
            name: "topic".to_string(),
            template_id: "pro-opening".to_string(),
        }
        .into();
        assert_eq!(status_for(&unresolved), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_status_for_storage_and_request_errors() {
        let missing: AppError = StorageError::SessionNotFound {
            session_id: "s-1".to_string(),
        }
        .into();
        assert_eq!(status_for(&missing), StatusCode::NOT_FOUND);

        let query: AppError = StorageError::Query {
            message: "bad".to_string(),
        }
        .into();
        assert_eq!(status_for(&query), StatusCode::INTERNAL_SERVER_ERROR);

        let invalid = AppError::InvalidRequest {
            message: "prompt is required".to_string(),
        };
        assert_eq!(status_for(&invalid), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_status_for_auth_and_billing_errors() {
        let unauthenticated: AppError = AuthError::NotAuthenticated.into();
        assert_eq!(status_for(&unauthenticated), StatusCode::UNAUTHORIZED);

        let auth_offline: AppError = AuthError::NotConfigured.into();
        assert_eq!(status_for(&auth_offline), StatusCode::SERVICE_UNAVAILABLE);

        let package: AppError = BillingError::UnknownPackage {
            package_id: "mega".to_string(),
        }
        .into();
        assert_eq!(status_for(&package), StatusCode::BAD_REQUEST);

        let stripe: AppError = BillingError::Stripe {
            status: 402,
            message: "declined".to_string(),
        }
        .into();
        assert_eq!(status_for(&stripe), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_error_response_body_shape() {
        let error = AppError::InvalidRequest {
            message: "prompt is required".to_string(),
        };
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Invalid request: prompt is required");
    }
}
