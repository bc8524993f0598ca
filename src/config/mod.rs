use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub providers: ProvidersConfig,
    pub breaker: BreakerConfig,
    pub request: RequestConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub templates: TemplateConfig,
    pub stripe: StripeConfig,
    pub auth: AuthConfig,
}

/// HTTP server bind configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// API key and base URL for a single provider
///
/// A missing key leaves the provider loadable but unconfigured; the base
/// URL is overridable so tests can point adapters at a local mock server.
#[derive(Debug, Clone)]
pub struct ProviderKeys {
    pub api_key: Option<String>,
    pub base_url: String,
}

/// Per-provider credentials and endpoints
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub openai: ProviderKeys,
    pub anthropic: ProviderKeys,
    pub google: ProviderKeys,
    pub deepseek: ProviderKeys,
    pub openrouter: ProviderKeys,
    pub xai: ProviderKeys,
}

/// Circuit breaker tuning
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub monitoring_period_ms: u64,
}

/// Outbound HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub health_check_timeout_ms: u64,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Unresolved-placeholder handling during template rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplatePolicy {
    /// Log a warning and leave the placeholder in place
    Warn,
    /// Fail the render (and startup validation) on unresolved placeholders
    Strict,
}

impl std::fmt::Display for TemplatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplatePolicy::Warn => write!(f, "warn"),
            TemplatePolicy::Strict => write!(f, "strict"),
        }
    }
}

/// Prompt template configuration
#[derive(Debug, Clone)]
pub struct TemplateConfig {
    pub prompts_dir: PathBuf,
    pub policy: TemplatePolicy,
}

/// Stripe billing configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub base_url: String,
}

/// Google OAuth configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub redirect_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5000),
        };

        let providers = ProvidersConfig {
            openai: provider_keys("OPENAI_API_KEY", "OPENAI_BASE_URL", "https://api.openai.com/v1"),
            anthropic: provider_keys(
                "ANTHROPIC_API_KEY",
                "ANTHROPIC_BASE_URL",
                "https://api.anthropic.com",
            ),
            google: provider_keys(
                "GEMINI_API_KEY",
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com",
            ),
            deepseek: provider_keys(
                "DEEPSEEK_API_KEY",
                "DEEPSEEK_BASE_URL",
                "https://api.deepseek.com/v1",
            ),
            openrouter: provider_keys(
                "OPENROUTER_API_KEY",
                "OPENROUTER_BASE_URL",
                "https://openrouter.ai/api/v1",
            ),
            xai: provider_keys("GROK_API_KEY", "XAI_BASE_URL", "https://api.x.ai/v1"),
        };

        let breaker = BreakerConfig {
            failure_threshold: env::var("CIRCUIT_BREAKER_FAILURE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            recovery_timeout_ms: env::var("CIRCUIT_BREAKER_RECOVERY_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60_000),
            monitoring_period_ms: env::var("CIRCUIT_BREAKER_MONITORING_PERIOD_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(120_000),
        };

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(120_000),
            health_check_timeout_ms: env::var("HEALTH_CHECK_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5_000),
        };

        let database = DatabaseConfig {
            backend: match env::var("STORAGE_BACKEND")
                .unwrap_or_else(|_| "sqlite".to_string())
                .to_lowercase()
                .as_str()
            {
                "memory" => StorageBackend::Memory,
                _ => StorageBackend::Sqlite,
            },
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/modelcompare.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let templates = TemplateConfig {
            prompts_dir: PathBuf::from(
                env::var("PROMPTS_DIR").unwrap_or_else(|_| "./prompts".to_string()),
            ),
            policy: match env::var("TEMPLATE_POLICY")
                .unwrap_or_else(|_| "warn".to_string())
                .to_lowercase()
                .as_str()
            {
                "strict" => TemplatePolicy::Strict,
                _ => TemplatePolicy::Warn,
            },
        };

        let stripe = StripeConfig {
            secret_key: env::var("STRIPE_SECRET_KEY").ok(),
            base_url: env::var("STRIPE_BASE_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
        };

        let auth = AuthConfig {
            google_client_id: env::var("GOOGLE_CLIENT_ID").ok(),
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET").ok(),
            redirect_url: env::var("GOOGLE_REDIRECT_URL").unwrap_or_else(|_| {
                "http://localhost:5000/api/auth/google/callback".to_string()
            }),
            auth_url: env::var("GOOGLE_AUTH_URL")
                .unwrap_or_else(|_| "https://accounts.google.com/o/oauth2/v2/auth".to_string()),
            token_url: env::var("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string()),
            userinfo_url: env::var("GOOGLE_USERINFO_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com/oauth2/v2/userinfo".to_string()),
        };

        Ok(Config {
            server,
            providers,
            breaker,
            request,
            database,
            logging,
            templates,
            stripe,
            auth,
        })
    }
}

fn provider_keys(key_var: &str, url_var: &str, default_url: &str) -> ProviderKeys {
    ProviderKeys {
        api_key: env::var(key_var).ok().filter(|k| !k.is_empty()),
        base_url: env::var(url_var).unwrap_or_else(|_| default_url.to_string()),
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            monitoring_period_ms: 120_000,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            health_check_timeout_ms: 5_000,
        }
    }
}
