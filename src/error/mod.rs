use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Billing error: {0}")]
    Billing(#[from] BillingError),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Provider layer errors
///
/// Covers model resolution, circuit breaker rejection, and vendor API
/// failures. Route handlers map these onto HTTP statuses.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Model not found: {model_id}")]
    ModelNotFound { model_id: String },

    #[error("Circuit breaker open for {provider} ({failure_count} recent failures)")]
    CircuitOpen { provider: String, failure_count: u32 },

    #[error("Provider {provider} is not configured (missing API key)")]
    NotConfigured { provider: String },

    #[error("{provider} API error: {status} - {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("Stream from {provider} failed: {message}")]
    Stream { provider: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Template layer errors
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {mode}/{template_id}")]
    NotFound { mode: String, template_id: String },

    #[error("Failed to parse template file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Unresolved variable {{{name}}} in template {template_id}")]
    UnresolvedVariable { name: String, template_id: String },

    #[error("Variable validation failed for {mode}: {message}")]
    Validation { mode: String, message: String },

    #[error("Template I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Comparison not found: {id}")]
    ComparisonNotFound { id: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Google OAuth is not configured")]
    NotConfigured,

    #[error("Token exchange failed: {message}")]
    ExchangeFailed { message: String },

    #[error("Invalid OAuth state")]
    InvalidState,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Billing / Stripe errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Stripe is not configured")]
    NotConfigured,

    #[error("Unknown credit package: {package_id}")]
    UnknownPackage { package_id: String },

    #[error("Stripe API error: {status} - {message}")]
    Stripe { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Result type alias for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Result type alias for billing operations
pub type BillingResult<T> = Result<T, BillingError>;
