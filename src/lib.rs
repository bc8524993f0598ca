//! # ModelCompare Server
//!
//! An HTTP server for comparing AI model outputs across providers.
//! Send one prompt to several models side by side, run head-to-head
//! battles, or stage streamed multi-turn debates between two models,
//! with per-call token accounting and cost attribution.
//!
//! ## Features
//!
//! - **Compare**: one prompt, many models, responses collected in parallel
//! - **Battle**: critique / improve / defend rounds between models
//! - **Debate**: turn-based pro/con debates streamed over SSE
//! - **Vixra**: satirical paper generation, section by section
//! - **Providers**: OpenAI, Anthropic, Google, DeepSeek, OpenRouter, xAI,
//!   each behind its own circuit breaker
//! - **Billing**: Stripe payment intents for credit packages
//! - **Auth**: Google sign-in with in-memory sessions
//!
//! ## Architecture
//!
//! ```text
//! Browser → axum routes → template catalog → provider registry
//!                                 ↓                ↓ (circuit breaker)
//!                          SQLite / memory    vendor APIs (HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use modelcompare::{Config, AppState};
//! use modelcompare::providers::ProviderRegistry;
//! use modelcompare::storage::SqliteStorage;
//! use modelcompare::templates::TemplateCatalog;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let registry = ProviderRegistry::from_config(&config)?;
//!     let storage = Arc::new(SqliteStorage::new(&config.database).await?);
//!     let templates = TemplateCatalog::load(&config.templates)?;
//!     let state = Arc::new(AppState::new(config, registry, storage, templates)?);
//!     modelcompare::server::serve(state).await?;
//!     Ok(())
//! }
//! ```

/// Google sign-in and session tracking.
pub mod auth;
/// Credit packages and Stripe payment intents.
pub mod billing;
/// Configuration management.
pub mod config;
/// Error types and result aliases.
pub mod error;
/// Markdown and plain-text exporters.
pub mod export;
/// Provider adapters, circuit breakers, and the dispatch registry.
pub mod providers;
/// HTTP server: state, router, and route handlers.
pub mod server;
/// Debate session types and the reconciliation ledger.
pub mod sessions;
/// Persistence layer (memory and SQLite backends).
pub mod storage;
/// Prompt template catalog, variable engine, and per-mode schemas.
pub mod templates;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, SharedState};
