use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use modelcompare::config::{Config, LogFormat, StorageBackend};
use modelcompare::providers::ProviderRegistry;
use modelcompare::server::{serve, AppState};
use modelcompare::storage::{MemoryStorage, SqliteStorage, Storage};
use modelcompare::templates::TemplateCatalog;

/// Multi-provider AI model comparison server.
#[derive(Debug, Parser)]
#[command(name = "modelcompare", version, about)]
struct Args {
    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Use the in-memory storage backend regardless of configuration.
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.in_memory {
        config.database.backend = StorageBackend::Memory;
    }

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "ModelCompare server starting..."
    );

    // Initialize storage
    let storage: Arc<dyn Storage> = match config.database.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; data is lost on restart");
            Arc::new(MemoryStorage::new())
        }
        StorageBackend::Sqlite => match SqliteStorage::new(&config.database).await {
            Ok(s) => {
                info!(path = %config.database.path.display(), "Database initialized");
                Arc::new(s)
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize database");
                return Err(e.into());
            }
        },
    };

    // Build the provider registry (one circuit breaker per provider)
    let registry = match ProviderRegistry::from_config(&config) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "Failed to build provider registry");
            return Err(e.into());
        }
    };

    // Parse and validate the prompt template catalog
    let templates = match TemplateCatalog::load(&config.templates) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "Failed to load prompt templates");
            return Err(e.into());
        }
    };

    let state = Arc::new(AppState::new(config, registry, storage, templates)?);

    if let Err(e) = serve(state).await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
