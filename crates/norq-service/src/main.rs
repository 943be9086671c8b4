//! # Norq Service
//!
//! Binary entry point for the Norq HTTP service.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Connects the backing store and builds the queue engine
//! - Starts the HTTP server from norq-api
//!
//! Exit codes: 1 bind failure, 2 server failure, 3 invalid configuration,
//! 4 backing store unreachable.

use norq_api::{start_server, LoggingConfig, ServiceConfig, ServiceError};
use norq_core::QueueEngine;
use norq_store::StoreFactory;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let service_config = match ServiceConfig::load(None) {
        Ok(config) => {
            init_tracing(&config.logging);
            config
        }
        Err(e) => {
            init_tracing(&LoggingConfig::default());
            error!(error = %e, "Service configuration is invalid; aborting");
            std::process::exit(3);
        }
    };

    info!("Starting Norq Service");

    // -------------------------------------------------------------------------
    // Build the queue engine
    //
    // The registry was already checked by ServiceConfig::validate, so a failure
    // here is still reported as a configuration error.
    // -------------------------------------------------------------------------
    let registry = match service_config.registry() {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "Queue model is invalid; aborting");
            std::process::exit(3);
        }
    };

    let store = match StoreFactory::create_store(&service_config.store).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Failed to connect to backing store; aborting");
            std::process::exit(4);
        }
    };

    let provider = store.provider_type();
    if !provider.is_durable() {
        warn!(provider = %provider, "Backing store is not durable; documents are lost on restart");
    }
    info!(
        provider = %provider,
        queues = registry.len(),
        "Queue engine ready"
    );
    let engine = QueueEngine::new(registry, store);

    if let Err(e) = start_server(service_config, engine).await {
        error!("Failed to start server: {}", e);

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };

        std::process::exit(exit_code);
    }

    Ok(())
}

// ============================================================================
// Private helpers
// ============================================================================

/// Install the global subscriber
///
/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Filter directives applying `level` to every Norq crate
fn default_directives(level: &str) -> String {
    ["norq_service", "norq_api", "norq_core", "norq_store", "tower_http"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}
