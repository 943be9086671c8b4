//! Configuration types for the HTTP service
//!
//! Configuration is layered with the `config` crate. Later sources override
//! earlier ones:
//!  1. `/etc/norq/service.yaml`: system-wide defaults
//!  2. `./config/service.yaml`: deployment-local override
//!  3. an explicit file, from `--config` or the `NORQ_CONFIG_FILE` variable
//!  4. environment variables prefixed `NORQ__` with `__` separators,
//!     e.g. `NORQ__SERVER__PORT=9090` sets `server.port`
//!
//! Every field carries a serde default, so an unconfigured environment yields
//! a valid configuration serving the `default` queue from Redis database 9.

use norq_core::{ModelError, ModelRegistry, QueueDefinition, DEFAULT_QUEUE};
use norq_store::{ConfigurationError, StoreConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "NORQ_CONFIG_FILE";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "NORQ";

/// Names taken by service routes, which would shadow a queue of the same name
pub const RESERVED_QUEUE_NAMES: [&str; 2] = ["health", "model"];

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Backing store settings
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Queues served, keyed by name
    pub model: BTreeMap<String, QueueConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let mut model = BTreeMap::new();
        model.insert(DEFAULT_QUEUE.to_string(), QueueConfig::default());

        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
            model,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the standard sources
    ///
    /// `explicit_path` takes precedence over `NORQ_CONFIG_FILE`; an explicit
    /// file must exist, the standard locations are optional.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("/etc/norq/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(
                config::File::with_name("config/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            );

        let explicit = explicit_path
            .map(|path| path.display().to_string())
            .or_else(|| std::env::var(CONFIG_FILE_ENV).ok())
            .filter(|path| !path.is_empty());
        if let Some(path) = explicit {
            info!(path = %path, "Loading configuration from explicit path");
            builder = builder.add_source(config::File::from(Path::new(&path)).required(true));
        }

        let service_config: ServiceConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        service_config.validate()?;
        Ok(service_config)
    }

    /// Validate settings that serde cannot check
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.store.validate()?;
        self.registry()?;
        Ok(())
    }

    /// Build the model registry described by `model`
    pub fn registry(&self) -> Result<ModelRegistry, ConfigError> {
        let definitions = self.model.iter().map(|(name, queue)| QueueDefinition {
            name: name.clone(),
            schema: queue.schema.clone(),
        });
        let registry = ModelRegistry::new(definitions)?;

        if let Some(name) = RESERVED_QUEUE_NAMES
            .iter()
            .find(|name| registry.contains(name))
        {
            return Err(ConfigError::Invalid {
                message: format!("queue name '{name}' is reserved by the service"),
            });
        }

        Ok(registry)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,

    /// Enable CORS
    pub enable_cors: bool,

    /// Enable compression
    pub enable_compression: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5150,
            timeout_seconds: 30,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
            enable_cors: true,
            enable_compression: true,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "server.host".to_string(),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be greater than zero".to_string(),
            });
        }
        if self.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration of a single queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// JSON Schema documents pushed to the queue must satisfy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration loading failed: {0}")]
    Loading(#[from] config::ConfigError),

    #[error("Invalid store configuration: {0}")]
    Store(#[from] ConfigurationError),

    #[error("Invalid queue model: {0}")]
    Model(#[from] ModelError),
}
