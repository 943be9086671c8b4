//! Provider types and configuration.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};

/// Enumeration of supported backing store providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    Redis,
    InMemory,
}

impl ProviderType {
    /// Check if data survives a restart of this process
    pub fn is_durable(&self) -> bool {
        match self {
            Self::Redis => true,
            Self::InMemory => false,
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Redis => write!(f, "redis"),
            Self::InMemory => write!(f, "in_memory"),
        }
    }
}

/// Provider-specific store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum StoreConfig {
    Redis(RedisConfig),
    InMemory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Redis(RedisConfig::default())
    }
}

impl StoreConfig {
    /// Provider selected by this configuration
    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::Redis(_) => ProviderType::Redis,
            Self::InMemory => ProviderType::InMemory,
        }
    }

    /// Validate the provider settings
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            Self::Redis(redis) => redis.validate(),
            Self::InMemory => Ok(()),
        }
    }
}

/// Redis connection configuration
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    /// Logical database selected on connect
    pub db: u32,
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 9,
            password: None,
        }
    }
}

impl RedisConfig {
    /// Connection parameters with the logical database selected
    ///
    /// Built field by field rather than as a URL, so passwords and IPv6 hosts
    /// need no escaping.
    pub fn connection_info(&self) -> redis::ConnectionInfo {
        redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: redis::RedisConnectionInfo {
                db: i64::from(self.db),
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.host.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "store.host".to_string(),
            });
        }
        if self.port == 0 {
            return Err(ConfigurationError::Invalid {
                message: "store.port must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
