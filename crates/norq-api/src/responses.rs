//! Response types and query parameters for the API.

use chrono::{DateTime, Utc};
use norq_store::{ProviderType, Reply};
use serde::{Deserialize, Serialize};

/// Window size used when a request does not give one
pub const DEFAULT_WINDOW: u64 = 10;

// ============================================================================
// Response Types
// ============================================================================

/// Welcome response for `GET /`
#[derive(Debug, Serialize, Deserialize)]
pub struct WelcomeResponse {
    pub norq: String,
    pub version: String,
}

impl Default for WelcomeResponse {
    fn default() -> Self {
        Self {
            norq: "Welcome".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub provider: ProviderType,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Queue size response
#[derive(Debug, Serialize, Deserialize)]
pub struct SizeResponse {
    pub queue: String,
    pub size: u64,
}

/// Document removal response
#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub deleted: bool,
    pub status: Vec<Reply>,
}

// ============================================================================
// Query Parameters
// ============================================================================

/// Query parameters for head and tail windows
#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<u64>,
}

impl LimitParams {
    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_WINDOW)
    }
}

/// Query parameters for pages
#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub size: Option<u64>,
}

impl PageParams {
    pub fn size(&self) -> u64 {
        self.size.unwrap_or(DEFAULT_WINDOW)
    }
}
