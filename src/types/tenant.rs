//! Tenant model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant of the service. Created by an operator through the internal API;
/// the plaintext credential is returned exactly once at creation, only its
/// fingerprint is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Stable unique id
    pub tenant_id: Uuid,
    /// Unique display name
    pub name: String,
    /// SHA-256 fingerprint of the API key
    #[serde(skip_serializing, default)]
    pub api_key_hash: String,
    /// Admitted API calls per sliding window
    pub rate_limit_per_minute: u32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Create a new tenant row
    pub fn new(name: String, api_key_hash: String, rate_limit_per_minute: u32) -> Self {
        Self {
            tenant_id: Uuid::new_v4(),
            name,
            api_key_hash,
            rate_limit_per_minute,
            created_at: Utc::now(),
        }
    }
}
