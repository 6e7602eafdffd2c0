//! Credential handling
//!
//! Tenant calls carry `X-API-Key`, resolved by SHA-256 fingerprint against
//! the tenant table; every downstream query then carries the resolved tenant
//! id. Internal calls carry `X-Internal-Token`, compared in constant time
//! against the deployment secret.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::Error;
use crate::types::Tenant;

use super::state::AppState;

/// SHA-256 hex fingerprint of an API key
pub fn fingerprint(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Generate a fresh API key for a tenant; shown once, stored only as a
/// fingerprint
pub fn generate_api_key(tenant_name: &str) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("{}_{}", tenant_name, token)
}

/// Length-checked constant-time byte comparison
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Extractor for tenant-scoped endpoints
pub struct AuthedTenant(pub Tenant);

#[async_trait]
impl FromRequestParts<AppState> for AuthedTenant {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let api_key = parts
            .headers
            .get("X-API-Key")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Unauthorized("API key required".to_string()))?;

        let tenant = state
            .db()
            .get_tenant_by_key_hash(&fingerprint(api_key))?
            .ok_or_else(|| Error::Unauthorized("Invalid API key".to_string()))?;

        Ok(AuthedTenant(tenant))
    }
}

/// Extractor for internal-scoped endpoints
pub struct InternalScope {
    pub service_name: String,
}

#[async_trait]
impl FromRequestParts<AppState> for InternalScope {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("X-Internal-Token")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Unauthorized("Internal service token required".to_string()))?;

        let expected = state.config().server.internal_token.as_bytes();
        if !constant_time_eq(token.as_bytes(), expected) {
            return Err(Error::Forbidden("Internal scope required".to_string()));
        }

        let service_name = parts
            .headers
            .get("X-Service-Name")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown_service")
            .to_string();

        Ok(InternalScope { service_name })
    }
}
