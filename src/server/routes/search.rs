//! Tenant-scoped semantic search endpoint

use axum::{extract::State, Json};

use crate::error::{Error, Result};
use crate::search::semantic_search;
use crate::types::api::{SearchRequest, SearchResponse};

use super::super::auth::AuthedTenant;
use super::super::state::AppState;

/// POST /search
pub async fn search(
    State(state): State<AppState>,
    AuthedTenant(tenant): AuthedTenant,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    state.enforce_rate_limit(&tenant)?;

    if !(1..=100).contains(&request.limit) {
        return Err(Error::validation("limit must be within 1..=100"));
    }
    if !(0.0..=1.0).contains(&request.score_threshold) {
        return Err(Error::validation("score_threshold must be within 0.0..=1.0"));
    }

    let results = semantic_search(
        state.db(),
        state.index().as_ref(),
        state.embedder().as_ref(),
        tenant.tenant_id,
        &request.query,
        request.limit,
        request.score_threshold,
    )
    .await?;

    Ok(Json(SearchResponse {
        total: results.len(),
        results,
        query: request.query,
    }))
}
