//! Internal-scoped endpoints: tenant CRUD, stats, cross-tenant reads
//!
//! Everything here requires the deployment's service token; tenant
//! credentials are rejected with 403.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::providers::{Embedder, VectorIndex};
use crate::search::internal_search;
use crate::storage::BlobStore;
use crate::types::api::{
    CreateTenantRequest, CreateTenantResponse, InternalHealthResponse, InternalStatsResponse,
    SearchRequest, SearchResponse, ServiceAuthResponse,
};
use crate::types::{DocumentStatus, JobStage, Tenant};

use super::super::auth::{fingerprint, generate_api_key, InternalScope};
use super::super::state::AppState;

/// GET /internal/auth
pub async fn authenticate_service(scope: InternalScope) -> Json<ServiceAuthResponse> {
    tracing::info!(service = %scope.service_name, "internal service authenticated");
    Json(ServiceAuthResponse {
        authenticated: true,
        service_name: scope.service_name,
        permissions: vec![
            "read:documents".to_string(),
            "write:documents".to_string(),
            "read:chunks".to_string(),
            "search:vectors".to_string(),
            "admin:tenants".to_string(),
        ],
    })
}

/// GET /internal/health
pub async fn health(
    State(state): State<AppState>,
    _scope: InternalScope,
) -> Json<InternalHealthResponse> {
    let database = match state.db().list_tenants() {
        Ok(_) => "healthy".to_string(),
        Err(e) => format!("unhealthy: {}", e),
    };
    let blob_store = match state.blobs().health_check().await {
        Ok(true) => "healthy".to_string(),
        Ok(false) => "unhealthy: not ready".to_string(),
        Err(e) => format!("unhealthy: {}", e),
    };
    let vector_index = match state.index().health_check().await {
        Ok(true) => "healthy".to_string(),
        Ok(false) => "unhealthy: not ready".to_string(),
        Err(e) => format!("unhealthy: {}", e),
    };
    let embedder = match state.embedder().health_check().await {
        Ok(true) => "healthy".to_string(),
        Ok(false) => "unhealthy: not reachable".to_string(),
        Err(e) => format!("unhealthy: {}", e),
    };

    let all_healthy = [&database, &blob_store, &vector_index, &embedder]
        .iter()
        .all(|s| s.as_str() == "healthy");

    Json(InternalHealthResponse {
        status: if all_healthy { "healthy" } else { "degraded" }.to_string(),
        database,
        blob_store,
        vector_index,
        embedder,
    })
}

/// GET /internal/tenants
pub async fn list_tenants(
    State(state): State<AppState>,
    _scope: InternalScope,
) -> Result<Json<serde_json::Value>> {
    let tenants = state.db().list_tenants()?;
    Ok(Json(serde_json::json!({
        "total": tenants.len(),
        "tenants": tenants,
    })))
}

/// POST /internal/tenants
///
/// The plaintext API key is returned exactly once.
pub async fn create_tenant(
    State(state): State<AppState>,
    _scope: InternalScope,
    Json(request): Json<CreateTenantRequest>,
) -> Result<Json<CreateTenantResponse>> {
    if request.name.trim().is_empty() {
        return Err(Error::validation("tenant name must not be empty"));
    }

    let rate_limit = request
        .rate_limit_per_minute
        .unwrap_or(state.config().limits.default_rate_limit_per_minute);
    let api_key = generate_api_key(&request.name);
    let tenant = Tenant::new(request.name.clone(), fingerprint(&api_key), rate_limit);
    state.db().insert_tenant(&tenant)?;

    tracing::info!(tenant_id = %tenant.tenant_id, name = %tenant.name, "tenant created");
    Ok(Json(CreateTenantResponse {
        tenant_id: tenant.tenant_id,
        name: tenant.name,
        api_key,
        rate_limit_per_minute: rate_limit,
        message: "Tenant created. Save the API key, it will not be shown again.".to_string(),
    }))
}

/// POST /internal/tenants/{name}/rotate-key
///
/// The only mutation tenants support. Returns the replacement key once; the
/// old key stops working immediately.
pub async fn rotate_tenant_key(
    State(state): State<AppState>,
    _scope: InternalScope,
    Path(name): Path<String>,
) -> Result<Json<CreateTenantResponse>> {
    let tenant = state
        .db()
        .get_tenant_by_name(&name)?
        .ok_or_else(|| Error::NotFound(format!("tenant '{}'", name)))?;

    let api_key = generate_api_key(&tenant.name);
    state
        .db()
        .rotate_tenant_key(tenant.tenant_id, &fingerprint(&api_key))?;

    tracing::info!(tenant_id = %tenant.tenant_id, name = %tenant.name, "tenant credential rotated");
    Ok(Json(CreateTenantResponse {
        tenant_id: tenant.tenant_id,
        name: tenant.name,
        api_key,
        rate_limit_per_minute: tenant.rate_limit_per_minute,
        message: "Credential rotated. Save the API key, it will not be shown again.".to_string(),
    }))
}

/// DELETE /internal/tenants/{name}
pub async fn delete_tenant(
    State(state): State<AppState>,
    _scope: InternalScope,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let tenant = state
        .db()
        .get_tenant_by_name(&name)?
        .ok_or_else(|| Error::NotFound(format!("tenant '{}'", name)))?;

    let documents = state.delete_tenant_cascade(&tenant).await?;
    Ok(Json(serde_json::json!({
        "tenant_id": tenant.tenant_id,
        "deleted": true,
        "documents_deleted": documents,
    })))
}

/// GET /internal/stats
pub async fn stats(
    State(state): State<AppState>,
    _scope: InternalScope,
) -> Result<Json<InternalStatsResponse>> {
    let mut queue_depths = HashMap::new();
    for stage in JobStage::ALL {
        queue_depths.insert(
            stage.as_str().to_string(),
            state.queue().stage_depth(stage)?,
        );
    }
    Ok(Json(InternalStatsResponse {
        tenants: state.db().list_tenants()?.len(),
        documents_by_status: state.db().document_status_counts()?,
        jobs_by_status: state.db().job_status_counts()?,
        queue_depths,
        vector_points: state.index().count().await?,
    }))
}

/// Query filters for the cross-tenant document listing
#[derive(Debug, Deserialize)]
pub struct DocumentListQuery {
    pub tenant_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

/// GET /internal/documents
pub async fn list_documents(
    State(state): State<AppState>,
    _scope: InternalScope,
    Query(query): Query<DocumentListQuery>,
) -> Result<Json<serde_json::Value>> {
    let status = match query.status.as_deref() {
        Some(s) => Some(
            DocumentStatus::parse(s)
                .ok_or_else(|| Error::validation(format!("unknown status '{}'", s)))?,
        ),
        None => None,
    };
    let documents =
        state
            .db()
            .list_documents(query.tenant_id, status, query.limit.unwrap_or(100))?;
    Ok(Json(serde_json::json!({
        "total": documents.len(),
        "documents": documents,
    })))
}

/// GET /internal/documents/{document_id}
pub async fn get_document(
    State(state): State<AppState>,
    _scope: InternalScope,
    Path(document_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let document = state
        .db()
        .get_document_any(document_id)?
        .ok_or_else(|| Error::NotFound(format!("document {}", document_id)))?;
    let jobs = state.db().jobs_for_document(document_id)?;
    Ok(Json(serde_json::json!({
        "document": document,
        "jobs": jobs,
    })))
}

/// POST /internal/search — cross-tenant
pub async fn search_all_tenants(
    State(state): State<AppState>,
    _scope: InternalScope,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    if !(1..=100).contains(&request.limit) {
        return Err(Error::validation("limit must be within 1..=100"));
    }
    let results = internal_search(
        state.db(),
        state.index().as_ref(),
        state.embedder().as_ref(),
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
