//! Status, delete and per-tenant metrics endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::api::{DeleteResponse, StageStatus, StatusResponse, TenantMetricsResponse};
use crate::types::{Job, JobStage, JobStatus};

use super::super::auth::AuthedTenant;
use super::super::state::AppState;

/// GET /status/{document_id}
pub async fn document_status(
    State(state): State<AppState>,
    AuthedTenant(tenant): AuthedTenant,
    Path(document_id): Path<Uuid>,
) -> Result<Json<StatusResponse>> {
    let document = state
        .db()
        .get_document(tenant.tenant_id, document_id)?
        .ok_or_else(|| Error::NotFound(format!("document {}", document_id)))?;

    let jobs = state.db().jobs_for_document(document_id)?;
    let mut stages: HashMap<String, Option<StageStatus>> = HashMap::new();
    for stage in JobStage::ALL {
        let stage_jobs: Vec<&Job> = jobs.iter().filter(|j| j.stage == stage).collect();
        stages.insert(stage.as_str().to_string(), summarize_stage(&stage_jobs));
    }

    Ok(Json(StatusResponse {
        document_id,
        status: document.status.as_str().to_string(),
        stages,
    }))
}

/// Collapse a stage's jobs (embed has one per chunk batch) into one status
fn summarize_stage(jobs: &[&Job]) -> Option<StageStatus> {
    if jobs.is_empty() {
        return None;
    }
    let status = if jobs.iter().any(|j| j.status == JobStatus::Dead) {
        JobStatus::Dead
    } else if jobs.iter().any(|j| j.status == JobStatus::Processing) {
        JobStatus::Processing
    } else if jobs.iter().any(|j| j.status == JobStatus::Pending) {
        JobStatus::Pending
    } else {
        JobStatus::Completed
    };
    Some(StageStatus {
        status: status.as_str().to_string(),
        retry_count: jobs.iter().map(|j| j.retry_count).max().unwrap_or(0),
        error: jobs.iter().find_map(|j| j.error_message.clone()),
    })
}

/// DELETE /documents/{document_id}
pub async fn delete_document(
    State(state): State<AppState>,
    AuthedTenant(tenant): AuthedTenant,
    Path(document_id): Path<Uuid>,
) -> Result<Json<DeleteResponse>> {
    let (chunks_deleted, vectors_deleted) = state
        .delete_document_cascade(tenant.tenant_id, document_id)
        .await?;
    Ok(Json(DeleteResponse {
        document_id,
        deleted: true,
        chunks_deleted,
        vectors_deleted,
    }))
}

/// GET /metrics/me
pub async fn tenant_metrics(
    State(state): State<AppState>,
    AuthedTenant(tenant): AuthedTenant,
) -> Result<Json<TenantMetricsResponse>> {
    let usage = state.db().tenant_usage(tenant.tenant_id)?;
    Ok(Json(TenantMetricsResponse {
        tenant_id: tenant.tenant_id,
        tenant_name: tenant.name,
        document_count: usage.document_count,
        chunk_count: usage.chunk_count,
        storage_used_bytes: usage.storage_used_bytes,
        last_upload: usage.last_upload,
        rate_limit_per_minute: tenant.rate_limit_per_minute,
        current_window_usage: state.limiter().current_usage(tenant.tenant_id),
    }))
}
