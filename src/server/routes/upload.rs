//! Upload endpoints
//!
//! Uploads are admitted through the tenant's rate limit, validated, stored
//! in the blob store, recorded as a pending document and handed to the
//! pipeline as an extract job. All processing happens asynchronously; the
//! response only promises the document is queued.

use axum::{
    extract::{Multipart, State},
    Json,
};

use crate::error::{Error, Result};
use crate::providers::extractor::is_supported_filename;
use crate::queue::queue_now;
use crate::storage::{raw_blob_path, BlobStore};
use crate::types::api::{BulkUploadItem, BulkUploadResponse, UploadResponse};
use crate::types::{Document, Job, JobPayload, JobStage, Tenant};

use super::super::auth::AuthedTenant;
use super::super::state::AppState;

/// POST /upload/single
pub async fn upload_single(
    State(state): State<AppState>,
    AuthedTenant(tenant): AuthedTenant,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    state.enforce_rate_limit(&tenant)?;

    let Some((filename, data)) = next_file(&mut multipart).await? else {
        return Err(Error::validation("multipart upload contains no file"));
    };

    let document = admit_upload(&state, &tenant, filename, &data).await?;
    Ok(Json(UploadResponse {
        document_id: document.document_id,
        filename: document.filename,
        status: "pending".to_string(),
        message: "File uploaded and queued for processing".to_string(),
    }))
}

/// POST /upload/bulk
pub async fn upload_bulk(
    State(state): State<AppState>,
    AuthedTenant(tenant): AuthedTenant,
    mut multipart: Multipart,
) -> Result<Json<BulkUploadResponse>> {
    state.enforce_rate_limit(&tenant)?;

    let max_files = state.config().limits.max_bulk_files;
    let mut items = Vec::new();
    let mut successful = 0;
    let mut failed = 0;

    while let Some((filename, data)) = next_file(&mut multipart).await? {
        if items.len() >= max_files {
            return Err(Error::validation(format!(
                "at most {} files per bulk upload",
                max_files
            )));
        }
        // Each file is admitted independently; one bad file does not sink
        // the batch
        match admit_upload(&state, &tenant, filename.clone(), &data).await {
            Ok(document) => {
                successful += 1;
                items.push(BulkUploadItem {
                    document_id: Some(document.document_id),
                    filename: document.filename,
                    status: "pending".to_string(),
                    message: "File uploaded and queued for processing".to_string(),
                });
            }
            Err(e) => {
                failed += 1;
                items.push(BulkUploadItem {
                    document_id: None,
                    filename,
                    status: "rejected".to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(Json(BulkUploadResponse {
        total_files: items.len(),
        successful,
        failed,
        documents: items,
    }))
}

/// Pull the next file field out of the multipart body
async fn next_file(multipart: &mut Multipart) -> Result<Option<(String, Vec<u8>)>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(format!("failed to read multipart field: {}", e)))?
    {
        let Some(filename) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| Error::validation(format!("failed to read file body: {}", e)))?;
        return Ok(Some((filename, data.to_vec())));
    }
    Ok(None)
}

/// Validate, persist and enqueue a single file
async fn admit_upload(
    state: &AppState,
    tenant: &Tenant,
    filename: String,
    data: &[u8],
) -> Result<Document> {
    if filename.is_empty() {
        return Err(Error::validation("filename must not be empty"));
    }
    if !is_supported_filename(&filename) {
        return Err(Error::UnsupportedFileType(filename));
    }
    let limit = state.config().server.max_file_size_bytes;
    if data.len() as u64 > limit {
        return Err(Error::FileTooLarge {
            size: data.len() as u64,
            limit,
        });
    }

    let document = Document::new(
        tenant.tenant_id,
        filename.clone(),
        String::new(),
        data.len() as u64,
    );
    let blob_path = raw_blob_path(&document.document_id, &filename);
    let document = Document {
        blob_path: blob_path.clone(),
        ..document
    };

    state.blobs().put(&blob_path, data).await?;
    state.db().insert_document(&document)?;

    let extract_job = Job::new(
        tenant.tenant_id,
        JobPayload::Extract {
            document_id: document.document_id,
            blob_path,
            filename,
        },
        state.config().pipeline.max_retries,
    );
    state.db().insert_job(&extract_job)?;
    state.queue().enqueue(
        tenant.tenant_id,
        JobStage::Extract,
        extract_job.job_id,
        queue_now(),
    )?;

    tracing::info!(
        tenant_id = %tenant.tenant_id,
        document_id = %document.document_id,
        filename = %document.filename,
        size_bytes = document.size_bytes,
        "upload accepted"
    );
    Ok(document)
}
