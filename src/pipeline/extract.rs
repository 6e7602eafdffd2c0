//! Extract stage: raw bytes to UTF-8 text
//!
//! Fetches the raw upload, runs the suffix-selected extractor, persists the
//! text at `extracted/{document_id}.txt`, then in one metadata transaction
//! advances the document to `chunking`, completes this job and inserts the
//! successor chunk job before enqueueing it.

use crate::error::{Error, Result};
use crate::providers::Extractor;
use crate::queue::queue_now;
use crate::storage::{extracted_text_path, BlobStore};
use crate::types::{DocumentStatus, Job, JobPayload, JobStage};

use super::PipelineContext;

pub async fn run(ctx: &PipelineContext, job: &Job) -> Result<()> {
    let JobPayload::Extract {
        document_id,
        blob_path,
        filename,
    } = &job.payload
    else {
        return Err(Error::internal("extract worker received a non-extract payload"));
    };

    if ctx.db.get_document(job.tenant_id, *document_id)?.is_none() {
        ctx.db
            .fail_job_dead(job.job_id, job.retry_count, "document no longer exists")?;
        tracing::warn!(job_id = %job.job_id, document_id = %document_id, "extract short-circuited, document gone");
        return Ok(());
    }

    // No-op on retry, when the document already left `pending`
    ctx.db.advance_document_status(
        *document_id,
        DocumentStatus::Pending,
        DocumentStatus::Extracting,
    )?;

    tracing::info!(
        job_id = %job.job_id,
        document_id = %document_id,
        filename = %filename,
        attempt = job.retry_count + 1,
        "extracting text"
    );

    let bytes = ctx.blobs.get(blob_path).await?;
    let extractor = ctx.extractors.for_filename(filename)?;
    let text = extractor.extract(&bytes).await?;

    let text_path = extracted_text_path(document_id);
    ctx.blobs.put(&text_path, text.as_bytes()).await?;

    let chunk_job = Job::new(
        job.tenant_id,
        JobPayload::Chunk {
            document_id: *document_id,
            text_path: text_path.clone(),
            filename: filename.clone(),
        },
        ctx.config.pipeline.max_retries,
    );

    let advanced = ctx
        .db
        .complete_extract_stage(job.job_id, *document_id, &chunk_job)?;
    if !advanced {
        ctx.db.fail_job_dead(
            job.job_id,
            job.retry_count,
            "document left the pipeline during extraction",
        )?;
        return Ok(());
    }

    ctx.queue.enqueue(
        job.tenant_id,
        JobStage::Chunk,
        chunk_job.job_id,
        queue_now(),
    )?;

    tracing::info!(
        job_id = %job.job_id,
        document_id = %document_id,
        text_bytes = text.len(),
        "extraction complete, chunk job enqueued"
    );
    Ok(())
}
