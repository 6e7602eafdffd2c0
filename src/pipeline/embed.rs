//! Embed stage: vectors, snapshot checkpoint, index upsert
//!
//! Embeddings are serialized to a columnar snapshot in the blob store before
//! the vector index is touched. A retry after a crash mid-upsert finds the
//! snapshot and replays the upsert without re-embedding; point id = chunk id
//! makes the upsert itself idempotent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::providers::{Embedder, PointPayload, VectorIndex, VectorPoint};
use crate::storage::{snapshot_path, BlobStore};
use crate::types::{Chunk, Job, JobPayload};

use super::PipelineContext;

/// Columnar embedding checkpoint: chunk ids and their vectors, in chunk
/// order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSnapshot {
    pub chunk_ids: Vec<Uuid>,
    pub dimension: usize,
    pub vectors: Vec<Vec<f32>>,
}

pub async fn run(ctx: &PipelineContext, job: &Job) -> Result<()> {
    let JobPayload::Embed {
        document_id,
        chunk_ids,
        filename,
    } = &job.payload
    else {
        return Err(Error::internal("embed worker received a non-embed payload"));
    };

    // A delete racing the pipeline removes the document first; pending embed
    // jobs short-circuit instead of resurrecting vectors.
    if ctx.db.get_document(job.tenant_id, *document_id)?.is_none() {
        ctx.db
            .fail_job_dead(job.job_id, job.retry_count, "document no longer exists")?;
        tracing::warn!(job_id = %job.job_id, document_id = %document_id, "embedding short-circuited, document gone");
        return Ok(());
    }

    let chunks = ctx.db.get_chunks_by_ids(job.tenant_id, chunk_ids)?;
    if chunks.is_empty() {
        ctx.db
            .fail_job_dead(job.job_id, job.retry_count, "chunk batch no longer exists")?;
        return Ok(());
    }

    tracing::info!(
        job_id = %job.job_id,
        document_id = %document_id,
        batch = chunks.len(),
        attempt = job.retry_count + 1,
        "embedding chunk batch"
    );

    let path = snapshot_path(&job.job_id);
    let snapshot = load_or_compute_snapshot(ctx, &path, &chunks).await?;

    let vector_of: HashMap<Uuid, &Vec<f32>> = snapshot
        .chunk_ids
        .iter()
        .zip(snapshot.vectors.iter())
        .map(|(id, v)| (*id, v))
        .collect();

    let points: Vec<VectorPoint> = chunks
        .iter()
        .map(|chunk| {
            let vector = vector_of.get(&chunk.chunk_id).ok_or_else(|| {
                Error::internal(format!("snapshot missing vector for chunk {}", chunk.chunk_id))
            })?;
            Ok(VectorPoint {
                point_id: chunk.chunk_id,
                vector: (*vector).clone(),
                payload: PointPayload {
                    tenant_id: chunk.tenant_id,
                    document_id: chunk.document_id,
                    chunk_id: chunk.chunk_id,
                    filename: filename.clone(),
                    chunk_index: chunk.chunk_index,
                    metadata: chunk.metadata.clone(),
                },
            })
        })
        .collect::<Result<_>>()?;

    ctx.index.upsert(points).await?;

    let batch_ids: Vec<Uuid> = chunks.iter().map(|c| c.chunk_id).collect();
    let document_completed = ctx.db.complete_embed_batch(
        job.job_id,
        job.tenant_id,
        *document_id,
        &batch_ids,
        &path,
    )?;

    if document_completed {
        tracing::info!(document_id = %document_id, "document processing completed");
    }
    tracing::info!(
        job_id = %job.job_id,
        document_id = %document_id,
        vectors = batch_ids.len(),
        "embed batch complete"
    );
    Ok(())
}

/// Read the checkpoint from a previous attempt if it covers this batch;
/// otherwise embed and write the checkpoint before any index mutation.
async fn load_or_compute_snapshot(
    ctx: &PipelineContext,
    path: &str,
    chunks: &[Chunk],
) -> Result<VectorSnapshot> {
    if ctx.blobs.exists(path).await? {
        let bytes = ctx.blobs.get(path).await?;
        if let Ok(snapshot) = serde_json::from_slice::<VectorSnapshot>(&bytes) {
            let covered = chunks
                .iter()
                .all(|c| snapshot.chunk_ids.contains(&c.chunk_id));
            if covered && snapshot.dimension == ctx.embedder.dimensions() {
                tracing::info!(path, "reusing embedding snapshot from previous attempt");
                return Ok(snapshot);
            }
        }
        tracing::warn!(path, "stale or unreadable snapshot, re-embedding");
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = ctx.embedder.embed_batch(&texts).await?;
    let expected = ctx.config.embedding.dimension;
    for vector in &vectors {
        if vector.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
    }

    let snapshot = VectorSnapshot {
        chunk_ids: chunks.iter().map(|c| c.chunk_id).collect(),
        dimension: expected,
        vectors,
    };
    ctx.blobs
        .put(path, &serde_json::to_vec(&snapshot)?)
        .await?;
    Ok(snapshot)
}
