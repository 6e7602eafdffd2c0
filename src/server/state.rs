//! Shared application state

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::limiter::{RateDecision, RateLimiter};
use crate::pipeline::PipelineContext;
use crate::providers::embedder::embedder_from_config;
use crate::providers::{Embedder, ExtractorSet, LocalVectorIndex, VectorIndex};
use crate::queue::JobQueue;
use crate::storage::{extracted_text_path, snapshot_path, BlobStore, LocalBlobStore, MetadataDb};
use crate::types::{JobStage, Tenant};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Arc<ServiceConfig>,
    db: MetadataDb,
    queue: JobQueue,
    blobs: Arc<dyn BlobStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    limiter: RateLimiter,
    pipeline: PipelineContext,
}

impl AppState {
    /// Construct all process-wide components from validated config
    pub fn new(config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let db = MetadataDb::open(&config.storage.metadata_db_path)?;
        tracing::info!(path = %config.storage.metadata_db_path.display(), "metadata store ready");

        let queue = JobQueue::new(&db);
        let blobs: Arc<dyn BlobStore> =
            Arc::new(LocalBlobStore::new(config.storage.blob_root.clone())?);
        tracing::info!(root = %config.storage.blob_root.display(), "blob store ready");

        let index: Arc<dyn VectorIndex> =
            Arc::new(LocalVectorIndex::new(config.embedding.dimension));
        let embedder = embedder_from_config(&config.embedding);
        tracing::info!(
            embedder = embedder.name(),
            dimension = config.embedding.dimension,
            "embedder ready"
        );

        let limiter = RateLimiter::new(Duration::from_secs(
            config.limits.rate_limit_window_seconds,
        ));

        let pipeline = PipelineContext::new(
            config.clone(),
            db.clone(),
            queue.clone(),
            blobs.clone(),
            index.clone(),
            embedder.clone(),
            ExtractorSet::standard(),
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                queue,
                blobs,
                index,
                embedder,
                limiter,
                pipeline,
            }),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    pub fn db(&self) -> &MetadataDb {
        &self.inner.db
    }

    pub fn queue(&self) -> &JobQueue {
        &self.inner.queue
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.inner.blobs
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.inner.index
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.inner.embedder
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    pub fn pipeline_context(&self) -> PipelineContext {
        self.inner.pipeline.clone()
    }

    /// Admission check for the upload and search endpoints
    pub fn enforce_rate_limit(&self, tenant: &Tenant) -> Result<()> {
        match self
            .inner
            .limiter
            .check(tenant.tenant_id, tenant.rate_limit_per_minute)
        {
            RateDecision::Ok => Ok(()),
            RateDecision::Denied { retry_after_ms } => {
                tracing::warn!(
                    tenant_id = %tenant.tenant_id,
                    retry_after_ms,
                    "request rate limited"
                );
                Err(Error::RateLimited { retry_after_ms })
            }
        }
    }

    /// Cascading document delete: vectors, chunk rows, job rows (and their
    /// queue entries), blob objects, then the document row. An interrupted
    /// delete leaves the row marked `failed_deletion` for a reconciler.
    pub async fn delete_document_cascade(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
    ) -> Result<(usize, usize)> {
        let document = self
            .inner
            .db
            .get_document(tenant_id, document_id)?
            .ok_or_else(|| Error::NotFound(format!("document {}", document_id)))?;

        match self.cascade_steps(tenant_id, document_id, &document.blob_path).await {
            Ok(counts) => Ok(counts),
            Err(e) => {
                self.inner.db.mark_document_failed_deletion(document_id)?;
                tracing::error!(
                    document_id = %document_id,
                    error = %e,
                    "cascade delete interrupted, document marked failed_deletion"
                );
                Err(e)
            }
        }
    }

    async fn cascade_steps(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
        raw_blob_path: &str,
    ) -> Result<(usize, usize)> {
        let db = &self.inner.db;

        let vectors_deleted = self
            .inner
            .index
            .delete_by_document(tenant_id, document_id)
            .await?;

        let chunks_deleted = db.delete_chunks_for_document(document_id)?;

        let jobs = db.jobs_for_document(document_id)?;
        for job in &jobs {
            self.inner.queue.remove(job.job_id)?;
        }
        db.delete_jobs_for_document(document_id)?;

        self.inner.blobs.delete(raw_blob_path).await?;
        self.inner
            .blobs
            .delete(&extracted_text_path(&document_id))
            .await?;
        for job in &jobs {
            if job.stage == JobStage::Embed {
                self.inner.blobs.delete(&snapshot_path(&job.job_id)).await?;
            }
        }

        db.delete_document_row(document_id)?;

        tracing::info!(
            document_id = %document_id,
            chunks_deleted,
            vectors_deleted,
            jobs_deleted = jobs.len(),
            "document deleted"
        );
        Ok((chunks_deleted, vectors_deleted))
    }

    /// Delete a tenant and everything it owns
    pub async fn delete_tenant_cascade(&self, tenant: &Tenant) -> Result<usize> {
        let documents = self.inner.db.documents_for_tenant(tenant.tenant_id)?;
        let document_count = documents.len();
        for document in documents {
            self.delete_document_cascade(tenant.tenant_id, document.document_id)
                .await?;
        }
        // Sweep stragglers the per-document passes could not see
        self.inner.index.delete_by_tenant(tenant.tenant_id).await?;
        self.inner.limiter.forget(tenant.tenant_id);
        self.inner.db.delete_tenant_row(tenant.tenant_id)?;
        tracing::info!(
            tenant_id = %tenant.tenant_id,
            name = %tenant.name,
            documents = document_count,
            "tenant deleted"
        );
        Ok(document_count)
    }
}
