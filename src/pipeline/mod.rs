//! Three-stage worker pipeline
//!
//! Worker pools pull jobs through the round-robin scheduler, run the stage
//! under a wall-clock budget, and either complete the job, requeue it with a
//! backoff-deferred score, or dead-letter it. The `pending -> processing`
//! claim is a conditional update, so a job id popped twice under queue
//! failure is only processed once.

pub mod chunk;
pub mod embed;
pub mod extract;

pub use chunk::SentenceChunker;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::providers::{Embedder, ExtractorSet, VectorIndex};
use crate::queue::{queue_now, JobQueue, StageScheduler};
use crate::storage::{BlobStore, MetadataDb};
use crate::types::{Job, JobStage};

/// Shared dependencies for the worker pools, constructed once at startup and
/// passed by reference
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<ServiceConfig>,
    pub db: MetadataDb,
    pub queue: JobQueue,
    pub scheduler: StageScheduler,
    pub blobs: Arc<dyn BlobStore>,
    pub index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub extractors: ExtractorSet,
}

impl PipelineContext {
    pub fn new(
        config: Arc<ServiceConfig>,
        db: MetadataDb,
        queue: JobQueue,
        blobs: Arc<dyn BlobStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        extractors: ExtractorSet,
    ) -> Self {
        let scheduler = StageScheduler::new(
            queue.clone(),
            db.clone(),
            config.pipeline.per_tenant_concurrency_cap,
        );
        Self {
            config,
            db,
            queue,
            scheduler,
            blobs,
            index,
            embedder,
            extractors,
        }
    }
}

/// Backoff-deferred queue score: due `2^retry_count` seconds from `now`
pub fn backoff_score(now: f64, retry_count: u32) -> f64 {
    now + 2f64.powi(retry_count.min(16) as i32)
}

/// Spawn the per-stage worker pools. Workers drain their in-flight job when
/// the shutdown signal flips.
pub fn spawn_workers(
    ctx: Arc<PipelineContext>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    for stage in JobStage::ALL {
        let count = ctx.config.pipeline.workers_for(stage);
        tracing::info!(stage = stage.as_str(), workers = count, "starting worker pool");
        for worker_id in 0..count {
            let ctx = ctx.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(ctx, stage, worker_id, shutdown).await;
            }));
        }
    }
    handles
}

async fn worker_loop(
    ctx: Arc<PipelineContext>,
    stage: JobStage,
    worker_id: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(stage = stage.as_str(), worker_id, "worker started");
    let mut idle = Duration::from_millis(100);

    loop {
        if *shutdown.borrow() {
            break;
        }
        match process_next(&ctx, stage).await {
            Ok(true) => {
                idle = Duration::from_millis(100);
            }
            Ok(false) => {
                tokio::select! {
                    _ = tokio::time::sleep(idle) => {},
                    _ = shutdown.changed() => {},
                }
                idle = (idle * 2).min(Duration::from_secs(2));
            }
            Err(e) => {
                tracing::error!(
                    stage = stage.as_str(),
                    worker_id,
                    error = %e,
                    "worker iteration failed"
                );
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {},
                    _ = shutdown.changed() => {},
                }
            }
        }
    }
    tracing::info!(stage = stage.as_str(), worker_id, "worker stopped");
}

/// Claim and run the next due job at the stage. Returns false when every
/// tenant is idle, deferred or capped; true when a job was served (including
/// race-lost claims, which count as already served).
pub async fn process_next(ctx: &PipelineContext, stage: JobStage) -> Result<bool> {
    process_next_at(ctx, stage, queue_now()).await
}

/// [`process_next`] with an explicit clock so tests can step through backoff
pub async fn process_next_at(ctx: &PipelineContext, stage: JobStage, now: f64) -> Result<bool> {
    let Some((tenant_id, job_id)) = ctx.scheduler.next_ready_at(stage, now)? else {
        return Ok(false);
    };

    if !ctx.db.claim_job(job_id)? {
        tracing::debug!(
            stage = stage.as_str(),
            %tenant_id,
            %job_id,
            "job already claimed elsewhere, skipping"
        );
        return Ok(true);
    }

    let Some(job) = ctx.db.get_job(job_id)? else {
        tracing::warn!(%job_id, "claimed job vanished from the metadata store");
        return Ok(true);
    };

    let budget = ctx.config.pipeline.timeout_for(stage);
    match timeout(budget, run_stage(ctx, &job)).await {
        Ok(Ok(())) => Ok(true),
        Ok(Err(error)) => {
            handle_failure(ctx, &job, error, now)?;
            Ok(true)
        }
        Err(_) => {
            let error = Error::Internal(format!(
                "stage budget of {}s exhausted",
                budget.as_secs()
            ));
            handle_failure(ctx, &job, error, now)?;
            Ok(true)
        }
    }
}

async fn run_stage(ctx: &PipelineContext, job: &Job) -> Result<()> {
    match job.stage {
        JobStage::Extract => extract::run(ctx, job).await,
        JobStage::Chunk => chunk::run(ctx, job).await,
        JobStage::Embed => embed::run(ctx, job).await,
    }
}

/// Transient errors requeue with an incremented retry count and a deferred
/// score; exhausted retries and permanent errors dead-letter the job and
/// fail the document.
fn handle_failure(ctx: &PipelineContext, job: &Job, error: Error, now: f64) -> Result<()> {
    let message = error.to_string();
    if error.is_transient() {
        let retry_count = job.retry_count + 1;
        if retry_count <= job.max_retries {
            ctx.db.fail_job_retry(job.job_id, retry_count, &message)?;
            ctx.queue.enqueue(
                job.tenant_id,
                job.stage,
                job.job_id,
                backoff_score(now, retry_count),
            )?;
            tracing::warn!(
                stage = job.stage.as_str(),
                job_id = %job.job_id,
                document_id = %job.document_id,
                retry_count,
                max_retries = job.max_retries,
                error = %message,
                "transient failure, requeued with backoff"
            );
            return Ok(());
        }
    }

    ctx.db.fail_job_dead(job.job_id, job.retry_count, &message)?;
    ctx.db.mark_document_failed(job.document_id)?;
    tracing::error!(
        stage = job.stage.as_str(),
        job_id = %job.job_id,
        document_id = %job.document_id,
        retry_count = job.retry_count,
        error = %message,
        "job dead-lettered, document failed"
    );
    Ok(())
}
