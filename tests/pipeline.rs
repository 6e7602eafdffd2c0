//! End-to-end pipeline scenarios: upload through extract, chunk and embed to
//! a searchable, tenant-isolated corpus.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use marshal_rag::config::ServiceConfig;
use marshal_rag::error::{Error, Result};
use marshal_rag::pipeline::{process_next_at, PipelineContext};
use marshal_rag::providers::{
    Embedder, Extractor, ExtractorSet, HashEmbedder, LocalVectorIndex, PdfExtractor,
    PlainTextExtractor, VectorIndex,
};
use marshal_rag::queue::JobQueue;
use marshal_rag::search::semantic_search;
use marshal_rag::server::state::AppState;
use marshal_rag::storage::{raw_blob_path, snapshot_path, BlobStore, LocalBlobStore, MetadataDb};
use marshal_rag::types::{
    Chunk, Document, DocumentStatus, Job, JobPayload, JobStage, JobStatus, Tenant,
};

const DIM: usize = 64;

fn test_config(chunk_size: usize, overlap: usize, batch_size: usize) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.chunking.chunk_size = chunk_size;
    config.chunking.chunk_overlap = overlap;
    config.embedding.batch_size = batch_size;
    config.embedding.dimension = DIM;
    config.embedding.model = "hash".to_string();
    config
}

struct Harness {
    ctx: PipelineContext,
    _blob_dir: TempDir,
}

fn harness(config: ServiceConfig) -> Harness {
    harness_with(
        config,
        Arc::new(HashEmbedder::new(DIM)),
        ExtractorSet::standard(),
    )
}

fn harness_with(
    config: ServiceConfig,
    embedder: Arc<dyn Embedder>,
    extractors: ExtractorSet,
) -> Harness {
    let blob_dir = TempDir::new().unwrap();
    let db = MetadataDb::in_memory().unwrap();
    let queue = JobQueue::new(&db);
    let blobs = Arc::new(LocalBlobStore::new(blob_dir.path().to_path_buf()).unwrap());
    let index: Arc<dyn VectorIndex> = Arc::new(LocalVectorIndex::new(DIM));
    let ctx = PipelineContext::new(
        Arc::new(config),
        db,
        queue,
        blobs,
        index,
        embedder,
        extractors,
    );
    Harness {
        ctx,
        _blob_dir: blob_dir,
    }
}

fn make_tenant(ctx: &PipelineContext, name: &str) -> Tenant {
    let tenant = Tenant::new(name.to_string(), format!("hash-{}", name), 1000);
    ctx.db.insert_tenant(&tenant).unwrap();
    tenant
}

/// What the dispatcher does on upload: raw blob, document row, extract job,
/// queue entry.
async fn upload(ctx: &PipelineContext, tenant: &Tenant, filename: &str, data: &[u8], score: f64) -> Document {
    let mut document = Document::new(
        tenant.tenant_id,
        filename.to_string(),
        String::new(),
        data.len() as u64,
    );
    document.blob_path = raw_blob_path(&document.document_id, filename);
    ctx.blobs.put(&document.blob_path, data).await.unwrap();
    ctx.db.insert_document(&document).unwrap();

    let job = Job::new(
        tenant.tenant_id,
        JobPayload::Extract {
            document_id: document.document_id,
            blob_path: document.blob_path.clone(),
            filename: filename.to_string(),
        },
        ctx.config.pipeline.max_retries,
    );
    ctx.db.insert_job(&job).unwrap();
    ctx.queue
        .enqueue(tenant.tenant_id, JobStage::Extract, job.job_id, score)
        .unwrap();
    document
}

/// Drive every stage until no due work remains at the given clock
async fn run_until_idle(ctx: &PipelineContext, now: f64) {
    loop {
        let mut progressed = false;
        for stage in JobStage::ALL {
            while process_next_at(ctx, stage, now).await.unwrap() {
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
}

// ==================== Scenario: single upload end to end ====================

#[tokio::test]
async fn plain_text_upload_completes_with_sentence_chunks() {
    let h = harness(test_config(2, 0, 100));
    let tenant = make_tenant(&h.ctx, "acme");

    let document = upload(
        &h.ctx,
        &tenant,
        "hello.txt",
        b"alpha beta. gamma delta. epsilon zeta.",
        1.0,
    )
    .await;

    run_until_idle(&h.ctx, 1000.0).await;

    let document = h
        .ctx
        .db
        .get_document(tenant.tenant_id, document.document_id)
        .unwrap()
        .unwrap();
    assert_eq!(document.status, DocumentStatus::Completed);

    let chunks = h
        .ctx
        .db
        .chunks_for_document(tenant.tenant_id, document.document_id)
        .unwrap();
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["alpha beta.", "gamma delta.", "epsilon zeta."]);

    // Contiguous indexes and snapshot paths on every chunk
    let indexes: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indexes, vec![0, 1, 2]);
    assert!(chunks.iter().all(|c| c.vector_snapshot_path.is_some()));

    // Three points, all tagged with the uploading tenant
    assert_eq!(h.ctx.index.count().await.unwrap(), 3);
    let embedder = HashEmbedder::new(DIM);
    let hits = h
        .ctx
        .index
        .search(&embedder.embed_sync("gamma delta"), tenant.tenant_id, 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|p| p.payload.tenant_id == tenant.tenant_id));

    // The snapshot checkpoint is in the blob store
    let jobs = h.ctx.db.jobs_for_document(document.document_id).unwrap();
    let embed_job = jobs.iter().find(|j| j.stage == JobStage::Embed).unwrap();
    assert_eq!(embed_job.status, JobStatus::Completed);
    assert!(h
        .ctx
        .blobs
        .exists(&snapshot_path(&embed_job.job_id))
        .await
        .unwrap());
}

// ==================== Scenario: default chunk size, unterminated tail ====================

#[tokio::test]
async fn default_chunk_size_splits_before_a_trailing_fragment() {
    // Production-range parameters: 512-token windows with 50-token overlap
    let h = harness(test_config(512, 50, 100));
    let tenant = make_tenant(&h.ctx, "acme");

    // Two long sentences and a tail with no terminator; the whole text fits
    // one window, so the break must come from the sentence boundary, not
    // end of text
    let mut text = String::new();
    for i in 0..40 {
        text.push_str(&format!("alpha{} ", i));
    }
    text.push_str("omega. ");
    for i in 0..40 {
        text.push_str(&format!("beta{} ", i));
    }
    text.push_str("omega. ");
    for i in 0..30 {
        text.push_str(&format!("tail{} ", i));
    }

    let document = upload(&h.ctx, &tenant, "long.txt", text.as_bytes(), 1.0).await;
    run_until_idle(&h.ctx, 1000.0).await;

    let document = h
        .ctx
        .db
        .get_document(tenant.tenant_id, document.document_id)
        .unwrap()
        .unwrap();
    assert_eq!(document.status, DocumentStatus::Completed);

    let chunks = h
        .ctx
        .db
        .chunks_for_document(tenant.tenant_id, document.document_id)
        .unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].text.ends_with("omega."));
    assert!(!chunks[0].text.contains("tail"));
    assert!(chunks[1].text.starts_with("alpha32"));
    assert!(chunks[1].text.ends_with("tail29"));

    let indexes: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indexes, vec![0, 1]);
    assert_eq!(h.ctx.index.count().await.unwrap(), 2);
}

// ==================== Scenario: stage ordering ====================

#[tokio::test]
async fn stages_run_in_order_per_document() {
    let h = harness(test_config(2, 0, 100));
    let tenant = make_tenant(&h.ctx, "acme");
    let document = upload(&h.ctx, &tenant, "doc.txt", b"one two. three four.", 1.0).await;

    // Nothing at chunk or embed before extract has run
    assert!(!process_next_at(&h.ctx, JobStage::Chunk, 1000.0).await.unwrap());
    assert!(!process_next_at(&h.ctx, JobStage::Embed, 1000.0).await.unwrap());

    assert!(process_next_at(&h.ctx, JobStage::Extract, 1000.0).await.unwrap());
    let status = h
        .ctx
        .db
        .get_document(tenant.tenant_id, document.document_id)
        .unwrap()
        .unwrap()
        .status;
    assert_eq!(status, DocumentStatus::Chunking);

    assert!(!process_next_at(&h.ctx, JobStage::Embed, 1000.0).await.unwrap());
    assert!(process_next_at(&h.ctx, JobStage::Chunk, 1000.0).await.unwrap());
    assert!(process_next_at(&h.ctx, JobStage::Embed, 1000.0).await.unwrap());

    let status = h
        .ctx
        .db
        .get_document(tenant.tenant_id, document.document_id)
        .unwrap()
        .unwrap()
        .status;
    assert_eq!(status, DocumentStatus::Completed);
}

// ==================== Scenario: fairness under bulk ====================

#[tokio::test]
async fn bulk_uploader_cannot_starve_a_small_tenant() {
    let h = harness(test_config(2, 0, 100));
    let bulk = make_tenant(&h.ctx, "bulk");
    let small = make_tenant(&h.ctx, "small");

    // The bulk tenant enqueues 10 documents first, then the small tenant
    // enqueues one
    for i in 0..10 {
        upload(&h.ctx, &bulk, &format!("bulk-{}.txt", i), b"text. more.", 1.0 + i as f64).await;
    }
    let small_doc = upload(&h.ctx, &small, "single.txt", b"text. more.", 100.0).await;

    // With one extract worker, the small tenant is served within the first
    // round-robin cycle
    assert!(process_next_at(&h.ctx, JobStage::Extract, 1000.0).await.unwrap());
    assert!(process_next_at(&h.ctx, JobStage::Extract, 1000.0).await.unwrap());

    let status = h
        .ctx
        .db
        .get_document(small.tenant_id, small_doc.document_id)
        .unwrap()
        .unwrap()
        .status;
    assert_ne!(status, DocumentStatus::Pending);
}

// ==================== Scenario: transient failure with backoff ====================

struct FlakyExtractor {
    failures_left: AtomicUsize,
    inner: PlainTextExtractor,
}

#[async_trait]
impl Extractor for FlakyExtractor {
    async fn extract(&self, data: &[u8]) -> Result<String> {
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Extraction {
                message: "simulated I/O failure".to_string(),
                transient: true,
            });
        }
        self.inner.extract(data).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

#[tokio::test]
async fn transient_extraction_failures_retry_with_exponential_backoff() {
    let extractors = ExtractorSet {
        plain_text: Arc::new(FlakyExtractor {
            failures_left: AtomicUsize::new(2),
            inner: PlainTextExtractor,
        }),
        pdf: Arc::new(PdfExtractor),
    };
    let h = harness_with(
        test_config(2, 0, 100),
        Arc::new(HashEmbedder::new(DIM)),
        extractors,
    );
    let tenant = make_tenant(&h.ctx, "acme");
    let document = upload(&h.ctx, &tenant, "doc.txt", b"alpha beta.", 1000.0).await;

    // Attempt 1 fails; the retry is deferred 2^1 = 2 seconds
    assert!(process_next_at(&h.ctx, JobStage::Extract, 1000.0).await.unwrap());
    assert!(!process_next_at(&h.ctx, JobStage::Extract, 1001.9).await.unwrap());

    // Attempt 2 at t+2 fails; next retry deferred 2^2 = 4 seconds
    assert!(process_next_at(&h.ctx, JobStage::Extract, 1002.0).await.unwrap());
    assert!(!process_next_at(&h.ctx, JobStage::Extract, 1005.9).await.unwrap());

    // Attempt 3 succeeds
    assert!(process_next_at(&h.ctx, JobStage::Extract, 1006.0).await.unwrap());

    let jobs = h.ctx.db.jobs_for_document(document.document_id).unwrap();
    let extract_job = jobs.iter().find(|j| j.stage == JobStage::Extract).unwrap();
    assert_eq!(extract_job.status, JobStatus::Completed);
    assert_eq!(extract_job.retry_count, 2);

    run_until_idle(&h.ctx, 2000.0).await;
    let status = h
        .ctx
        .db
        .get_document(tenant.tenant_id, document.document_id)
        .unwrap()
        .unwrap()
        .status;
    assert_eq!(status, DocumentStatus::Completed);
}

// ==================== Scenario: permanent failure ====================

#[tokio::test]
async fn corrupt_pdf_dead_letters_without_successor_jobs() {
    let h = harness(test_config(2, 0, 100));
    let tenant = make_tenant(&h.ctx, "acme");
    let document = upload(&h.ctx, &tenant, "broken.pdf", b"not a pdf at all", 1.0).await;

    assert!(process_next_at(&h.ctx, JobStage::Extract, 1000.0).await.unwrap());

    let jobs = h.ctx.db.jobs_for_document(document.document_id).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Dead);
    assert!(jobs[0].error_message.as_deref().unwrap_or("").len() > 0);

    let document = h
        .ctx
        .db
        .get_document(tenant.tenant_id, document.document_id)
        .unwrap()
        .unwrap();
    assert_eq!(document.status, DocumentStatus::Failed);

    // No chunk or embed work was ever enqueued
    assert!(!process_next_at(&h.ctx, JobStage::Chunk, 2000.0).await.unwrap());
    assert!(!process_next_at(&h.ctx, JobStage::Embed, 2000.0).await.unwrap());
}

// ==================== Scenario: retry bound ====================

#[tokio::test]
async fn retries_never_exceed_max_retries() {
    let extractors = ExtractorSet {
        plain_text: Arc::new(FlakyExtractor {
            failures_left: AtomicUsize::new(usize::MAX),
            inner: PlainTextExtractor,
        }),
        pdf: Arc::new(PdfExtractor),
    };
    let h = harness_with(
        test_config(2, 0, 100),
        Arc::new(HashEmbedder::new(DIM)),
        extractors,
    );
    let tenant = make_tenant(&h.ctx, "acme");
    let document = upload(&h.ctx, &tenant, "doc.txt", b"text.", 0.0).await;

    // Keep advancing the clock far enough that every backoff is due
    let mut now = 0.0;
    for _ in 0..10 {
        process_next_at(&h.ctx, JobStage::Extract, now).await.unwrap();
        now += 1000.0;
    }

    let jobs = h.ctx.db.jobs_for_document(document.document_id).unwrap();
    assert_eq!(jobs[0].status, JobStatus::Dead);
    assert!(jobs[0].retry_count <= jobs[0].max_retries);
    let status = h
        .ctx
        .db
        .get_document(tenant.tenant_id, document.document_id)
        .unwrap()
        .unwrap()
        .status;
    assert_eq!(status, DocumentStatus::Failed);
}

// ==================== Scenario: snapshot short-circuits re-embedding ====================

struct CountingEmbedder {
    inner: HashEmbedder,
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "counting"
    }
}

#[tokio::test]
async fn embed_retry_reads_the_snapshot_instead_of_re_embedding() {
    let embedder = Arc::new(CountingEmbedder {
        inner: HashEmbedder::new(DIM),
        calls: AtomicUsize::new(0),
    });
    let h = harness_with(
        test_config(2, 0, 100),
        embedder.clone(),
        ExtractorSet::standard(),
    );
    let tenant = make_tenant(&h.ctx, "acme");

    // A document already chunked, with an embed job whose previous attempt
    // crashed after writing the snapshot but before the index upsert
    let mut document = Document::new(tenant.tenant_id, "doc.txt".into(), "raw/x".into(), 1);
    document.status = DocumentStatus::Embedding;
    h.ctx.db.insert_document(&document).unwrap();

    let chunks: Vec<Chunk> = (0..2)
        .map(|i| {
            Chunk::new(
                document.document_id,
                tenant.tenant_id,
                i,
                format!("chunk text {}", i),
            )
        })
        .collect();
    h.ctx.db.insert_chunks(&chunks).unwrap();

    let job = Job::new(
        tenant.tenant_id,
        JobPayload::Embed {
            document_id: document.document_id,
            chunk_ids: chunks.iter().map(|c| c.chunk_id).collect(),
            filename: "doc.txt".into(),
        },
        3,
    );
    h.ctx.db.insert_job(&job).unwrap();

    let snapshot = serde_json::json!({
        "chunk_ids": chunks.iter().map(|c| c.chunk_id).collect::<Vec<_>>(),
        "dimension": DIM,
        "vectors": chunks.iter().map(|_| vec![0.5f32; DIM]).collect::<Vec<_>>(),
    });
    h.ctx
        .blobs
        .put(
            &snapshot_path(&job.job_id),
            &serde_json::to_vec(&snapshot).unwrap(),
        )
        .await
        .unwrap();

    h.ctx
        .queue
        .enqueue(tenant.tenant_id, JobStage::Embed, job.job_id, 1.0)
        .unwrap();
    assert!(process_next_at(&h.ctx, JobStage::Embed, 1000.0).await.unwrap());

    // The checkpoint was replayed: no embedder call, document completed
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.ctx.index.count().await.unwrap(), 2);
    let status = h
        .ctx
        .db
        .get_document(tenant.tenant_id, document.document_id)
        .unwrap()
        .unwrap()
        .status;
    assert_eq!(status, DocumentStatus::Completed);

    // Replaying the same job id again is a no-op: the queue entry dedups
    // and the completed job cannot be claimed
    h.ctx
        .queue
        .enqueue(tenant.tenant_id, JobStage::Embed, job.job_id, 1.0)
        .unwrap();
    assert!(process_next_at(&h.ctx, JobStage::Embed, 1000.0).await.unwrap());
    assert_eq!(h.ctx.index.count().await.unwrap(), 2);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

// ==================== Scenario: cross-tenant search isolation ====================

#[tokio::test]
async fn search_never_crosses_tenant_boundaries() {
    let h = harness(test_config(2, 0, 100));
    let tenant_a = make_tenant(&h.ctx, "alpha");
    let tenant_b = make_tenant(&h.ctx, "beta");

    upload(&h.ctx, &tenant_a, "fruit.txt", b"apple orchard harvest.", 1.0).await;
    run_until_idle(&h.ctx, 1000.0).await;

    let for_a = semantic_search(
        &h.ctx.db,
        h.ctx.index.as_ref(),
        h.ctx.embedder.as_ref(),
        tenant_a.tenant_id,
        "apple",
        10,
        0.0,
    )
    .await
    .unwrap();
    assert!(!for_a.is_empty());
    assert!(for_a.iter().any(|r| r.text.contains("apple")));

    let for_b = semantic_search(
        &h.ctx.db,
        h.ctx.index.as_ref(),
        h.ctx.embedder.as_ref(),
        tenant_b.tenant_id,
        "apple",
        10,
        0.0,
    )
    .await
    .unwrap();
    assert!(for_b.is_empty());
}

// ==================== Scenario: empty document ====================

#[tokio::test]
async fn empty_upload_completes_with_zero_chunks() {
    let h = harness(test_config(2, 0, 100));
    let tenant = make_tenant(&h.ctx, "acme");
    let document = upload(&h.ctx, &tenant, "empty.txt", b"", 1.0).await;

    run_until_idle(&h.ctx, 1000.0).await;

    let document = h
        .ctx
        .db
        .get_document(tenant.tenant_id, document.document_id)
        .unwrap()
        .unwrap();
    assert_eq!(document.status, DocumentStatus::Completed);
    assert!(h
        .ctx
        .db
        .chunks_for_document(tenant.tenant_id, document.document_id)
        .unwrap()
        .is_empty());
    assert_eq!(h.ctx.index.count().await.unwrap(), 0);
}

// ==================== Scenario: cascading delete mid-embedding ====================

#[tokio::test]
async fn delete_mid_embedding_removes_everything_and_kills_pending_jobs() {
    let blob_dir = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();

    let mut config = ServiceConfig::default();
    config.chunking.chunk_size = 128;
    config.chunking.chunk_overlap = 0;
    config.embedding.batch_size = 1;
    config.embedding.dimension = DIM;
    config.embedding.model = "hash".to_string();
    config.storage.blob_root = blob_dir.path().to_path_buf();
    config.storage.metadata_db_path = db_dir.path().join("meta.db");

    let state = AppState::new(config).unwrap();
    let ctx = state.pipeline_context();
    let tenant = make_tenant(&ctx, "acme");

    // Enough text for several 128-token chunks: sentences of 50 words
    let mut text = String::new();
    for s in 0..8 {
        for w in 0..50 {
            text.push_str(&format!("word{}x{} ", s, w));
        }
        text.push_str("end. ");
    }
    let document = upload(&ctx, &tenant, "big.txt", text.as_bytes(), 1.0).await;

    // Extract and chunk, then complete only some embed batches
    assert!(process_next_at(&ctx, JobStage::Extract, 1000.0).await.unwrap());
    assert!(process_next_at(&ctx, JobStage::Chunk, 1000.0).await.unwrap());

    let chunks = ctx
        .db
        .chunks_for_document(tenant.tenant_id, document.document_id)
        .unwrap();
    assert!(chunks.len() >= 3, "expected several chunks, got {}", chunks.len());

    assert!(process_next_at(&ctx, JobStage::Embed, 1000.0).await.unwrap());
    assert!(process_next_at(&ctx, JobStage::Embed, 1000.0).await.unwrap());

    let doc_status = ctx
        .db
        .get_document(tenant.tenant_id, document.document_id)
        .unwrap()
        .unwrap()
        .status;
    assert_eq!(doc_status, DocumentStatus::Embedding);

    // Delete while embed jobs are still pending
    let (chunks_deleted, vectors_deleted) = state
        .delete_document_cascade(tenant.tenant_id, document.document_id)
        .await
        .unwrap();
    assert_eq!(chunks_deleted, chunks.len());
    assert_eq!(vectors_deleted, 2);

    // Rows, vectors and blobs are gone
    assert!(ctx
        .db
        .get_document(tenant.tenant_id, document.document_id)
        .unwrap()
        .is_none());
    assert!(ctx
        .db
        .chunks_for_document(tenant.tenant_id, document.document_id)
        .unwrap()
        .is_empty());
    assert!(ctx.db.jobs_for_document(document.document_id).unwrap().is_empty());
    assert_eq!(ctx.index.count().await.unwrap(), 0);
    assert!(!ctx.blobs.exists(&document.blob_path).await.unwrap());

    // Any embed job the queue still surfaces short-circuits without
    // resurrecting vectors
    run_until_idle(&ctx, 2000.0).await;
    assert_eq!(ctx.index.count().await.unwrap(), 0);
}

// ==================== Property: fairness slack over a window ====================

#[tokio::test]
async fn round_robin_completions_stay_within_slack_one() {
    let h = harness(test_config(2, 0, 100));
    let mut tenants = Vec::new();
    for i in 0..3 {
        let tenant = make_tenant(&h.ctx, &format!("tenant-{}", i));
        for d in 0..4 {
            upload(
                &h.ctx,
                &tenant,
                &format!("doc-{}.txt", d),
                b"some text here.",
                1.0,
            )
            .await;
        }
        tenants.push(tenant);
    }

    // Serve 9 extract jobs (3 full cycles); every tenant completes exactly 3
    for _ in 0..9 {
        assert!(process_next_at(&h.ctx, JobStage::Extract, 1000.0).await.unwrap());
    }
    for tenant in &tenants {
        let extracting = h
            .ctx
            .db
            .documents_for_tenant(tenant.tenant_id)
            .unwrap()
            .into_iter()
            .filter(|d| d.status != DocumentStatus::Pending)
            .count();
        assert_eq!(extracting, 3);
    }
}
