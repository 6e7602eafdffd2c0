//! SQLite metadata store
//!
//! Source of truth for tenants, documents, chunks and jobs. All state
//! transitions are conditional updates (`UPDATE … WHERE status = ?`) so that
//! racing workers cannot double-apply a transition and document status can
//! never regress.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{
    Chunk, Document, DocumentStatus, Job, JobPayload, JobStage, JobStatus, Tenant,
};

/// SQLite-backed metadata store
#[derive(Clone)]
pub struct MetadataDb {
    conn: Arc<Mutex<Connection>>,
}

impl MetadataDb {
    /// Create or open the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Database(format!("Failed to create db directory: {}", e)))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::Database(format!("Failed to open database: {}", e)))?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("Failed to open in-memory database: {}", e)))?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Shared connection handle for the queue substrate, which lives in the
    /// same database so that scaled-out workers share one rotation pointer
    pub(crate) fn share_connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                tenant_id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                api_key_hash TEXT NOT NULL UNIQUE,
                rate_limit_per_minute INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                document_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                blob_path TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                status TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_tenant ON documents(tenant_id);
            CREATE INDEX IF NOT EXISTS idx_documents_tenant_status ON documents(tenant_id, status);

            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                vector_snapshot_path TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                UNIQUE(document_id, chunk_index)
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
            CREATE INDEX IF NOT EXISTS idx_chunks_tenant ON chunks(tenant_id);

            CREATE TABLE IF NOT EXISTS jobs (
                job_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                status TEXT NOT NULL,
                payload TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_document ON jobs(document_id);
            CREATE INDEX IF NOT EXISTS idx_jobs_tenant_stage_status ON jobs(tenant_id, stage, status);

            CREATE TABLE IF NOT EXISTS queue_entries (
                job_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                score REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_queue_stage_tenant_score
                ON queue_entries(stage, tenant_id, score);

            CREATE TABLE IF NOT EXISTS scheduler_cursor (
                stage TEXT PRIMARY KEY,
                last_served TEXT NOT NULL
            );
            "#,
        )?;
        tracing::info!("Metadata store migrations complete");
        Ok(())
    }

    // ==================== Tenants ====================

    pub fn insert_tenant(&self, tenant: &Tenant) -> Result<()> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO tenants
                 (tenant_id, name, api_key_hash, rate_limit_per_minute, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tenant.tenant_id.to_string(),
                tenant.name,
                tenant.api_key_hash,
                tenant.rate_limit_per_minute,
                tenant.created_at.to_rfc3339(),
            ],
        )?;
        if inserted == 0 {
            return Err(Error::Validation(format!(
                "Tenant '{}' already exists",
                tenant.name
            )));
        }
        Ok(())
    }

    pub fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>> {
        let conn = self.conn.lock();
        let tenant = conn
            .query_row(
                "SELECT tenant_id, name, api_key_hash, rate_limit_per_minute, created_at
                 FROM tenants WHERE tenant_id = ?1",
                params![tenant_id.to_string()],
                row_to_tenant,
            )
            .optional()?;
        Ok(tenant)
    }

    pub fn get_tenant_by_key_hash(&self, api_key_hash: &str) -> Result<Option<Tenant>> {
        let conn = self.conn.lock();
        let tenant = conn
            .query_row(
                "SELECT tenant_id, name, api_key_hash, rate_limit_per_minute, created_at
                 FROM tenants WHERE api_key_hash = ?1",
                params![api_key_hash],
                row_to_tenant,
            )
            .optional()?;
        Ok(tenant)
    }

    pub fn get_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>> {
        let conn = self.conn.lock();
        let tenant = conn
            .query_row(
                "SELECT tenant_id, name, api_key_hash, rate_limit_per_minute, created_at
                 FROM tenants WHERE name = ?1",
                params![name],
                row_to_tenant,
            )
            .optional()?;
        Ok(tenant)
    }

    pub fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT tenant_id, name, api_key_hash, rate_limit_per_minute, created_at
             FROM tenants ORDER BY created_at DESC",
        )?;
        let tenants = stmt
            .query_map([], row_to_tenant)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tenants)
    }

    /// Credential rotation; the only mutation tenants support
    pub fn rotate_tenant_key(&self, tenant_id: Uuid, api_key_hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE tenants SET api_key_hash = ?2 WHERE tenant_id = ?1",
            params![tenant_id.to_string(), api_key_hash],
        )?;
        Ok(updated > 0)
    }

    pub fn delete_tenant_row(&self, tenant_id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM tenants WHERE tenant_id = ?1",
            params![tenant_id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    // ==================== Documents ====================

    pub fn insert_document(&self, document: &Document) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO documents
                 (document_id, tenant_id, filename, blob_path, size_bytes, status,
                  metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                document.document_id.to_string(),
                document.tenant_id.to_string(),
                document.filename,
                document.blob_path,
                document.size_bytes as i64,
                document.status.as_str(),
                serde_json::to_string(&document.metadata)?,
                document.created_at.to_rfc3339(),
                document.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Tenant-scoped lookup; returns nothing for foreign documents
    pub fn get_document(&self, tenant_id: Uuid, document_id: Uuid) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let document = conn
            .query_row(
                "SELECT document_id, tenant_id, filename, blob_path, size_bytes, status,
                        metadata, created_at, updated_at
                 FROM documents WHERE document_id = ?1 AND tenant_id = ?2",
                params![document_id.to_string(), tenant_id.to_string()],
                row_to_document,
            )
            .optional()?;
        Ok(document)
    }

    /// Cross-tenant lookup for the internal scope
    pub fn get_document_any(&self, document_id: Uuid) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let document = conn
            .query_row(
                "SELECT document_id, tenant_id, filename, blob_path, size_bytes, status,
                        metadata, created_at, updated_at
                 FROM documents WHERE document_id = ?1",
                params![document_id.to_string()],
                row_to_document,
            )
            .optional()?;
        Ok(document)
    }

    /// List documents with optional tenant and status filters (internal scope)
    pub fn list_documents(
        &self,
        tenant_id: Option<Uuid>,
        status: Option<DocumentStatus>,
        limit: usize,
    ) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        let mut sql = String::from(
            "SELECT document_id, tenant_id, filename, blob_path, size_bytes, status,
                    metadata, created_at, updated_at
             FROM documents WHERE 1=1",
        );
        let mut bindings: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(tenant_id) = tenant_id {
            sql.push_str(&format!(" AND tenant_id = ?{}", bindings.len() + 1));
            bindings.push(tenant_id.to_string().into());
        }
        if let Some(status) = status {
            sql.push_str(&format!(" AND status = ?{}", bindings.len() + 1));
            bindings.push(status.as_str().to_string().into());
        }
        sql.push_str(&format!(
            " ORDER BY created_at DESC LIMIT ?{}",
            bindings.len() + 1
        ));
        bindings.push((limit as i64).into());

        let mut stmt = conn.prepare(&sql)?;
        let documents = stmt
            .query_map(params_from_iter(bindings.iter()), row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(documents)
    }

    pub fn documents_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT document_id, tenant_id, filename, blob_path, size_bytes, status,
                    metadata, created_at, updated_at
             FROM documents WHERE tenant_id = ?1",
        )?;
        let documents = stmt
            .query_map(params![tenant_id.to_string()], row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(documents)
    }

    /// Conditional monotonic status advance. Returns false if the document is
    /// no longer in `from` (raced, failed, or deleted); callers treat that as
    /// already-served and move on.
    pub fn advance_document_status(
        &self,
        document_id: Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE documents SET status = ?3, updated_at = ?4
             WHERE document_id = ?1 AND status = ?2",
            params![
                document_id.to_string(),
                from.as_str(),
                to.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(updated > 0)
    }

    /// Fail a document from any non-terminal state
    pub fn mark_document_failed(&self, document_id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE documents SET status = 'failed', updated_at = ?2
             WHERE document_id = ?1
               AND status NOT IN ('completed', 'failed', 'failed_deletion')",
            params![document_id.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(updated > 0)
    }

    /// Mark a document whose cascade delete stopped partway; a reconciler can
    /// retry the delete later
    pub fn mark_document_failed_deletion(&self, document_id: Uuid) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE documents SET status = 'failed_deletion', updated_at = ?2
             WHERE document_id = ?1",
            params![document_id.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn delete_document_row(&self, document_id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM documents WHERE document_id = ?1",
            params![document_id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    /// Per-tenant usage counters for `/metrics/me`
    pub fn tenant_usage(&self, tenant_id: Uuid) -> Result<TenantUsage> {
        let conn = self.conn.lock();
        let tenant = tenant_id.to_string();
        let document_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE tenant_id = ?1",
            params![tenant],
            |row| row.get(0),
        )?;
        let chunk_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE tenant_id = ?1",
            params![tenant],
            |row| row.get(0),
        )?;
        let storage_used: i64 = conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM documents WHERE tenant_id = ?1",
            params![tenant],
            |row| row.get(0),
        )?;
        let last_upload: Option<String> = conn.query_row(
            "SELECT MAX(created_at) FROM documents WHERE tenant_id = ?1",
            params![tenant],
            |row| row.get(0),
        )?;
        Ok(TenantUsage {
            document_count: document_count as usize,
            chunk_count: chunk_count as usize,
            storage_used_bytes: storage_used as u64,
            last_upload: last_upload.and_then(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .ok()
                    .map(|d| d.with_timezone(&Utc))
            }),
        })
    }

    pub fn document_status_counts(&self) -> Result<HashMap<String, usize>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM documents GROUP BY status")?;
        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(counts)
    }

    // ==================== Chunks ====================

    /// Insert a document's chunks in one transaction
    pub fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks
                     (chunk_id, document_id, tenant_id, chunk_index, text,
                      vector_snapshot_path, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    chunk.chunk_id.to_string(),
                    chunk.document_id.to_string(),
                    chunk.tenant_id.to_string(),
                    chunk.chunk_index,
                    chunk.text,
                    chunk.vector_snapshot_path,
                    serde_json::to_string(&chunk.metadata)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Load chunks by id, tenant-scoped, ordered by chunk_index
    pub fn get_chunks_by_ids(&self, tenant_id: Uuid, chunk_ids: &[Uuid]) -> Result<Vec<Chunk>> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let placeholders = vec!["?"; chunk_ids.len()].join(", ");
        let sql = format!(
            "SELECT chunk_id, document_id, tenant_id, chunk_index, text,
                    vector_snapshot_path, metadata
             FROM chunks
             WHERE tenant_id = ? AND chunk_id IN ({})
             ORDER BY chunk_index",
            placeholders
        );
        let mut bindings = vec![tenant_id.to_string()];
        bindings.extend(chunk_ids.iter().map(|id| id.to_string()));
        let mut stmt = conn.prepare(&sql)?;
        let chunks = stmt
            .query_map(params_from_iter(bindings.iter()), row_to_chunk)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    pub fn chunks_for_document(&self, tenant_id: Uuid, document_id: Uuid) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT chunk_id, document_id, tenant_id, chunk_index, text,
                    vector_snapshot_path, metadata
             FROM chunks WHERE tenant_id = ?1 AND document_id = ?2
             ORDER BY chunk_index",
        )?;
        let chunks = stmt
            .query_map(
                params![tenant_id.to_string(), document_id.to_string()],
                row_to_chunk,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    pub fn get_chunk(&self, tenant_id: Uuid, chunk_id: Uuid) -> Result<Option<Chunk>> {
        let conn = self.conn.lock();
        let chunk = conn
            .query_row(
                "SELECT chunk_id, document_id, tenant_id, chunk_index, text,
                        vector_snapshot_path, metadata
                 FROM chunks WHERE chunk_id = ?1 AND tenant_id = ?2",
                params![chunk_id.to_string(), tenant_id.to_string()],
                row_to_chunk,
            )
            .optional()?;
        Ok(chunk)
    }

    /// Cross-tenant chunk lookup for the internal scope
    pub fn get_chunk_any(&self, chunk_id: Uuid) -> Result<Option<Chunk>> {
        let conn = self.conn.lock();
        let chunk = conn
            .query_row(
                "SELECT chunk_id, document_id, tenant_id, chunk_index, text,
                        vector_snapshot_path, metadata
                 FROM chunks WHERE chunk_id = ?1",
                params![chunk_id.to_string()],
                row_to_chunk,
            )
            .optional()?;
        Ok(chunk)
    }

    pub fn delete_chunks_for_document(&self, document_id: Uuid) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM chunks WHERE document_id = ?1",
            params![document_id.to_string()],
        )?;
        Ok(deleted)
    }

    // ==================== Jobs ====================

    pub fn insert_job(&self, job: &Job) -> Result<()> {
        let conn = self.conn.lock();
        insert_job_inner(&conn, job)?;
        Ok(())
    }

    pub fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        let conn = self.conn.lock();
        let job = conn
            .query_row(
                "SELECT job_id, tenant_id, document_id, stage, status, payload,
                        retry_count, max_retries, error_message, created_at, updated_at
                 FROM jobs WHERE job_id = ?1",
                params![job_id.to_string()],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    /// Lease fence: `pending -> processing` as a conditional update. Two
    /// workers holding the same popped job id cannot both win.
    pub fn claim_job(&self, job_id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE jobs SET status = 'processing', updated_at = ?2
             WHERE job_id = ?1 AND status = 'pending'",
            params![job_id.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(updated > 0)
    }

    /// Retryable failure: back to `pending` with the bumped retry count; the
    /// caller re-enqueues with a backoff-deferred score
    pub fn fail_job_retry(&self, job_id: Uuid, retry_count: u32, error: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE jobs SET status = 'pending', retry_count = ?2, error_message = ?3,
                             updated_at = ?4
             WHERE job_id = ?1 AND status = 'processing'",
            params![
                job_id.to_string(),
                retry_count,
                error,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(updated > 0)
    }

    /// Terminal failure; dead jobs are retained for operator inspection
    pub fn fail_job_dead(&self, job_id: Uuid, retry_count: u32, error: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE jobs SET status = 'dead', retry_count = ?2, error_message = ?3,
                             updated_at = ?4
             WHERE job_id = ?1 AND status IN ('pending', 'processing')",
            params![
                job_id.to_string(),
                retry_count,
                error,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(updated > 0)
    }

    pub fn jobs_for_document(&self, document_id: Uuid) -> Result<Vec<Job>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT job_id, tenant_id, document_id, stage, status, payload,
                    retry_count, max_retries, error_message, created_at, updated_at
             FROM jobs WHERE document_id = ?1 ORDER BY created_at",
        )?;
        let jobs = stmt
            .query_map(params![document_id.to_string()], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    pub fn delete_jobs_for_document(&self, document_id: Uuid) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM jobs WHERE document_id = ?1",
            params![document_id.to_string()],
        )?;
        Ok(deleted)
    }

    /// In-flight jobs for a tenant at a stage; used for the per-tenant
    /// concurrency cap
    pub fn count_processing(&self, tenant_id: Uuid, stage: JobStage) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs
             WHERE tenant_id = ?1 AND stage = ?2 AND status = 'processing'",
            params![tenant_id.to_string(), stage.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn job_status_counts(&self) -> Result<HashMap<String, usize>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(counts)
    }

    // ==================== Stage completion transactions ====================

    /// Extract stage completion: advance the document to `chunking`, complete
    /// the extract job and insert the successor chunk job, all in one
    /// transaction. Returns false (rolled back) if the document was no longer
    /// in `extracting`.
    pub fn complete_extract_stage(
        &self,
        job_id: Uuid,
        document_id: Uuid,
        chunk_job: &Job,
    ) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let advanced = tx.execute(
            "UPDATE documents SET status = 'chunking', updated_at = ?2
             WHERE document_id = ?1 AND status = 'extracting'",
            params![document_id.to_string(), Utc::now().to_rfc3339()],
        )?;
        if advanced == 0 {
            return Ok(false);
        }
        complete_job_inner(&tx, job_id)?;
        insert_job_inner(&tx, chunk_job)?;
        tx.commit()?;
        Ok(true)
    }

    /// Chunk stage completion: insert chunk rows, advance the document (to
    /// `embedding`, or straight to `completed` for empty text), complete the
    /// chunk job and insert the embed jobs, all in one transaction.
    pub fn complete_chunk_stage(
        &self,
        job_id: Uuid,
        document_id: Uuid,
        chunks: &[Chunk],
        embed_jobs: &[Job],
    ) -> Result<bool> {
        let to = if chunks.is_empty() {
            DocumentStatus::Completed
        } else {
            DocumentStatus::Embedding
        };
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let advanced = tx.execute(
            "UPDATE documents SET status = ?3, updated_at = ?2
             WHERE document_id = ?1 AND status = 'chunking'",
            params![
                document_id.to_string(),
                Utc::now().to_rfc3339(),
                to.as_str()
            ],
        )?;
        if advanced == 0 {
            return Ok(false);
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks
                     (chunk_id, document_id, tenant_id, chunk_index, text,
                      vector_snapshot_path, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    chunk.chunk_id.to_string(),
                    chunk.document_id.to_string(),
                    chunk.tenant_id.to_string(),
                    chunk.chunk_index,
                    chunk.text,
                    chunk.vector_snapshot_path,
                    serde_json::to_string(&chunk.metadata)?,
                ])?;
            }
        }
        complete_job_inner(&tx, job_id)?;
        for job in embed_jobs {
            insert_job_inner(&tx, job)?;
        }
        tx.commit()?;
        Ok(true)
    }

    /// Embed batch completion: record the snapshot path on the affected
    /// chunks, complete the embed job, and atomically check whether every
    /// chunk of the document now carries a snapshot path; if so the document
    /// advances to `completed`. Returns whether the document completed.
    pub fn complete_embed_batch(
        &self,
        job_id: Uuid,
        tenant_id: Uuid,
        document_id: Uuid,
        chunk_ids: &[Uuid],
        snapshot_path: &str,
    ) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE chunks SET vector_snapshot_path = ?3
                 WHERE chunk_id = ?1 AND tenant_id = ?2",
            )?;
            for chunk_id in chunk_ids {
                stmt.execute(params![
                    chunk_id.to_string(),
                    tenant_id.to_string(),
                    snapshot_path
                ])?;
            }
        }
        complete_job_inner(&tx, job_id)?;

        let (total, embedded): (i64, i64) = tx.query_row(
            "SELECT COUNT(*), COUNT(vector_snapshot_path)
             FROM chunks WHERE document_id = ?1",
            params![document_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let mut document_completed = false;
        if total > 0 && total == embedded {
            let advanced = tx.execute(
                "UPDATE documents SET status = 'completed', updated_at = ?2
                 WHERE document_id = ?1 AND status = 'embedding'",
                params![document_id.to_string(), Utc::now().to_rfc3339()],
            )?;
            document_completed = advanced > 0;
        }
        tx.commit()?;
        Ok(document_completed)
    }
}

/// Per-tenant usage counters
#[derive(Debug, Clone)]
pub struct TenantUsage {
    pub document_count: usize,
    pub chunk_count: usize,
    pub storage_used_bytes: u64,
    pub last_upload: Option<DateTime<Utc>>,
}

// Row mappers and helpers

fn insert_job_inner(conn: &Connection, job: &Job) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO jobs
             (job_id, tenant_id, document_id, stage, status, payload,
              retry_count, max_retries, error_message, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            job.job_id.to_string(),
            job.tenant_id.to_string(),
            job.document_id.to_string(),
            job.stage.as_str(),
            job.status.as_str(),
            serde_json::to_string(&job.payload)
                .map_err(|e| conversion_error(5, e.to_string()))?,
            job.retry_count,
            job.max_retries,
            job.error_message,
            job.created_at.to_rfc3339(),
            job.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn complete_job_inner(conn: &Connection, job_id: Uuid) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE jobs SET status = 'completed', error_message = NULL, updated_at = ?2
         WHERE job_id = ?1 AND status = 'processing'",
        params![job_id.to_string(), Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn uuid_column(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let value: String = row.get(idx)?;
    Uuid::parse_str(&value).map_err(|e| conversion_error(idx, e.to_string()))
}

fn datetime_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e.to_string()))
}

fn metadata_column(
    row: &Row,
    idx: usize,
) -> rusqlite::Result<HashMap<String, serde_json::Value>> {
    let value: String = row.get(idx)?;
    serde_json::from_str(&value).map_err(|e| conversion_error(idx, e.to_string()))
}

fn row_to_tenant(row: &Row) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        tenant_id: uuid_column(row, 0)?,
        name: row.get(1)?,
        api_key_hash: row.get(2)?,
        rate_limit_per_minute: row.get(3)?,
        created_at: datetime_column(row, 4)?,
    })
}

fn row_to_document(row: &Row) -> rusqlite::Result<Document> {
    let status_str: String = row.get(5)?;
    Ok(Document {
        document_id: uuid_column(row, 0)?,
        tenant_id: uuid_column(row, 1)?,
        filename: row.get(2)?,
        blob_path: row.get(3)?,
        size_bytes: row.get::<_, i64>(4)? as u64,
        status: DocumentStatus::parse(&status_str)
            .ok_or_else(|| conversion_error(5, format!("unknown status '{}'", status_str)))?,
        metadata: metadata_column(row, 6)?,
        created_at: datetime_column(row, 7)?,
        updated_at: datetime_column(row, 8)?,
    })
}

fn row_to_chunk(row: &Row) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        chunk_id: uuid_column(row, 0)?,
        document_id: uuid_column(row, 1)?,
        tenant_id: uuid_column(row, 2)?,
        chunk_index: row.get(3)?,
        text: row.get(4)?,
        vector_snapshot_path: row.get(5)?,
        metadata: metadata_column(row, 6)?,
    })
}

fn row_to_job(row: &Row) -> rusqlite::Result<Job> {
    let stage_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let payload_str: String = row.get(5)?;
    Ok(Job {
        job_id: uuid_column(row, 0)?,
        tenant_id: uuid_column(row, 1)?,
        document_id: uuid_column(row, 2)?,
        stage: JobStage::parse(&stage_str)
            .ok_or_else(|| conversion_error(3, format!("unknown stage '{}'", stage_str)))?,
        status: JobStatus::parse(&status_str)
            .ok_or_else(|| conversion_error(4, format!("unknown status '{}'", status_str)))?,
        payload: serde_json::from_str::<JobPayload>(&payload_str)
            .map_err(|e| conversion_error(5, e.to_string()))?,
        retry_count: row.get(6)?,
        max_retries: row.get(7)?,
        error_message: row.get(8)?,
        created_at: datetime_column(row, 9)?,
        updated_at: datetime_column(row, 10)?,
    })
}
