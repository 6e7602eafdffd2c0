//! Queue substrate: per-(tenant, stage) ordered sets
//!
//! Each set holds job ids keyed by a numeric priority score; lower scores pop
//! first and ties break by insertion order. Backoff is encoded as a deferred
//! score (`now + 2^retry_count` seconds): `pop_min` only returns entries
//! whose score has come due, so no worker ever sleeps on behalf of a retry.
//!
//! The substrate also owns the scheduler's `last_served` rotation pointer so
//! that worker processes sharing the database share one rotation.

pub mod scheduler;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::MetadataDb;
use crate::types::JobStage;

pub use scheduler::StageScheduler;

/// Current queue time in epoch seconds
pub fn queue_now() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_millis()) / 1000.0
}

/// Handle to the per-(tenant, stage) scored sets
#[derive(Clone)]
pub struct JobQueue {
    conn: Arc<Mutex<Connection>>,
}

impl JobQueue {
    /// Attach to the metadata database; queue tables live alongside the job
    /// rows so stage completion and enqueue touch one store
    pub fn new(db: &MetadataDb) -> Self {
        Self {
            conn: db.share_connection(),
        }
    }

    /// Add a job to its tenant's set for the stage. Idempotent on job id:
    /// re-enqueueing an already-queued job is a no-op.
    pub fn enqueue(
        &self,
        tenant_id: Uuid,
        stage: JobStage,
        job_id: Uuid,
        score: f64,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO queue_entries (job_id, tenant_id, stage, score)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                job_id.to_string(),
                tenant_id.to_string(),
                stage.as_str(),
                score
            ],
        )?;
        Ok(())
    }

    /// Atomically remove and return the lowest-scoring due entry for the
    /// tenant at the stage. Entries with a score in the future (backoff) are
    /// not eligible.
    pub fn pop_min(&self, tenant_id: Uuid, stage: JobStage, now: f64) -> Result<Option<Uuid>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let job_id: Option<String> = tx
            .query_row(
                "SELECT job_id FROM queue_entries
                 WHERE tenant_id = ?1 AND stage = ?2 AND score <= ?3
                 ORDER BY score ASC, rowid ASC
                 LIMIT 1",
                params![tenant_id.to_string(), stage.as_str(), now],
                |row| row.get(0),
            )
            .optional()?;
        let Some(job_id) = job_id else {
            return Ok(None);
        };
        tx.execute(
            "DELETE FROM queue_entries WHERE job_id = ?1",
            params![job_id],
        )?;
        tx.commit()?;
        Ok(Some(Uuid::parse_str(&job_id).map_err(|e| {
            crate::error::Error::Database(format!("corrupt queue entry id: {}", e))
        })?))
    }

    /// Remove a specific entry (used by cascading delete)
    pub fn remove(&self, job_id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM queue_entries WHERE job_id = ?1",
            params![job_id.to_string()],
        )?;
        Ok(removed > 0)
    }

    /// Tenants with at least one due entry at the stage, in tenant-id order
    pub fn list_active_tenants(&self, stage: JobStage, now: f64) -> Result<Vec<Uuid>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT tenant_id FROM queue_entries
             WHERE stage = ?1 AND score <= ?2
             ORDER BY tenant_id",
        )?;
        let tenants = stmt
            .query_map(params![stage.as_str(), now], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        tenants
            .into_iter()
            .map(|s| {
                Uuid::parse_str(&s).map_err(|e| {
                    crate::error::Error::Database(format!("corrupt queue tenant id: {}", e))
                })
            })
            .collect()
    }

    /// Pending entries for a tenant at a stage, due or not
    pub fn len(&self, tenant_id: Uuid, stage: JobStage) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM queue_entries WHERE tenant_id = ?1 AND stage = ?2",
            params![tenant_id.to_string(), stage.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Total depth of a stage across all tenants
    pub fn stage_depth(&self, stage: JobStage) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM queue_entries WHERE stage = ?1",
            params![stage.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// The tenant served last at this stage, shared across worker processes
    pub fn cursor(&self, stage: JobStage) -> Result<Option<Uuid>> {
        let conn = self.conn.lock();
        let value: Option<String> = conn
            .query_row(
                "SELECT last_served FROM scheduler_cursor WHERE stage = ?1",
                params![stage.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(|s| Uuid::parse_str(&s).ok()))
    }

    /// Record the tenant just served at this stage
    pub fn set_cursor(&self, stage: JobStage, tenant_id: Uuid) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO scheduler_cursor (stage, last_served) VALUES (?1, ?2)
             ON CONFLICT(stage) DO UPDATE SET last_served = excluded.last_served",
            params![stage.as_str(), tenant_id.to_string()],
        )?;
        Ok(())
    }
}
