//! Round-robin stage scheduler
//!
//! Picks the next (tenant, job) for a worker to serve. Fairness comes from
//! rotating the active-tenant set, resuming just after the last tenant
//! served; priority order within each tenant is the queue's own score order.
//! A job enqueued with k other tenants continuously active is therefore
//! served within at most k worker cycles.

use uuid::Uuid;

use crate::error::Result;
use crate::storage::MetadataDb;
use crate::types::JobStage;

use super::{queue_now, JobQueue};

/// Scheduler over the queue substrate
#[derive(Clone)]
pub struct StageScheduler {
    queue: JobQueue,
    db: MetadataDb,
    /// Optional per-tenant in-flight cap per stage
    per_tenant_cap: Option<usize>,
}

impl StageScheduler {
    pub fn new(queue: JobQueue, db: MetadataDb, per_tenant_cap: Option<usize>) -> Self {
        Self {
            queue,
            db,
            per_tenant_cap,
        }
    }

    /// Next (tenant, job) due at the stage, or None if every tenant is idle,
    /// deferred, or capped. Does not block; the worker loop owns the idle
    /// backoff.
    pub fn next_ready(&self, stage: JobStage) -> Result<Option<(Uuid, Uuid)>> {
        self.next_ready_at(stage, queue_now())
    }

    /// Same as [`next_ready`] with an explicit clock, so tests can drive
    /// backoff expiry deterministically.
    pub fn next_ready_at(&self, stage: JobStage, now: f64) -> Result<Option<(Uuid, Uuid)>> {
        let active = self.queue.list_active_tenants(stage, now)?;
        if active.is_empty() {
            return Ok(None);
        }

        // Resume the rotation just after the last tenant served. The cursor
        // tenant may no longer be active; partition_point still lands on the
        // right successor in the sorted set.
        let start = match self.queue.cursor(stage)? {
            Some(last) => active.partition_point(|t| *t <= last),
            None => 0,
        };

        for offset in 0..active.len() {
            let tenant = active[(start + offset) % active.len()];
            if let Some(cap) = self.per_tenant_cap {
                if self.db.count_processing(tenant, stage)? >= cap {
                    continue;
                }
            }
            // A racing worker may drain the tenant between the snapshot and
            // the pop; just move on to the next tenant.
            if let Some(job_id) = self.queue.pop_min(tenant, stage, now)? {
                self.queue.set_cursor(stage, tenant)?;
                return Ok(Some((tenant, job_id)));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Document, Job, JobPayload};

    fn setup() -> (MetadataDb, JobQueue, StageScheduler) {
        let db = MetadataDb::in_memory().unwrap();
        let queue = JobQueue::new(&db);
        let scheduler = StageScheduler::new(queue.clone(), db.clone(), None);
        (db, queue, scheduler)
    }

    fn enqueue_n(queue: &JobQueue, tenant: Uuid, stage: JobStage, n: usize, base_score: f64) {
        for i in 0..n {
            queue
                .enqueue(tenant, stage, Uuid::new_v4(), base_score + i as f64)
                .unwrap();
        }
    }

    #[test]
    fn alternates_between_continuously_active_tenants() {
        let (_db, queue, scheduler) = setup();
        let mut tenants = [Uuid::new_v4(), Uuid::new_v4()];
        tenants.sort();

        enqueue_n(&queue, tenants[0], JobStage::Extract, 3, 1.0);
        enqueue_n(&queue, tenants[1], JobStage::Extract, 3, 1.0);

        let mut served = Vec::new();
        for _ in 0..6 {
            let (tenant, _) = scheduler
                .next_ready_at(JobStage::Extract, 100.0)
                .unwrap()
                .unwrap();
            served.push(tenant);
        }

        // Strict alternation while both stay active
        for pair in served.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert_eq!(served.iter().filter(|t| **t == tenants[0]).count(), 3);
        assert_eq!(served.iter().filter(|t| **t == tenants[1]).count(), 3);
    }

    #[test]
    fn late_tenant_is_served_within_one_cycle() {
        let (_db, queue, scheduler) = setup();
        let bulk = Uuid::new_v4();
        let small = Uuid::new_v4();

        // A bulk uploader enqueues 100 documents first
        enqueue_n(&queue, bulk, JobStage::Extract, 100, 1.0);
        // Then a second tenant enqueues a single document
        enqueue_n(&queue, small, JobStage::Extract, 1, 200.0);

        let (first, _) = scheduler
            .next_ready_at(JobStage::Extract, 1000.0)
            .unwrap()
            .unwrap();
        let (second, _) = scheduler
            .next_ready_at(JobStage::Extract, 1000.0)
            .unwrap()
            .unwrap();

        // The small tenant's job starts no later than after bulk's first job
        assert!(first != second);
        assert!(first == small || second == small);
    }

    #[test]
    fn rotation_survives_tenant_exhaustion() {
        let (_db, queue, scheduler) = setup();
        let mut tenants = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        tenants.sort();

        enqueue_n(&queue, tenants[0], JobStage::Chunk, 1, 1.0);
        enqueue_n(&queue, tenants[1], JobStage::Chunk, 2, 1.0);
        enqueue_n(&queue, tenants[2], JobStage::Chunk, 2, 1.0);

        let mut served = Vec::new();
        while let Some((tenant, _)) = scheduler.next_ready_at(JobStage::Chunk, 100.0).unwrap() {
            served.push(tenant);
        }

        assert_eq!(served.len(), 5);
        // First full cycle visits everyone once
        assert_eq!(
            {
                let mut cycle = served[..3].to_vec();
                cycle.sort();
                cycle
            },
            tenants.to_vec()
        );
        // After tenant 0 drains, the rotation keeps alternating 1 and 2
        assert_ne!(served[3], served[4]);
    }

    #[test]
    fn priority_within_tenant_is_score_order() {
        let (_db, queue, scheduler) = setup();
        let tenant = Uuid::new_v4();
        let urgent = Uuid::new_v4();
        let routine = Uuid::new_v4();

        queue.enqueue(tenant, JobStage::Embed, routine, 50.0).unwrap();
        queue.enqueue(tenant, JobStage::Embed, urgent, 10.0).unwrap();

        let (_, first) = scheduler
            .next_ready_at(JobStage::Embed, 100.0)
            .unwrap()
            .unwrap();
        assert_eq!(first, urgent);
    }

    #[test]
    fn capped_tenant_is_skipped_in_rotation() {
        let db = MetadataDb::in_memory().unwrap();
        let queue = JobQueue::new(&db);
        let scheduler = StageScheduler::new(queue.clone(), db.clone(), Some(1));

        let tenant_busy = crate::types::Tenant::new("busy".into(), "h1".into(), 100);
        let tenant_idle = crate::types::Tenant::new("idle".into(), "h2".into(), 100);
        db.insert_tenant(&tenant_busy).unwrap();
        db.insert_tenant(&tenant_idle).unwrap();

        // Give the busy tenant one in-flight extract job
        let document = Document::new(
            tenant_busy.tenant_id,
            "a.txt".into(),
            "raw/a/a.txt".into(),
            1,
        );
        db.insert_document(&document).unwrap();
        let inflight = Job::new(
            tenant_busy.tenant_id,
            JobPayload::Extract {
                document_id: document.document_id,
                blob_path: document.blob_path.clone(),
                filename: document.filename.clone(),
            },
            3,
        );
        db.insert_job(&inflight).unwrap();
        db.claim_job(inflight.job_id).unwrap();

        enqueue_n(&queue, tenant_busy.tenant_id, JobStage::Extract, 2, 1.0);
        enqueue_n(&queue, tenant_idle.tenant_id, JobStage::Extract, 1, 1.0);

        // Only the idle tenant is eligible while busy sits at its cap
        let (served, _) = scheduler
            .next_ready_at(JobStage::Extract, 100.0)
            .unwrap()
            .unwrap();
        assert_eq!(served, tenant_idle.tenant_id);
        assert!(scheduler
            .next_ready_at(JobStage::Extract, 100.0)
            .unwrap()
            .is_none());
    }
}
