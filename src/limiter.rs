//! Per-tenant sliding-window rate limiter
//!
//! Guards API admission on the upload and search endpoints; worker-internal
//! enqueues are never rate limited. Each tenant has a window of admission
//! timestamps; entries older than the window are evicted on every check.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Admitted; the call was recorded against the window
    Ok,
    /// Denied; retry after the given delay
    Denied { retry_after_ms: u64 },
}

/// Sliding-window rate limiter keyed by tenant
pub struct RateLimiter {
    window: Duration,
    buckets: DashMap<Uuid, Mutex<VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buckets: DashMap::new(),
        }
    }

    /// Check and record one admission for the tenant against its limit
    pub fn check(&self, tenant_id: Uuid, limit: u32) -> RateDecision {
        self.check_at(tenant_id, limit, Instant::now())
    }

    /// Admission check with an explicit clock for tests
    pub fn check_at(&self, tenant_id: Uuid, limit: u32, now: Instant) -> RateDecision {
        let bucket = self
            .buckets
            .entry(tenant_id)
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut window = bucket.lock();

        while let Some(front) = window.front() {
            if now.duration_since(*front) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= limit as usize {
            // The oldest entry leaving the window frees the next slot
            let retry_after = window
                .front()
                .map(|front| self.window.saturating_sub(now.duration_since(*front)))
                .unwrap_or(self.window);
            return RateDecision::Denied {
                retry_after_ms: retry_after.as_millis() as u64,
            };
        }

        window.push_back(now);
        RateDecision::Ok
    }

    /// Admissions currently inside the tenant's window
    pub fn current_usage(&self, tenant_id: Uuid) -> usize {
        self.current_usage_at(tenant_id, Instant::now())
    }

    fn current_usage_at(&self, tenant_id: Uuid, now: Instant) -> usize {
        self.buckets
            .get(&tenant_id)
            .map(|bucket| {
                let window = bucket.lock();
                window
                    .iter()
                    .filter(|t| now.duration_since(**t) < self.window)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Drop a tenant's window (tenant deletion)
    pub fn forget(&self, tenant_id: Uuid) {
        self.buckets.remove(&tenant_id);
    }
}
