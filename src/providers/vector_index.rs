//! Vector index capability
//!
//! Approximate-nearest-neighbor search over chunk embeddings. Every point
//! carries its tenant in the payload and tenant-scoped search applies the
//! tenant filter inside the index, so a forgotten filter cannot leak foreign
//! vectors. Point id = chunk id, which makes upserts idempotent.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Payload stored with every vector point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointPayload {
    pub tenant_id: Uuid,
    pub document_id: Uuid,
    pub chunk_id: Uuid,
    pub filename: String,
    pub chunk_index: u32,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A vector point; `point_id` equals the chunk id
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub point_id: Uuid,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// A search hit with its cosine similarity (higher is better)
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub payload: PointPayload,
    pub score: f32,
}

/// Trait for vector storage and similarity search
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace points by point id
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()>;

    /// Tenant-scoped similarity search; the tenant filter is mandatory
    async fn search(
        &self,
        query: &[f32],
        tenant_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    /// Cross-tenant search for the internal scope
    async fn search_unfiltered(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredPoint>>;

    /// Delete every point of a document, tenant-scoped; returns how many
    async fn delete_by_document(&self, tenant_id: Uuid, document_id: Uuid) -> Result<usize>;

    /// Delete every point of a tenant; returns how many
    async fn delete_by_tenant(&self, tenant_id: Uuid) -> Result<usize>;

    /// Total points stored
    async fn count(&self) -> Result<usize>;

    /// Check if the index is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Index name for logging
    fn name(&self) -> &str;
}

/// In-process cosine index
///
/// Brute-force scan over tenant-tagged points. Process-lifetime storage; the
/// durable copies are the per-job vector snapshots in the blob store, and
/// re-ingestion rebuilds the index.
pub struct LocalVectorIndex {
    dimension: usize,
    points: DashMap<Uuid, VectorPoint>,
}

impl LocalVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            points: DashMap::new(),
        }
    }

    fn scored<F>(&self, query: &[f32], limit: usize, filter: F) -> Result<Vec<ScoredPoint>>
    where
        F: Fn(&VectorPoint) -> bool,
    {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let mut hits: Vec<ScoredPoint> = self
            .points
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| ScoredPoint {
                payload: entry.value().payload.clone(),
                score: cosine_similarity(query, &entry.value().vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[async_trait]
impl VectorIndex for LocalVectorIndex {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        for point in &points {
            if point.vector.len() != self.dimension {
                return Err(Error::DimensionMismatch {
                    expected: self.dimension,
                    actual: point.vector.len(),
                });
            }
        }
        for point in points {
            self.points.insert(point.point_id, point);
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        tenant_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        self.scored(query, limit, |point| point.payload.tenant_id == tenant_id)
    }

    async fn search_unfiltered(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        self.scored(query, limit, |_| true)
    }

    async fn delete_by_document(&self, tenant_id: Uuid, document_id: Uuid) -> Result<usize> {
        let victims: Vec<Uuid> = self
            .points
            .iter()
            .filter(|entry| {
                entry.value().payload.tenant_id == tenant_id
                    && entry.value().payload.document_id == document_id
            })
            .map(|entry| *entry.key())
            .collect();
        for id in &victims {
            self.points.remove(id);
        }
        Ok(victims.len())
    }

    async fn delete_by_tenant(&self, tenant_id: Uuid) -> Result<usize> {
        let victims: Vec<Uuid> = self
            .points
            .iter()
            .filter(|entry| entry.value().payload.tenant_id == tenant_id)
            .map(|entry| *entry.key())
            .collect();
        for id in &victims {
            self.points.remove(id);
        }
        Ok(victims.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.points.len())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "local-cosine"
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(tenant_id: Uuid, document_id: Uuid, vector: Vec<f32>) -> VectorPoint {
        let chunk_id = Uuid::new_v4();
        VectorPoint {
            point_id: chunk_id,
            vector,
            payload: PointPayload {
                tenant_id,
                document_id,
                chunk_id,
                filename: "doc.txt".to_string(),
                chunk_index: 0,
                metadata: HashMap::new(),
            },
        }
    }

    #[tokio::test]
    async fn search_is_tenant_scoped() {
        let index = LocalVectorIndex::new(2);
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();
        let doc = Uuid::new_v4();

        index
            .upsert(vec![
                point(tenant_a, doc, vec![1.0, 0.0]),
                point(tenant_b, doc, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], tenant_a, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload.tenant_id, tenant_a);

        let all = index.search_unfiltered(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn results_are_ordered_by_similarity() {
        let index = LocalVectorIndex::new(2);
        let tenant = Uuid::new_v4();
        let doc = Uuid::new_v4();

        index
            .upsert(vec![
                point(tenant, doc, vec![0.0, 1.0]),
                point(tenant, doc, vec![1.0, 0.0]),
                point(tenant, doc, vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], tenant, 3).await.unwrap();
        assert!(hits[0].score >= hits[1].score);
        assert!(hits[1].score >= hits[2].score);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_point_id() {
        let index = LocalVectorIndex::new(2);
        let tenant = Uuid::new_v4();
        let doc = Uuid::new_v4();
        let p = point(tenant, doc, vec![1.0, 0.0]);

        index.upsert(vec![p.clone()]).await.unwrap();
        index.upsert(vec![p]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_by_document_only_touches_that_document() {
        let index = LocalVectorIndex::new(2);
        let tenant = Uuid::new_v4();
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();

        index
            .upsert(vec![
                point(tenant, doc_a, vec![1.0, 0.0]),
                point(tenant, doc_a, vec![0.0, 1.0]),
                point(tenant, doc_b, vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let deleted = index.delete_by_document(tenant, doc_a).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rejects_mismatched_dimensions() {
        let index = LocalVectorIndex::new(3);
        let tenant = Uuid::new_v4();
        let doc = Uuid::new_v4();

        let err = index
            .upsert(vec![point(tenant, doc, vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));

        let err = index.search(&[1.0, 0.0], tenant, 5).await.unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }
}
