//! Semantic search read path
//!
//! Queries are embedded with the same embedder used for ingestion, the index
//! query carries a mandatory tenant filter, and a foreign tenant id in the
//! result set aborts the request. Silent filtering would hide an isolation
//! bug, so it is an error instead.

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::providers::{Embedder, ScoredPoint, VectorIndex};
use crate::storage::MetadataDb;
use crate::types::api::SearchResultItem;

/// Tenant-scoped semantic search
pub async fn semantic_search(
    db: &MetadataDb,
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
    tenant_id: Uuid,
    query: &str,
    limit: usize,
    score_threshold: f32,
) -> Result<Vec<SearchResultItem>> {
    if query.trim().is_empty() {
        return Err(Error::validation("query must not be empty"));
    }

    let query_vector = embed_query(embedder, query).await?;
    let hits = index.search(&query_vector, tenant_id, limit).await?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        if hit.payload.tenant_id != tenant_id {
            return Err(Error::IsolationViolation(format!(
                "search for tenant {} returned a point owned by tenant {}",
                tenant_id, hit.payload.tenant_id
            )));
        }
        if hit.score < score_threshold {
            continue;
        }
        results.push(to_result_item(db, &hit, Some(tenant_id))?);
    }
    Ok(results)
}

/// Cross-tenant search for the internal scope
pub async fn internal_search(
    db: &MetadataDb,
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
    query: &str,
    limit: usize,
    score_threshold: f32,
) -> Result<Vec<SearchResultItem>> {
    if query.trim().is_empty() {
        return Err(Error::validation("query must not be empty"));
    }

    let query_vector = embed_query(embedder, query).await?;
    let hits = index.search_unfiltered(&query_vector, limit).await?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        if hit.score < score_threshold {
            continue;
        }
        results.push(to_result_item(db, &hit, None)?);
    }
    Ok(results)
}

async fn embed_query(embedder: &dyn Embedder, query: &str) -> Result<Vec<f32>> {
    let mut vectors = embedder.embed_batch(&[query.to_string()]).await?;
    vectors
        .pop()
        .ok_or_else(|| Error::embedding("embedder returned no vector for the query"))
}

/// Resolve a hit to its chunk text. The text lives in the metadata store,
/// not the point payload; the lookup stays tenant-scoped when a tenant is
/// given.
fn to_result_item(
    db: &MetadataDb,
    hit: &ScoredPoint,
    tenant_id: Option<Uuid>,
) -> Result<SearchResultItem> {
    let chunk = match tenant_id {
        Some(tenant_id) => db.get_chunk(tenant_id, hit.payload.chunk_id)?,
        None => db.get_chunk_any(hit.payload.chunk_id)?,
    };
    let text = chunk.map(|c| c.text).unwrap_or_default();
    Ok(SearchResultItem {
        chunk_id: hit.payload.chunk_id,
        document_id: hit.payload.document_id,
        filename: hit.payload.filename.clone(),
        text,
        score: hit.score,
        metadata: hit.payload.metadata.clone(),
    })
}
