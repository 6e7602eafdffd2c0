//! HTTP request and response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Response for a single file upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub document_id: Uuid,
    pub filename: String,
    pub status: String,
    pub message: String,
}

/// Response for a bulk upload; each file is accepted or rejected independently
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUploadResponse {
    pub total_files: usize,
    pub successful: usize,
    pub failed: usize,
    pub documents: Vec<BulkUploadItem>,
}

/// Per-file outcome within a bulk upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUploadItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Uuid>,
    pub filename: String,
    pub status: String,
    pub message: String,
}

/// Per-stage detail inside a status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatus {
    pub status: String,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Document status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub document_id: Uuid,
    pub status: String,
    pub stages: HashMap<String, Option<StageStatus>>,
}

/// Response for a cascading document delete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub document_id: Uuid,
    pub deleted: bool,
    pub chunks_deleted: usize,
    pub vectors_deleted: usize,
}

fn default_limit() -> usize {
    10
}

fn default_score_threshold() -> f32 {
    0.7
}

/// Semantic search request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
}

/// A single ranked search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub filename: String,
    pub text: String,
    pub score: f32,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Semantic search response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub total: usize,
    pub query: String,
}

/// Per-tenant usage metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantMetricsResponse {
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub document_count: usize,
    pub chunk_count: usize,
    pub storage_used_bytes: u64,
    pub last_upload: Option<DateTime<Utc>>,
    pub rate_limit_per_minute: u32,
    pub current_window_usage: usize,
}

/// Request to create a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
}

/// Response after creating a tenant; the plaintext key appears here once and
/// is never retrievable again
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenantResponse {
    pub tenant_id: Uuid,
    pub name: String,
    pub api_key: String,
    pub rate_limit_per_minute: u32,
    pub message: String,
}

/// Cross-service statistics for operators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalStatsResponse {
    pub tenants: usize,
    pub documents_by_status: HashMap<String, usize>,
    pub jobs_by_status: HashMap<String, usize>,
    pub queue_depths: HashMap<String, usize>,
    pub vector_points: usize,
}

/// Per-dependency health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalHealthResponse {
    pub status: String,
    pub database: String,
    pub blob_store: String,
    pub vector_index: String,
    pub embedder: String,
}

/// Internal service authentication echo
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAuthResponse {
    pub authenticated: bool,
    pub service_name: String,
    pub permissions: Vec<String>,
}
