//! marshal-rag: multi-tenant document ingestion and semantic search service
//!
//! Uploaded files move through a three-stage pipeline (text extraction,
//! chunking, embedding + vector-index insertion) driven by per-tenant
//! priority queues and a round-robin scheduler, so bulk uploaders cannot
//! starve other tenants. Ingested chunks are searchable through a
//! tenant-isolated vector index.

pub mod config;
pub mod error;
pub mod limiter;
pub mod pipeline;
pub mod providers;
pub mod queue;
pub mod search;
pub mod server;
pub mod storage;
pub mod types;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use types::{
    document::{Chunk, Document, DocumentStatus},
    job::{Job, JobPayload, JobStage, JobStatus},
    tenant::Tenant,
};
