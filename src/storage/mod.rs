//! Durable state: SQLite metadata store and blob store

pub mod blob;
pub mod database;

pub use blob::{BlobStore, LocalBlobStore};
pub use database::MetadataDb;

/// Blob path of a raw upload
pub fn raw_blob_path(document_id: &uuid::Uuid, filename: &str) -> String {
    format!("raw/{}/{}", document_id, filename)
}

/// Blob path of extracted text
pub fn extracted_text_path(document_id: &uuid::Uuid) -> String {
    format!("extracted/{}.txt", document_id)
}

/// Blob path of an embed job's vector snapshot
pub fn snapshot_path(job_id: &uuid::Uuid) -> String {
    format!("embeddings/{}.snapshot", job_id)
}
