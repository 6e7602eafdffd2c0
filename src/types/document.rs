//! Document and chunk models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Document processing status. Advances monotonically through the pipeline;
/// `Failed` is reachable from any non-terminal state, `FailedDeletion` marks
/// a cascade delete that stopped partway and is retryable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Extracting,
    Chunking,
    Embedding,
    Completed,
    Failed,
    FailedDeletion,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Extracting => "extracting",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::FailedDeletion => "failed_deletion",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "extracting" => Some(Self::Extracting),
            "chunking" => Some(Self::Chunking),
            "embedding" => Some(Self::Embedding),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "failed_deletion" => Some(Self::FailedDeletion),
            _ => None,
        }
    }

    /// Terminal states accept no further pipeline transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::FailedDeletion)
    }
}

/// An uploaded document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document id
    pub document_id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Original filename as uploaded
    pub filename: String,
    /// Blob store path of the raw upload
    pub blob_path: String,
    /// Raw file size in bytes
    pub size_bytes: u64,
    /// Pipeline status
    pub status: DocumentStatus,
    /// Opaque caller-supplied metadata
    pub metadata: HashMap<String, serde_json::Value>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a new pending document
    pub fn new(tenant_id: Uuid, filename: String, blob_path: String, size_bytes: u64) -> Self {
        let now = Utc::now();
        Self {
            document_id: Uuid::new_v4(),
            tenant_id,
            filename,
            blob_path,
            size_bytes,
            status: DocumentStatus::Pending,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A chunk of extracted text. For a given document, `chunk_index` runs
/// 0..N-1 with no gaps and every chunk shares the document's tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk id; doubles as the vector point id
    pub chunk_id: Uuid,
    /// Parent document
    pub document_id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Position within the document, 0-based and contiguous
    pub chunk_index: u32,
    /// Chunk text
    pub text: String,
    /// Blob path of the embedding snapshot; set when the embed stage completes
    pub vector_snapshot_path: Option<String>,
    /// Opaque metadata
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Chunk {
    /// Create a new chunk without an embedding snapshot
    pub fn new(document_id: Uuid, tenant_id: Uuid, chunk_index: u32, text: String) -> Self {
        Self {
            chunk_id: Uuid::new_v4(),
            document_id,
            tenant_id,
            chunk_index,
            text,
            vector_snapshot_path: None,
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Extracting,
            DocumentStatus::Chunking,
            DocumentStatus::Embedding,
            DocumentStatus::Completed,
            DocumentStatus::Failed,
            DocumentStatus::FailedDeletion,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::parse("bogus"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(DocumentStatus::Completed.is_terminal());
        assert!(DocumentStatus::Failed.is_terminal());
        assert!(!DocumentStatus::Embedding.is_terminal());
    }
}
