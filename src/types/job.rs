//! Job model for the three-stage pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Extract,
    Chunk,
    Embed,
}

impl JobStage {
    pub const ALL: [JobStage; 3] = [JobStage::Extract, JobStage::Chunk, JobStage::Embed];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Chunk => "chunk",
            Self::Embed => "embed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "extract" => Some(Self::Extract),
            "chunk" => Some(Self::Chunk),
            "embed" => Some(Self::Embed),
            _ => None,
        }
    }
}

/// Job processing status. `Completed` and `Dead` are terminal; a processing
/// job may return to `Pending` on retry with a backoff-deferred score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }
}

/// Stage-specific job payload, persisted as stage-discriminated JSON
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum JobPayload {
    Extract {
        document_id: Uuid,
        blob_path: String,
        filename: String,
    },
    Chunk {
        document_id: Uuid,
        text_path: String,
        filename: String,
    },
    Embed {
        document_id: Uuid,
        chunk_ids: Vec<Uuid>,
        filename: String,
    },
}

impl JobPayload {
    pub fn stage(&self) -> JobStage {
        match self {
            Self::Extract { .. } => JobStage::Extract,
            Self::Chunk { .. } => JobStage::Chunk,
            Self::Embed { .. } => JobStage::Embed,
        }
    }

    pub fn document_id(&self) -> Uuid {
        match self {
            Self::Extract { document_id, .. }
            | Self::Chunk { document_id, .. }
            | Self::Embed { document_id, .. } => *document_id,
        }
    }
}

/// A unit of work at a single stage for a single document (or chunk batch,
/// for embed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub tenant_id: Uuid,
    pub document_id: Uuid,
    pub stage: JobStage,
    pub status: JobStatus,
    pub payload: JobPayload,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job for the payload's stage
    pub fn new(tenant_id: Uuid, payload: JobPayload, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            tenant_id,
            document_id: payload.document_id(),
            stage: payload.stage(),
            status: JobStatus::Pending,
            payload,
            retry_count: 0,
            max_retries,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_stage_discriminated() {
        let payload = JobPayload::Embed {
            document_id: Uuid::new_v4(),
            chunk_ids: vec![Uuid::new_v4()],
            filename: "report.pdf".to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["stage"], "embed");

        let parsed: JobPayload = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, payload);
        assert_eq!(parsed.stage(), JobStage::Embed);
    }

    #[test]
    fn stage_round_trips() {
        for stage in JobStage::ALL {
            assert_eq!(JobStage::parse(stage.as_str()), Some(stage));
        }
    }
}
