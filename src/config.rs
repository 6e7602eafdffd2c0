//! Configuration for the ingestion service

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::types::job::JobStage;

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage paths
    #[serde(default)]
    pub storage: StorageConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Embedding configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Admission limits
    #[serde(default)]
    pub limits: LimitConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Maximum upload size in bytes (default: 100MB)
    pub max_file_size_bytes: u64,
    /// Service token granting cross-tenant scope; overridden by the
    /// INTERNAL_SERVICE_TOKEN environment variable
    pub internal_token: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_file_size_bytes: 100 * 1024 * 1024,
            internal_token: "internal_service_secret_token".to_string(),
        }
    }
}

/// Storage paths for the metadata store and blob root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite metadata database path
    pub metadata_db_path: PathBuf,
    /// Root directory for the blob store
    pub blob_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            metadata_db_path: PathBuf::from("data/metadata.db"),
            blob_root: PathBuf::from("data/blobs"),
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in approximate tokens
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in tokens
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model identifier; "hash" selects the deterministic built-in embedder,
    /// anything else is requested from the model server at `base_url`
    pub model: String,
    /// Vector dimension; must match the index and the model output
    pub dimension: usize,
    /// Chunks per embed job
    pub batch_size: usize,
    /// Model server base URL
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "hash".to_string(),
            dimension: 384,
            batch_size: 100,
            base_url: "http://localhost:11434".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Worker pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Worker instances for the extract stage
    pub extract_workers: Option<usize>,
    /// Worker instances for the chunk stage
    pub chunk_workers: Option<usize>,
    /// Worker instances for the embed stage
    pub embed_workers: Option<usize>,
    /// Maximum retries before a job dead-letters
    pub max_retries: u32,
    /// Wall-clock budget for a single extract job in seconds
    pub extract_timeout_secs: u64,
    /// Wall-clock budget for a single chunk job in seconds
    pub chunk_timeout_secs: u64,
    /// Wall-clock budget for a single embed job in seconds
    pub embed_timeout_secs: u64,
    /// Optional per-tenant in-flight cap per stage
    pub per_tenant_concurrency_cap: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extract_workers: None,
            chunk_workers: None,
            embed_workers: None,
            max_retries: 3,
            extract_timeout_secs: 300,
            chunk_timeout_secs: 120,
            embed_timeout_secs: 600,
            per_tenant_concurrency_cap: None,
        }
    }
}

impl PipelineConfig {
    /// Worker count for a stage, defaulting from the CPU count
    pub fn workers_for(&self, stage: JobStage) -> usize {
        let configured = match stage {
            JobStage::Extract => self.extract_workers,
            JobStage::Chunk => self.chunk_workers,
            JobStage::Embed => self.embed_workers,
        };
        configured.unwrap_or_else(|| num_cpus::get().min(4)).max(1)
    }

    /// Wall-clock budget for a stage
    pub fn timeout_for(&self, stage: JobStage) -> std::time::Duration {
        let secs = match stage {
            JobStage::Extract => self.extract_timeout_secs,
            JobStage::Chunk => self.chunk_timeout_secs,
            JobStage::Embed => self.embed_timeout_secs,
        };
        std::time::Duration::from_secs(secs)
    }
}

/// API admission limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Sliding-window length in seconds
    pub rate_limit_window_seconds: u64,
    /// Rate limit applied to tenants created without an explicit limit
    pub default_rate_limit_per_minute: u32,
    /// Maximum files per bulk upload
    pub max_bulk_files: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            rate_limit_window_seconds: 60,
            default_rate_limit_per_minute: 100,
            max_bulk_files: 100,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a JSON file, applying environment overrides
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides for secrets
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("INTERNAL_SERVICE_TOKEN") {
            self.server.internal_token = token;
        }
    }

    /// Validate option ranges
    pub fn validate(&self) -> Result<()> {
        if !(128..=4096).contains(&self.chunking.chunk_size) {
            return Err(Error::Config(format!(
                "chunk_size must be within 128..=4096, got {}",
                self.chunking.chunk_size
            )));
        }
        if self.chunking.chunk_overlap > self.chunking.chunk_size / 2 {
            return Err(Error::Config(format!(
                "chunk_overlap must be at most chunk_size/2, got {}",
                self.chunking.chunk_overlap
            )));
        }
        if !(1..=1000).contains(&self.embedding.batch_size) {
            return Err(Error::Config(format!(
                "embed batch_size must be within 1..=1000, got {}",
                self.embedding.batch_size
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::Config("embedding dimension must be non-zero".into()));
        }
        if self.limits.rate_limit_window_seconds == 0 {
            return Err(Error::Config("rate_limit_window_seconds must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ServiceConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_chunking() {
        let mut config = ServiceConfig::default();
        config.chunking.chunk_size = 64;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_batch_size() {
        let mut config = ServiceConfig::default();
        config.embedding.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
