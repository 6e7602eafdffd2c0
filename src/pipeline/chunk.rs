//! Chunk stage: sentence-aware overlapping segmentation
//!
//! Token counting is a light word tokenizer; it approximates model token
//! counts deterministically without pulling a model vocabulary. Windows
//! prefer to break after the last sentence terminator in range and fall back
//! to the token boundary at the window edge.

use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};
use crate::queue::queue_now;
use crate::storage::BlobStore;
use crate::types::{Chunk, Job, JobPayload, JobStage};

use super::PipelineContext;

/// Sentence-aware chunker with token-window sizing and overlap
pub struct SentenceChunker {
    chunk_size: usize,
    overlap: usize,
}

impl SentenceChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    /// Split text into overlapping chunks. Empty or whitespace-only text
    /// yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let tokens: Vec<(usize, &str)> = text.unicode_word_indices().collect();
        if tokens.is_empty() {
            return Vec::new();
        }

        // A token ends a sentence when a terminator appears in the gap
        // before the next token (or end of text); the gap is punctuation and
        // whitespace only, so any terminator there is sentence-final.
        let sentence_end: Vec<bool> = (0..tokens.len())
            .map(|i| {
                let gap_start = tokens[i].0 + tokens[i].1.len();
                let gap_end = tokens
                    .get(i + 1)
                    .map(|(start, _)| *start)
                    .unwrap_or(text.len());
                text[gap_start..gap_end].contains(['.', '!', '?'])
            })
            .collect();

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut prev_end: Option<usize> = None;
        while start < tokens.len() {
            let window_end = (start + self.chunk_size).min(tokens.len());
            // Split after the last sentence boundary inside the window, else
            // at the window edge itself (a token boundary, hence whitespace).
            // Boundaries at or before the previous chunk's end sit in the
            // overlap region and cannot make progress.
            let end = (start..window_end)
                .rev()
                .find(|i| sentence_end[*i] && prev_end.map_or(true, |p| *i > p))
                .unwrap_or(window_end - 1);

            let byte_start = tokens[start].0;
            let byte_end = tokens
                .get(end + 1)
                .map(|(next_start, _)| *next_start)
                .unwrap_or(text.len());
            let piece = text[byte_start..byte_end].trim();
            if !piece.is_empty() {
                chunks.push(piece.to_string());
            }

            if end + 1 >= tokens.len() {
                break;
            }
            prev_end = Some(end);
            // Next chunk begins `overlap` tokens before this chunk's end
            start = (end + 1 - self.overlap.min(end)).max(start + 1);
        }
        chunks
    }
}

pub async fn run(ctx: &PipelineContext, job: &Job) -> Result<()> {
    let JobPayload::Chunk {
        document_id,
        text_path,
        filename,
    } = &job.payload
    else {
        return Err(Error::internal("chunk worker received a non-chunk payload"));
    };

    if ctx.db.get_document(job.tenant_id, *document_id)?.is_none() {
        ctx.db
            .fail_job_dead(job.job_id, job.retry_count, "document no longer exists")?;
        tracing::warn!(job_id = %job.job_id, document_id = %document_id, "chunking short-circuited, document gone");
        return Ok(());
    }

    tracing::info!(
        job_id = %job.job_id,
        document_id = %document_id,
        attempt = job.retry_count + 1,
        "chunking text"
    );

    let bytes = ctx.blobs.get(text_path).await?;
    let text = String::from_utf8_lossy(&bytes);

    let chunker = SentenceChunker::new(
        ctx.config.chunking.chunk_size,
        ctx.config.chunking.chunk_overlap,
    );
    let pieces = chunker.chunk(&text);

    let chunks: Vec<Chunk> = pieces
        .into_iter()
        .enumerate()
        .map(|(index, piece)| Chunk::new(*document_id, job.tenant_id, index as u32, piece))
        .collect();

    let embed_jobs: Vec<Job> = chunks
        .chunks(ctx.config.embedding.batch_size)
        .map(|batch| {
            Job::new(
                job.tenant_id,
                JobPayload::Embed {
                    document_id: *document_id,
                    chunk_ids: batch.iter().map(|c| c.chunk_id).collect(),
                    filename: filename.clone(),
                },
                ctx.config.pipeline.max_retries,
            )
        })
        .collect();

    let advanced =
        ctx.db
            .complete_chunk_stage(job.job_id, *document_id, &chunks, &embed_jobs)?;
    if !advanced {
        ctx.db.fail_job_dead(
            job.job_id,
            job.retry_count,
            "document left the pipeline during chunking",
        )?;
        return Ok(());
    }

    for embed_job in &embed_jobs {
        ctx.queue.enqueue(
            job.tenant_id,
            JobStage::Embed,
            embed_job.job_id,
            queue_now(),
        )?;
    }

    tracing::info!(
        job_id = %job.job_id,
        document_id = %document_id,
        chunks = chunks.len(),
        embed_jobs = embed_jobs.len(),
        "chunking complete"
    );
    Ok(())
}
