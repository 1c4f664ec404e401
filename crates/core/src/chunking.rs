use crate::error::PipelineError;
use crate::models::{Chunk, ChunkPosition, Document};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Sliding-window parameters. Overlap must be strictly smaller than the
/// window or the walk would never advance; validated here, at
/// configuration time, not per call.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    max_words: usize,
    overlap_words: usize,
}

impl ChunkingConfig {
    pub fn new(max_words: usize, overlap_words: usize) -> Result<Self, PipelineError> {
        if max_words == 0 {
            return Err(PipelineError::InvalidConfig(
                "chunk window must be at least one word".to_string(),
            ));
        }
        if overlap_words >= max_words {
            return Err(PipelineError::InvalidConfig(format!(
                "chunk overlap {overlap_words} must be smaller than window {max_words}"
            )));
        }
        Ok(Self {
            max_words,
            overlap_words,
        })
    }

    pub fn max_words(&self) -> usize {
        self.max_words
    }

    pub fn overlap_words(&self) -> usize {
        self.overlap_words
    }

    /// Words the window advances by on each step.
    pub fn stride(&self) -> usize {
        self.max_words - self.overlap_words
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_words: 300,
            overlap_words: 50,
        }
    }
}

/// Split extracted text into overlapping word-bounded chunks.
///
/// Deterministic: identical input always yields identical boundaries and
/// identical chunk ids. Empty or whitespace-only input yields zero
/// chunks, which is a valid outcome for the caller to interpret.
pub fn chunk_document(document: &Document, text: &str, config: ChunkingConfig) -> Vec<Chunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0u32;

    while start < words.len() {
        let end = (start + config.max_words()).min(words.len());
        let content = words[start..end].join(" ");

        chunks.push(Chunk {
            id: chunk_id(&document.id, index, &content),
            document_id: document.id,
            tenant_id: document.tenant_id.clone(),
            file_name: document.file_name.clone(),
            chunk_index: index,
            content,
            embedding: None,
            position: Some(ChunkPosition {
                start_word: start,
                end_word: end,
                word_count: end - start,
            }),
        });

        index = index.saturating_add(1);
        if end == words.len() {
            break;
        }
        start += config.stride();
    }

    chunks
}

/// Content-addressed chunk id: reprocessing identical input reproduces
/// the same ids, which is what makes re-indexing an idempotent replace.
fn chunk_id(document_id: &Uuid, index: u32, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
