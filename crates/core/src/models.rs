use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The pipeline stage a document is currently in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Extracting,
    Chunking,
    Embedding,
    Indexing,
}

/// Per-document lifecycle. `Completed` and `Failed` are terminal;
/// `Failed` is reachable from any processing stage. Reprocessing resets
/// a terminal document back to `Pending`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing { stage: ProcessingStage },
    Completed,
    Failed { reason: String },
}

impl ProcessingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::Completed | ProcessingStatus::Failed { .. }
        )
    }
}

/// An uploaded document. Status is only ever mutated through the
/// orchestrator's document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub tenant_id: String,
    pub file_name: String,
    pub media_type: String,
    pub byte_len: u64,
    /// Opaque object-store path of the original upload.
    pub source_path: String,
    pub status: ProcessingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        tenant_id: impl Into<String>,
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        byte_len: u64,
        source_path: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            file_name: file_name.into(),
            media_type: media_type.into(),
            byte_len,
            source_path: source_path.into(),
            status: ProcessingStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Which strategy produced a document's text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    PdfText,
    PdfOcr,
    WordXml,
    SlideTree,
    SlideXmlScrape,
    ArchiveScrape,
    Spreadsheet,
    Html,
    Delimited,
    PlainText,
    ImageOcr,
    RawText,
}

/// One extraction attempt's output, persisted alongside the document for
/// audit and reprocessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedText {
    pub content: String,
    pub method: ExtractionMethod,
    pub confidence: Option<f32>,
    /// Pages, sheets, or slides, depending on the format.
    pub section_count: Option<u32>,
}

/// Word-offset range of a chunk within its document's extracted text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkPosition {
    pub start_word: usize,
    pub end_word: usize,
    pub word_count: usize,
}

/// A bounded, overlapping slice of a document's text: the unit of
/// embedding and retrieval. A chunk's tenant always equals its
/// document's tenant; every read path re-checks this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: Uuid,
    pub tenant_id: String,
    pub file_name: String,
    pub chunk_index: u32,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub position: Option<ChunkPosition>,
}

impl Chunk {
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Tenant boundary plus optional file allowlist for a query.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchScope {
    pub tenant_id: String,
    pub file_ids: Option<Vec<Uuid>>,
}

impl SearchScope {
    pub fn tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            file_ids: None,
        }
    }

    pub fn with_files(mut self, file_ids: Vec<Uuid>) -> Self {
        self.file_ids = Some(file_ids);
        self
    }

    pub fn admits_file(&self, document_id: Uuid) -> bool {
        match &self.file_ids {
            Some(ids) => ids.contains(&document_id),
            None => true,
        }
    }
}

/// A scored search hit: the chunk plus its cosine similarity (when a
/// vector pass ran) and the fused ranking score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedChunk {
    pub chunk: Chunk,
    pub similarity: Option<f32>,
    pub keyword_score: f32,
    pub fused_score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(ProcessingStatus::Completed.is_terminal());
        assert!(ProcessingStatus::Failed {
            reason: "x".to_string()
        }
        .is_terminal());
        assert!(!ProcessingStatus::Pending.is_terminal());
        assert!(!ProcessingStatus::Processing {
            stage: ProcessingStage::Embedding
        }
        .is_terminal());
    }

    #[test]
    fn scope_without_allowlist_admits_any_file() {
        let scope = SearchScope::tenant("acme");
        assert!(scope.admits_file(Uuid::new_v4()));
    }

    #[test]
    fn scope_allowlist_is_exact() {
        let allowed = Uuid::new_v4();
        let scope = SearchScope::tenant("acme").with_files(vec![allowed]);
        assert!(scope.admits_file(allowed));
        assert!(!scope.admits_file(Uuid::new_v4()));
    }
}
