use crate::error::StoreError;
use crate::models::{Chunk, Document, ExtractedText, ProcessingStatus};
use async_trait::async_trait;
use uuid::Uuid;

/// Object storage for original uploads. Paths are opaque strings.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StoreError>;
}

/// Durable document records and their processing status. The
/// orchestrator is the only writer of status transitions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError>;

    async fn document(&self, id: Uuid) -> Result<Option<Document>, StoreError>;

    async fn set_status(&self, id: Uuid, status: ProcessingStatus) -> Result<(), StoreError>;

    async fn status(&self, id: Uuid) -> Result<Option<ProcessingStatus>, StoreError>;

    async fn delete_document(&self, id: Uuid) -> Result<(), StoreError>;

    /// Keep the latest extraction output for audit and reprocessing.
    async fn record_extraction(
        &self,
        id: Uuid,
        extraction: &ExtractedText,
    ) -> Result<(), StoreError>;
}

/// Durable chunk persistence: the source of truth the in-memory index is
/// rebuilt from.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn persist_chunks(&self, chunks: &[Chunk]) -> Result<(), StoreError>;

    async fn delete_chunks(&self, document_id: Uuid) -> Result<usize, StoreError>;

    async fn chunks_for_document(&self, document_id: Uuid) -> Result<Vec<Chunk>, StoreError>;

    /// Chunks carrying an embedding, filtered store-side so rebuilds do
    /// not load the full corpus only to discard rows.
    async fn embedded_chunks(&self) -> Result<Vec<Chunk>, StoreError>;
}
