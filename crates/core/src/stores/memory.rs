use crate::error::StoreError;
use crate::models::{Chunk, Document, ExtractedText, ProcessingStatus};
use crate::traits::{ChunkStore, DocumentStore, ObjectStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    objects: HashMap<String, (Vec<u8>, String)>,
    documents: HashMap<Uuid, Document>,
    extractions: HashMap<Uuid, ExtractedText>,
    chunks: HashMap<Uuid, Vec<Chunk>>,
}

/// In-memory implementation of all three storage contracts. Backs tests
/// and the demo CLI; a relational store slots in behind the same traits
/// for real deployments.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("poisoned store lock".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("poisoned store lock".to_string()))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let state = self.read()?;
        state
            .objects
            .get(path)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StoreError::Backend(format!("object not found: {path}")))
    }

    async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StoreError> {
        let mut state = self.write()?;
        state
            .objects
            .insert(path.to_string(), (bytes.to_vec(), content_type.to_string()));
        Ok(path.to_string())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.read()?.documents.get(&id).cloned())
    }

    async fn set_status(&self, id: Uuid, status: ProcessingStatus) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let document = state
            .documents
            .get_mut(&id)
            .ok_or(StoreError::MissingDocument(id))?;
        document.status = status;
        document.updated_at = Utc::now();
        Ok(())
    }

    async fn status(&self, id: Uuid) -> Result<Option<ProcessingStatus>, StoreError> {
        Ok(self
            .read()?
            .documents
            .get(&id)
            .map(|document| document.status.clone()))
    }

    async fn delete_document(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.documents.remove(&id);
        state.extractions.remove(&id);
        Ok(())
    }

    async fn record_extraction(
        &self,
        id: Uuid,
        extraction: &ExtractedText,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.extractions.insert(id, extraction.clone());
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn persist_chunks(&self, chunks: &[Chunk]) -> Result<(), StoreError> {
        let mut state = self.write()?;
        for chunk in chunks {
            let rows = state.chunks.entry(chunk.document_id).or_default();
            rows.retain(|existing| existing.id != chunk.id);
            rows.push(chunk.clone());
        }
        Ok(())
    }

    async fn delete_chunks(&self, document_id: Uuid) -> Result<usize, StoreError> {
        let mut state = self.write()?;
        Ok(state
            .chunks
            .remove(&document_id)
            .map(|chunks| chunks.len())
            .unwrap_or(0))
    }

    async fn chunks_for_document(&self, document_id: Uuid) -> Result<Vec<Chunk>, StoreError> {
        Ok(self
            .read()?
            .chunks
            .get(&document_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn embedded_chunks(&self) -> Result<Vec<Chunk>, StoreError> {
        Ok(self
            .read()?
            .chunks
            .values()
            .flatten()
            .filter(|chunk| chunk.embedding.is_some())
            .cloned()
            .collect())
    }
}
