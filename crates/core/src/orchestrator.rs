use crate::chunking::{chunk_document, ChunkingConfig};
use crate::embeddings::{EmbeddingGenerator, EmbeddingProvider};
use crate::error::{EmbedError, ExtractError, PipelineError, SearchError, StoreError};
use crate::extract::TextExtractor;
use crate::index::HybridIndex;
use crate::models::{
    Document, ProcessingStage, ProcessingStatus, RankedChunk, SearchScope,
};
use crate::traits::{ChunkStore, DocumentStore, ObjectStore};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Policy hooks the surrounding application decides, not the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestionPolicy {
    /// Fail ingestion when the embedding provider is down instead of
    /// indexing lexical-only.
    pub require_embeddings: bool,
}

/// Drives one document at a time through
/// extraction → chunking → embedding → indexing, recording progress on
/// the document record. Failures never escape: they become the
/// document's `failed` status and callers observe it.
pub struct IngestionOrchestrator<P, S, O> {
    extractor: TextExtractor,
    embedder: EmbeddingGenerator<P>,
    index: Arc<HybridIndex>,
    store: Arc<S>,
    objects: Arc<O>,
    chunking: ChunkingConfig,
    policy: IngestionPolicy,
}

impl<P, S, O> IngestionOrchestrator<P, S, O>
where
    P: EmbeddingProvider,
    S: DocumentStore + ChunkStore,
    O: ObjectStore,
{
    pub fn new(
        extractor: TextExtractor,
        embedder: EmbeddingGenerator<P>,
        index: Arc<HybridIndex>,
        store: Arc<S>,
        objects: Arc<O>,
    ) -> Self {
        Self {
            extractor,
            embedder,
            index,
            store,
            objects,
            chunking: ChunkingConfig::default(),
            policy: IngestionPolicy::default(),
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_policy(mut self, policy: IngestionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn index(&self) -> &Arc<HybridIndex> {
        &self.index
    }

    /// Run the full pipeline for one document. The returned status is
    /// also recorded on the document; this method does not error.
    pub async fn process_document(&self, document: &Document, bytes: &[u8]) -> ProcessingStatus {
        match self.run_pipeline(document, bytes).await {
            Ok(status) => status,
            Err(error) => {
                // Freeze progress at the stage that was running.
                let stage = match self.store.status(document.id).await {
                    Ok(Some(ProcessingStatus::Processing { stage })) => Some(stage),
                    _ => None,
                };
                let reason = match stage {
                    Some(stage) => format!("{stage:?}: {error}"),
                    None => error.to_string(),
                };
                warn!(document_id = %document.id, %reason, "ingestion failed");
                let failed = ProcessingStatus::Failed { reason };
                if let Err(store_error) = self
                    .store
                    .set_status(document.id, failed.clone())
                    .await
                {
                    warn!(
                        document_id = %document.id,
                        error = %store_error,
                        "could not record failure status"
                    );
                }
                failed
            }
        }
    }

    async fn run_pipeline(
        &self,
        document: &Document,
        bytes: &[u8],
    ) -> Result<ProcessingStatus, PipelineError> {
        self.enter_stage(document.id, ProcessingStage::Extracting).await?;
        let extracted = self
            .extractor
            .extract(bytes, &document.media_type)
            .await?;
        if extracted.content.trim().is_empty() {
            return Err(ExtractError::NoExtractableContent.into());
        }
        self.store.record_extraction(document.id, &extracted).await?;
        debug!(
            document_id = %document.id,
            method = ?extracted.method,
            chars = extracted.content.len(),
            "extraction finished"
        );

        self.enter_stage(document.id, ProcessingStage::Chunking).await?;
        let mut chunks = chunk_document(document, &extracted.content, self.chunking);
        if chunks.is_empty() {
            return Err(PipelineError::NoChunksProduced);
        }

        self.enter_stage(document.id, ProcessingStage::Embedding).await?;
        if self.embedder.is_available() {
            let embedded = self.embedder.embed_chunks(&mut chunks).await?;
            let non_blank = chunks.iter().filter(|chunk| !chunk.is_blank()).count();
            let attached = chunks
                .iter()
                .filter(|chunk| chunk.embedding.is_some())
                .count();
            // The generator promises one vector per non-blank chunk;
            // verify instead of trusting it.
            if embedded != non_blank || attached != non_blank {
                return Err(EmbedError::CountMismatch {
                    sent: non_blank,
                    received: attached,
                }
                .into());
            }
        } else if self.policy.require_embeddings {
            return Err(EmbedError::Unavailable.into());
        } else {
            warn!(
                document_id = %document.id,
                "embedding provider unavailable, indexing lexical-only"
            );
        }

        self.enter_stage(document.id, ProcessingStage::Indexing).await?;
        self.store.persist_chunks(&chunks).await?;
        self.index.add_chunks(&chunks)?;

        // A concurrent removal or reset wins over this run: re-check
        // before the terminal transition and roll back our insertions
        // rather than resurrect removed content.
        match self.store.status(document.id).await? {
            Some(ProcessingStatus::Processing { .. }) => {
                self.store
                    .set_status(document.id, ProcessingStatus::Completed)
                    .await?;
                info!(
                    document_id = %document.id,
                    chunks = chunks.len(),
                    "document ingested"
                );
                Ok(ProcessingStatus::Completed)
            }
            Some(other) => {
                warn!(
                    document_id = %document.id,
                    "document status changed mid-run, rolling back index entries"
                );
                self.index.remove_document(document.id)?;
                Ok(other)
            }
            None => {
                warn!(
                    document_id = %document.id,
                    "document removed mid-run, rolling back"
                );
                self.index.remove_document(document.id)?;
                self.store.delete_chunks(document.id).await?;
                Ok(ProcessingStatus::Failed {
                    reason: "document removed during processing".to_string(),
                })
            }
        }
    }

    /// Wipe prior output and run the pipeline again from the stored
    /// source bytes. Identical input reproduces identical chunk ids, so
    /// the result is a replace, never an append.
    pub async fn reprocess_document(
        &self,
        document_id: Uuid,
    ) -> Result<ProcessingStatus, PipelineError> {
        let document = self
            .store
            .document(document_id)
            .await?
            .ok_or(StoreError::MissingDocument(document_id))?;

        self.index.remove_document(document_id)?;
        self.store.delete_chunks(document_id).await?;
        self.store
            .set_status(document_id, ProcessingStatus::Pending)
            .await?;

        let bytes = self.objects.download(&document.source_path).await?;
        Ok(self.process_document(&document, &bytes).await)
    }

    /// Drop a document's retrieval state: index entries and persisted
    /// chunks. Idempotent, and safe to race with an in-flight pipeline
    /// run for the same document.
    pub async fn remove_document_processing(
        &self,
        document_id: Uuid,
    ) -> Result<usize, PipelineError> {
        let removed = self.index.remove_document(document_id)?;
        let deleted = self.store.delete_chunks(document_id).await?;
        debug!(%document_id, removed, deleted, "document processing state removed");
        Ok(removed.max(deleted))
    }

    /// Repopulate the index from the durable store, e.g. at process
    /// start. Only chunks with embeddings are scanned back.
    pub async fn rebuild_index(&self) -> Result<usize, PipelineError> {
        let chunks = self.store.embedded_chunks().await?;
        let added = self.index.rebuild(&chunks)?;
        info!(chunks = added, "index rebuilt from durable store");
        Ok(added)
    }

    /// Query entry point: vectorize the query when the provider is up,
    /// degrade to lexical-only when it is not, then search the index.
    pub async fn search(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: usize,
    ) -> Result<Vec<RankedChunk>, SearchError> {
        let query_embedding = if self.embedder.is_available() {
            match self.embedder.embed_query(query).await {
                Ok(vector) => Some(vector),
                Err(error) => {
                    warn!(%error, "query embedding failed, lexical-only search");
                    None
                }
            }
        } else {
            None
        };

        self.index.search(
            query,
            query_embedding.as_deref(),
            scope,
            limit,
            self.index.tuning().similarity_threshold,
        )
    }

    async fn enter_stage(
        &self,
        document_id: Uuid,
        stage: ProcessingStage,
    ) -> Result<(), PipelineError> {
        debug!(%document_id, ?stage, "entering stage");
        self.store
            .set_status(document_id, ProcessingStatus::Processing { stage })
            .await?;
        Ok(())
    }
}
