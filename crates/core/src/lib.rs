pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_document, ChunkingConfig};
pub use embeddings::{
    cosine_similarity, DisabledProvider, EmbeddingConfig, EmbeddingGenerator, EmbeddingProvider,
    HttpEmbeddingProvider, NgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    EmbedError, ExtractError, IndexError, PipelineError, SearchError, StoreError,
};
pub use extract::{ExtractorConfig, MediaKind, OcrClient, OcrConfig, TextExtractor};
pub use index::{HybridIndex, SearchTuning};
pub use ingest::{discover_files, media_type_for_path, IngestJob, IngestionQueue};
pub use models::{
    Chunk, ChunkPosition, Document, ExtractedText, ExtractionMethod, ProcessingStage,
    ProcessingStatus, RankedChunk, SearchScope,
};
pub use orchestrator::{IngestionOrchestrator, IngestionPolicy};
pub use stores::MemoryStore;
pub use traits::{ChunkStore, DocumentStore, ObjectStore};
