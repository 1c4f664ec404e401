use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported media type: {0}")]
    UnsupportedFormat(String),

    #[error("extraction failed: {0}")]
    Failed(String),

    #[error("no extractable content")]
    NoExtractableContent,

    #[error("ocr failed: {0}")]
    OcrFailed(String),

    #[error("invalid ocr endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding provider is not configured")]
    Unavailable,

    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("embedding count mismatch: sent {sent}, received {received}")]
    CountMismatch { sent: usize, received: usize },

    #[error("vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("invalid embedding endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index corruption: {0}")]
    Corruption(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("document not found: {0}")]
    MissingDocument(uuid::Uuid),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("no chunks produced")]
    NoChunksProduced,

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),

    #[error("ingestion queue closed")]
    QueueClosed,

    #[error("ingestion queue full")]
    QueueFull,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query is empty")]
    EmptyQuery,

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
