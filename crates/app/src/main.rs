use chrono::Utc;
use clap::{Parser, Subcommand};
use doc_retrieval_core::{
    discover_files, media_type_for_path, Document, EmbeddingConfig, EmbeddingGenerator,
    EmbeddingProvider, ExtractorConfig, HttpEmbeddingProvider, HybridIndex, IngestJob,
    IngestionOrchestrator, IngestionPolicy, IngestionQueue, MemoryStore, NgramEmbedder, OcrClient,
    OcrConfig, ProcessingStatus, SearchScope, TextExtractor,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-retrieval", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Tenant scope for everything this invocation touches.
    #[arg(long, default_value = "default")]
    tenant: String,

    /// OpenAI-style embeddings endpoint. Without it, a local ngram
    /// embedder is used.
    #[arg(long, env = "EMBEDDING_ENDPOINT")]
    embedding_endpoint: Option<String>,

    /// API key for the embeddings endpoint.
    #[arg(long, env = "EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,

    /// Embedding model name.
    #[arg(long, default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Multimodal OCR endpoint for scanned PDFs and images.
    #[arg(long, env = "OCR_ENDPOINT")]
    ocr_endpoint: Option<String>,

    /// API key for the OCR endpoint.
    #[arg(long, env = "OCR_API_KEY")]
    ocr_api_key: Option<String>,

    /// Fail documents when embeddings are unavailable instead of
    /// indexing them for lexical-only search.
    #[arg(long, default_value_t = false)]
    require_embeddings: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest every supported file under a folder and report statuses.
    Ingest {
        /// Folder scanned recursively for supported files.
        #[arg(long)]
        folder: String,

        /// Parallel pipeline workers.
        #[arg(long, default_value = "4")]
        workers: usize,
    },
    /// Ingest a folder, then query the hybrid index.
    Search {
        /// Folder scanned recursively for supported files.
        #[arg(long)]
        folder: String,

        /// Search query.
        #[arg(long)]
        query: String,

        /// Number of results to return.
        #[arg(long, default_value = "10")]
        top_k: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "doc-retrieval boot"
    );

    let embedder: Box<dyn EmbeddingProvider> = match &cli.embedding_endpoint {
        Some(endpoint) => {
            let config = EmbeddingConfig {
                endpoint: endpoint.clone(),
                api_key: cli.embedding_api_key.clone(),
                model: cli.embedding_model.clone(),
                ..EmbeddingConfig::default()
            };
            Box::new(HttpEmbeddingProvider::new(&config)?)
        }
        None => {
            warn!("no embedding endpoint configured, using local ngram embedder");
            Box::new(NgramEmbedder::default())
        }
    };

    let mut extractor = TextExtractor::new(ExtractorConfig::default());
    if let Some(endpoint) = &cli.ocr_endpoint {
        let mut ocr_config = OcrConfig::new(endpoint);
        if let Some(api_key) = &cli.ocr_api_key {
            ocr_config = ocr_config.with_api_key(api_key);
        }
        extractor = extractor.with_ocr(OcrClient::new(ocr_config)?);
    }

    let store = Arc::new(MemoryStore::new());
    let index = Arc::new(HybridIndex::new(embedder.dimensions()));
    let orchestrator = Arc::new(
        IngestionOrchestrator::new(
            extractor,
            EmbeddingGenerator::new(embedder),
            index,
            store.clone(),
            store.clone(),
        )
        .with_policy(IngestionPolicy {
            require_embeddings: cli.require_embeddings,
        }),
    );

    match cli.command {
        Command::Ingest { folder, workers } => {
            let ids =
                ingest_folder(&folder, &cli.tenant, &store, orchestrator.clone(), workers).await?;

            for id in ids {
                let Some(document) = doc_retrieval_core::DocumentStore::document(&*store, id).await?
                else {
                    continue;
                };
                match document.status {
                    ProcessingStatus::Completed => {
                        println!("ok      {} ({})", document.file_name, document.id);
                    }
                    ProcessingStatus::Failed { reason } => {
                        println!("failed  {} ({}): {reason}", document.file_name, document.id);
                    }
                    other => {
                        println!("stuck   {} ({}): {other:?}", document.file_name, document.id);
                    }
                }
            }
        }
        Command::Search {
            folder,
            query,
            top_k,
        } => {
            ingest_folder(&folder, &cli.tenant, &store, orchestrator.clone(), 4).await?;

            let scope = SearchScope::tenant(&cli.tenant);
            let hits = orchestrator.search(&query, &scope, top_k).await?;

            println!("query: {query}");
            if hits.is_empty() {
                println!("no results");
            }
            for hit in hits {
                let similarity = hit
                    .similarity
                    .map(|value| format!("{value:.3}"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "[{:.3}] sim={} kw={:.3} file={} chunk={}",
                    hit.fused_score, similarity, hit.keyword_score, hit.chunk.file_name,
                    hit.chunk.chunk_index
                );
                println!("  {}", hit.chunk.content);
            }
        }
    }

    Ok(())
}

async fn ingest_folder(
    folder: &str,
    tenant: &str,
    store: &Arc<MemoryStore>,
    orchestrator: Arc<
        IngestionOrchestrator<Box<dyn EmbeddingProvider>, MemoryStore, MemoryStore>,
    >,
    workers: usize,
) -> anyhow::Result<Vec<uuid::Uuid>> {
    use doc_retrieval_core::{DocumentStore, ObjectStore};

    let folder = Path::new(folder);
    let files = discover_files(folder);
    if files.is_empty() {
        anyhow::bail!("no supported files found in {}", folder.display());
    }
    info!(count = files.len(), folder = %folder.display(), "ingesting folder");

    let queue = IngestionQueue::start(orchestrator, 16, workers);
    let mut ids = Vec::new();

    for path in files {
        let Some(media_type) = media_type_for_path(&path) else {
            continue;
        };
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();
        let bytes = tokio::fs::read(&path).await?;

        let document = Document::new(
            tenant,
            file_name,
            media_type,
            bytes.len() as u64,
            format!("objects/{}/{}", tenant, path.display()),
        );
        store
            .upload(&document.source_path, &bytes, media_type)
            .await?;
        store.insert_document(&document).await?;
        ids.push(document.id);

        queue
            .submit(IngestJob { document, bytes })
            .await
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;
    }

    queue.drain().await;
    Ok(ids)
}
