use crate::error::EmbedError;
use crate::models::Chunk;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

/// A source of dense text embeddings. Implementations must return one
/// vector per input text, in input order, or fail the whole call.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimensions(&self) -> usize;

    fn is_available(&self) -> bool {
        true
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

#[async_trait]
impl EmbeddingProvider for Box<dyn EmbeddingProvider> {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        (**self).embed(texts).await
    }
}

/// Cosine of the angle between two vectors. Zero-magnitude input yields
/// 0.0 rather than a division error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, EmbedError> {
    if a.len() != b.len() {
        return Err(EmbedError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (mag_a * mag_b))
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub timeout: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            batch_size: 64,
            batch_delay: Duration::from_millis(200),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Embedding provider backed by an OpenAI-style HTTP endpoint.
pub struct HttpEmbeddingProvider {
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    client: reqwest::Client,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let endpoint = Url::parse(&config.endpoint)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(self.endpoint.clone()).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Provider(format!(
                "embedding endpoint returned {status}: {body}"
            )));
        }

        let payload: EmbeddingResponse = response.json().await?;
        if let Some(usage) = payload.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                total_tokens = usage.total_tokens,
                "embedding batch usage"
            );
        }

        if payload.data.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                sent: texts.len(),
                received: payload.data.len(),
            });
        }

        // Responses are index-tagged; never trust wire order.
        let mut rows = payload.data;
        rows.sort_by_key(|row| row.index);
        Ok(rows.into_iter().map(|row| row.embedding).collect())
    }
}

/// Placeholder provider for deployments without an embedding endpoint:
/// reports unavailable and refuses to embed, which callers translate
/// into lexical-only operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn dimensions(&self) -> usize {
        0
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Unavailable)
    }
}

/// Deterministic character-trigram hashing embedder. No network, stable
/// across runs; useful offline and in tests.
#[derive(Debug, Clone, Copy)]
pub struct NgramEmbedder {
    pub dimensions: usize,
}

impl Default for NgramEmbedder {
    fn default() -> Self {
        Self { dimensions: 128 }
    }
}

impl NgramEmbedder {
    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for NgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|text| self.vectorize(text)).collect())
    }
}

/// Drives a provider over document chunks: batches sequentially with an
/// inter-batch pause, skips blank chunks, and writes each vector back to
/// its chunk by index so the blank filter can never misalign results.
pub struct EmbeddingGenerator<P> {
    provider: P,
    batch_size: usize,
    batch_delay: Duration,
}

impl<P: EmbeddingProvider> EmbeddingGenerator<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            batch_size: 64,
            batch_delay: Duration::from_millis(200),
        }
    }

    pub fn with_batching(mut self, batch_size: usize, batch_delay: Duration) -> Self {
        self.batch_size = batch_size.max(1);
        self.batch_delay = batch_delay;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_available()
    }

    /// Embed every non-blank chunk in place. Returns the number of
    /// chunks that received a vector; any batch returning the wrong
    /// count fails the whole call.
    pub async fn embed_chunks(&self, chunks: &mut [Chunk]) -> Result<usize, EmbedError> {
        if !self.provider.is_available() {
            return Err(EmbedError::Unavailable);
        }

        let targets: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| !chunk.is_blank())
            .map(|(position, _)| position)
            .collect();
        if targets.is_empty() {
            return Ok(0);
        }

        let mut embedded = 0usize;
        for batch in targets.chunks(self.batch_size) {
            if embedded > 0 {
                tokio::time::sleep(self.batch_delay).await;
            }

            let texts: Vec<String> = batch
                .iter()
                .map(|&position| chunks[position].content.clone())
                .collect();
            let vectors = self.provider.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(EmbedError::CountMismatch {
                    sent: batch.len(),
                    received: vectors.len(),
                });
            }

            for (&position, vector) in batch.iter().zip(vectors.into_iter()) {
                chunks[position].embedding = Some(vector);
                embedded += 1;
            }
        }

        Ok(embedded)
    }

    /// Vectorize a search query with the same underlying call as
    /// document chunks.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let vectors = self.provider.embed(&[text.to_string()]).await?;
        vectors.into_iter().next().ok_or(EmbedError::CountMismatch {
            sent: 1,
            received: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{chunk_document, ChunkingConfig};
    use crate::models::Document;

    #[test]
    fn cosine_of_vector_with_itself_is_one() {
        let v = vec![0.3, -1.2, 4.5];
        let sim = cosine_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_vector_with_negation_is_minus_one() {
        let v = vec![1.0, 2.0, 3.0];
        let negated: Vec<f32> = v.iter().map(|x| -x).collect();
        let sim = cosine_similarity(&v, &negated).unwrap();
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_is_symmetric() {
        let a = vec![0.1, 0.9, 0.4];
        let b = vec![0.7, 0.2, 0.5];
        let left = cosine_similarity(&a, &b).unwrap();
        let right = cosine_similarity(&b, &a).unwrap();
        assert!((left - right).abs() < 1e-6);
    }

    #[test]
    fn zero_magnitude_yields_zero_not_an_error() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &v).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&v, &zero).unwrap(), 0.0);
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let err = cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(
            err,
            EmbedError::DimensionMismatch { left: 2, right: 3 }
        ));
    }

    #[test]
    fn ngram_embedder_is_deterministic() {
        let embedder = NgramEmbedder::default();
        assert_eq!(
            embedder.vectorize("hybrid retrieval pipelines"),
            embedder.vectorize("hybrid retrieval pipelines")
        );
    }

    #[tokio::test]
    async fn generator_skips_blank_chunks_and_keeps_alignment() {
        let document = Document::new("t", "a.txt", "text/plain", 0, "objects/a.txt");
        let config = ChunkingConfig::new(4, 1).unwrap();
        let mut chunks = chunk_document(&document, "alpha beta gamma delta epsilon zeta", config);
        // Fabricate a blank chunk in the middle to exercise the filter.
        chunks[1].content = "   ".to_string();

        let generator = EmbeddingGenerator::new(NgramEmbedder::default());
        let embedded = generator.embed_chunks(&mut chunks).await.unwrap();

        assert_eq!(embedded, chunks.len() - 1);
        assert!(chunks[0].embedding.is_some());
        assert!(chunks[1].embedding.is_none());
        for chunk in chunks.iter().filter(|c| !c.is_blank()) {
            assert_eq!(
                chunk.embedding.as_ref().map(Vec::len),
                Some(generator.dimensions())
            );
        }
    }

    #[tokio::test]
    async fn disabled_provider_reports_unavailable() {
        let generator = EmbeddingGenerator::new(DisabledProvider);
        assert!(!generator.is_available());
        let mut chunks = vec![];
        assert!(matches!(
            generator.embed_chunks(&mut chunks).await,
            Err(EmbedError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn query_embedding_matches_document_embedding() {
        let generator = EmbeddingGenerator::new(NgramEmbedder::default());
        let query = generator.embed_query("lahore weather").await.unwrap();
        let doc = generator
            .provider()
            .embed(&["lahore weather".to_string()])
            .await
            .unwrap();
        assert_eq!(query, doc[0]);
    }
}
