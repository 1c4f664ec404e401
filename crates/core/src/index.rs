//! Tenant-isolated hybrid index: a brute-force vector scan over an
//! in-memory chunk map, paired with an inverted keyword/bigram index,
//! fused into one ranking. Rebuildable from the durable store; the index
//! itself is never persisted.
//!
//! Pure vector search over-retrieves topically-adjacent content and pure
//! keyword search misses paraphrase, so candidates from the vector pass
//! must also clear a lexical gate: a minimum share of the significant
//! query terms has to appear (plural/possessive tolerant) in the chunk
//! text.

use crate::embeddings::cosine_similarity;
use crate::error::{IndexError, SearchError};
use crate::models::{Chunk, RankedChunk, SearchScope};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

const STOP_WORDS: [&str; 44] = [
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "had", "has", "have",
    "how", "i", "if", "in", "is", "it", "its", "of", "on", "or", "our", "so", "that", "the",
    "their", "then", "there", "these", "they", "this", "to", "was", "we", "were", "what", "when",
    "where", "which", "will", "with",
];

/// Ranking knobs. Empirically chosen defaults; callers tune rather than
/// patch constants.
#[derive(Debug, Clone, Copy)]
pub struct SearchTuning {
    /// Final cosine-similarity cutoff used by callers that do not pass
    /// their own.
    pub similarity_threshold: f32,
    /// The vector pass admits candidates at `threshold * relaxed_ratio`
    /// so reranking sees a superset.
    pub relaxed_ratio: f32,
    /// Minimum share of significant (non-stop) query terms that must
    /// appear in a chunk's text.
    pub min_term_ratio: f32,
    /// Fusion weight of the cosine similarity for chunks in both passes.
    pub vector_weight: f32,
    /// Fusion weight of the keyword score for chunks in both passes.
    pub keyword_weight: f32,
    /// Down-weight applied to chunks found only by the lexical pass.
    pub keyword_only_weight: f32,
    /// The vector pass keeps `limit * candidate_multiplier` candidates.
    pub candidate_multiplier: usize,
}

impl Default for SearchTuning {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            relaxed_ratio: 0.65,
            min_term_ratio: 0.6,
            vector_weight: 0.7,
            keyword_weight: 0.3,
            keyword_only_weight: 0.5,
            candidate_multiplier: 4,
        }
    }
}

struct IndexEntry {
    chunk: Chunk,
    /// Keyword/bigram tokens this chunk contributed to the inverted
    /// index; removal takes out exactly these postings.
    tokens: HashSet<String>,
    /// Stemmed unigrams of the chunk text, for the lexical gate.
    stems: HashSet<String>,
}

#[derive(Default)]
struct IndexState {
    entries: HashMap<String, IndexEntry>,
    by_document: HashMap<Uuid, HashSet<String>>,
    postings: HashMap<String, HashSet<String>>,
}

impl IndexState {
    fn unlink(&mut self, entry: &IndexEntry) {
        if let Some(ids) = self.by_document.get_mut(&entry.chunk.document_id) {
            ids.remove(&entry.chunk.id);
            if ids.is_empty() {
                self.by_document.remove(&entry.chunk.document_id);
            }
        }
        for token in &entry.tokens {
            if let Some(ids) = self.postings.get_mut(token) {
                ids.remove(&entry.chunk.id);
                if ids.is_empty() {
                    self.postings.remove(token);
                }
            }
        }
    }
}

/// In-memory hybrid index. One instance per process with an explicit
/// lifecycle; a coarse interior lock keeps concurrent `add_chunks` and
/// `remove_document` calls safe at the expected update volume.
pub struct HybridIndex {
    dimensions: usize,
    tuning: SearchTuning,
    state: RwLock<IndexState>,
}

impl HybridIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            tuning: SearchTuning::default(),
            state: RwLock::new(IndexState::default()),
        }
    }

    pub fn with_tuning(mut self, tuning: SearchTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn tuning(&self) -> &SearchTuning {
        &self.tuning
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|state| state.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Idempotent upsert by chunk id: re-adding a chunk replaces its
    /// entry and postings. Blank chunks are skipped; embeddings whose
    /// dimension disagrees with the index are dropped so the chunk
    /// degrades to lexical-only instead of erroring.
    pub fn add_chunks(&self, chunks: &[Chunk]) -> Result<usize, IndexError> {
        let mut state = self.write_state()?;
        let mut added = 0usize;

        for chunk in chunks {
            if chunk.is_blank() {
                continue;
            }

            if let Some(existing) = state.by_document.get(&chunk.document_id) {
                if let Some(sample) = existing.iter().next() {
                    if let Some(entry) = state.entries.get(sample) {
                        if entry.chunk.tenant_id != chunk.tenant_id {
                            return Err(IndexError::Corruption(format!(
                                "document {} indexed under two tenants",
                                chunk.document_id
                            )));
                        }
                    }
                }
            }

            if let Some(previous) = state.entries.remove(&chunk.id) {
                state.unlink(&previous);
            }

            let mut chunk = chunk.clone();
            if let Some(vector) = &chunk.embedding {
                if vector.len() != self.dimensions {
                    warn!(
                        chunk_id = %chunk.id,
                        vector_len = vector.len(),
                        dimensions = self.dimensions,
                        "dropping mismatched embedding, chunk is lexical-only"
                    );
                    chunk.embedding = None;
                }
            }

            let tokens: HashSet<String> = keyword_terms(&chunk.content).into_iter().collect();
            let stems: HashSet<String> = tokenize(&chunk.content)
                .iter()
                .map(|word| stem(word).to_string())
                .collect();

            for token in &tokens {
                state
                    .postings
                    .entry(token.clone())
                    .or_default()
                    .insert(chunk.id.clone());
            }
            state
                .by_document
                .entry(chunk.document_id)
                .or_default()
                .insert(chunk.id.clone());
            state.entries.insert(
                chunk.id.clone(),
                IndexEntry {
                    chunk,
                    tokens,
                    stems,
                },
            );
            added += 1;
        }

        Ok(added)
    }

    /// Remove every chunk of a document from all structures. A no-op for
    /// unknown documents.
    pub fn remove_document(&self, document_id: Uuid) -> Result<usize, IndexError> {
        let mut state = self.write_state()?;
        let Some(chunk_ids) = state.by_document.remove(&document_id) else {
            return Ok(0);
        };

        for chunk_id in &chunk_ids {
            let entry = state.entries.remove(chunk_id).ok_or_else(|| {
                IndexError::Corruption(format!(
                    "chunk {chunk_id} tracked for document {document_id} but missing from entries"
                ))
            })?;
            for token in &entry.tokens {
                if let Some(ids) = state.postings.get_mut(token) {
                    ids.remove(chunk_id);
                    if ids.is_empty() {
                        state.postings.remove(token);
                    }
                }
            }
        }

        debug!(%document_id, removed = chunk_ids.len(), "removed document from index");
        Ok(chunk_ids.len())
    }

    /// Replace the whole index from a durable-store scan.
    pub fn rebuild(&self, chunks: &[Chunk]) -> Result<usize, IndexError> {
        {
            let mut state = self.write_state()?;
            *state = IndexState::default();
        }
        self.add_chunks(chunks)
    }

    /// Hybrid search. The tenant filter is applied before anything else;
    /// no scoring path ever sees another tenant's chunks.
    pub fn search(
        &self,
        query: &str,
        query_embedding: Option<&[f32]>,
        scope: &SearchScope,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<RankedChunk>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let state = self.read_state()?;

        // 1. Candidate narrowing: tenant boundary first, then allowlist.
        let admitted: HashMap<&str, &IndexEntry> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.chunk.tenant_id == scope.tenant_id)
            .filter(|(_, entry)| scope.admits_file(entry.chunk.document_id))
            .map(|(id, entry)| (id.as_str(), entry))
            .collect();

        // 2. Vector pass at a relaxed threshold, bounded superset.
        let relaxed = threshold * self.tuning.relaxed_ratio;
        let mut similarities: HashMap<&str, f32> = HashMap::new();
        if let Some(query_vector) = query_embedding {
            let mut scored: Vec<(&str, f32)> = Vec::new();
            for (&id, entry) in &admitted {
                let Some(vector) = &entry.chunk.embedding else {
                    continue;
                };
                if vector.len() != query_vector.len() {
                    continue;
                }
                let similarity = cosine_similarity(query_vector, vector)?;
                if similarity >= relaxed {
                    scored.push((id, similarity));
                }
            }
            scored.sort_by(|a, b| b.1.total_cmp(&a.1));
            let cap = limit
                .saturating_mul(self.tuning.candidate_multiplier)
                .max(limit);
            scored.truncate(cap);
            similarities = scored.into_iter().collect();
        }

        // 3. Lexical pass: normalized keyword/bigram hits per candidate.
        let query_terms = keyword_terms(query);
        let significant: Vec<String> = tokenize(query)
            .into_iter()
            .filter(|word| word.len() > 1 && !STOP_WORDS.contains(&word.as_str()))
            .collect();

        let mut keyword_hits: HashMap<&str, usize> = HashMap::new();
        for term in &query_terms {
            if let Some(ids) = state.postings.get(term) {
                for id in ids {
                    if let Some((&admitted_id, _)) = admitted.get_key_value(id.as_str()) {
                        *keyword_hits.entry(admitted_id).or_default() += 1;
                    }
                }
            }
        }

        // 4. Fusion over the union of both passes, behind the lexical gate.
        let mut candidate_ids: HashSet<&str> = similarities.keys().copied().collect();
        candidate_ids.extend(keyword_hits.keys().copied());

        let mut results = Vec::new();
        for id in candidate_ids {
            let entry = admitted.get(id).ok_or_else(|| {
                IndexError::Corruption(format!("scored chunk {id} missing from candidate set"))
            })?;

            if !passes_term_gate(entry, &significant, self.tuning.min_term_ratio) {
                continue;
            }

            let similarity = similarities.get(id).copied();
            let keyword_score = keyword_hits
                .get(id)
                .map(|hits| *hits as f32 / query_terms.len().max(1) as f32)
                .unwrap_or(0.0);

            let fused_score = match (similarity, keyword_score > 0.0) {
                (Some(similarity), true) => {
                    self.tuning.vector_weight * similarity
                        + self.tuning.keyword_weight * keyword_score
                }
                (Some(similarity), false) => similarity,
                (None, true) => self.tuning.keyword_only_weight * keyword_score,
                (None, false) => continue,
            };

            results.push(RankedChunk {
                chunk: entry.chunk.clone(),
                similarity,
                keyword_score,
                fused_score,
            });
        }

        results.sort_by(|a, b| {
            b.fused_score
                .total_cmp(&a.fused_score)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        results.truncate(limit);
        Ok(results)
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, IndexState>, IndexError> {
        self.state
            .read()
            .map_err(|_| IndexError::Corruption("poisoned index lock".to_string()))
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, IndexState>, IndexError> {
        self.state
            .write()
            .map_err(|_| IndexError::Corruption("poisoned index lock".to_string()))
    }
}

/// The lexical gate: enough of the significant query terms must appear,
/// tolerating trailing plural/possessive variants, in the chunk text.
fn passes_term_gate(entry: &IndexEntry, significant: &[String], min_ratio: f32) -> bool {
    if significant.is_empty() {
        return true;
    }
    let matched = significant
        .iter()
        .filter(|term| entry.stems.contains(stem(term)))
        .count();
    matched as f32 / significant.len() as f32 >= min_ratio
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|raw| {
            raw.chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect()
}

/// Single non-stop words plus adjacent-word bigrams: the posting keys.
fn keyword_terms(text: &str) -> Vec<String> {
    let words: Vec<String> = tokenize(text)
        .into_iter()
        .filter(|word| word.len() > 1 && !STOP_WORDS.contains(&word.as_str()))
        .collect();
    let mut terms = words.clone();
    terms.extend(words.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    terms
}

/// Trailing-plural/possessive tolerant stem. Deliberately crude; it only
/// has to make "forecast" meet "forecasts".
fn stem(token: &str) -> &str {
    if let Some(base) = token.strip_suffix("es") {
        if base.len() >= 3 {
            return base;
        }
    }
    if let Some(base) = token.strip_suffix('s') {
        if base.len() >= 2 {
            return base;
        }
    }
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkPosition;

    fn chunk(
        id: &str,
        tenant: &str,
        document_id: Uuid,
        content: &str,
        embedding: Option<Vec<f32>>,
    ) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id,
            tenant_id: tenant.to_string(),
            file_name: format!("{id}.txt"),
            chunk_index: 0,
            content: content.to_string(),
            embedding,
            position: Some(ChunkPosition {
                start_word: 0,
                end_word: 3,
                word_count: 3,
            }),
        }
    }

    fn permissive_tuning() -> SearchTuning {
        SearchTuning {
            min_term_ratio: 0.0,
            ..SearchTuning::default()
        }
    }

    #[test]
    fn search_never_crosses_the_tenant_boundary() {
        let index = HybridIndex::new(3).with_tuning(permissive_tuning());
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        // The other tenant's chunk is a perfect vector match.
        index
            .add_chunks(&[
                chunk(
                    "own",
                    "tenant-a",
                    doc_a,
                    "storage cluster upgrade",
                    Some(vec![0.5, 0.5, 0.0]),
                ),
                chunk(
                    "foreign",
                    "tenant-b",
                    doc_b,
                    "storage cluster upgrade",
                    Some(vec![1.0, 0.0, 0.0]),
                ),
            ])
            .unwrap();

        let results = index
            .search(
                "storage cluster upgrade",
                Some(&[1.0, 0.0, 0.0]),
                &SearchScope::tenant("tenant-a"),
                10,
                0.2,
            )
            .unwrap();

        assert!(!results.is_empty());
        assert!(results.iter().all(|hit| hit.chunk.tenant_id == "tenant-a"));
        assert!(results.iter().all(|hit| hit.chunk.id != "foreign"));
    }

    #[test]
    fn file_allowlist_narrows_candidates() {
        let index = HybridIndex::new(3).with_tuning(permissive_tuning());
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        index
            .add_chunks(&[
                chunk("a", "t", doc_a, "database failover drill", None),
                chunk("b", "t", doc_b, "database failover drill", None),
            ])
            .unwrap();

        let scope = SearchScope::tenant("t").with_files(vec![doc_a]);
        let results = index
            .search("database failover", None, &scope, 10, 0.7)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.document_id, doc_a);
    }

    #[test]
    fn remove_document_leaves_no_dangling_postings() {
        let index = HybridIndex::new(3).with_tuning(permissive_tuning());
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        index
            .add_chunks(&[
                chunk("a1", "t", doc_a, "kubernetes upgrade checklist", None),
                chunk("b1", "t", doc_b, "kubernetes rollback checklist", None),
            ])
            .unwrap();

        assert_eq!(index.remove_document(doc_a).unwrap(), 1);
        // Removing again is a no-op, not an error.
        assert_eq!(index.remove_document(doc_a).unwrap(), 0);

        let results = index
            .search("kubernetes checklist", None, &SearchScope::tenant("t"), 10, 0.7)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "b1");

        // The shared keyword still resolves for the surviving document.
        let state = index.state.read().unwrap();
        let ids = state.postings.get("kubernetes").unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("b1"));
        assert!(!state.postings.contains_key("upgrade"));
    }

    #[test]
    fn re_adding_chunks_is_idempotent() {
        let index = HybridIndex::new(3).with_tuning(permissive_tuning());
        let doc = Uuid::new_v4();
        let chunks = vec![chunk("c1", "t", doc, "retry backoff policy", None)];
        index.add_chunks(&chunks).unwrap();
        index.add_chunks(&chunks).unwrap();

        assert_eq!(index.len(), 1);
        let state = index.state.read().unwrap();
        assert_eq!(state.postings.get("retry").unwrap().len(), 1);
    }

    #[test]
    fn mismatched_embedding_degrades_to_lexical_only() {
        let index = HybridIndex::new(3).with_tuning(permissive_tuning());
        let doc = Uuid::new_v4();
        index
            .add_chunks(&[chunk(
                "c1",
                "t",
                doc,
                "billing export formats",
                Some(vec![1.0, 0.0]),
            )])
            .unwrap();

        // Vector-only query finds nothing for this chunk.
        let vector_only = index
            .search("billing export", Some(&[1.0, 0.0, 0.0]), &SearchScope::tenant("t"), 10, 0.2)
            .unwrap();
        assert_eq!(vector_only.len(), 1);
        assert!(vector_only[0].similarity.is_none());
        assert!(vector_only[0].keyword_score > 0.0);
    }

    #[test]
    fn lexical_gate_rejects_vector_similar_but_topically_wrong_chunks() {
        let index = HybridIndex::new(3);
        let lahore = Uuid::new_v4();
        let paris = Uuid::new_v4();
        index
            .add_chunks(&[
                chunk(
                    "lahore-1",
                    "t",
                    lahore,
                    "Lahore weather forecasts predict heavy monsoon rain",
                    Some(vec![0.95, 0.3, 0.0]),
                ),
                chunk(
                    "lahore-2",
                    "t",
                    lahore,
                    "Weather stations around Lahore report rising humidity",
                    Some(vec![0.9, 0.4, 0.0]),
                ),
                chunk(
                    "paris-1",
                    "t",
                    paris,
                    "Paris weather stays mild with light rain expected",
                    Some(vec![0.92, 0.35, 0.0]),
                ),
            ])
            .unwrap();

        // The query embedding is vector-close to every chunk.
        let results = index
            .search(
                "Paris weather",
                Some(&[1.0, 0.3, 0.0]),
                &SearchScope::tenant("t"),
                10,
                0.7,
            )
            .unwrap();

        // "paris" + "weather" = 2 significant terms; the Lahore chunks
        // match only "weather" (50% < 60%) despite similarity above the
        // threshold.
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "paris-1");
        assert!(results[0].similarity.unwrap() >= 0.7);
    }

    #[test]
    fn fused_ranking_prefers_chunks_found_by_both_passes() {
        let index = HybridIndex::new(3).with_tuning(permissive_tuning());
        let doc = Uuid::new_v4();
        index
            .add_chunks(&[
                chunk(
                    "both",
                    "t",
                    doc,
                    "incident postmortem template",
                    Some(vec![0.9, 0.1, 0.0]),
                ),
                chunk(
                    "vector-only",
                    "t",
                    doc,
                    "unrelated facilities memo",
                    Some(vec![0.88, 0.12, 0.0]),
                ),
            ])
            .unwrap();

        let results = index
            .search(
                "incident postmortem",
                Some(&[1.0, 0.0, 0.0]),
                &SearchScope::tenant("t"),
                10,
                0.2,
            )
            .unwrap();

        assert_eq!(results[0].chunk.id, "both");
    }

    #[test]
    fn rebuild_replaces_prior_contents() {
        let index = HybridIndex::new(3).with_tuning(permissive_tuning());
        let old_doc = Uuid::new_v4();
        let new_doc = Uuid::new_v4();
        index
            .add_chunks(&[chunk("old", "t", old_doc, "stale content here", None)])
            .unwrap();
        index
            .rebuild(&[chunk("new", "t", new_doc, "fresh content here", None)])
            .unwrap();

        assert_eq!(index.len(), 1);
        let results = index
            .search("stale content", None, &SearchScope::tenant("t"), 10, 0.7)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn empty_query_is_rejected() {
        let index = HybridIndex::new(3);
        let result = index.search("   ", None, &SearchScope::tenant("t"), 10, 0.7);
        assert!(matches!(result, Err(SearchError::EmptyQuery)));
    }

    #[test]
    fn stemming_tolerates_trailing_plurals() {
        assert_eq!(stem("forecasts"), "forecast");
        assert_eq!(stem("boxes"), "box");
        assert_eq!(stem("paris"), "pari");
        assert_eq!(stem("as"), "as");
    }
}
