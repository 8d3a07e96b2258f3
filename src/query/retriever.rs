//! Vector retrieval with optional reranking
//!
//! Embeds the query, pulls top-M candidates from the index, filters by
//! the cosine relevance floor, optionally reranks with the lexical
//! cross-scorer, and truncates to top-K. An empty result is a valid,
//! expected outcome meaning "insufficient knowledge"; the responder
//! turns it into the canned answer instead of hallucinating.

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::errors::Result;
use crate::index::{ChunkStore, VectorSearch};
use crate::query::intent::Intent;
use crate::query::reranker::CrossScorer;

/// A chunk selected as grounding for the response
///
/// `similarity` is cosine in [-1, 1]. `rerank_score` lives on the
/// cross-scorer's own [0, 1] scale, normalized within one candidate
/// set; the two are not comparable and the relevance floor applies to
/// `similarity` only.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub text: String,
    pub source_file: String,
    pub section_label: String,
    pub similarity: f32,
    pub rerank_score: Option<f32>,
    /// Ordering key: rerank score when reranking ran, cosine otherwise
    pub final_score: f32,
}

/// Orchestrates embedding, vector search, and reranking
pub struct Retriever {
    store: Arc<ChunkStore>,
    index: Arc<dyn VectorSearch>,
    embedder: Arc<dyn Embedder>,
    scorer: CrossScorer,
    config: RetrievalConfig,
}

impl Retriever {
    /// Create a retriever over shared read-only index structures
    pub fn new(
        store: Arc<ChunkStore>,
        index: Arc<dyn VectorSearch>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            scorer: CrossScorer::new(),
            config,
        }
    }

    /// Embed the query and retrieve grounding chunks
    pub fn retrieve(&self, query: &str, intent: Intent) -> Result<Vec<RetrievedChunk>> {
        let vector = self.embedder.embed(query)?;
        self.retrieve_embedded(query, &vector, intent)
    }

    /// Retrieve using an already-computed query embedding
    ///
    /// The pipeline embeds once and shares the vector between the cache
    /// lookup and retrieval; this is the entry point it uses.
    pub fn retrieve_embedded(
        &self,
        query: &str,
        query_vector: &[f32],
        intent: Intent,
    ) -> Result<Vec<RetrievedChunk>> {
        let hits = self.index.search(query_vector, self.config.candidates)?;

        let mut candidates: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter(|hit| hit.score >= self.config.min_similarity)
            .filter_map(|hit| {
                self.store.get(&hit.chunk_id).map(|chunk| RetrievedChunk {
                    chunk_id: chunk.id.clone(),
                    text: chunk.text.clone(),
                    source_file: chunk.source_file.clone(),
                    section_label: chunk.section_label.clone(),
                    similarity: hit.score,
                    rerank_score: None,
                    final_score: hit.score,
                })
            })
            .collect();

        if self.config.rerank {
            candidates = self.scorer.rerank(query, intent, candidates);
        }

        candidates.truncate(self.config.top_k);
        Ok(candidates)
    }

    /// Active retrieval configuration
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }
}
