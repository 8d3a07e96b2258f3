//! Flat cosine-similarity index over chunk embeddings
//!
//! Exact nearest-neighbor search by linear scan. The knowledge base for a
//! single support domain is a few hundred chunks at most, so a flat scan
//! beats an approximate structure on both simplicity and recall. Vectors
//! are L2-normalized once at build time; search is then a dot product.

use crate::errors::{PipelineError, Result};
use crate::index::store::ChunkStore;

/// A single nearest-neighbor match
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub chunk_id: String,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

/// Nearest-neighbor search over chunk embeddings
///
/// Implementations must be safe for concurrent readers; the index is
/// never written during query processing.
pub trait VectorSearch: Send + Sync {
    /// Return the `top_n` chunks nearest to `query_vector`, ordered by
    /// descending cosine similarity
    fn search(&self, query_vector: &[f32], top_n: usize) -> Result<Vec<IndexHit>>;
}

/// In-memory exact index with pre-normalized vectors
pub struct FlatIndex {
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    dimension: usize,
}

impl FlatIndex {
    /// Build the index from a chunk store, normalizing every embedding
    pub fn build(store: &ChunkStore) -> Result<Self> {
        let dimension = store.dimension();
        let mut ids = Vec::with_capacity(store.len());
        let mut vectors = Vec::with_capacity(store.len());

        for chunk in store.chunks() {
            ids.push(chunk.id.clone());
            vectors.push(normalize(&chunk.embedding));
        }

        Ok(Self {
            ids,
            vectors,
            dimension,
        })
    }

    /// Number of indexed vectors
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the index holds no vectors
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Embedding dimensionality
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl VectorSearch for FlatIndex {
    fn search(&self, query_vector: &[f32], top_n: usize) -> Result<Vec<IndexHit>> {
        if self.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        if query_vector.len() != self.dimension {
            return Err(PipelineError::RetrievalUnavailable(format!(
                "query vector dimension {} does not match index dimension {}",
                query_vector.len(),
                self.dimension
            )));
        }

        let query = normalize(query_vector);

        let mut hits: Vec<IndexHit> = self
            .ids
            .iter()
            .zip(self.vectors.iter())
            .map(|(id, vector)| IndexHit {
                chunk_id: id.clone(),
                score: dot(&query, vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_n);

        Ok(hits)
    }
}

/// Dot product of two equal-length vectors
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2-normalize a vector; zero vectors are returned unchanged
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / magnitude).collect()
}

/// Cosine similarity between two vectors of the same dimension
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let ma: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if ma == 0.0 || mb == 0.0 {
        return 0.0;
    }
    dot(a, b) / (ma * mb)
}
