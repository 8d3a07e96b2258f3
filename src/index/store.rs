//! Immutable chunk store loaded from the ingestion snapshot

use crate::errors::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A segment of source document text with its embedding
///
/// Created during offline ingestion; never mutated at query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source_file: String,
    #[serde(default)]
    pub section_label: String,
    pub embedding: Vec<f32>,
}

/// Read-only collection of chunks with id lookup
pub struct ChunkStore {
    chunks: Vec<Chunk>,
    by_id: HashMap<String, usize>,
}

impl ChunkStore {
    /// Build a store from already-loaded chunks
    pub fn new(chunks: Vec<Chunk>) -> Result<Self> {
        let dimension = match chunks.first() {
            Some(first) => first.embedding.len(),
            None => 0,
        };

        let mut by_id = HashMap::with_capacity(chunks.len());
        for (idx, chunk) in chunks.iter().enumerate() {
            if chunk.embedding.len() != dimension {
                return Err(PipelineError::Index(format!(
                    "chunk {} has embedding dimension {} but store dimension is {}",
                    chunk.id,
                    chunk.embedding.len(),
                    dimension
                )));
            }
            if by_id.insert(chunk.id.clone(), idx).is_some() {
                return Err(PipelineError::Index(format!(
                    "duplicate chunk id: {}",
                    chunk.id
                )));
            }
        }

        Ok(Self { chunks, by_id })
    }

    /// Load the JSON snapshot produced by the offline ingestion step
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Index(format!(
                "failed to read chunk snapshot {}: {}",
                path.display(),
                e
            ))
        })?;

        let chunks: Vec<Chunk> = serde_json::from_str(&contents)
            .map_err(|e| PipelineError::Index(format!("failed to parse chunk snapshot: {}", e)))?;

        Self::new(chunks)
    }

    /// Look up a chunk by id
    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.by_id.get(id).map(|&idx| &self.chunks[idx])
    }

    /// All chunks in snapshot order
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Number of chunks in the store
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the store holds no chunks
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Embedding dimensionality shared by every chunk (0 when empty)
    pub fn dimension(&self) -> usize {
        self.chunks.first().map_or(0, |c| c.embedding.len())
    }
}
