//! Semantic cache keyed by embedding similarity
//!
//! Maps previously answered queries to complete responses. A hit
//! requires near-paraphrase similarity (threshold well above the
//! retrieval floor) and short-circuits the rest of the pipeline, which
//! makes it the primary latency and cost optimization. Entries expire
//! lazily by TTL and are evicted least-recently-used at capacity.
//!
//! All state lives behind one mutex: a lookup can never observe a
//! partially written entry, and when two identical queries race, the
//! second store overwrites the first (last-writer-wins).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::index::flat::cosine_similarity;
use crate::query::intent::Intent;
use crate::query::pipeline::SourceRef;

/// One cached answer
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub query: String,
    pub embedding: Vec<f32>,
    pub response: String,
    pub intent: Intent,
    pub confidence: f32,
    pub sources: Vec<SourceRef>,
    pub created_at: Instant,
    pub last_access: Instant,
    pub hit_count: u64,
}

/// A successful cache lookup
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub response: String,
    pub intent: Intent,
    pub confidence: f32,
    pub sources: Vec<SourceRef>,
    /// Similarity between the incoming query and the cached one
    pub similarity: f32,
    pub cached_query: String,
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, in [0, 1]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheState {
    entries: Vec<CacheEntry>,
    hits: u64,
    misses: u64,
}

/// In-memory semantic cache with TTL and LRU eviction
pub struct SemanticCache {
    hit_threshold: f32,
    ttl: Duration,
    max_entries: usize,
    state: Mutex<CacheState>,
}

impl SemanticCache {
    /// Create a cache from configuration
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            hit_threshold: config.hit_threshold,
            ttl: Duration::from_secs(config.ttl_seconds),
            max_entries: config.max_entries,
            state: Mutex::new(CacheState {
                entries: Vec::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Find a cached answer for a semantically near-identical query
    ///
    /// Expired entries are skipped and dropped lazily. On a hit the
    /// entry's `hit_count` and recency are updated.
    pub fn lookup(&self, query_vector: &[f32]) -> Option<CacheHit> {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();

        Self::evict_expired(&mut state.entries, self.ttl, now);

        let mut best: Option<(usize, f32)> = None;
        for (idx, entry) in state.entries.iter().enumerate() {
            let similarity = cosine_similarity(query_vector, &entry.embedding);
            match best {
                Some((_, best_sim)) if similarity <= best_sim => {}
                _ => best = Some((idx, similarity)),
            }
        }

        match best {
            Some((idx, similarity)) if similarity >= self.hit_threshold => {
                let entry = &mut state.entries[idx];
                entry.last_access = now;
                entry.hit_count += 1;

                let hit = CacheHit {
                    response: entry.response.clone(),
                    intent: entry.intent,
                    confidence: entry.confidence,
                    sources: entry.sources.clone(),
                    similarity,
                    cached_query: entry.query.clone(),
                };

                state.hits += 1;
                Some(hit)
            }
            _ => {
                state.misses += 1;
                None
            }
        }
    }

    /// Store a complete answer keyed by the query embedding
    ///
    /// If an existing entry is a near-paraphrase of the new query the
    /// new answer replaces it; otherwise the entry is appended, evicting
    /// the least-recently-used entry at capacity.
    pub fn store(
        &self,
        query: &str,
        embedding: Vec<f32>,
        response: &str,
        intent: Intent,
        confidence: f32,
        sources: Vec<SourceRef>,
    ) {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();

        Self::evict_expired(&mut state.entries, self.ttl, now);

        let entry = CacheEntry {
            query: query.to_string(),
            embedding,
            response: response.to_string(),
            intent,
            confidence,
            sources,
            created_at: now,
            last_access: now,
            hit_count: 0,
        };

        // Last-writer-wins for racing identical queries
        if let Some(existing) = state
            .entries
            .iter_mut()
            .find(|e| cosine_similarity(&entry.embedding, &e.embedding) >= self.hit_threshold)
        {
            *existing = entry;
            return;
        }

        if state.entries.len() >= self.max_entries {
            Self::evict_lru(&mut state.entries);
        }

        state.entries.push(entry);
    }

    /// Current statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap();
        CacheStats {
            entries: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
        }
    }

    /// Drop every entry and reset counters
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
    }

    fn evict_expired(entries: &mut Vec<CacheEntry>, ttl: Duration, now: Instant) {
        entries.retain(|entry| now.duration_since(entry.created_at) < ttl);
    }

    fn evict_lru(entries: &mut Vec<CacheEntry>) {
        if let Some(oldest) = entries
            .iter()
            .enumerate()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(idx, _)| idx)
        {
            entries.remove(oldest);
        }
    }
}
