//! Lexical cross-scoring over (query, chunk) pairs
//!
//! Second-pass relevance scoring for the vector candidates: each pair is
//! scored on direct term overlap plus an intent affinity boost, then
//! min-max normalized within the candidate set. The resulting scale is
//! ordinal and per-query; it must never be compared against cosine
//! similarity or across queries.

use crate::query::intent::Intent;
use crate::query::retriever::RetrievedChunk;

/// Cross-scorer configuration
#[derive(Debug, Clone)]
pub struct CrossScorerConfig {
    /// Weight of adjacent-pair (phrase) matches relative to term matches
    pub phrase_weight: f32,
    /// Additive boost when the chunk matches the query's intent
    pub intent_boost: f32,
    /// Terms shorter than this are ignored as noise
    pub min_term_len: usize,
}

impl Default for CrossScorerConfig {
    fn default() -> Self {
        Self {
            phrase_weight: 0.25,
            intent_boost: 0.1,
            min_term_len: 4,
        }
    }
}

/// Scores (query, chunk_text) pairs and reorders candidates
pub struct CrossScorer {
    config: CrossScorerConfig,
}

impl CrossScorer {
    /// Create a scorer with default weights
    pub fn new() -> Self {
        Self {
            config: CrossScorerConfig::default(),
        }
    }

    /// Create a scorer with custom weights
    pub fn with_config(config: CrossScorerConfig) -> Self {
        Self { config }
    }

    /// Score each candidate against the query, normalize within the set,
    /// and sort by descending rerank score
    pub fn rerank(
        &self,
        query: &str,
        intent: Intent,
        candidates: Vec<RetrievedChunk>,
    ) -> Vec<RetrievedChunk> {
        if candidates.is_empty() {
            return candidates;
        }

        let raw: Vec<f32> = candidates
            .iter()
            .map(|chunk| self.pair_score(query, intent, chunk))
            .collect();

        let min = raw.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = raw.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let range = max - min;

        let mut scored: Vec<RetrievedChunk> = candidates
            .into_iter()
            .zip(raw)
            .map(|(mut chunk, score)| {
                // Degenerate set (all raw scores equal) keeps full score;
                // the ordering is unchanged either way
                let normalized = if range > 0.0 {
                    (score - min) / range
                } else {
                    1.0
                };
                chunk.rerank_score = Some(normalized);
                chunk.final_score = normalized;
                chunk
            })
            .collect();

        scored.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        scored
    }

    /// Raw relevance of one (query, chunk) pair
    fn pair_score(&self, query: &str, intent: Intent, chunk: &RetrievedChunk) -> f32 {
        let query_lower = query.to_lowercase();
        let content_lower = chunk.text.to_lowercase();

        let terms: Vec<&str> = query_lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= self.config.min_term_len)
            .collect();

        if terms.is_empty() {
            return 0.0;
        }

        let matched = terms
            .iter()
            .filter(|t| content_lower.contains(**t))
            .count();
        let term_score = matched as f32 / terms.len() as f32;

        // Adjacent-pair matches reward phrase-level agreement
        let pairs = terms.len().saturating_sub(1);
        let phrase_score = if pairs > 0 {
            let matched_pairs = terms
                .windows(2)
                .filter(|pair| content_lower.contains(&format!("{} {}", pair[0], pair[1])))
                .count();
            matched_pairs as f32 / pairs as f32
        } else {
            0.0
        };

        let mut score = term_score + self.config.phrase_weight * phrase_score;

        if self.matches_intent(intent, chunk) {
            score += self.config.intent_boost;
        }

        score
    }

    /// Whether a chunk belongs to the query's topic
    fn matches_intent(&self, intent: Intent, chunk: &RetrievedChunk) -> bool {
        if intent == Intent::Otro {
            return false;
        }

        let label = intent.label();
        chunk.section_label.to_lowercase().contains(label)
            || chunk.source_file.to_lowercase().contains(label)
    }

    /// Active configuration
    pub fn config(&self) -> &CrossScorerConfig {
        &self.config
    }
}

impl Default for CrossScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, text: &str, section: &str, similarity: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: id.to_string(),
            text: text.to_string(),
            source_file: "doc.md".to_string(),
            section_label: section.to_string(),
            similarity,
            rerank_score: None,
            final_score: similarity,
        }
    }

    #[test]
    fn test_rerank_empty_set() {
        let scorer = CrossScorer::new();
        let result = scorer.rerank("planes", Intent::Planes, Vec::new());
        assert!(result.is_empty());
    }

    #[test]
    fn test_overlapping_chunk_ranks_first() {
        let scorer = CrossScorer::new();
        let candidates = vec![
            candidate("a", "horario de oficina y contacto", "Info", 0.8),
            candidate("b", "planes de soporte disponibles", "Planes", 0.8),
        ];

        let ranked = scorer.rerank("planes de soporte", Intent::Otro, candidates);
        assert_eq!(ranked[0].chunk_id, "b");
        assert_eq!(ranked[0].rerank_score, Some(1.0));
        assert_eq!(ranked[1].rerank_score, Some(0.0));
    }

    #[test]
    fn test_scores_normalized_to_unit_interval() {
        let scorer = CrossScorer::new();
        let candidates = vec![
            candidate("a", "soporte remoto", "Soporte", 0.9),
            candidate("b", "planes de soporte y precios", "Planes", 0.8),
            candidate("c", "texto sin relacion", "Otro", 0.7),
        ];

        let ranked = scorer.rerank("planes de soporte", Intent::Otro, candidates);
        for chunk in &ranked {
            let score = chunk.rerank_score.unwrap();
            assert!((0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn test_degenerate_set_keeps_order() {
        let scorer = CrossScorer::new();
        let candidates = vec![
            candidate("a", "mismo texto", "X", 0.9),
            candidate("b", "mismo texto", "X", 0.8),
        ];

        let ranked = scorer.rerank("consulta general", Intent::Otro, candidates);
        assert_eq!(ranked[0].chunk_id, "a");
        assert_eq!(ranked[0].rerank_score, Some(1.0));
        assert_eq!(ranked[1].rerank_score, Some(1.0));
    }

    #[test]
    fn test_intent_boost_breaks_lexical_tie() {
        let scorer = CrossScorer::new();
        let candidates = vec![
            candidate("generic", "informacion de soporte", "General", 0.8),
            candidate("on_topic", "informacion de soporte", "planes", 0.8),
        ];

        let ranked = scorer.rerank("informacion soporte", Intent::Planes, candidates);
        assert_eq!(ranked[0].chunk_id, "on_topic");
    }

    #[test]
    fn test_term_coverage_drives_score() {
        let scorer = CrossScorer::new();
        let candidates = vec![
            candidate("scattered", "soporte para todos; hay planes", "X", 0.8),
            candidate("phrase", "nuestros planes de soporte incluyen", "X", 0.8),
        ];

        let ranked = scorer.rerank("para todos planes", Intent::Otro, candidates);
        assert_eq!(ranked[0].chunk_id, "scattered");
    }
}
