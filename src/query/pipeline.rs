//! Pipeline orchestrator
//!
//! Sequences rate limiting, validation, cache lookup, intent
//! classification, retrieval, and response generation, and converts
//! every failure into a `PipelineResult` with a friendly message; an
//! error never escapes to the caller. Each outcome is recorded in the
//! result sink before it is returned.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RagConfig;
use crate::embedding::Embedder;
use crate::errors::{PipelineError, Result};
use crate::generation::Generator;
use crate::index::{ChunkStore, VectorSearch};
use crate::query::cache::SemanticCache;
use crate::query::intent::{Intent, IntentClassifier};
use crate::query::responder::{Responder, TECHNICAL_DIFFICULTIES};
use crate::query::retriever::{RetrievedChunk, Retriever};
use crate::query::state::{QueryState, StageEvent};
use crate::query::validator::QueryValidator;
use crate::ratelimit::RateLimiter;
use crate::sink::{QueryRecord, ResultSink};

/// One incoming question; ephemeral, one per pipeline invocation
#[derive(Debug, Clone)]
pub struct Query {
    pub raw_text: String,
    pub requester_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A grounding source cited by a response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_file: String,
    pub section_label: String,
    pub score: f32,
}

/// One prior exchange, passed in verbatim by the caller
///
/// The core keeps no dialogue state; whatever multi-turn context exists
/// lives in the orchestrating application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
}

/// Outcome of one pipeline invocation
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub success: bool,
    pub response: String,
    pub intent: Intent,
    pub confidence: f32,
    pub sources: Vec<SourceRef>,
    pub tokens_used: u32,
    pub latency_ms: u64,
    pub cache_hit: bool,
    /// Stable error label when the query did not complete normally
    pub error: Option<String>,
}

/// The query pipeline: the core's single public operation
pub struct QueryPipeline {
    validator: QueryValidator,
    classifier: IntentClassifier,
    cache: Arc<SemanticCache>,
    retriever: Retriever,
    responder: Responder,
    embedder: Arc<dyn Embedder>,
    limiter: Arc<dyn RateLimiter>,
    sink: Arc<dyn ResultSink>,
}

impl QueryPipeline {
    /// Wire the pipeline from its injected collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &RagConfig,
        store: Arc<ChunkStore>,
        index: Arc<dyn VectorSearch>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        limiter: Arc<dyn RateLimiter>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            validator: QueryValidator::new(config.validation.max_query_chars),
            classifier: IntentClassifier::new(),
            cache: Arc::new(SemanticCache::new(&config.cache)),
            retriever: Retriever::new(
                store,
                index,
                embedder.clone(),
                config.retrieval.clone(),
            ),
            responder: Responder::new(generator, config.responder.clone()),
            embedder,
            limiter,
            sink,
        }
    }

    /// Process one query for one requester
    pub async fn process(&self, requester_id: &str, query_text: &str) -> PipelineResult {
        self.process_with_history(requester_id, query_text, None)
            .await
    }

    /// Process one query with prior conversation turns from the caller
    pub async fn process_with_history(
        &self,
        requester_id: &str,
        query_text: &str,
        history: Option<&[ConversationTurn]>,
    ) -> PipelineResult {
        let started = Instant::now();
        let query = Query {
            raw_text: query_text.to_string(),
            requester_id: requester_id.to_string(),
            timestamp: Utc::now(),
        };

        // Orchestrator boundary: nothing below may escape as an error
        let result = match self.run(&query, history, started).await {
            Ok(result) => result,
            Err(e) => self.failure_result(&e, started, Intent::Otro, 0.0),
        };

        self.record(&query, &result);
        result
    }

    /// Semantic cache statistics for operational visibility
    pub fn cache_stats(&self) -> crate::query::cache::CacheStats {
        self.cache.stats()
    }

    async fn run(
        &self,
        query: &Query,
        history: Option<&[ConversationTurn]>,
        started: Instant,
    ) -> Result<PipelineResult> {
        let mut state = QueryState::Received;

        // 1. Rate limit: check and increment are one atomic step
        if !self.limiter.check_and_increment(&query.requester_id) {
            state.transition(StageEvent::RateExceeded)?;
            let err = PipelineError::RateLimited {
                limit: self.limiter.limit(),
            };
            return Ok(self.failure_result(&err, started, Intent::Otro, 0.0));
        }
        state = state.transition(StageEvent::RateOk)?;

        // 2. Validate before any retrieval work
        if let Err(e) = self.validator.validate(&query.raw_text) {
            state.transition(StageEvent::ValidationFailed)?;
            return Ok(self.failure_result(&e, started, Intent::Otro, 0.0));
        }
        state = state.transition(StageEvent::Accepted)?;

        // 3. Embed once; the vector serves both cache lookup and retrieval
        let vector = match retry_once(|| self.embedder.embed(&query.raw_text)) {
            Ok(v) => v,
            Err(e) => {
                state.transition(StageEvent::StageFailure)?;
                return Ok(self.degraded_result(&e, started, Intent::Otro, 0.0));
            }
        };
        state = state.transition(StageEvent::LookupDone)?;

        // 4. Cache hit short-circuits retrieval and generation entirely
        if let Some(hit) = self.cache.lookup(&vector) {
            state.transition(StageEvent::HitFound)?;
            return Ok(PipelineResult {
                success: true,
                response: hit.response,
                intent: hit.intent,
                confidence: hit.confidence,
                sources: hit.sources,
                tokens_used: 0,
                latency_ms: elapsed_ms(started),
                cache_hit: true,
                error: None,
            });
        }

        // 5. Classify to bias retrieval and response tone
        let classification = self.classifier.classify(&query.raw_text);

        // 6. Retrieve grounding chunks
        let chunks = match retry_once(|| {
            self.retriever
                .retrieve_embedded(&query.raw_text, &vector, classification.intent)
        }) {
            Ok(chunks) => chunks,
            Err(e) => {
                state.transition(StageEvent::StageFailure)?;
                return Ok(self.degraded_result(
                    &e,
                    started,
                    classification.intent,
                    classification.confidence,
                ));
            }
        };
        state = state.transition(StageEvent::RetrievalDone)?;

        // 7. Generate (or return the canned insufficient-information text)
        let output = match self
            .responder
            .respond(&query.raw_text, classification.intent, &chunks, history)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                state.transition(StageEvent::StageFailure)?;
                return Ok(self.degraded_result(
                    &e,
                    started,
                    classification.intent,
                    classification.confidence,
                ));
            }
        };
        state.transition(StageEvent::ResponseDone)?;

        let sources = to_source_refs(&chunks);

        // 8. Store the complete answer for repeat questions. This runs
        //    only after a full response: a request cancelled mid-flight
        //    leaves no partial cache entry.
        self.cache.store(
            &query.raw_text,
            vector,
            &output.text,
            classification.intent,
            classification.confidence,
            sources.clone(),
        );

        Ok(PipelineResult {
            success: true,
            response: output.text,
            intent: classification.intent,
            confidence: classification.confidence,
            sources,
            tokens_used: output.tokens_used,
            latency_ms: elapsed_ms(started),
            cache_hit: false,
            error: None,
        })
    }

    /// Terminal, user-facing failure (validation, rate limit, internal)
    fn failure_result(
        &self,
        error: &PipelineError,
        started: Instant,
        intent: Intent,
        confidence: f32,
    ) -> PipelineResult {
        PipelineResult {
            success: false,
            response: user_message(error),
            intent,
            confidence,
            sources: Vec::new(),
            tokens_used: 0,
            latency_ms: elapsed_ms(started),
            cache_hit: false,
            error: Some(error.label().to_string()),
        }
    }

    /// Degraded outcome after a transient dependency failure: the canned
    /// fallback, never the raw error
    fn degraded_result(
        &self,
        error: &PipelineError,
        started: Instant,
        intent: Intent,
        confidence: f32,
    ) -> PipelineResult {
        PipelineResult {
            success: false,
            response: TECHNICAL_DIFFICULTIES.to_string(),
            intent,
            confidence,
            sources: Vec::new(),
            tokens_used: 0,
            latency_ms: elapsed_ms(started),
            cache_hit: false,
            error: Some(error.label().to_string()),
        }
    }

    fn record(&self, query: &Query, result: &PipelineResult) {
        self.sink.record(QueryRecord {
            id: Uuid::new_v4(),
            requester_id: query.requester_id.clone(),
            query: query.raw_text.clone(),
            timestamp: query.timestamp,
            result: result.clone(),
        });
    }
}

/// One bounded retry for transient failures; terminal errors pass through
fn retry_once<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    match op() {
        Ok(value) => Ok(value),
        Err(e) if e.is_transient() => op(),
        Err(e) => Err(e),
    }
}

fn to_source_refs(chunks: &[RetrievedChunk]) -> Vec<SourceRef> {
    chunks
        .iter()
        .map(|chunk| SourceRef {
            source_file: chunk.source_file.clone(),
            section_label: chunk.section_label.clone(),
            score: chunk.final_score,
        })
        .collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Friendly user-facing message per error kind
fn user_message(error: &PipelineError) -> String {
    match error {
        PipelineError::EmptyInput => "Por favor, escriba su consulta.".to_string(),
        PipelineError::TooLong { max, .. } => format!(
            "Su consulta es demasiado larga. Por favor, resúmala en menos de {} caracteres.",
            max
        ),
        PipelineError::OffTopic { .. } => "Lo siento, solo puedo responder preguntas sobre \
             nuestros servicios de soporte IT: planes, SLA, tickets y mantenimiento."
            .to_string(),
        PipelineError::InjectionAttempt { .. } => "No puedo procesar esa solicitud. Por favor, \
             formule una consulta sobre nuestros servicios de soporte."
            .to_string(),
        PipelineError::RateLimited { limit } => format!(
            "Ha alcanzado el límite de {} consultas por hora. Por favor, intente nuevamente más tarde.",
            limit
        ),
        _ => TECHNICAL_DIFFICULTIES.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;

    #[test]
    fn test_user_messages_are_specific() {
        let too_long = user_message(&PipelineError::TooLong { len: 200, max: 150 });
        assert!(too_long.contains("150"));

        let limited = user_message(&PipelineError::RateLimited { limit: 15 });
        assert!(limited.contains("15"));

        let off_topic = user_message(&PipelineError::OffTopic {
            topic: "hacking".to_string(),
        });
        assert!(off_topic.contains("soporte IT"));
    }

    #[test]
    fn test_internal_errors_get_safe_message() {
        let msg = user_message(&PipelineError::Internal("stack details".to_string()));
        assert!(!msg.contains("stack details"));
        assert_eq!(msg, TECHNICAL_DIFFICULTIES);
    }

    #[test]
    fn test_retry_once_transient() {
        let mut attempts = 0;
        let result: Result<i32> = retry_once(|| {
            attempts += 1;
            if attempts == 1 {
                Err(PipelineError::RetrievalUnavailable("flaky".to_string()))
            } else {
                Ok(5)
            }
        });
        assert_eq!(result.unwrap(), 5);
        assert_eq!(attempts, 2);
    }

    #[test]
    fn test_retry_once_terminal_not_retried() {
        let mut attempts = 0;
        let result: Result<i32> = retry_once(|| {
            attempts += 1;
            Err(PipelineError::EmptyInput)
        });
        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_source_refs_preserve_order_and_scores() {
        let chunks = vec![
            RetrievedChunk {
                chunk_id: "a".to_string(),
                text: String::new(),
                source_file: "planes.md".to_string(),
                section_label: "Planes".to_string(),
                similarity: 0.9,
                rerank_score: Some(1.0),
                final_score: 1.0,
            },
            RetrievedChunk {
                chunk_id: "b".to_string(),
                text: String::new(),
                source_file: "sla.md".to_string(),
                section_label: "SLA".to_string(),
                similarity: 0.4,
                rerank_score: Some(0.2),
                final_score: 0.2,
            },
        ];

        let sources = to_source_refs(&chunks);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].source_file, "planes.md");
        assert_eq!(sources[0].score, 1.0);
        assert_eq!(sources[1].score, 0.2);
    }
}
