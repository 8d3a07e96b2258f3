//! Grounded response generation
//!
//! Builds a prompt in which the retrieved chunks are the only
//! permissible factual source and calls the generation model once (plus
//! a single bounded retry). With no grounding chunks the fixed
//! insufficient-information answer is returned without any model call.
//! Responses are re-truncated after generation; instructing the model
//! to respect the cap is not enough on its own.

use std::sync::Arc;

use crate::config::ResponderConfig;
use crate::errors::Result;
use crate::generation::{Generator, RetryPolicy};
use crate::query::intent::Intent;
use crate::query::pipeline::ConversationTurn;
use crate::query::retriever::RetrievedChunk;

/// Fixed answer when retrieval produced no grounding
pub const INSUFFICIENT_INFO: &str = "No dispongo de esa información en la base de conocimiento. \
     Le recomiendo contactar a nuestro equipo de soporte para recibir asistencia personalizada.";

/// Fixed answer when the generation model is unavailable
pub const TECHNICAL_DIFFICULTIES: &str = "Disculpe, tengo problemas técnicos en este momento. \
     Por favor, intente nuevamente en unos minutos.";

/// A generated (or canned) response
#[derive(Debug, Clone)]
pub struct ResponderOutput {
    pub text: String,
    pub tokens_used: u32,
    pub truncated: bool,
}

/// Generates grounded answers from retrieved context
pub struct Responder {
    generator: Arc<dyn Generator>,
    retry: RetryPolicy,
    config: ResponderConfig,
}

impl Responder {
    /// Create a responder over a generation client
    pub fn new(generator: Arc<dyn Generator>, config: ResponderConfig) -> Self {
        Self {
            generator,
            retry: RetryPolicy::new(config.max_retries),
            config,
        }
    }

    /// Produce an answer for the query given its grounding chunks
    ///
    /// Transient generation failures surface as errors after the retry
    /// budget is spent; the pipeline degrades them to the canned
    /// fallback rather than showing the caller a raw error.
    pub async fn respond(
        &self,
        query: &str,
        intent: Intent,
        chunks: &[RetrievedChunk],
        history: Option<&[ConversationTurn]>,
    ) -> Result<ResponderOutput> {
        if chunks.is_empty() {
            return Ok(ResponderOutput {
                text: INSUFFICIENT_INFO.to_string(),
                tokens_used: 0,
                truncated: false,
            });
        }

        let prompt = self.build_prompt(query, intent, chunks, history);

        let generation = self
            .retry
            .execute(|| self.generator.generate(&prompt, self.config.max_tokens))
            .await?;

        let (text, truncated) = self.enforce_word_cap(generation.text.trim());

        Ok(ResponderOutput {
            text,
            tokens_used: generation.tokens_used,
            truncated,
        })
    }

    /// Assemble the grounded prompt
    fn build_prompt(
        &self,
        query: &str,
        intent: Intent,
        chunks: &[RetrievedChunk],
        history: Option<&[ConversationTurn]>,
    ) -> String {
        let mut parts = Vec::new();

        parts.push(format!(
            "Usted es el asistente virtual oficial de una empresa de soporte IT para PyMEs.\n\
             REGLAS OBLIGATORIAS:\n\
             1. Responda siempre en español formal (usted/ustedes).\n\
             2. Responda EXCLUSIVAMENTE con información del contexto proporcionado.\n\
             3. Si la información no está en el contexto, indíquelo claramente.\n\
             4. Nunca invente datos, cifras ni nombres.\n\
             5. Máximo {} palabras por respuesta.\n\
             6. Use tono profesional y corporativo, sin emojis ni lenguaje coloquial.",
            self.config.max_words
        ));

        if let Some(tone) = intent_guidance(intent) {
            parts.push(tone.to_string());
        }

        if let Some(turns) = history {
            // Only the most recent turns; the core keeps no dialogue state
            for turn in turns.iter().rev().take(2).rev() {
                parts.push(format!(
                    "Intercambio previo:\nUsuario: {}\nAsistente: {}",
                    turn.user, turn.assistant
                ));
            }
        }

        parts.push(format!(
            "Contexto relevante de la base de conocimiento:\n{}",
            format_context(chunks)
        ));

        parts.push(format!(
            "Pregunta del usuario: {}\n\n\
             Responda de manera profesional, concisa y basándose únicamente en el contexto.",
            query
        ));

        parts.join("\n\n")
    }

    /// Truncate text that exceeds the word cap, preferring to end at a
    /// sentence boundary when one lands near the cut
    fn enforce_word_cap(&self, text: &str) -> (String, bool) {
        let words: Vec<&str> = text.split_whitespace().collect();

        if words.len() <= self.config.max_words {
            return (text.to_string(), false);
        }

        let truncated = words[..self.config.max_words].join(" ");

        // End at the last sentence if it falls in the final 30%
        if let Some(last_period) = truncated.rfind('.') {
            if last_period >= truncated.len() * 7 / 10 {
                return (truncated[..=last_period].to_string(), true);
            }
        }

        (truncated, true)
    }

    /// Active configuration
    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }
}

/// Per-intent tone guidance appended to the system rules
fn intent_guidance(intent: Intent) -> Option<&'static str> {
    match intent {
        Intent::Planes => Some(
            "La consulta es sobre planes de servicio: mencione los planes por nombre \
             y aclare que los precios están sujetos a ajuste.",
        ),
        Intent::Sla => Some(
            "La consulta es sobre SLA: indique tiempos de respuesta y resolución \
             por prioridad cuando el contexto los incluya.",
        ),
        Intent::Tickets => Some(
            "La consulta es sobre tickets: describa el procedimiento paso a paso \
             si el contexto lo detalla.",
        ),
        Intent::Mantenimiento => Some(
            "La consulta es sobre mantenimiento: distinga tareas preventivas de \
             correctivas cuando aplique.",
        ),
        Intent::InfoGeneral | Intent::Faq | Intent::Otro => None,
    }
}

/// Format chunks as the only permissible factual source
fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            if chunk.section_label.is_empty() {
                format!("[Fuente {}: {}]\n{}", i + 1, chunk.source_file, chunk.text)
            } else {
                format!(
                    "[Fuente {}: {} - {}]\n{}",
                    i + 1,
                    chunk.source_file,
                    chunk.section_label,
                    chunk.text
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;
    use crate::generation::Generation;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingGenerator {
        calls: AtomicU32,
        response: String,
        fail_times: u32,
    }

    impl CountingGenerator {
        fn answering(response: &str) -> Self {
            Self {
                calls: AtomicU32::new(0),
                response: response.to_string(),
                fail_times: 0,
            }
        }

        fn failing_first(fail_times: u32, response: &str) -> Self {
            Self {
                calls: AtomicU32::new(0),
                response: response.to_string(),
                fail_times,
            }
        }
    }

    #[async_trait]
    impl Generator for CountingGenerator {
        async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<Generation> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                return Err(PipelineError::GenerationFailed("transient".to_string()));
            }
            Ok(Generation {
                text: self.response.clone(),
                tokens_used: 42,
            })
        }
    }

    fn chunk(text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: "c1".to_string(),
            text: text.to_string(),
            source_file: "planes_soporte.md".to_string(),
            section_label: "Planes".to_string(),
            similarity: 0.9,
            rerank_score: Some(1.0),
            final_score: 1.0,
        }
    }

    fn config() -> ResponderConfig {
        ResponderConfig {
            max_words: 150,
            max_tokens: 500,
            timeout_seconds: 15,
            max_retries: 1,
        }
    }

    #[tokio::test]
    async fn test_empty_chunks_canned_answer_zero_calls() {
        let generator = Arc::new(CountingGenerator::answering("no debería usarse"));
        let responder = Responder::new(generator.clone(), config());

        let output = responder
            .respond("¿algo raro?", Intent::Otro, &[], None)
            .await
            .unwrap();

        assert_eq!(output.text, INSUFFICIENT_INFO);
        assert_eq!(output.tokens_used, 0);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generates_with_grounding() {
        let generator = Arc::new(CountingGenerator::answering(
            "Ofrecemos los planes Basic, Professional y Enterprise.",
        ));
        let responder = Responder::new(generator.clone(), config());

        let chunks = vec![chunk("Planes: Basic, Professional, Enterprise")];
        let output = responder
            .respond("¿Qué planes ofrecen?", Intent::Planes, &chunks, None)
            .await
            .unwrap();

        assert!(output.text.contains("Basic"));
        assert_eq!(output.tokens_used, 42);
        assert!(!output.truncated);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once() {
        let generator = Arc::new(CountingGenerator::failing_first(1, "Respuesta."));
        let responder = Responder::new(generator.clone(), config());

        let chunks = vec![chunk("contexto")];
        let output = responder
            .respond("¿planes?", Intent::Planes, &chunks, None)
            .await
            .unwrap();

        assert_eq!(output.text, "Respuesta.");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_persistent_failure_surfaces_error() {
        let generator = Arc::new(CountingGenerator::failing_first(10, "nunca"));
        let responder = Responder::new(generator.clone(), config());

        let chunks = vec![chunk("contexto")];
        let result = responder
            .respond("¿planes?", Intent::Planes, &chunks, None)
            .await;

        assert!(matches!(result, Err(PipelineError::GenerationFailed(_))));
        // Initial attempt + one retry
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_word_cap_enforced_post_generation() {
        let long_answer = "palabra ".repeat(300);
        let generator = Arc::new(CountingGenerator::answering(&long_answer));
        let responder = Responder::new(generator, config());

        let chunks = vec![chunk("contexto")];
        let output = responder
            .respond("¿planes?", Intent::Planes, &chunks, None)
            .await
            .unwrap();

        assert!(output.truncated);
        assert!(output.text.split_whitespace().count() <= 150);
    }

    #[test]
    fn test_truncation_prefers_sentence_boundary() {
        let responder = Responder::new(
            Arc::new(CountingGenerator::answering("")),
            ResponderConfig {
                max_words: 10,
                ..config()
            },
        );

        let text = "Una dos tres cuatro cinco seis siete ocho nueve. Diez once doce trece";
        let (truncated, was_truncated) = responder.enforce_word_cap(text);

        assert!(was_truncated);
        assert!(truncated.ends_with('.'));
    }

    #[test]
    fn test_prompt_contains_context_and_query() {
        let responder = Responder::new(Arc::new(CountingGenerator::answering("")), config());

        let chunks = vec![chunk("Planes: Basic y Enterprise")];
        let prompt = responder.build_prompt("¿Qué planes hay?", Intent::Planes, &chunks, None);

        assert!(prompt.contains("Planes: Basic y Enterprise"));
        assert!(prompt.contains("¿Qué planes hay?"));
        assert!(prompt.contains("planes_soporte.md"));
        assert!(prompt.contains("EXCLUSIVAMENTE"));
    }

    #[test]
    fn test_prompt_includes_recent_history_only() {
        let responder = Responder::new(Arc::new(CountingGenerator::answering("")), config());

        let history = vec![
            ConversationTurn {
                user: "primera pregunta".to_string(),
                assistant: "primera respuesta".to_string(),
            },
            ConversationTurn {
                user: "segunda pregunta".to_string(),
                assistant: "segunda respuesta".to_string(),
            },
            ConversationTurn {
                user: "tercera pregunta".to_string(),
                assistant: "tercera respuesta".to_string(),
            },
        ];

        let chunks = vec![chunk("contexto")];
        let prompt =
            responder.build_prompt("¿y ahora?", Intent::Faq, &chunks, Some(&history));

        assert!(!prompt.contains("primera pregunta"));
        assert!(prompt.contains("segunda pregunta"));
        assert!(prompt.contains("tercera pregunta"));
    }
}
