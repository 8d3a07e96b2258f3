//! Intent classification via keyword matching
//!
//! Deterministic, sub-millisecond topic tagging. The result biases
//! retrieval and response tone; it never blocks the pipeline (the
//! validator already gated topic membership). Confidence is a
//! normalized match-strength score, not a calibrated probability.

use serde::{Deserialize, Serialize};

/// Closed set of query topics, declared most-specific first
///
/// Declaration order doubles as tie-break priority: when two intents
/// match the same number of distinct keywords, the earlier one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Service plans and pricing
    Planes,
    /// Response/resolution time commitments
    Sla,
    /// Ticket management
    Tickets,
    /// Preventive maintenance
    Mantenimiento,
    /// Company information
    InfoGeneral,
    /// Generic how/where/when questions
    Faq,
    /// No pattern matched
    Otro,
}

impl Intent {
    /// Stable label used in logs and cached entries
    pub fn label(&self) -> &'static str {
        match self {
            Intent::Planes => "planes",
            Intent::Sla => "sla",
            Intent::Tickets => "tickets",
            Intent::Mantenimiento => "mantenimiento",
            Intent::InfoGeneral => "info_general",
            Intent::Faq => "faq",
            Intent::Otro => "otro",
        }
    }
}

/// Classification outcome
#[derive(Debug, Clone)]
pub struct Classification {
    pub intent: Intent,
    /// Normalized match strength in [0, 1]
    pub confidence: f32,
    pub matched_keywords: Vec<String>,
}

/// Keyword-driven intent classifier
///
/// Patterns are declarative data loaded at construction, not scattered
/// conditionals; deployments can swap the tables wholesale.
pub struct IntentClassifier {
    patterns: Vec<(Intent, Vec<String>)>,
}

impl IntentClassifier {
    /// Create a classifier with the built-in phrase sets
    pub fn new() -> Self {
        let to_owned = |words: &[&str]| words.iter().map(|s| s.to_string()).collect();

        Self {
            patterns: vec![
                (
                    Intent::Planes,
                    to_owned(&[
                        "plan", "planes", "precio", "costo", "paquete", "tier", "basic",
                        "professional", "enterprise", "cuanto cuesta", "contratar", "ofrecen",
                    ]),
                ),
                (
                    Intent::Sla,
                    to_owned(&[
                        "sla", "tiempo", "respuesta", "cuanto tarda", "prioridad", "urgente",
                        "critical", "high", "medium", "low", "horario", "disponibilidad",
                    ]),
                ),
                (
                    Intent::Tickets,
                    to_owned(&[
                        "ticket", "incidente", "problema", "issue", "reporte", "solicitud",
                        "caso", "abrir ticket", "crear ticket", "estado", "seguimiento",
                    ]),
                ),
                (
                    Intent::Mantenimiento,
                    to_owned(&[
                        "mantenimiento", "preventivo", "actualizacion", "backup",
                        "maintenance", "update", "parche", "patch", "monitoreo",
                    ]),
                ),
                (
                    Intent::InfoGeneral,
                    to_owned(&[
                        "empresa", "compañia", "compañía", "quienes son", "que hacen",
                        "contacto", "ubicacion",
                    ]),
                ),
                (
                    Intent::Faq,
                    to_owned(&[
                        "como", "cómo", "donde", "dónde", "cuando", "cuándo", "porque",
                        "que es", "puedo", "debo", "necesito", "requisito", "incluye",
                    ]),
                ),
            ],
        }
    }

    /// Create a classifier with custom phrase sets (declaration order is
    /// tie-break priority)
    pub fn with_patterns(patterns: Vec<(Intent, Vec<String>)>) -> Self {
        Self { patterns }
    }

    /// Classify a query
    pub fn classify(&self, query: &str) -> Classification {
        let query_lower = query.to_lowercase();

        let mut best: Option<(Intent, Vec<String>)> = None;

        for (intent, keywords) in &self.patterns {
            let matches: Vec<String> = keywords
                .iter()
                .filter(|kw| query_lower.contains(kw.as_str()))
                .cloned()
                .collect();

            if matches.is_empty() {
                continue;
            }

            // Strictly-greater keeps the earlier (higher-priority) intent on ties
            let is_better = match &best {
                Some((_, best_matches)) => matches.len() > best_matches.len(),
                None => true,
            };

            if is_better {
                best = Some((*intent, matches));
            }
        }

        match best {
            Some((intent, matched_keywords)) => {
                let confidence = (matched_keywords.len() as f32 / 3.0).min(1.0);
                Classification {
                    intent,
                    confidence,
                    matched_keywords,
                }
            }
            None => Classification {
                intent: Intent::Otro,
                confidence: 0.0,
                matched_keywords: Vec::new(),
            },
        }
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}
