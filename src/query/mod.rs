//! Query pipeline: the guarded path from raw question to grounded answer
//!
//! Stages run in a fixed order (rate limit, validation, semantic cache,
//! intent classification, retrieval with reranking, grounded generation)
//! and only the cache hit may short-circuit. Each stage either advances
//! the query or terminates it with a specific, user-facing reason.

pub mod cache;
pub mod intent;
pub mod pipeline;
pub mod reranker;
pub mod responder;
pub mod retriever;
pub mod state;
pub mod validator;

pub use cache::SemanticCache;
pub use intent::{Intent, IntentClassifier};
pub use pipeline::{PipelineResult, QueryPipeline, SourceRef};
pub use reranker::CrossScorer;
pub use responder::Responder;
pub use retriever::{RetrievedChunk, Retriever};
pub use state::QueryState;
pub use validator::{QueryValidator, ValidationPolicy};
