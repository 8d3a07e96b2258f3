//! Text embedding for retrieval and semantic caching
//!
//! The `Embedder` trait is the seam the pipeline depends on; the default
//! implementation runs a multilingual sentence-transformer locally via
//! Candle. Ingestion and query time must share one implementation so
//! that dimensionality and vector space line up.

pub mod engine;

pub use engine::{Embedder, SentenceEmbedder, EMBEDDING_DIM};
