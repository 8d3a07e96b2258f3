//! Knowledge index: chunk store and vector search
//!
//! Both structures are built offline by the ingestion step and are
//! read-only at query time; concurrent readers share them through `Arc`
//! with no locking. Rebuilding the index is an offline operation that
//! swaps in a fresh process-wide instance.

pub mod flat;
pub mod store;

pub use flat::{FlatIndex, IndexHit, VectorSearch};
pub use store::{Chunk, ChunkStore};
