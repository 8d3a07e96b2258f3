//! Generation model access
//!
//! The `Generator` trait is the only way the pipeline talks to an LLM.
//! The default implementation streams from a local Ollama server with a
//! hard per-call timeout; `RetryPolicy` wraps calls with a small bounded
//! retry for transient failures.

pub mod client;
pub mod retry;

pub use client::{Generation, Generator, OllamaGenerator};
pub use retry::RetryPolicy;
