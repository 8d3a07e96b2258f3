//! Configuration management for deskbuddy
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.deskbuddy/config.toml
//!
//! Every threshold in here is tunable deployment configuration, not a
//! contract: cache and retrieval cutoffs in particular should be
//! re-validated empirically whenever the embedding model changes.

use crate::errors::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete configuration for the query pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub ollama: OllamaConfig,
    pub retrieval: RetrievalConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub responder: ResponderConfig,
    pub validation: ValidationConfig,
    pub paths: PathsConfig,
}

/// Ollama connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub host: String,
    pub port: u16,
    pub model: String,
}

/// Vector retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates fetched from the index before reranking
    pub candidates: usize,
    /// Final number of chunks handed to the responder
    pub top_k: usize,
    /// Minimum cosine similarity for a chunk to count as grounding
    pub min_similarity: f32,
    /// Enable the lexical cross-scoring rerank pass
    pub rerank: bool,
}

/// Semantic cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cosine similarity required for a cache hit. Must be stricter than
    /// the retrieval floor: a hit means near-paraphrase, not same topic.
    pub hit_threshold: f32,
    /// Entry time-to-live in seconds
    pub ttl_seconds: u64,
    /// Maximum number of cached entries before LRU eviction
    pub max_entries: usize,
}

/// Per-requester rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Queries allowed per requester per window
    pub max_queries: u32,
    /// Window length in seconds (sliding)
    pub window_seconds: u64,
}

/// Response generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderConfig {
    /// Hard cap on response length in words
    pub max_words: usize,
    /// Token budget passed to the generation model
    pub max_tokens: u32,
    /// Per-call generation timeout in seconds
    pub timeout_seconds: u64,
    /// Retries after the first failed generation attempt
    pub max_retries: u32,
}

/// Query validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Maximum accepted query length in characters
    pub max_query_chars: usize,
}

/// File system paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Chunk snapshot produced by the offline ingestion step
    pub chunks_file: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            ollama: OllamaConfig::default(),
            retrieval: RetrievalConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            responder: ResponderConfig::default(),
            validation: ValidationConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11434,
            model: "qwen2.5:7b-instruct".to_string(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidates: 10,
            top_k: 3,
            min_similarity: 0.2,
            rerank: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hit_threshold: 0.92,
            ttl_seconds: 86_400,
            max_entries: 100,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_queries: 15,
            window_seconds: 3600,
        }
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            max_words: 150,
            max_tokens: 500,
            timeout_seconds: 15,
            max_retries: 1,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_query_chars: 150,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            chunks_file: "~/.deskbuddy/store/chunks.json".to_string(),
        }
    }
}

impl RagConfig {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("Failed to read config: {}", e)))?;

        let config: RagConfig = toml::from_str(&contents)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".deskbuddy").join("config.toml");
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(RagConfig::default())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(PipelineError::Config(
                "retrieval.top_k must be greater than 0".to_string(),
            ));
        }

        if self.retrieval.candidates < self.retrieval.top_k {
            return Err(PipelineError::Config(
                "retrieval.candidates must be at least retrieval.top_k".to_string(),
            ));
        }

        if !(-1.0..=1.0).contains(&self.retrieval.min_similarity) {
            return Err(PipelineError::Config(
                "retrieval.min_similarity must be a cosine value in [-1, 1]".to_string(),
            ));
        }

        if self.cache.hit_threshold <= self.retrieval.min_similarity {
            return Err(PipelineError::Config(
                "cache.hit_threshold must be stricter than retrieval.min_similarity".to_string(),
            ));
        }

        if self.cache.max_entries == 0 {
            return Err(PipelineError::Config(
                "cache.max_entries must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.max_queries == 0 {
            return Err(PipelineError::Config(
                "rate_limit.max_queries must be greater than 0".to_string(),
            ));
        }

        if self.responder.max_words == 0 {
            return Err(PipelineError::Config(
                "responder.max_words must be greater than 0".to_string(),
            ));
        }

        if !(5..=60).contains(&self.responder.timeout_seconds) {
            return Err(PipelineError::Config(
                "responder.timeout_seconds must be between 5 and 60".to_string(),
            ));
        }

        if self.validation.max_query_chars == 0 {
            return Err(PipelineError::Config(
                "validation.max_query_chars must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &PathBuf) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PipelineError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| PipelineError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Get Ollama base URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Get chunk snapshot path
    pub fn chunks_file(&self) -> PathBuf {
        Self::expand_path(&self.paths.chunks_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RagConfig::default();
        assert_eq!(config.ollama.host, "127.0.0.1");
        assert_eq!(config.ollama.port, 11434);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.rate_limit.max_queries, 15);
    }

    #[test]
    fn test_config_validation_success() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_top_k() {
        let mut config = RagConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_candidates_below_top_k() {
        let mut config = RagConfig::default();
        config.retrieval.candidates = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_cache_threshold_ordering() {
        let mut config = RagConfig::default();
        config.cache.hit_threshold = 0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_timeout_band() {
        let mut config = RagConfig::default();
        config.responder.timeout_seconds = 120;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ollama_url() {
        let config = RagConfig::default();
        assert_eq!(config.ollama_url(), "http://127.0.0.1:11434");
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = RagConfig::expand_path("~/.deskbuddy");
        assert!(!expanded.to_string_lossy().contains('~'));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = "/absolute/path";
        let expanded = RagConfig::expand_path(path);
        assert_eq!(expanded.to_string_lossy(), path);
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = RagConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: RagConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.cache.max_entries, config.cache.max_entries);
        assert_eq!(parsed.responder.max_words, config.responder.max_words);
    }
}
