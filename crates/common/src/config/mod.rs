//! Configuration management for QueryBridge
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{env}, config/local)
//! - Default values
//!
//! Chunk sizes, overlap, cache TTL, top_k, and timeouts are all
//! configuration rather than constants in code.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Source database access configuration
    pub database: DatabaseConfig,

    /// Schema discovery configuration
    pub discovery: DiscoveryConfig,

    /// Embedding service configuration
    pub embedding: EmbeddingConfig,

    /// NL→SQL translation service configuration
    pub translator: TranslatorConfig,

    /// Document ingestion configuration
    pub ingestion: IngestionConfig,

    /// Query execution configuration
    pub query: QueryConfig,

    /// Response cache configuration
    pub cache: CacheConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Pool sizing and timeouts for source databases. The connection string
/// itself arrives per request, not from configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Maximum pool connections per source database
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connect timeout in seconds (the connectivity check budget)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Timeout for a single read query in seconds
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Maximum sample rows fetched per table
    #[serde(default = "default_sample_row_limit")]
    pub sample_row_limit: usize,

    /// Per-call introspection timeout in seconds
    #[serde(default = "default_introspection_timeout")]
    pub introspection_timeout_secs: u64,

    /// Extra business-term aliases merged into the built-in dictionary,
    /// canonical term → synonyms
    #[serde(default)]
    pub synonyms: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: http (OpenAI-compatible) or hash
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for the embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests during ingestion
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranslatorConfig {
    /// Translation provider: http (OpenAI-compatible chat endpoint) or static
    #[serde(default = "default_translator_provider")]
    pub provider: String,

    /// API key for the translation service
    pub api_key: Option<String>,

    /// API base URL
    pub api_base: Option<String>,

    /// Chat model used for NL→SQL
    #[serde(default = "default_translator_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_translator_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Target chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Minimum chunk size (smaller chunks are merged or dropped)
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,

    /// Files processed concurrently within one job
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,

    /// Total backoff budget for one chunk batch's embedding, in seconds
    #[serde(default = "default_embed_retry_budget")]
    pub embed_retry_budget_secs: u64,

    /// How long terminal jobs are retained for polling, in seconds
    #[serde(default = "default_job_retention")]
    pub job_retention_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Default number of document matches returned
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Row limit enforced on generated SQL
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// SQL sub-path timeout in seconds (translation + execution each)
    #[serde(default = "default_sql_timeout")]
    pub sql_timeout_secs: u64,

    /// Document sub-path timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,

    /// Source snippet preview length in characters
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Most-recent-N history records kept per connection
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Entry TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Maximum cached responses
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,

    /// Background sweep interval in seconds
    #[serde(default = "default_cache_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Prometheus metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_max_connections() -> u32 { 5 }
fn default_connect_timeout() -> u64 { 10 }
fn default_statement_timeout() -> u64 { 15 }
fn default_sample_row_limit() -> usize { 5 }
fn default_introspection_timeout() -> u64 { 10 }
fn default_embedding_provider() -> String { "http".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 768 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_embed_batch_size() -> usize { 32 }
fn default_translator_provider() -> String { "http".to_string() }
fn default_translator_model() -> String { "llama-3.3-70b-versatile".to_string() }
fn default_translator_timeout() -> u64 { 30 }
fn default_chunk_size() -> usize { 800 }
fn default_chunk_overlap() -> usize { 120 }
fn default_min_chunk_size() -> usize { 80 }
fn default_max_concurrent_files() -> usize { 4 }
fn default_embed_retry_budget() -> u64 { 30 }
fn default_job_retention() -> u64 { 3600 }
fn default_top_k() -> usize { 10 }
fn default_max_rows() -> usize { 100 }
fn default_sql_timeout() -> u64 { 20 }
fn default_search_timeout() -> u64 { 10 }
fn default_preview_chars() -> usize { 240 }
fn default_history_capacity() -> usize { 100 }
fn default_cache_ttl() -> u64 { 300 }
fn default_cache_max_entries() -> usize { 1000 }
fn default_cache_sweep_interval() -> u64 { 60 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "querybridge".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// SQL sub-path timeout as Duration
    pub fn sql_timeout(&self) -> Duration {
        Duration::from_secs(self.query.sql_timeout_secs)
    }

    /// Document sub-path timeout as Duration
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.query.search_timeout_secs)
    }

    /// Introspection call timeout as Duration
    pub fn introspection_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery.introspection_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
            },
            database: DatabaseConfig {
                max_connections: default_max_connections(),
                connect_timeout_secs: default_connect_timeout(),
                statement_timeout_secs: default_statement_timeout(),
            },
            discovery: DiscoveryConfig {
                sample_row_limit: default_sample_row_limit(),
                introspection_timeout_secs: default_introspection_timeout(),
                synonyms: HashMap::new(),
            },
            embedding: EmbeddingConfig {
                provider: default_embedding_provider(),
                api_key: None,
                api_base: None,
                model: default_embedding_model(),
                dimension: default_embedding_dimension(),
                timeout_secs: default_embedding_timeout(),
                max_retries: default_embedding_retries(),
                batch_size: default_embed_batch_size(),
            },
            translator: TranslatorConfig {
                provider: default_translator_provider(),
                api_key: None,
                api_base: None,
                model: default_translator_model(),
                timeout_secs: default_translator_timeout(),
            },
            ingestion: IngestionConfig {
                chunk_size: default_chunk_size(),
                chunk_overlap: default_chunk_overlap(),
                min_chunk_size: default_min_chunk_size(),
                max_concurrent_files: default_max_concurrent_files(),
                embed_retry_budget_secs: default_embed_retry_budget(),
                job_retention_secs: default_job_retention(),
            },
            query: QueryConfig {
                default_top_k: default_top_k(),
                max_rows: default_max_rows(),
                sql_timeout_secs: default_sql_timeout(),
                search_timeout_secs: default_search_timeout(),
                preview_chars: default_preview_chars(),
                history_capacity: default_history_capacity(),
            },
            cache: CacheConfig {
                ttl_secs: default_cache_ttl(),
                max_entries: default_cache_max_entries(),
                sweep_interval_secs: default_cache_sweep_interval(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
        }
    }
}

impl From<&CacheConfig> for crate::cache::CacheConfig {
    fn from(c: &CacheConfig) -> Self {
        Self {
            ttl_secs: c.ttl_secs,
            max_entries: c.max_entries,
            sweep_interval_secs: c.sweep_interval_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.discovery.sample_row_limit, 5);
    }

    #[test]
    fn test_overlap_smaller_than_chunk() {
        let config = AppConfig::default();
        assert!(config.ingestion.chunk_overlap < config.ingestion.chunk_size);
        assert!(config.ingestion.min_chunk_size <= config.ingestion.chunk_size);
    }
}
