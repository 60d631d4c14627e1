
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub storefront: StorefrontConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub embedding_model: String,
    pub chat_model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            embedding_model: "nomic-embed-text:latest".to_string(),
            chat_model: "llama3.1:8b".to_string(),
            batch_size: 20,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            temperature: 0.3,
            timeout_seconds: 120,
        }
    }
}

/// Knobs for the read path of reply generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per customer message
    pub top_k: usize,
    /// Maximum characters of a source snippet returned to the caller
    pub snippet_chars: usize,
    /// Maximum order references looked up per message
    pub max_order_references: usize,
    /// Chunks scoring below this cosine similarity are dropped
    pub min_similarity: f32,
    /// Maximum cached resolved tickets quoted in the prompt
    pub learned_matches: usize,
    /// Minimum keyword overlap score for a cached ticket to be quoted
    pub learned_min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            snippet_chars: 150,
            max_order_references: 3,
            min_similarity: 0.0,
            learned_matches: 3,
            learned_min_score: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestionConfig {
    /// Upper bound for uploaded or pasted documents
    pub max_document_bytes: usize,
    /// Upper bound for the combined document produced by ticket learning
    pub max_learned_document_bytes: usize,
    /// Similarity at or above which an incremental lesson counts as already known
    pub duplicate_similarity: f32,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: 100 * 1024,
            max_learned_document_bytes: 5 * 1024 * 1024,
            duplicate_similarity: 0.95,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarvestConfig {
    /// Delay inserted between consecutive helpdesk API calls
    pub request_delay_ms: u64,
    /// Ticket detail fetches between two pauses
    pub detail_pause_every: usize,
    /// Page size requested from list endpoints
    pub per_page: u32,
    /// Page cap for each dedicated status filter
    pub max_filter_pages: u32,
    /// Page cap for each status on the search endpoint
    pub search_pages_per_status: u32,
    /// Page cap for the full scan fallback
    pub max_scan_pages: u32,
    pub min_target: usize,
    pub max_target: usize,
    /// Customer text length that still earns a stub entry without an agent reply
    pub stub_min_chars: usize,
    pub cache_ttl_seconds: u64,
    /// Tickets fetched when the learning cache is warmed during reply generation
    pub cache_warm_count: usize,
    /// Seconds to wait on HTTP 429 when the helpdesk sends no Retry-After
    pub throttle_backoff_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            // Freshdesk allows roughly 100 calls per minute on entry plans
            request_delay_ms: 650,
            detail_pause_every: 1,
            per_page: 100,
            max_filter_pages: 50,
            search_pages_per_status: 10,
            max_scan_pages: 300,
            min_target: 10,
            max_target: 5000,
            stub_min_chars: 50,
            cache_ttl_seconds: 3600,
            cache_warm_count: 30,
            throttle_backoff_seconds: 30,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorefrontConfig {
    pub api_version: String,
    pub timeout_seconds: u64,
    /// Orders returned for an email lookup
    pub max_orders_per_lookup: u32,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            api_version: "2024-01".to_string(),
            timeout_seconds: 15,
            max_orders_per_lookup: 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid target chunk size: {0} (must be between 200 and 8000 characters)")]
    InvalidTargetChunkSize(usize),
    #[error("Overlap ({0}) must be smaller than half the target chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid top_k: {0} (must be between 1 and 50)")]
    InvalidTopK(usize),
    #[error("Invalid snippet length: {0} (must be between 20 and 1000)")]
    InvalidSnippetLength(usize),
    #[error("Invalid similarity threshold: {0} (must be between 0.0 and 1.0)")]
    InvalidSimilarity(f32),
    #[error("Invalid document limit: {0} bytes")]
    InvalidDocumentLimit(usize),
    #[error("Invalid harvest target range: {0}..={1}")]
    InvalidTargetRange(usize, usize),
    #[error("Invalid page setting {0}: {1} (must be between 1 and {2})")]
    InvalidPageSetting(&'static str, u32, u32),
    #[error("Invalid API version: {0}")]
    InvalidApiVersion(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.validate_chunking_config()?;
        self.validate_retrieval_config()?;
        self.validate_ingestion_config()?;
        self.validate_harvest_config()?;

        if self.storefront.api_version.trim().is_empty() {
            return Err(ConfigError::InvalidApiVersion(
                self.storefront.api_version.clone(),
            ));
        }

        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(200..=8000).contains(&config.target_size) {
            return Err(ConfigError::InvalidTargetChunkSize(config.target_size));
        }

        // The next window must always start past the previous one
        if config.overlap * 2 >= config.target_size {
            return Err(ConfigError::OverlapTooLarge(
                config.overlap,
                config.target_size,
            ));
        }

        Ok(())
    }

    fn validate_retrieval_config(&self) -> Result<(), ConfigError> {
        let config = &self.retrieval;

        if !(1..=50).contains(&config.top_k) {
            return Err(ConfigError::InvalidTopK(config.top_k));
        }

        if !(20..=1000).contains(&config.snippet_chars) {
            return Err(ConfigError::InvalidSnippetLength(config.snippet_chars));
        }

        for threshold in [config.min_similarity, config.learned_min_score] {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::InvalidSimilarity(threshold));
            }
        }

        Ok(())
    }

    fn validate_ingestion_config(&self) -> Result<(), ConfigError> {
        let config = &self.ingestion;

        if config.max_document_bytes == 0 {
            return Err(ConfigError::InvalidDocumentLimit(config.max_document_bytes));
        }

        if config.max_learned_document_bytes < config.max_document_bytes {
            return Err(ConfigError::InvalidDocumentLimit(
                config.max_learned_document_bytes,
            ));
        }

        if !(0.0..=1.0).contains(&config.duplicate_similarity) {
            return Err(ConfigError::InvalidSimilarity(config.duplicate_similarity));
        }

        Ok(())
    }

    fn validate_harvest_config(&self) -> Result<(), ConfigError> {
        let config = &self.harvest;

        if config.min_target == 0 || config.min_target > config.max_target {
            return Err(ConfigError::InvalidTargetRange(
                config.min_target,
                config.max_target,
            ));
        }

        let pages = [
            ("per_page", config.per_page, 100),
            ("max_filter_pages", config.max_filter_pages, 500),
            ("search_pages_per_status", config.search_pages_per_status, 50),
            ("max_scan_pages", config.max_scan_pages, 5000),
        ];
        for (name, value, max) in pages {
            if value == 0 || value > max {
                return Err(ConfigError::InvalidPageSetting(name, value, max));
            }
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("metadata.db")
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        for model in [&self.embedding_model, &self.chat_model] {
            if model.trim().is_empty() {
                return Err(ConfigError::InvalidModel(model.clone()));
            }
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}

impl HarvestConfig {
    /// Clamp a requested ticket count into the supported range
    #[inline]
    pub fn clamp_target(&self, requested: usize) -> usize {
        requested.clamp(self.min_target, self.max_target)
    }
}
