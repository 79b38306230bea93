//! Configuration management for the Doca indexing pipeline.
//!
//! Settings come from built-in defaults, then an optional TOML file,
//! then `DOCA_*` environment variables.
//! Invalid chunking or batching parameters are rejected here, before
//! any run can start.

use crate::core::error::{DocaError, Result};
use crate::core::xdg::XdgDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything a run needs to know up front
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Walking and chunking
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexingConfig {
    /// Chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by neighbouring chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Chunks per embedding call and per collection write
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Extracted text beyond this many characters is dropped
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// Chunks beyond this count are dropped
    #[serde(default = "default_max_chunks_per_file")]
    pub max_chunks_per_file: usize,

    /// Maximum file size in MB (larger files are skipped with a warning)
    #[serde(default = "default_max_file_size")]
    pub max_file_size_mb: usize,

    /// Walk subdirectories unless a run overrides it
    #[serde(default = "default_recursive")]
    pub recursive: bool,

    /// File extensions to index, without the dot
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Glob patterns to exclude
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

/// Where embedding inference runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}

/// Embedding model configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Model identifier (a fastembed model name, or `hash`/`hash-<dim>`)
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Memory budget for one embedding batch, in GB
    #[serde(default = "default_memory_limit")]
    pub memory_limit: f64,

    /// Inference device
    #[serde(default)]
    pub device: Device,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory for collection storage
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Collection that indexing runs write into
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
}

/// Limits configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Timeout for a single embedding or write call, in seconds
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Events buffered per progress observer before it starts lagging
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,
}

fn default_chunk_size() -> usize {
    256
}

fn default_chunk_overlap() -> usize {
    64
}

fn default_batch_size() -> usize {
    2
}

fn default_max_content_length() -> usize {
    100_000
}

fn default_max_chunks_per_file() -> usize {
    50
}

fn default_max_file_size() -> usize {
    5
}

fn default_recursive() -> bool {
    true
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string(), "markdown".to_string()]
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
        "**/vendor/**".to_string(),
        "**/.git/**".to_string(),
        "**/build/**".to_string(),
        "**/dist/**".to_string(),
    ]
}

fn default_model_name() -> String {
    "paraphrase-multilingual-MiniLM-L12-v2".to_string()
}

fn default_memory_limit() -> f64 {
    8.0
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_collection_name() -> String {
    "doca_documents".to_string()
}

fn default_operation_timeout() -> u64 {
    120
}

fn default_progress_capacity() -> usize {
    256
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            batch_size: default_batch_size(),
            max_content_length: default_max_content_length(),
            max_chunks_per_file: default_max_chunks_per_file(),
            max_file_size_mb: default_max_file_size(),
            recursive: default_recursive(),
            extensions: default_extensions(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            memory_limit: default_memory_limit(),
            device: Device::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            collection_name: default_collection_name(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            operation_timeout_secs: default_operation_timeout(),
            progress_capacity: default_progress_capacity(),
        }
    }
}

impl EmbeddingConfig {
    /// Memory budget in bytes
    pub fn memory_limit_bytes(&self) -> u64 {
        (self.memory_limit * 1024.0 * 1024.0 * 1024.0) as u64
    }
}

impl StorageConfig {
    /// Directory holding one subdirectory per collection
    pub fn collections_dir(&self) -> PathBuf {
        self.data_dir.join("collections")
    }
}

impl Config {
    /// Parse a TOML file, missing keys take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| DocaError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from the standard locations
    pub fn load() -> Result<Self> {
        let xdg = XdgDirs::new();
        Self::load_with_xdg(&xdg)
    }

    /// Load using already-resolved directories
    ///
    /// Priority order:
    /// 1. DOCA_CONFIG or DOCA_CONFIG_FILE env var
    /// 2. XDG config file (~/.config/doca/config.toml)
    /// 3. ./doca.toml
    /// 4. Defaults
    pub fn load_with_xdg(xdg: &XdgDirs) -> Result<Self> {
        let mut config = if let Ok(config_path) = env::var("DOCA_CONFIG") {
            Self::from_file(config_path)?
        } else {
            let xdg_config = xdg.config_file();
            if xdg_config.exists() {
                Self::from_file(xdg_config)?
            } else if Path::new("doca.toml").exists() {
                Self::from_file("doca.toml")?
            } else {
                Self::default()
            }
        };

        // Use the XDG data directory unless one was set explicitly
        if env::var("DOCA_DATA_DIR").is_err() && config.storage.data_dir == default_data_dir() {
            config.storage.data_dir = xdg.data_dir.clone();
        }

        config.merge_env();
        config.validate()?;

        Ok(config)
    }

    /// Apply `DOCA_*` overrides on top of the current values
    pub fn merge_env(&mut self) {
        // Indexing configuration
        if let Some(size) = parse_env("DOCA_CHUNK_SIZE") {
            self.indexing.chunk_size = size;
        }
        if let Some(overlap) = parse_env("DOCA_CHUNK_OVERLAP") {
            self.indexing.chunk_overlap = overlap;
        }
        if let Some(batch) = parse_env("DOCA_BATCH_SIZE") {
            self.indexing.batch_size = batch;
        }
        if let Some(len) = parse_env("DOCA_MAX_CONTENT_LENGTH") {
            self.indexing.max_content_length = len;
        }
        if let Some(max) = parse_env("DOCA_MAX_CHUNKS_PER_FILE") {
            self.indexing.max_chunks_per_file = max;
        }
        if let Some(size) = parse_env("DOCA_MAX_FILE_SIZE_MB") {
            self.indexing.max_file_size_mb = size;
        }
        if let Ok(recursive) = env::var("DOCA_RECURSIVE") {
            self.indexing.recursive = matches!(recursive.as_str(), "1" | "true" | "yes");
        }

        // Embedding configuration
        if let Ok(model) = env::var("DOCA_MODEL_NAME") {
            if !model.is_empty() {
                self.embedding.model_name = model;
            }
        }
        if let Some(limit) = parse_env("DOCA_MEMORY_LIMIT") {
            self.embedding.memory_limit = limit;
        }
        if let Ok(device) = env::var("DOCA_DEVICE") {
            match device.to_lowercase().as_str() {
                "cpu" => self.embedding.device = Device::Cpu,
                "cuda" => self.embedding.device = Device::Cuda,
                other => tracing::warn!("Ignoring unknown DOCA_DEVICE value: {}", other),
            }
        } else if env::var("DOCA_USE_CUDA").as_deref() == Ok("1") {
            self.embedding.device = Device::Cuda;
        }

        // Storage configuration
        if let Ok(data_dir) = env::var("DOCA_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(name) = env::var("DOCA_COLLECTION_NAME") {
            self.storage.collection_name = name;
        }

        // Limits configuration
        if let Some(timeout) = parse_env("DOCA_OPERATION_TIMEOUT_SEC") {
            self.limits.operation_timeout_secs = timeout;
        }
        if let Some(capacity) = parse_env("DOCA_PROGRESS_CAPACITY") {
            self.limits.progress_capacity = capacity;
        }
    }

    /// Reject settings no run could use
    pub fn validate(&self) -> Result<()> {
        let indexing = &self.indexing;

        if indexing.chunk_size == 0 {
            return Err(DocaError::ConfigError(
                "Chunk size must be non-zero".to_string(),
            ));
        }

        if indexing.chunk_overlap >= indexing.chunk_size {
            return Err(DocaError::ConfigError(
                "Chunk overlap must be less than chunk size".to_string(),
            ));
        }

        if indexing.batch_size == 0 {
            return Err(DocaError::ConfigError(
                "Batch size must be non-zero".to_string(),
            ));
        }

        if indexing.max_content_length == 0 {
            return Err(DocaError::ConfigError(
                "Max content length must be non-zero".to_string(),
            ));
        }

        if indexing.max_chunks_per_file == 0 {
            return Err(DocaError::ConfigError(
                "Max chunks per file must be non-zero".to_string(),
            ));
        }

        if indexing.extensions.is_empty() {
            return Err(DocaError::ConfigError(
                "At least one file extension must be configured".to_string(),
            ));
        }

        if !self.embedding.memory_limit.is_finite() || self.embedding.memory_limit <= 0.0 {
            return Err(DocaError::ConfigError(
                "Memory limit must be a positive number of GB".to_string(),
            ));
        }

        if self.embedding.model_name.trim().is_empty() {
            return Err(DocaError::ConfigError(
                "Model name cannot be empty".to_string(),
            ));
        }

        validate_collection_name(&self.storage.collection_name)?;

        if self.limits.operation_timeout_secs == 0 {
            return Err(DocaError::ConfigError(
                "Operation timeout must be non-zero".to_string(),
            ));
        }

        if self.limits.progress_capacity == 0 {
            return Err(DocaError::ConfigError(
                "Progress capacity must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Log configuration
    pub fn log_config(&self) {
        tracing::info!("Configuration loaded:");
        tracing::info!("  Chunk size: {} chars", self.indexing.chunk_size);
        tracing::info!("  Chunk overlap: {} chars", self.indexing.chunk_overlap);
        tracing::info!("  Batch size: {}", self.indexing.batch_size);
        tracing::info!(
            "  Max content length: {} chars",
            self.indexing.max_content_length
        );
        tracing::info!(
            "  Max chunks per file: {}",
            self.indexing.max_chunks_per_file
        );
        tracing::info!("  Max file size: {} MB", self.indexing.max_file_size_mb);
        tracing::info!("  Extensions: {:?}", self.indexing.extensions);
        tracing::info!("  Model: {}", self.embedding.model_name);
        tracing::info!("  Memory limit: {} GB", self.embedding.memory_limit);
        tracing::info!("  Device: {}", self.embedding.device);
        tracing::info!("  Data dir: {:?}", self.storage.data_dir);
        tracing::info!("  Collection: {}", self.storage.collection_name);
        tracing::info!(
            "  Operation timeout: {}s",
            self.limits.operation_timeout_secs
        );
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = env::var(name).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={}", name, value);
            None
        }
    }
}

/// Collection names become directory names, so keep them simple
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DocaError::ConfigError(
            "Collection name cannot be empty".to_string(),
        ));
    }
    if name.len() > 64 {
        return Err(DocaError::ConfigError(format!(
            "Collection name '{name}' is too long (max 64 characters)"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DocaError::ConfigError(format!(
            "Collection name '{name}' may only contain letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}
